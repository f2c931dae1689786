//! The proxy's axum application (spec §4.7): hostname parsing, the
//! capability-token callback, and the catch-all forwarding handler for both
//! plain HTTP and WebSocket upgrades.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::ws::{Message as AMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Query, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::any;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use http_body_util::BodyExt;
use serde::Deserialize;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as TMessage;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::Settings;
use crate::error::CoreError;
use crate::model::Pod;
use crate::store::Store;

use super::error::{ProxyError, ProxyResult};
use super::hostname::ProxyHostname;
use super::inject::{inject_script, random_nonce, rewrite_csp_for_nonce, strip_framing_headers};
use super::pool::{UpstreamPool, UpstreamTarget};
use super::token::TokenCodec;

pub const COOKIE_NAME: &str = "pinacle-proxy-token";
pub const CALLBACK_PATH: &str = "/pinacle-proxy-callback";

#[derive(Clone)]
pub struct ProxyState {
    pub store: Arc<dyn Store>,
    pub pool: Arc<UpstreamPool>,
    pub token_codec: Arc<TokenCodec>,
    pub base_domain: String,
    pub api_url: String,
    pub dev_mode: bool,
    pub http_client: reqwest::Client,
}

impl ProxyState {
    pub fn new(store: Arc<dyn Store>, settings: &Settings) -> Self {
        Self {
            store,
            pool: Arc::new(UpstreamPool::new(settings.timeouts.proxy_cache_ttl)),
            token_codec: Arc::new(TokenCodec::new(&settings.proxy_token_signing_key)),
            base_domain: settings.proxy_base_domain.clone(),
            api_url: settings.api_url.clone(),
            dev_mode: settings.dev_mode,
            http_client: reqwest::Client::new(),
        }
    }
}

pub fn build_router(state: ProxyState) -> Router {
    Router::new()
        .route(CALLBACK_PATH, any(callback))
        .fallback(any(forward))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    token: String,
    embed: Option<bool>,
    return_url: Option<String>,
}

fn host_header(headers: &HeaderMap) -> Option<String> {
    headers.get(axum::http::header::HOST)?.to_str().ok().map(str::to_string)
}

fn parse_hostname(headers: &HeaderMap, base_domain: &str) -> ProxyResult<ProxyHostname> {
    let host = host_header(headers).ok_or_else(|| ProxyError::Core(CoreError::NotFound("no Host header".into())))?;
    ProxyHostname::parse(&host, base_domain).ok_or_else(|| ProxyError::Core(CoreError::NotFound(format!("{host} is not a proxy hostname"))))
}

/// Capability-flow step 2 (spec §4.7): verify the token, check it matches
/// the hostname it was redirected back to, and set the scoped cookie.
async fn callback(State(state): State<ProxyState>, headers: HeaderMap, Query(query): Query<CallbackQuery>) -> ProxyResult<Response> {
    let hostname = parse_hostname(&headers, &state.base_domain)?;
    let claims = state.token_codec.verify(&query.token)?;

    if claims.pod_slug != hostname.pod_slug || claims.target_port != hostname.target_port {
        return Err(ProxyError::Core(CoreError::Forbidden("token does not match requested hostname".into())));
    }

    let embed = query.embed.unwrap_or(false);
    let cookie = build_set_cookie(&query.token, embed, state.dev_mode);

    let redirect_to = query.return_url.unwrap_or_else(|| "/".to_string());
    let mut response = Redirect::to(&redirect_to).into_response();
    response.headers_mut().append(axum::http::header::SET_COOKIE, cookie);
    Ok(response)
}

/// Cookie attributes per spec §4.7: `SameSite=Lax` for a top-level
/// navigation, `SameSite=None; Secure; Partitioned` when embedded in an
/// iframe so the cookie is bound to the embedding top-level site. `Secure`
/// is dropped only in dev mode, where proxying typically happens over
/// plain HTTP on localhost.
fn build_set_cookie(token: &str, embed: bool, dev_mode: bool) -> HeaderValue {
    let secure = if dev_mode { "" } else { "; Secure" };
    let value = if embed {
        format!("{COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=None; Partitioned{secure}")
    } else {
        format!("{COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax{secure}")
    };
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static(""))
}

fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    raw.split(';').map(str::trim).find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}

async fn resolve_upstream(state: &ProxyState, pod: &Pod, target_port: u16) -> ProxyResult<UpstreamTarget> {
    let host_id = pod.host_id.clone().ok_or_else(|| ProxyError::Core(CoreError::NotFound(format!("pod {} has no host", pod.id))))?;
    let parsed_host_id = host_id
        .parse::<crate::model::ServerId>()
        .map_err(|_| ProxyError::Core(CoreError::NotFound("malformed host id".into())))?;
    let server = state
        .store
        .get_server(&parsed_host_id)
        .await?
        .ok_or_else(|| ProxyError::Core(CoreError::NotFound(format!("host {host_id} not found"))))?;
    let nginx_port = pod.nginx_proxy_port().ok_or_else(|| ProxyError::Core(CoreError::NotFound("pod has no nginx-proxy port mapping".into())))?;

    Ok(UpstreamTarget {
        base_url: format!("http://{}:{}", server.ip_address, nginx_port),
        host_header: format!("localhost-{}.pod-{}.{}", target_port, pod.slug, state.base_domain),
    })
}

async fn forward(State(state): State<ProxyState>, request: Request) -> Response {
    match forward_inner(state, request).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn forward_inner(state: ProxyState, request: Request) -> ProxyResult<Response> {
    let (mut parts, body) = request.into_parts();
    let hostname = parse_hostname(&parts.headers, &state.base_domain)?;

    let Some(token) = extract_cookie(&parts.headers, COOKIE_NAME) else {
        return Ok(redirect_to_auth(&state, &hostname, &parts.uri));
    };
    let claims = state.token_codec.verify(&token)?;
    if claims.pod_slug != hostname.pod_slug || claims.target_port != hostname.target_port {
        return Err(ProxyError::Core(CoreError::Forbidden("cookie does not match requested hostname".into())));
    }

    let pod_id = claims.pod_id;
    let pod = state
        .store
        .get_pod(&pod_id)
        .await?
        .ok_or_else(|| ProxyError::Core(CoreError::NotFound(format!("pod {pod_id} not found"))))?;

    let target = state
        .pool
        .get_or_resolve(pod_id, claims.target_port, || resolve_upstream(&state, &pod, claims.target_port))
        .await?;

    if is_websocket_upgrade(&parts.headers) {
        let upgrade = WebSocketUpgrade::from_request_parts(&mut parts, &state)
            .await
            .map_err(|_| ProxyError::BadGateway("invalid websocket upgrade request".into()))?;
        return Ok(handle_websocket(upgrade, target, parts.uri).await);
    }

    let bytes = body.collect().await.map_err(|e| ProxyError::BadGateway(e.to_string()))?.to_bytes();
    forward_http(&state, &target, parts.method, &parts.uri, parts.headers, bytes).await
}

/// Capability-flow step 1 (spec §4.7): a proxy hostname hit with no session
/// cookie bounces to the control plane's own auth endpoint, which
/// authenticates the user, checks team membership for the pod slug, mints a
/// scoped token, and redirects back to [`CALLBACK_PATH`] on this hostname.
fn redirect_to_auth(state: &ProxyState, hostname: &ProxyHostname, uri: &Uri) -> Response {
    let return_url = format!("http://{}{}", hostname.canonical_host(&state.base_domain), uri.path_and_query().map(|p| p.as_str()).unwrap_or("/"));
    let target = format!(
        "{}/proxy/authorize?podSlug={}&targetPort={}&returnUrl={}",
        state.api_url,
        urlencoding::encode(&hostname.pod_slug),
        hostname.target_port,
        urlencoding::encode(&return_url),
    );
    Redirect::to(&target).into_response()
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let is_upgrade = headers
        .get(axum::http::header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("upgrade"))
        .unwrap_or(false);
    let is_websocket = headers
        .get(axum::http::header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    is_upgrade && is_websocket
}

async fn forward_http(
    state: &ProxyState,
    target: &UpstreamTarget,
    method: Method,
    uri: &Uri,
    mut headers: HeaderMap,
    body: Bytes,
) -> ProxyResult<Response> {
    headers.remove(axum::http::header::HOST);
    headers.insert(axum::http::header::HOST, HeaderValue::from_str(&target.host_header).unwrap_or_else(|_| HeaderValue::from_static("")));
    headers.remove(axum::http::header::ACCEPT_ENCODING);

    let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let url = format!("{}{}", target.base_url, path_and_query);

    let upstream_response = state
        .http_client
        .request(method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| ProxyError::BadGateway(format!("upstream request failed: {e}")))?;

    let status = upstream_response.status();
    let response_headers = upstream_response.headers().clone();
    let is_html = response_headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("text/html"))
        .unwrap_or(false);

    if is_html {
        let bytes = upstream_response.bytes().await.map_err(|e| ProxyError::BadGateway(e.to_string()))?;
        let html = String::from_utf8_lossy(&bytes).into_owned();
        let nonce = random_nonce();
        let injected = inject_script(&html, &nonce);

        let mut out_headers = response_headers;
        strip_framing_headers(&mut out_headers);
        rewrite_csp_for_nonce(&mut out_headers, &nonce);
        out_headers.remove(axum::http::header::CONTENT_LENGTH);
        out_headers.insert(axum::http::header::CONTENT_LENGTH, HeaderValue::from_str(&injected.len().to_string()).unwrap());

        let mut builder = Response::builder().status(status);
        *builder.headers_mut().unwrap() = out_headers;
        return Ok(builder.body(Body::from(injected)).unwrap());
    }

    let stream = upstream_response.bytes_stream();
    let mut builder = Response::builder().status(status);
    *builder.headers_mut().unwrap() = response_headers;
    Ok(builder.body(Body::from_stream(stream)).unwrap())
}

async fn handle_websocket(upgrade: WebSocketUpgrade, target: UpstreamTarget, uri: Uri) -> Response {
    let ws_url = format!("ws://{}{}", target.base_url.trim_start_matches("http://"), uri.path_and_query().map(|p| p.as_str()).unwrap_or("/"));

    let mut client_request = match ws_url.clone().into_client_request() {
        Ok(req) => req,
        Err(e) => return (StatusCode::BAD_GATEWAY, format!("invalid upstream websocket url: {e}")).into_response(),
    };
    if let Ok(value) = HeaderValue::from_str(&target.host_header) {
        client_request.headers_mut().insert(axum::http::header::HOST, value);
    }

    let upstream = match tokio_tungstenite::connect_async(client_request).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            warn!(error = %e, url = %ws_url, "websocket upgrade to upstream failed");
            return (StatusCode::BAD_GATEWAY, "upstream refused websocket upgrade").into_response();
        }
    };

    upgrade.on_upgrade(move |socket| bridge_websockets(socket, upstream))
}

async fn bridge_websockets(client: WebSocket, upstream: tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>) {
    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let client_to_upstream = async move {
        while let Some(Ok(msg)) = client_rx.next().await {
            let converted = match msg {
                AMessage::Text(t) => TMessage::Text(t),
                AMessage::Binary(b) => TMessage::Binary(b),
                AMessage::Ping(b) => TMessage::Ping(b),
                AMessage::Pong(b) => TMessage::Pong(b),
                AMessage::Close(_) => break,
            };
            if upstream_tx.send(converted).await.is_err() {
                break;
            }
        }
        let _ = upstream_tx.send(TMessage::Close(None)).await;
    };

    let upstream_to_client = async move {
        while let Some(Ok(msg)) = upstream_rx.next().await {
            let converted = match msg {
                TMessage::Text(t) => AMessage::Text(t),
                TMessage::Binary(b) => AMessage::Binary(b),
                TMessage::Ping(b) => AMessage::Ping(b),
                TMessage::Pong(b) => AMessage::Pong(b),
                TMessage::Close(_) | TMessage::Frame(_) => break,
            };
            if client_tx.send(converted).await.is_err() {
                break;
            }
        }
        let _ = client_tx.send(AMessage::Close(None)).await;
    };

    tokio::select! {
        _ = client_to_upstream => {}
        _ = upstream_to_client => {}
    }
}
