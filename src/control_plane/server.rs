//! Control Plane API server (spec §4.5, C5): axum router plus the
//! `axum::serve` entry point, following the shape of the pack's
//! Axum-based web servers (public routes, then a protected group under
//! middleware, merged into one router).

use std::net::SocketAddr;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::auth::require_agent_api_key;
use super::handlers;
use super::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let agent_routes = Router::new()
        .route("/register", post(handlers::register_server))
        .route("/heartbeat", post(handlers::heartbeat))
        .route("/metrics", post(handlers::report_metrics))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_agent_api_key));

    let pod_routes = Router::new()
        .route("/pods", post(handlers::create_pod))
        .route("/pods/:pod_id", get(handlers::get_pod_status).delete(handlers::delete_pod))
        .route("/pods/:pod_id/start", post(handlers::start_pod))
        .route("/pods/:pod_id/stop", post(handlers::stop_pod))
        .route("/pods/:pod_id/retry", post(handlers::retry_pod))
        .route("/pods/:pod_id/rebuild", post(handlers::rebuild_pod))
        .route("/pods/:pod_id/snapshots", post(handlers::create_snapshot));

    Router::new()
        .merge(agent_routes)
        .merge(pod_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);
    info!(%addr, "control plane listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
