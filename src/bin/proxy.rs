//! `pinacle-proxy`: the Authenticated Subdomain Proxy (spec §4.7, C7). A
//! separate process (may be co-located with the control plane) that reads
//! the same `Pod`/`Server` rows to route subdomain traffic to the right
//! pod upstream.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use pinacle_core::config::Settings;
use pinacle_core::logging;
use pinacle_core::proxy::{build_router, ProxyState};
use pinacle_core::store::{SqliteStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init("pinacle_core=info,pinacle_proxy=info")?;

    let settings = Settings::from_env().context("loading settings from environment")?;
    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://pinacle.db".to_string());
    let store: Arc<dyn Store> = Arc::new(SqliteStore::connect(&database_url).await.context("connecting to sqlite store")?);

    let state = ProxyState::new(store, &settings);
    let app = build_router(state);

    let addr: SocketAddr = std::env::var("PROXY_LISTEN_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8443".to_string())
        .parse()
        .context("parsing PROXY_LISTEN_ADDR")?;

    info!(%addr, "proxy listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
