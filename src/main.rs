//! `pinacle-control-plane`: the Control Plane API (spec §4.5, C5). Loads
//! settings from the environment, opens the SQLite store, reconnects to
//! every known host, and serves the agent-facing and pod-CRUD HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use pinacle_core::config::{Settings, StorageBackend};
use pinacle_core::control_plane::host_connect::build_host_handle;
use pinacle_core::control_plane::{sweep, AppState};
use pinacle_core::host::HostRegistry;
use pinacle_core::logging;
use pinacle_core::orchestrator::Orchestrator;
use pinacle_core::snapshot::{FilesystemStorage, S3Storage, SnapshotEngine, StorageProvider};
use pinacle_core::store::{SqliteStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init("pinacle_core=info,pinacle_control_plane=info")?;

    let settings = Arc::new(Settings::from_env().context("loading settings from environment")?);

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://pinacle.db".to_string());
    let store: Arc<dyn Store> = Arc::new(SqliteStore::connect(&database_url).await.context("connecting to sqlite store")?);

    let storage: Arc<dyn StorageProvider> = match &settings.storage {
        StorageBackend::Filesystem { base_path } => Arc::new(FilesystemStorage::new(base_path.clone())),
        StorageBackend::S3(config) => Arc::new(S3Storage::new(config).await.context("initializing s3 storage provider")?),
    };

    let hosts = Arc::new(HostRegistry::new());
    reconnect_known_hosts(store.as_ref(), &hosts, &settings).await;

    let snapshot_engine = Arc::new(SnapshotEngine::new(store.clone(), hosts.clone(), storage));
    let orchestrator = Orchestrator::with_host_registry(store.clone(), hosts.clone(), &settings.timeouts)
        .with_port_range(settings.port_range.clone())
        .with_restorer(snapshot_engine.clone());
    let orchestrator = Arc::new(orchestrator);

    tokio::spawn(sweep::run(store.clone(), settings.timeouts.heartbeat_stale, settings.timeouts.heartbeat_interval));

    let state = AppState {
        store,
        hosts,
        orchestrator,
        snapshot_engine,
        settings: settings.clone(),
        timeouts: settings.timeouts,
        agent_api_key: settings.api_key.clone(),
    };

    let addr: SocketAddr = std::env::var("LISTEN_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()
        .context("parsing LISTEN_ADDR")?;
    pinacle_core::control_plane::server::serve(state, addr).await
}

/// On startup, re-establish a live host connection and runtime adapter for
/// every host the store already knows about, so a control-plane restart
/// doesn't orphan running pods until their next heartbeat.
async fn reconnect_known_hosts(store: &dyn Store, hosts: &HostRegistry, settings: &Settings) {
    let servers = match store.list_servers().await {
        Ok(servers) => servers,
        Err(err) => {
            warn!(error = %err, "could not list known hosts on startup");
            return;
        }
    };

    for server in servers {
        match build_host_handle(&server, settings) {
            Ok((conn, runtime)) => {
                hosts.register(server.id.to_string(), conn, runtime);
                info!(host_id = %server.id, "reconnected to host on startup");
            }
            Err(err) => warn!(host_id = %server.id, error = %err, "could not reconnect to host on startup"),
        }
    }
}
