//! Shared application state injected into every handler.

use std::sync::Arc;

use crate::config::{Settings, Timeouts};
use crate::host::HostRegistry;
use crate::orchestrator::Orchestrator;
use crate::snapshot::SnapshotEngine;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub hosts: Arc<HostRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub snapshot_engine: Arc<SnapshotEngine>,
    pub settings: Arc<Settings>,
    pub timeouts: Timeouts,
    /// Shared secret the Host Agent presents in `X-Api-Key` (spec §6).
    pub agent_api_key: String,
}
