//! Shared host registry: resolves a host id to its live connection and
//! container runtime. The Pod Orchestrator and the Snapshot Engine both
//! need this (spec §4.1, §4.3, §4.6) and must agree on the same live set,
//! so it lives here rather than inside either module.

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{CoreError, CoreResult};
use crate::runtime::ContainerRuntime;

use super::HostConnection;

#[derive(Clone)]
pub struct HostHandle {
    pub conn: Arc<dyn HostConnection>,
    pub runtime: Arc<dyn ContainerRuntime>,
}

#[derive(Default)]
pub struct HostRegistry {
    hosts: DashMap<String, HostHandle>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, host_id: impl Into<String>, conn: Arc<dyn HostConnection>, runtime: Arc<dyn ContainerRuntime>) {
        self.hosts.insert(host_id.into(), HostHandle { conn, runtime });
    }

    pub fn get(&self, host_id: &str) -> CoreResult<HostHandle> {
        self.hosts
            .get(host_id)
            .map(|h| h.clone())
            .ok_or_else(|| CoreError::NotFound(format!("no host connection registered for {host_id}")))
    }
}
