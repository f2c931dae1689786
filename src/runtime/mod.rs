//! Container Runtime Adapter (spec §4.2, C2): a thin contract over a
//! sandboxed container runtime. One adapter implementation per supported
//! runtime; the reference target is a userspace-kernel sandbox (gVisor-
//! style) invoked through the host's container CLI (spec §9 "thin
//! bindings" design note — prefer the native API where available, fall
//! back to the CLI through Host Connection for anything that lacks API
//! coverage, and never build shell strings).

pub mod sandboxed;
pub mod spec;

pub use spec::{ContainerSpec, HostBindMount, PublishedPort, ResourceLimits, VolumeMount};

use async_trait::async_trait;

use crate::error::CoreResult;

#[derive(Debug, Clone, Default)]
pub struct ContainerFilter {
    pub label: Option<(String, String)>,
    pub name_prefix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub status: String,
}

#[derive(Debug, Clone, Default)]
pub struct ContainerStats {
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn create_network(&self, pod_network_name: &str, subnet: &str) -> CoreResult<()>;
    async fn destroy_network(&self, pod_network_name: &str) -> CoreResult<()>;

    async fn create_volume(&self, name: &str) -> CoreResult<()>;
    async fn remove_volume(&self, name: &str) -> CoreResult<()>;
    async fn volume_exists(&self, name: &str) -> CoreResult<bool>;

    /// Returns the full 64-character container ID (spec §4.2 invariant:
    /// this is what every downstream operation must use).
    async fn create_container(&self, spec: &ContainerSpec) -> CoreResult<String>;
    async fn start_container(&self, container_id: &str) -> CoreResult<()>;
    async fn stop_container(&self, container_id: &str, grace_period_secs: u32) -> CoreResult<()>;
    async fn remove_container(&self, container_id: &str, force: bool) -> CoreResult<()>;
    async fn list_containers(&self, filter: ContainerFilter) -> CoreResult<Vec<ContainerSummary>>;

    async fn exec_in_container(&self, container_id: &str, cmd: &[String]) -> CoreResult<(String, String, i32)>;
    async fn stats(&self, container_id: &str) -> CoreResult<ContainerStats>;

    /// Block until `container_id` exits and return its exit code. Used by
    /// one-shot helper containers (snapshot export/import) that run a
    /// single command and terminate on their own.
    async fn wait_container(&self, container_id: &str) -> CoreResult<i32>;
}
