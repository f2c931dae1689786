//! Wire-format request/response bodies for the control-plane API (spec
//! §4.5, §6). Kept separate from the domain model so the two can evolve
//! independently of each other's `serde` attributes.

use serde::{Deserialize, Serialize};

use crate::model::{
    Pod, PodConfig, PodId, PodLog, PodMetricsSample, Server, ServerId, ServerMetricsSample, SnapshotId, SshEndpoint,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterServerRequest {
    pub id: ServerId,
    pub hostname: String,
    pub ip_address: String,
    pub cpu_cores: u32,
    pub memory_mb: u64,
    pub disk_gb: u64,
    pub ssh_host: String,
    pub ssh_port: u16,
    pub ssh_user: String,
    #[serde(default)]
    pub local_vm_name: Option<String>,
}

impl RegisterServerRequest {
    pub fn ssh_endpoint(&self) -> SshEndpoint {
        SshEndpoint { host: self.ssh_host.clone(), port: self.ssh_port, user: self.ssh_user.clone() }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub server_id: ServerId,
}

/// Flat wire shape (spec §6): the server-wide sample's fields sit alongside
/// `serverId` at the top level rather than nested, with per-pod samples in
/// `podMetrics`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetricsRequest {
    pub server_id: ServerId,
    pub cpu_usage_percent: f64,
    pub memory_usage_mb: f64,
    pub disk_usage_gb: f64,
    pub active_pods_count: u32,
    #[serde(default)]
    pub pod_metrics: Vec<PodMetricsRequestEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodMetricsRequestEntry {
    pub pod_id: PodId,
    pub container_id: String,
    pub cpu_usage_percent: f64,
    pub memory_usage_mb: f64,
    pub disk_usage_mb: f64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
}

impl ReportMetricsRequest {
    pub fn into_samples(self) -> (ServerMetricsSample, Vec<PodMetricsSample>) {
        let now = chrono::Utc::now();
        let server_sample = ServerMetricsSample {
            server_id: self.server_id,
            cpu_usage_percent: self.cpu_usage_percent,
            memory_usage_mb: self.memory_usage_mb,
            disk_usage_gb: self.disk_usage_gb,
            active_pods_count: self.active_pods_count,
            recorded_at: now,
        };
        let pod_samples = self
            .pod_metrics
            .into_iter()
            .map(|p| PodMetricsSample {
                pod_id: p.pod_id,
                container_id: p.container_id,
                cpu_usage_percent: p.cpu_usage_percent,
                memory_usage_mb: p.memory_usage_mb,
                disk_usage_mb: p.disk_usage_mb,
                network_rx_bytes: p.network_rx_bytes,
                network_tx_bytes: p.network_tx_bytes,
                recorded_at: now,
            })
            .collect();
        (server_sample, pod_samples)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePodRequest {
    pub name: String,
    pub slug: String,
    pub owner_user_id: String,
    pub owner_team_id: String,
    pub template: String,
    pub tier_tag: String,
    #[serde(default)]
    pub service_toggles: Vec<String>,
    #[serde(default)]
    pub env_set_ref: Option<String>,
    #[serde(default)]
    pub pre_snapshot_hook: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RebuildPodRequest {
    #[serde(default)]
    pub from_snapshot: Option<SnapshotId>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PodStatusQuery {
    #[serde(default)]
    pub after_log_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PodStatusResponse {
    pub pod: Pod,
    pub logs: Vec<PodLog>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnapshotResponse {
    pub id: SnapshotId,
    pub storage_path: String,
    pub size_bytes: u64,
}

impl CreatePodRequest {
    pub fn into_config(self) -> (PodConfig, String, String, String, String) {
        let config = PodConfig {
            template: self.template.clone(),
            tier_tag: self.tier_tag.clone(),
            service_toggles: self.service_toggles,
            env_set_ref: self.env_set_ref,
            pre_snapshot_hook: self.pre_snapshot_hook,
        };
        (config, self.name, self.slug, self.owner_user_id, self.owner_team_id)
    }
}

/// Register response is just the id (spec §6: `POST /register` → `{id}`).
pub fn server_response(server: &Server) -> serde_json::Value {
    serde_json::json!({ "id": server.id })
}

pub fn pod_id_response(id: PodId) -> serde_json::Value {
    serde_json::json!({ "id": id })
}
