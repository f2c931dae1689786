//! Persistence Model (spec §4.8, C8): a storage-agnostic `Store` trait plus
//! a SQLite-backed implementation. No enforced foreign keys except
//! `pods.owner_user_id`; every other reference is soft (spec §4.8).

pub mod sqlite;

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::model::{Pod, PodLog, PodMetricsSample, Server, ServerMetricsSample, SnapshotRecord};

pub use sqlite::SqliteStore;

/// A port held by a non-archived pod on a host, for the port allocator's
/// authoritative view (spec §5 "Host-local port range").
#[derive(Debug, Clone, Copy)]
pub struct HeldPort {
    pub external: u16,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert_server(&self, server: &Server) -> CoreResult<()>;
    async fn get_server(&self, id: &crate::model::ServerId) -> CoreResult<Option<Server>>;
    async fn list_servers(&self) -> CoreResult<Vec<Server>>;
    async fn touch_heartbeat(&self, id: &crate::model::ServerId, at: chrono::DateTime<chrono::Utc>) -> CoreResult<()>;
    async fn mark_offline_if_stale(&self, stale_threshold: chrono::Duration) -> CoreResult<Vec<crate::model::ServerId>>;

    async fn insert_pod(&self, pod: &Pod) -> CoreResult<()>;
    async fn get_pod(&self, id: &crate::model::PodId) -> CoreResult<Option<Pod>>;
    async fn get_pod_by_slug(&self, slug: &str) -> CoreResult<Option<Pod>>;
    /// Updates the row only if `expected_updated_at` still matches what is
    /// stored — the optimistic-version guard for concurrent transitions
    /// (spec §5, testable property 4 "concurrent transitions rejected").
    async fn update_pod(&self, pod: &Pod, expected_updated_at: chrono::DateTime<chrono::Utc>) -> CoreResult<()>;
    async fn delete_pod(&self, id: &crate::model::PodId) -> CoreResult<()>;
    async fn list_pods_on_host(&self, host_id: &str, include_archived: bool) -> CoreResult<Vec<Pod>>;
    async fn held_ports_on_host(&self, host_id: &str) -> CoreResult<Vec<HeldPort>>;

    async fn append_pod_log(&self, log: &PodLog) -> CoreResult<i64>;
    async fn update_pod_log(&self, id: i64, stdout: Option<&str>, stderr: Option<&str>, exit_code: Option<i32>, duration_ms: Option<i64>) -> CoreResult<()>;
    async fn pod_logs_after(&self, pod_id: &crate::model::PodId, after_id: i64) -> CoreResult<Vec<PodLog>>;

    async fn insert_snapshot(&self, snapshot: &SnapshotRecord) -> CoreResult<()>;
    async fn update_snapshot_status(&self, id: &crate::model::SnapshotId, status: crate::model::snapshot::SnapshotStatus, size_bytes: Option<u64>) -> CoreResult<()>;
    async fn get_snapshot(&self, id: &crate::model::SnapshotId) -> CoreResult<Option<SnapshotRecord>>;
    async fn list_snapshots_for_pod(&self, pod_id: &crate::model::PodId) -> CoreResult<Vec<SnapshotRecord>>;
    async fn delete_snapshots_for_pod(&self, pod_id: &crate::model::PodId) -> CoreResult<()>;

    async fn record_server_metrics(&self, sample: &ServerMetricsSample) -> CoreResult<()>;
    async fn record_pod_metrics(&self, sample: &PodMetricsSample) -> CoreResult<()>;
    async fn prune_metrics_older_than(&self, cutoff: chrono::DateTime<chrono::Utc>) -> CoreResult<()>;
}
