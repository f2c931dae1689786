//! Persistence-agnostic entity schema (spec §3, §4.8 "Persistence Model").
//!
//! Deliberately no enforced foreign keys between arbitrary tables — only
//! `pods.owner_user_id` is treated as identity-critical. Every other
//! reference (host_id, container_id, template tags, snapshot's pod_id) is
//! "soft": integrity is maintained by the orchestrator, not the store, so an
//! operator-level deletion or a schema migration can never deadlock the
//! system (spec §4.8).

pub mod ids;
pub mod metrics;
pub mod pod;
pub mod podlog;
pub mod server;
pub mod snapshot;
pub mod token;

pub use ids::{PodId, ServerId, SnapshotId};
pub use metrics::{AggregationBucket, PodMetricsSample, ServerMetricsSample};
pub use pod::{Pod, PodConfig, PodStatus, PortMapping, Tier, TierLimits};
pub use podlog::PodLog;
pub use server::{Server, ServerStatus, SshEndpoint};
pub use snapshot::{SnapshotManifest, SnapshotRecord, SnapshotStatus};
pub use token::ProxyClaims;
