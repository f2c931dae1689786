//! Append-only provisioning-command log (spec §3 "Pod Log", §5 ordering
//! guarantees: strictly monotonic IDs per pod, tailed by `afterId`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::PodId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodLog {
    /// Monotonic within a pod; consumers tail with `after_id`.
    pub id: i64,
    pub pod_id: PodId,
    pub timestamp: DateTime<Utc>,
    pub label: Option<String>,
    pub command: String,
    pub container_command: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    /// `None` means "in flight".
    pub exit_code: Option<i32>,
    pub duration_ms: Option<i64>,
}

impl PodLog {
    pub fn in_flight(&self) -> bool {
        self.exit_code.is_none()
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Timeout exit code reserved by spec §6/§5 for a step that exceeded its
/// per-step or total deadline.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

#[cfg(test)]
mod tests {
    use super::*;

    fn log(exit_code: Option<i32>) -> PodLog {
        PodLog {
            id: 1,
            pod_id: PodId::new(),
            timestamp: Utc::now(),
            label: Some("create-network".into()),
            command: "docker network create".into(),
            container_command: None,
            stdout: None,
            stderr: None,
            exit_code,
            duration_ms: Some(100),
        }
    }

    #[test]
    fn in_flight_has_no_exit_code() {
        assert!(log(None).in_flight());
        assert!(!log(Some(0)).in_flight());
    }

    #[test]
    fn succeeded_requires_zero_exit() {
        assert!(log(Some(0)).succeeded());
        assert!(!log(Some(1)).succeeded());
        assert!(!log(None).succeeded());
    }
}
