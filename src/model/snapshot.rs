//! Snapshot Record and Manifest (spec §3, §6 "Snapshot archive format").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{PodId, SnapshotId};
use super::pod::CANONICAL_VOLUMES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Creating,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub id: SnapshotId,
    pub pod_id: PodId,
    pub created_at: DateTime<Utc>,
    pub status: SnapshotStatus,
    pub storage_path: String,
    pub size_bytes: u64,
    pub manifest_version: String,
}

/// The current manifest format. Implementations must refuse any other
/// version (spec §4.6 invariant).
pub const MANIFEST_VERSION: &str = "2.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub version: String,
    pub snapshot_id: SnapshotId,
    pub pod_id: PodId,
    pub volumes: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl SnapshotManifest {
    pub fn new(snapshot_id: SnapshotId, pod_id: PodId, volumes: Vec<String>) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            snapshot_id,
            pod_id,
            volumes,
            created_at: Utc::now(),
        }
    }

    /// Refuse unknown manifest versions (spec §4.6 invariant).
    pub fn validate(&self) -> crate::error::CoreResult<()> {
        if self.version != MANIFEST_VERSION {
            return Err(crate::error::CoreError::Invariant(format!(
                "unsupported snapshot manifest version {:?} (expected {MANIFEST_VERSION:?})",
                self.version
            )));
        }
        for name in &self.volumes {
            if !CANONICAL_VOLUMES.contains(&name.as_str()) {
                return Err(crate::error::CoreError::Invariant(format!(
                    "manifest references unknown volume {name:?}"
                )));
            }
        }
        Ok(())
    }

    pub fn volume_tar_path(volume: &str) -> String {
        format!("volumes/{volume}.tar")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_future_manifest_versions() {
        let mut manifest = SnapshotManifest::new(SnapshotId::new(), PodId::new(), vec!["workspace".into()]);
        manifest.version = "3.0".into();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn rejects_unknown_volume_names() {
        let manifest = SnapshotManifest::new(SnapshotId::new(), PodId::new(), vec!["not-a-volume".into()]);
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn accepts_full_canonical_volume_set() {
        let volumes: Vec<String> = CANONICAL_VOLUMES.iter().map(|s| s.to_string()).collect();
        let manifest = SnapshotManifest::new(SnapshotId::new(), PodId::new(), volumes);
        assert!(manifest.validate().is_ok());
    }
}
