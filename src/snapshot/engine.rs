//! Snapshot Engine (spec §4.6, C6): export a pod's volume set to a
//! compressed archive in object storage, and restore one back onto a pod's
//! (already-provisioned) volumes.
//!
//! Both directions go through a short-lived, unprivileged helper container
//! per volume rather than touching the host filesystem directly (spec §9
//! "thin bindings" note) — the same `ContainerRuntime`/`HostConnection`
//! primitives the orchestrator uses.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};

use crate::error::{CoreError, CoreResult};
use crate::host::HostRegistry;
use crate::model::pod::{volume_name, CANONICAL_VOLUMES};
use crate::model::snapshot::{SnapshotManifest, SnapshotRecord, SnapshotStatus};
use crate::model::{Pod, PodId, SnapshotId};
use crate::orchestrator::SnapshotRestorer;
use crate::runtime::{ContainerSpec, HostBindMount, ResourceLimits, VolumeMount};
use crate::store::Store;

use super::archive;
use super::storage::StorageProvider;

/// Image run for volume export/import. A minimal image with `tar` on
/// `PATH`; it never touches the network (spec §4.2 sandboxing still
/// applies to helper containers).
const HELPER_IMAGE: &str = "pinacle/volume-helper:latest";

fn helper_limits() -> ResourceLimits {
    ResourceLimits { cpu_cores: 0.5, memory_mb: 256, pids_limit: 32 }
}

pub struct SnapshotEngine {
    store: Arc<dyn Store>,
    hosts: Arc<HostRegistry>,
    storage: Arc<dyn StorageProvider>,
    host_scratch_root: String,
    local_scratch_root: PathBuf,
}

impl SnapshotEngine {
    pub fn new(store: Arc<dyn Store>, hosts: Arc<HostRegistry>, storage: Arc<dyn StorageProvider>) -> Self {
        Self {
            store,
            hosts,
            storage,
            host_scratch_root: "/var/lib/pinacle/snapshot-scratch".to_string(),
            local_scratch_root: std::env::temp_dir().join("pinacle-snapshot-scratch"),
        }
    }

    fn storage_key(snapshot_id: SnapshotId) -> String {
        format!("snapshots/{snapshot_id}.tar.gz")
    }

    /// `Create(podId)` (spec §4.6): export every canonical volume, compose
    /// the archive, upload it, and persist the `SnapshotRecord`.
    pub async fn create(&self, pod: &Pod) -> CoreResult<SnapshotRecord> {
        let host_id = pod
            .host_id
            .clone()
            .ok_or_else(|| CoreError::Invariant(format!("pod {} has no host to snapshot from", pod.id)))?;
        let handle = self.hosts.get(&host_id)?;

        let snapshot_id = SnapshotId::new();
        let host_scratch = format!("{}/{snapshot_id}", self.host_scratch_root);
        let local_scratch = self.local_scratch_root.join(snapshot_id.to_string());
        tokio::fs::create_dir_all(&local_scratch).await.map_err(|e| CoreError::Other(e.into()))?;

        let mut volumes = Vec::new();
        let mut local_tars: BTreeMap<String, PathBuf> = BTreeMap::new();

        for volume in CANONICAL_VOLUMES {
            let source_volume = volume_name(&pod.id, volume);
            if !handle.runtime.volume_exists(&source_volume).await? {
                // A pod that never finished provisioning may be missing
                // some volumes; skip rather than fail the whole snapshot.
                continue;
            }

            let remote_tar = format!("{volume}.tar");
            let spec = ContainerSpec {
                name: format!("pinacle-snap-export-{snapshot_id}-{volume}"),
                image: HELPER_IMAGE.to_string(),
                command: vec!["tar".into(), "cf".into(), format!("/output/{remote_tar}"), "-C".into(), "/source".into(), ".".into()],
                limits: helper_limits(),
                mounts: vec![VolumeMount { volume_name: source_volume, mount_path: "/source".into() }],
                host_binds: vec![HostBindMount { host_path: host_scratch.clone(), container_path: "/output".into(), read_only: false }],
                network_name: "none".to_string(),
                ..Default::default()
            };

            let container_id = handle.runtime.create_container(&spec).await?;
            let export_result = run_to_completion(&*handle.runtime, &container_id).await;
            handle.runtime.remove_container(&container_id, true).await.ok();
            export_result?;

            let local_path = local_scratch.join(&remote_tar);
            handle.conn.copy_out(&format!("{host_scratch}/{remote_tar}"), &local_path).await?;
            local_tars.insert(volume.to_string(), local_path);
            volumes.push(volume.to_string());
        }

        let manifest = SnapshotManifest::new(snapshot_id, pod.id, volumes);
        let tar_refs: BTreeMap<String, &Path> = local_tars.iter().map(|(k, v)| (k.clone(), v.as_path())).collect();
        let archive_bytes = archive::build_archive(&manifest, &tar_refs)?;
        let size_bytes = archive_bytes.len() as u64;

        let key = Self::storage_key(snapshot_id);
        let body = stream::once(async move { Ok::<_, std::io::Error>(bytes::Bytes::from(archive_bytes)) }).boxed();
        let storage_path = self.storage.upload(&key, body).await?;

        tokio::fs::remove_dir_all(&local_scratch).await.ok();

        let record = SnapshotRecord {
            id: snapshot_id,
            pod_id: pod.id,
            created_at: chrono::Utc::now(),
            status: SnapshotStatus::Ready,
            storage_path,
            size_bytes,
            manifest_version: manifest.version,
        };
        self.store.insert_snapshot(&record).await?;
        Ok(record)
    }

    /// `Restore(podId, snapshotId)` (spec §4.6): download the archive and
    /// write each volume's contents back onto the pod's existing volumes.
    /// Volumes must already exist (the caller re-provisions afterward).
    pub async fn restore(&self, snapshot_id: SnapshotId, pod_id: PodId) -> CoreResult<()> {
        let snapshot = self
            .store
            .get_snapshot(&snapshot_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("snapshot {snapshot_id} not found")))?;
        if snapshot.pod_id != pod_id {
            return Err(CoreError::Invariant(format!(
                "snapshot {snapshot_id} belongs to pod {} not {pod_id}",
                snapshot.pod_id
            )));
        }

        let pod = self
            .store
            .get_pod(&pod_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("pod {pod_id} not found")))?;
        let host_id = pod
            .host_id
            .clone()
            .ok_or_else(|| CoreError::Invariant(format!("pod {pod_id} has no host to restore onto")))?;
        let handle = self.hosts.get(&host_id)?;

        let mut downloaded = self.storage.download(&snapshot.storage_path).await?;
        let mut archive_bytes = Vec::new();
        while let Some(chunk) = downloaded.next().await {
            archive_bytes.extend_from_slice(&chunk.map_err(|e| CoreError::Other(e.into()))?);
        }

        let local_scratch = self.local_scratch_root.join(snapshot_id.to_string());
        tokio::fs::create_dir_all(&local_scratch).await.map_err(|e| CoreError::Other(e.into()))?;
        let manifest = archive::unpack_archive(&archive_bytes, &local_scratch)?;

        let host_scratch = format!("{}/{snapshot_id}", self.host_scratch_root);
        for volume in &manifest.volumes {
            let local_tar = local_scratch.join(format!("{volume}.tar"));
            let remote_tar = format!("{host_scratch}/{volume}.tar");
            handle.conn.copy_in(&local_tar, &remote_tar).await?;

            let dest_volume = volume_name(&pod_id, volume);
            let spec = ContainerSpec {
                name: format!("pinacle-snap-import-{snapshot_id}-{volume}"),
                image: HELPER_IMAGE.to_string(),
                command: vec![
                    "sh".into(), "-c".into(),
                    format!("rm -rf /dest/* /dest/..?* /dest/.[!.]* 2>/dev/null; tar xf /input/{volume}.tar -C /dest"),
                ],
                limits: helper_limits(),
                mounts: vec![VolumeMount { volume_name: dest_volume, mount_path: "/dest".into() }],
                host_binds: vec![HostBindMount { host_path: host_scratch.clone(), container_path: "/input".into(), read_only: true }],
                network_name: "none".to_string(),
                ..Default::default()
            };

            let container_id = handle.runtime.create_container(&spec).await?;
            let import_result = run_to_completion(&*handle.runtime, &container_id).await;
            handle.runtime.remove_container(&container_id, true).await.ok();
            import_result?;
        }

        tokio::fs::remove_dir_all(&local_scratch).await.ok();
        Ok(())
    }
}

async fn run_to_completion(runtime: &dyn crate::runtime::ContainerRuntime, container_id: &str) -> CoreResult<()> {
    runtime.start_container(container_id).await?;
    let exit_code = runtime.wait_container(container_id).await?;
    if exit_code != 0 {
        return Err(CoreError::StepFailure {
            step: "snapshot_helper".into(),
            message: format!("helper container {container_id} exited with code {exit_code}"),
        });
    }
    Ok(())
}

#[async_trait]
impl SnapshotRestorer for SnapshotEngine {
    async fn restore(&self, snapshot_id: SnapshotId, pod_id: PodId) -> CoreResult<()> {
        SnapshotEngine::restore(self, snapshot_id, pod_id).await
    }
}
