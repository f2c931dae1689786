//! Pod Orchestrator (spec §4.3, C3): owns the pod provisioning state
//! machine and drives it from a dedicated task per operation, serialized
//! per `podId` by a keyed mutex (spec §9 "coroutine control flow" note).

pub mod ports;
pub mod state_machine;
pub mod steps;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::{CoreError, CoreResult};
use crate::host::{HostConnection, HostHandle, HostRegistry};
use crate::model::{Pod, PodId, PodStatus, SnapshotId};
use crate::runtime::ContainerRuntime;
use crate::store::Store;

use ports::PortAllocator;
use state_machine::{transition, Event};
use steps::{default_pipeline, ProvisionContext};

/// Supplied by the Snapshot Engine; kept as a trait here so the orchestrator
/// does not depend on C6's storage/archive machinery directly.
#[async_trait::async_trait]
pub trait SnapshotRestorer: Send + Sync {
    async fn restore(&self, snapshot_id: SnapshotId, pod_id: PodId) -> CoreResult<()>;
}

pub struct Orchestrator {
    store: Arc<dyn Store>,
    hosts: Arc<HostRegistry>,
    pod_locks: DashMap<PodId, Arc<Mutex<()>>>,
    port_allocator: PortAllocator,
    step_timeout: Duration,
    total_timeout: Duration,
    restorer: Option<Arc<dyn SnapshotRestorer>>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn Store>, timeouts: &crate::config::Timeouts) -> Self {
        Self::with_host_registry(store, Arc::new(HostRegistry::new()), timeouts)
    }

    /// Share a [`HostRegistry`] with, e.g., the Snapshot Engine so both
    /// resolve the same live host set (spec §4.6's restore step runs on
    /// the pod's existing host, looked up the same way provisioning does).
    pub fn with_host_registry(store: Arc<dyn Store>, hosts: Arc<HostRegistry>, timeouts: &crate::config::Timeouts) -> Self {
        Self {
            store,
            hosts,
            pod_locks: DashMap::new(),
            port_allocator: PortAllocator::default(),
            step_timeout: timeouts.step,
            total_timeout: timeouts.total_provision,
            restorer: None,
        }
    }

    pub fn with_restorer(mut self, restorer: Arc<dyn SnapshotRestorer>) -> Self {
        self.restorer = Some(restorer);
        self
    }

    /// Override the default port range (spec §4.3, §6 `PORT_RANGE`).
    pub fn with_port_range(mut self, range: std::ops::RangeInclusive<u16>) -> Self {
        self.port_allocator = PortAllocator::new(range);
        self
    }

    pub fn host_registry(&self) -> Arc<HostRegistry> {
        self.hosts.clone()
    }

    pub fn register_host(&self, host_id: impl Into<String>, conn: Arc<dyn HostConnection>, runtime: Arc<dyn ContainerRuntime>) {
        self.hosts.register(host_id, conn, runtime);
    }

    fn pod_lock(&self, pod_id: PodId) -> Arc<Mutex<()>> {
        self.pod_locks.entry(pod_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    fn host_handle(&self, host_id: &str) -> CoreResult<HostHandle> {
        self.hosts.get(host_id)
    }

    /// `Provision(podId, hostId)` (spec §4.3). Validates the transition
    /// against freshly-read state, persists it, and spawns the step
    /// pipeline in the background. Returns once the in-flight state is
    /// durable, not once provisioning completes.
    pub async fn provision(self: &Arc<Self>, pod_id: PodId, host_id: String) -> CoreResult<()> {
        let lock = self.pod_lock(pod_id);
        let _guard = lock.lock().await;

        let pod = self.load_pod(pod_id).await?;
        let is_restart = pod.status == PodStatus::Stopped;
        let event = if is_restart { Event::Start } else { Event::BeginProvision };
        self.begin_provisioning(pod, event, host_id, is_restart).await
    }

    async fn begin_provisioning(self: &Arc<Self>, mut pod: Pod, event: Event, host_id: String, is_restart: bool) -> CoreResult<()> {
        let pod_id = pod.id;
        let new_status = transition(pod.status, event)?;

        let expected = pod.updated_at;
        pod.status = new_status;
        pod.host_id = Some(host_id.clone());
        pod.updated_at = Utc::now();
        self.store.update_pod(&pod, expected).await?;

        let this = self.clone();
        tokio::spawn(async move {
            this.run_provisioning(pod_id, host_id, is_restart).await;
        });
        Ok(())
    }

    async fn run_provisioning(self: Arc<Self>, pod_id: PodId, host_id: String, is_restart: bool) {
        let lock = self.pod_lock(pod_id);
        let _guard = lock.lock().await;

        let result = self.run_provisioning_inner(pod_id, &host_id, is_restart).await;
        if let Err(err) = result {
            warn!(%pod_id, error = %err, "provisioning failed");
            if let Ok(mut pod) = self.load_pod(pod_id).await {
                let expected = pod.updated_at;
                pod.status = PodStatus::Error;
                pod.last_error_message = Some(err.to_string());
                pod.updated_at = Utc::now();
                if let Err(persist_err) = self.store.update_pod(&pod, expected).await {
                    error!(%pod_id, error = %persist_err, "failed to persist error status");
                }
            }
        }
    }

    async fn run_provisioning_inner(&self, pod_id: PodId, host_id: &str, is_restart: bool) -> CoreResult<()> {
        let handle = self.host_handle(host_id)?;
        let pod = self.load_pod(pod_id).await?;

        let mut ctx = ProvisionContext {
            pod,
            host: handle.conn.clone(),
            runtime: handle.runtime.clone(),
            store: self.store.clone(),
            port_allocator: self.port_allocator.clone(),
            step_timeout: self.step_timeout,
            is_restart,
        };

        let resume_from = self.first_unfinished_step(pod_id).await?;
        let pipeline = default_pipeline();

        let run = async {
            for (idx, step) in pipeline.iter().enumerate() {
                if idx < resume_from {
                    continue;
                }
                info!(%pod_id, step = step.name(), "running provisioning step");
                step.run(&mut ctx).await?;
                // Persist progress (host/container/ports) after each step so a
                // crash mid-pipeline can resume from the right point.
                let expected = ctx.pod.updated_at;
                ctx.pod.updated_at = Utc::now();
                self.store.update_pod(&ctx.pod, expected).await?;
            }
            Ok::<_, CoreError>(())
        };

        tokio::time::timeout(self.total_timeout, run)
            .await
            .map_err(|_| CoreError::StepFailure { step: "provisioning".into(), message: "total provisioning timeout exceeded".into() })??;

        let expected = ctx.pod.updated_at;
        ctx.pod.status = transition(PodStatus::Provisioning, Event::AllStepsOk)?;
        ctx.pod.updated_at = Utc::now();
        self.store.update_pod(&ctx.pod, expected).await
    }

    /// Index of the first pipeline step to (re-)run: the first whose last
    /// log record either failed or never completed (spec §4.3 "Rules").
    async fn first_unfinished_step(&self, pod_id: PodId) -> CoreResult<usize> {
        let logs = self.store.pod_logs_after(&pod_id, 0).await?;
        let mut last_by_label: HashMap<String, bool> = HashMap::new();
        for log in &logs {
            if let Some(label) = &log.label {
                last_by_label.insert(label.clone(), log.succeeded());
            }
        }
        let pipeline = default_pipeline();
        for (idx, step) in pipeline.iter().enumerate() {
            match last_by_label.get(step.name()) {
                Some(true) => continue,
                _ => return Ok(idx),
            }
        }
        Ok(pipeline.len())
    }

    async fn load_pod(&self, pod_id: PodId) -> CoreResult<Pod> {
        self.store
            .get_pod(&pod_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("pod {pod_id} not found")))
    }

    /// `Start(podId)`: re-enters the pipeline, skipping template-install
    /// steps (handled inside the step implementations via `is_restart`).
    pub async fn start(self: &Arc<Self>, pod_id: PodId) -> CoreResult<()> {
        let pod = self.load_pod(pod_id).await?;
        let host_id = pod
            .host_id
            .clone()
            .ok_or_else(|| CoreError::Invariant(format!("pod {pod_id} has no host assigned to restart on")))?;
        self.provision(pod_id, host_id).await
    }

    /// `Stop(podId)`: stop the container, keep volumes and network.
    pub async fn stop(self: &Arc<Self>, pod_id: PodId) -> CoreResult<()> {
        let lock = self.pod_lock(pod_id);
        let _guard = lock.lock().await;

        let mut pod = self.load_pod(pod_id).await?;
        let new_status = transition(pod.status, Event::Stop)?;
        let expected = pod.updated_at;
        pod.status = new_status;
        pod.updated_at = Utc::now();
        self.store.update_pod(&pod, expected).await?;

        let host_id = pod.host_id.clone();
        let container_id = pod.container_id.clone();
        if let (Some(host_id), Some(container_id)) = (host_id, container_id) {
            let handle = self.host_handle(&host_id)?;
            handle.runtime.stop_container(&container_id, 15).await?;
        }

        let expected = pod.updated_at;
        pod.status = state_machine::stopping_complete();
        pod.updated_at = Utc::now();
        self.store.update_pod(&pod, expected).await
    }

    /// `Delete(podId)`: remove container, volumes, network, and snapshots.
    pub async fn delete(self: &Arc<Self>, pod_id: PodId) -> CoreResult<()> {
        let lock = self.pod_lock(pod_id);
        let _guard = lock.lock().await;

        let mut pod = self.load_pod(pod_id).await?;
        let new_status = transition(pod.status, Event::Delete)?;
        let expected = pod.updated_at;
        pod.status = new_status;
        pod.updated_at = Utc::now();
        self.store.update_pod(&pod, expected).await?;

        if let Some(host_id) = pod.host_id.clone() {
            if let Ok(handle) = self.host_handle(&host_id) {
                if let Some(container_id) = &pod.container_id {
                    handle.runtime.remove_container(container_id, true).await.ok();
                }
                for volume in crate::model::pod::CANONICAL_VOLUMES {
                    handle.runtime.remove_volume(&crate::model::pod::volume_name(&pod_id, volume)).await.ok();
                }
                handle.runtime.destroy_network(&crate::model::pod::network_name(&pod_id)).await.ok();
            }
        }

        self.store.delete_snapshots_for_pod(&pod_id).await?;
        self.store.delete_pod(&pod_id).await?;
        self.pod_locks.remove(&pod_id);
        Ok(())
    }

    /// `Rebuild(podId, fromSnapshot?)`: tear down the container (keeping
    /// volumes unless a snapshot restore is requested), then re-provision.
    pub async fn rebuild(self: &Arc<Self>, pod_id: PodId, from_snapshot: Option<SnapshotId>) -> CoreResult<()> {
        let lock = self.pod_lock(pod_id);
        let _guard = lock.lock().await;

        let mut pod = self.load_pod(pod_id).await?;
        let host_id = pod
            .host_id
            .clone()
            .ok_or_else(|| CoreError::Invariant(format!("pod {pod_id} has no host to rebuild on")))?;

        if let Some(container_id) = pod.container_id.take() {
            if let Ok(handle) = self.host_handle(&host_id) {
                handle.runtime.remove_container(&container_id, true).await.ok();
            }
        }
        pod.ports.clear();

        if let (Some(snapshot_id), Some(restorer)) = (from_snapshot, self.restorer.clone()) {
            restorer.restore(snapshot_id, pod_id).await?;
        }

        self.begin_provisioning(pod, Event::Rebuild, host_id, false).await
    }

    /// Re-invokes the pipeline from the first non-succeeded step
    /// (`RetryProvisioning`, spec §4.5).
    pub async fn retry(self: &Arc<Self>, pod_id: PodId) -> CoreResult<()> {
        let lock = self.pod_lock(pod_id);
        let guard = lock.lock().await;

        let mut pod = self.load_pod(pod_id).await?;
        let host_id = pod
            .host_id
            .clone()
            .ok_or_else(|| CoreError::Invariant(format!("pod {pod_id} has no host to retry provisioning on")))?;
        let new_status = transition(pod.status, Event::Retry)?;
        let expected = pod.updated_at;
        pod.status = new_status;
        pod.last_error_message = None;
        pod.updated_at = Utc::now();
        self.store.update_pod(&pod, expected).await?;
        drop(guard);

        let this = self.clone();
        tokio::spawn(async move {
            this.run_provisioning(pod_id, host_id, false).await;
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_errors_are_conflicts_not_panics() {
        let err = transition(PodStatus::Running, Event::Start).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }
}
