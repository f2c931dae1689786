//! Provisioning step pipeline (spec §4.3 "Provisioning step pipeline").
//!
//! Each step is atomic and re-runnable: a retry starts from the first step
//! whose last log record has `exit_code != 0` or is still in flight. Steps
//! 7-9 (config write, service install, post-install hook) are skipped when
//! restarting an already-provisioned pod, per the state table's "skip
//! template-install steps on subsequent starts" note.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{CoreError, CoreResult};
use crate::host::{ExecOptions, HostConnection};
use crate::model::pod::{container_name, network_name, volume_name, CANONICAL_VOLUMES, NGINX_PROXY_PORT_NAME};
use crate::model::{Pod, PodLog, PortMapping};
use crate::runtime::{ContainerRuntime, ContainerSpec, PublishedPort, ResourceLimits, VolumeMount};
use crate::store::Store;

use super::ports::PortAllocator;

pub struct ProvisionContext {
    pub pod: Pod,
    pub host: Arc<dyn HostConnection>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub store: Arc<dyn Store>,
    pub port_allocator: PortAllocator,
    pub step_timeout: Duration,
    /// True when this is a restart of a previously-running pod rather than
    /// a first-time create (spec §4.3 state table, `stopped --Start--> provisioning`).
    pub is_restart: bool,
}

#[async_trait]
pub trait ProvisionStep: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, ctx: &mut ProvisionContext) -> CoreResult<()>;
}

/// Default pipeline in spec order. Image-pull (step 1) is folded into
/// container creation for the reference runtime, which pulls on demand.
pub fn default_pipeline() -> Vec<Box<dyn ProvisionStep>> {
    vec![
        Box::new(CreateNetworkStep),
        Box::new(CreateVolumesStep),
        Box::new(AllocatePortsStep),
        Box::new(CreateContainerStep),
        Box::new(StartContainerStep),
        Box::new(WriteConfigStep),
        Box::new(InstallServicesStep),
        Box::new(PostInstallHookStep),
        Box::new(HealthCheckStep),
    ]
}

async fn log_step<F, Fut>(ctx: &mut ProvisionContext, name: &str, command: &str, f: F) -> CoreResult<()>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = CoreResult<()>>,
{
    log_step_with_result(ctx, name, command, || async move { f().await.map(|_| ()) }).await
}

/// Same bookkeeping as [`log_step`], but returns whatever value the step
/// produces (e.g. the created container's ID) alongside logging it.
async fn log_step_with_result<F, Fut, T>(ctx: &mut ProvisionContext, name: &str, command: &str, f: F) -> CoreResult<T>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = CoreResult<T>>,
{
    let log_id = ctx
        .store
        .append_pod_log(&PodLog {
            id: 0,
            pod_id: ctx.pod.id,
            timestamp: Utc::now(),
            label: Some(name.to_string()),
            command: command.to_string(),
            container_command: None,
            stdout: None,
            stderr: None,
            exit_code: None,
            duration_ms: None,
        })
        .await?;

    let started = std::time::Instant::now();
    let outcome = tokio::time::timeout(ctx.step_timeout, f()).await;

    match outcome {
        Ok(Ok(value)) => {
            ctx.store
                .update_pod_log(log_id, None, None, Some(0), Some(started.elapsed().as_millis() as i64))
                .await?;
            Ok(value)
        }
        Ok(Err(err)) => {
            ctx.store
                .update_pod_log(log_id, None, Some(&err.to_string()), Some(1), Some(started.elapsed().as_millis() as i64))
                .await?;
            Err(err)
        }
        Err(_) => {
            ctx.store
                .update_pod_log(log_id, None, Some("timed out"), Some(crate::model::podlog::TIMEOUT_EXIT_CODE), Some(started.elapsed().as_millis() as i64))
                .await?;
            Err(CoreError::StepFailure { step: name.to_string(), message: "timed out".into() })
        }
    }
}

struct CreateNetworkStep;
#[async_trait]
impl ProvisionStep for CreateNetworkStep {
    fn name(&self) -> &'static str {
        "create-network"
    }

    async fn run(&self, ctx: &mut ProvisionContext) -> CoreResult<()> {
        let net_name = network_name(&ctx.pod.id);
        let runtime = ctx.runtime.clone();
        log_step(ctx, self.name(), &format!("network create {net_name}"), || async move {
            // Subnet selection is host-local; a /28 per pod keeps the fleet's
            // bridge address space small without a central allocator.
            runtime.create_network(&net_name, "10.200.0.0/28").await
        })
        .await
    }
}

struct CreateVolumesStep;
#[async_trait]
impl ProvisionStep for CreateVolumesStep {
    fn name(&self) -> &'static str {
        "create-volumes"
    }

    async fn run(&self, ctx: &mut ProvisionContext) -> CoreResult<()> {
        let pod_id = ctx.pod.id;
        let runtime = ctx.runtime.clone();
        log_step(ctx, self.name(), "create canonical volumes", || async move {
            for volume in CANONICAL_VOLUMES {
                runtime.create_volume(&volume_name(&pod_id, volume)).await?;
            }
            Ok(())
        })
        .await
    }
}

struct AllocatePortsStep;
#[async_trait]
impl ProvisionStep for AllocatePortsStep {
    fn name(&self) -> &'static str {
        "allocate-ports"
    }

    async fn run(&self, ctx: &mut ProvisionContext) -> CoreResult<()> {
        if !ctx.pod.ports.is_empty() {
            // Already allocated on a prior successful run (e.g. a restart).
            return Ok(());
        }
        let host_id = ctx
            .pod
            .host_id
            .clone()
            .ok_or_else(|| CoreError::Invariant("allocate-ports ran without a host assigned".into()))?;

        let mut names = vec![NGINX_PROXY_PORT_NAME.to_string()];
        names.extend(ctx.pod.config.service_toggles.iter().cloned());

        let allocator_range = ctx.port_allocator.clone();
        let store = ctx.store.clone();
        let ports = allocator_range.allocate_many(store.as_ref(), &host_id, names.len()).await?;

        ctx.pod.ports = names
            .into_iter()
            .zip(ports)
            .map(|(name, external)| PortMapping { name, internal: 80, external })
            .collect();
        Ok(())
    }
}

struct CreateContainerStep;
#[async_trait]
impl ProvisionStep for CreateContainerStep {
    fn name(&self) -> &'static str {
        "create-container"
    }

    async fn run(&self, ctx: &mut ProvisionContext) -> CoreResult<()> {
        if ctx.pod.container_id.is_some() {
            return Ok(());
        }
        let limits = ctx.pod.tier.limits();
        let spec = ContainerSpec {
            name: container_name(&ctx.pod.id),
            image: format!("pinacle-template/{}", ctx.pod.template),
            command: vec![],
            env: std::collections::HashMap::new(),
            limits: ResourceLimits {
                cpu_cores: limits.cpu_cores,
                memory_mb: limits.memory_mb,
                pids_limit: 4096,
            },
            mounts: CANONICAL_VOLUMES
                .iter()
                .map(|v| VolumeMount {
                    volume_name: volume_name(&ctx.pod.id, v),
                    mount_path: format!("/{}", v.replace('-', "/")),
                })
                .collect(),
            network_name: network_name(&ctx.pod.id),
            published_ports: ctx
                .pod
                .ports
                .iter()
                .map(|p| PublishedPort { internal: p.internal, external: p.external })
                .collect(),
            labels: std::collections::HashMap::from([("pinacle.pod_id".to_string(), ctx.pod.id.to_string())]),
        };

        let runtime = ctx.runtime.clone();
        let pod_id = ctx.pod.id;
        let id = log_step_with_result(ctx, self.name(), &format!("create container for {pod_id}"), || {
            let runtime = runtime.clone();
            let spec = spec.clone();
            async move { runtime.create_container(&spec).await }
        })
        .await?;
        ctx.pod.container_id = Some(id);
        Ok(())
    }
}

struct StartContainerStep;
#[async_trait]
impl ProvisionStep for StartContainerStep {
    fn name(&self) -> &'static str {
        "start-container"
    }

    async fn run(&self, ctx: &mut ProvisionContext) -> CoreResult<()> {
        let container_id = ctx
            .pod
            .container_id
            .clone()
            .ok_or_else(|| CoreError::Invariant("start-container ran before create-container".into()))?;
        let runtime = ctx.runtime.clone();
        log_step(ctx, self.name(), &format!("start {container_id}"), || async move {
            runtime.start_container(&container_id).await
        })
        .await
    }
}

struct WriteConfigStep;
#[async_trait]
impl ProvisionStep for WriteConfigStep {
    fn name(&self) -> &'static str {
        "write-config"
    }

    async fn run(&self, ctx: &mut ProvisionContext) -> CoreResult<()> {
        if ctx.is_restart {
            return Ok(());
        }
        let container_id = ctx.pod.container_id.clone().unwrap_or_default();
        let runtime = ctx.runtime.clone();
        log_step(ctx, self.name(), &format!("write bootstrap files in {container_id}"), || async move {
            runtime
                .exec_in_container(&container_id, &["sh".into(), "-c".into(), "mkdir -p /etc/pinacle".into()])
                .await
                .map(|(_, _, code)| code)
                .and_then(|code| if code == 0 { Ok(()) } else { Err(CoreError::StepFailure { step: "write-config".into(), message: format!("exit {code}") }) })
        })
        .await
    }
}

struct InstallServicesStep;
#[async_trait]
impl ProvisionStep for InstallServicesStep {
    fn name(&self) -> &'static str {
        "install-services"
    }

    async fn run(&self, ctx: &mut ProvisionContext) -> CoreResult<()> {
        if ctx.is_restart {
            return Ok(());
        }
        let container_id = ctx.pod.container_id.clone().unwrap_or_default();
        let toggles = ctx.pod.config.service_toggles.clone();
        let runtime = ctx.runtime.clone();
        log_step(ctx, self.name(), &format!("install services {toggles:?} in {container_id}"), || async move {
            for service in &toggles {
                let (_, _, code) = runtime
                    .exec_in_container(&container_id, &["pinacle-install".into(), service.clone()])
                    .await?;
                if code != 0 {
                    return Err(CoreError::StepFailure {
                        step: "install-services".into(),
                        message: format!("service {service} install exited {code}"),
                    });
                }
            }
            Ok(())
        })
        .await
    }
}

struct PostInstallHookStep;
#[async_trait]
impl ProvisionStep for PostInstallHookStep {
    fn name(&self) -> &'static str {
        "post-install-hook"
    }

    async fn run(&self, ctx: &mut ProvisionContext) -> CoreResult<()> {
        if ctx.is_restart {
            return Ok(());
        }
        let container_id = ctx.pod.container_id.clone().unwrap_or_default();
        let template = ctx.pod.template.clone();
        let runtime = ctx.runtime.clone();
        log_step(ctx, self.name(), &format!("post-install hook for {template}"), || async move {
            let (_, _, code) = runtime
                .exec_in_container(&container_id, &["sh".into(), "-c".into(), "test -x /etc/pinacle/post-install.sh && /etc/pinacle/post-install.sh || true".into()])
                .await?;
            if code == 0 {
                Ok(())
            } else {
                Err(CoreError::StepFailure { step: "post-install-hook".into(), message: format!("exit {code}") })
            }
        })
        .await
    }
}

struct HealthCheckStep;
#[async_trait]
impl ProvisionStep for HealthCheckStep {
    fn name(&self) -> &'static str {
        "health-check"
    }

    async fn run(&self, ctx: &mut ProvisionContext) -> CoreResult<()> {
        let port = ctx
            .pod
            .nginx_proxy_port()
            .ok_or_else(|| CoreError::Invariant("health-check ran before ports were assigned".into()))?;
        let host = ctx.host.clone();
        log_step(ctx, self.name(), &format!("curl 127.0.0.1:{port}/"), || async move {
            let opts = ExecOptions::with_timeout(Duration::from_secs(10));
            let output = host
                .exec("curl", &["-sf".into(), "-o".into(), "/dev/null".into(), format!("http://127.0.0.1:{port}/")], opts)
                .await?;
            if output.success() {
                Ok(())
            } else {
                Err(CoreError::StepFailure { step: "health-check".into(), message: format!("exit {}", output.exit_code) })
            }
        })
        .await
    }
}
