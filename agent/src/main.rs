//! `pinacle-agent`: the Host Agent (spec §4.4, C4). Registers its host with
//! the control plane, then loops heartbeats and metrics reports. Unlike
//! every other component, the agent talks to the container runtime
//! directly (via `bollard`) rather than through a host connection, since it
//! runs on the host it reports about.

mod client;
mod config;
mod stats;

use std::time::Duration;

use anyhow::{Context, Result};
use bollard::Docker;
use serde_json::json;
use tracing::{error, info, warn};

use client::{ClientError, ControlPlaneClient};
use config::AgentConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "pinacle_agent=info".into())).init();

    let config = AgentConfig::from_env().context("loading agent configuration")?;
    let identity = config::load_or_create_identity(&config.identity_path)?;
    let client = ControlPlaneClient::new(&config);
    let docker = Docker::connect_with_local_defaults().context("connecting to the local container runtime")?;

    register(&client, &config, &identity.server_id).await.context("registering with the control plane")?;

    let mut interval = tokio::time::interval(Duration::from_millis(config.heartbeat_interval_ms));
    let mut previous_cpu_ticks = stats::sample_cpu_ticks().ok();

    loop {
        interval.tick().await;

        let heartbeat_body = json!({ "serverId": identity.server_id });
        if let Err(ClientError::NotFound) = client.post("/heartbeat", &heartbeat_body).await {
            reregister_then_retry(&client, &config, &identity.server_id, "/heartbeat", &heartbeat_body).await;
        }

        match report_metrics(&client, &docker, &identity.server_id, &mut previous_cpu_ticks).await {
            Ok(()) => {}
            Err(ClientError::NotFound) => {
                let body = metrics_body(&docker, &identity.server_id, &mut previous_cpu_ticks).await;
                reregister_then_retry(&client, &config, &identity.server_id, "/metrics", &body).await;
            }
            Err(err) => error!(error = %err, "metrics report failed"),
        }
    }
}

/// Spec §4.4 step 3: on a 404 (host not recognized) re-register using the
/// stable id, then retry the failed call once.
async fn reregister_then_retry(client: &ControlPlaneClient, config: &AgentConfig, server_id: &str, path: &str, body: &serde_json::Value) {
    if let Err(err) = register(client, config, server_id).await {
        warn!(error = %err, "re-register after 404 failed");
        return;
    }
    if let Err(err) = client.post(path, body).await {
        warn!(path, error = %err, "retry after re-register still failed");
    }
}

async fn register(client: &ControlPlaneClient, config: &AgentConfig, server_id: &str) -> Result<()> {
    let body = json!({
        "id": server_id,
        "hostname": config.hostname,
        "ipAddress": config.ip_address,
        "cpuCores": num_cpus::get() as u32,
        "memoryMb": total_memory_mb().unwrap_or(0),
        "diskGb": stats::disk_usage_gb("/").unwrap_or(0),
        "sshHost": config.ssh_host,
        "sshPort": config.ssh_port,
        "sshUser": config.ssh_user,
    });
    client.post("/register", &body).await?;
    info!(server_id, "registered with control plane");
    Ok(())
}

fn total_memory_mb() -> Option<u64> {
    let contents = std::fs::read_to_string("/proc/meminfo").ok()?;
    let line = contents.lines().find(|l| l.starts_with("MemTotal"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb / 1024)
}

async fn report_metrics(
    client: &ControlPlaneClient,
    docker: &Docker,
    server_id: &str,
    previous_cpu_ticks: &mut Option<(u64, u64)>,
) -> Result<(), ClientError> {
    let body = metrics_body(docker, server_id, previous_cpu_ticks).await;
    client.post("/metrics", &body).await?;
    Ok(())
}

/// Body for `POST /metrics` (spec §6): a flat server-wide sample plus a
/// `podMetrics` array, one entry per running pod container.
async fn metrics_body(docker: &Docker, server_id: &str, previous_cpu_ticks: &mut Option<(u64, u64)>) -> serde_json::Value {
    let current_ticks = stats::sample_cpu_ticks().ok();
    let cpu_usage_percent = match (*previous_cpu_ticks, current_ticks) {
        (Some(prev), Some(cur)) => stats::cpu_usage_percent(prev, cur),
        _ => 0.0,
    };
    *previous_cpu_ticks = current_ticks;

    let memory_mb = stats::memory_usage_mb().map(|m| m.used_mb).unwrap_or(0);
    let disk_gb = stats::disk_usage_gb("/").unwrap_or(0);
    let pod_samples = stats::sample_pod_containers(docker).await.unwrap_or_default();

    json!({
        "serverId": server_id,
        "cpuUsagePercent": cpu_usage_percent,
        "memoryUsageMb": memory_mb as f64,
        "diskUsageGb": disk_gb as f64,
        "activePodsCount": pod_samples.len() as u32,
        "podMetrics": pod_samples.iter().map(|s| json!({
            "podId": s.pod_id,
            "containerId": s.container_id,
            "cpuUsagePercent": s.cpu_usage_percent,
            "memoryUsageMb": s.memory_usage_mb as f64,
            "diskUsageMb": s.disk_usage_mb as f64,
            "networkRxBytes": s.network_rx_bytes,
            "networkTxBytes": s.network_tx_bytes,
        })).collect::<Vec<_>>(),
    })
}
