//! Host and per-container metrics sampling (spec §4.4, §6 `POST /metrics`).
//!
//! Host CPU usage is a delta over `/proc/stat` jiffy counters between two
//! samples, the same technique every `top`-alike uses; memory and disk come
//! from `/proc/meminfo` and `statvfs` respectively. Per-container stats
//! reuse the daemon's own cgroup accounting via `bollard`, scoped to
//! containers named with the `pinacle-pod-` prefix (spec §3 naming
//! convention) — the agent is the one component allowed to talk to the
//! container runtime directly rather than through a host connection.

use std::collections::HashMap;

use anyhow::{Context, Result};
use bollard::container::{ListContainersOptions, StatsOptions};
use bollard::Docker;
use futures_util::StreamExt;

#[derive(Debug, Clone, Copy, Default)]
struct CpuTicks {
    idle: u64,
    total: u64,
}

fn read_cpu_ticks() -> Result<CpuTicks> {
    let contents = std::fs::read_to_string("/proc/stat").context("reading /proc/stat")?;
    let line = contents.lines().next().context("empty /proc/stat")?;
    let fields: Vec<u64> = line.split_whitespace().skip(1).filter_map(|f| f.parse().ok()).collect();
    if fields.len() < 4 {
        anyhow::bail!("unexpected /proc/stat format: {line:?}");
    }
    let idle = fields[3];
    let total: u64 = fields.iter().sum();
    Ok(CpuTicks { idle, total })
}

/// CPU usage percent between two `/proc/stat` samples taken `interval`
/// apart. Callers are expected to keep the previous sample around and pass
/// it in; there is no meaningful "instantaneous" CPU percent from one read.
pub fn cpu_usage_percent(previous: (u64, u64), current: (u64, u64)) -> f64 {
    let (prev_idle, prev_total) = previous;
    let (cur_idle, cur_total) = current;
    let total_delta = cur_total.saturating_sub(prev_total);
    let idle_delta = cur_idle.saturating_sub(prev_idle);
    if total_delta == 0 {
        return 0.0;
    }
    100.0 * (1.0 - idle_delta as f64 / total_delta as f64)
}

pub fn sample_cpu_ticks() -> Result<(u64, u64)> {
    let ticks = read_cpu_ticks()?;
    Ok((ticks.idle, ticks.total))
}

pub struct MemoryUsage {
    pub used_mb: u64,
}

pub fn memory_usage_mb() -> Result<MemoryUsage> {
    let contents = std::fs::read_to_string("/proc/meminfo").context("reading /proc/meminfo")?;
    let mut fields: HashMap<&str, u64> = HashMap::new();
    for line in contents.lines() {
        if let Some((key, value)) = line.split_once(':') {
            if let Some(kb) = value.trim().trim_end_matches(" kB").parse::<u64>().ok() {
                fields.insert(key, kb);
            }
        }
    }
    let total = *fields.get("MemTotal").unwrap_or(&0);
    let available = *fields.get("MemAvailable").unwrap_or(&0);
    Ok(MemoryUsage { used_mb: total.saturating_sub(available) / 1024 })
}

pub fn disk_usage_gb(path: &str) -> Result<u64> {
    // statvfs isn't in std; shell out to `df` rather than pull in a libc
    // binding crate for one number.
    let output = std::process::Command::new("df").args(["-B1", "--output=used", path]).output().context("running df")?;
    let text = String::from_utf8_lossy(&output.stdout);
    let used_bytes: u64 = text.lines().nth(1).and_then(|l| l.trim().parse().ok()).unwrap_or(0);
    Ok(used_bytes / (1024 * 1024 * 1024))
}

#[derive(Debug, Clone)]
pub struct ContainerSample {
    /// Full `pod_<ulid>` id, already prefixed (parsed out of the container
    /// name `pinacle-pod-pod_<ulid>` as-is, not re-derived).
    pub pod_id: String,
    pub container_id: String,
    pub cpu_usage_percent: f64,
    pub memory_usage_mb: u64,
    pub disk_usage_mb: u64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
}

/// Sample every running container named `pinacle-pod-<podId>`.
pub async fn sample_pod_containers(docker: &Docker) -> Result<Vec<ContainerSample>> {
    let mut filters = HashMap::new();
    filters.insert("name".to_string(), vec!["pinacle-pod-".to_string()]);
    let containers = docker
        .list_containers(Some(ListContainersOptions { all: false, size: true, filters, ..Default::default() }))
        .await
        .context("listing pod containers")?;

    let mut samples = Vec::with_capacity(containers.len());
    for container in containers {
        let Some(id) = container.id.clone() else { continue };
        let Some(name) = container.names.as_ref().and_then(|n| n.first()) else { continue };
        let Some(pod_id) = name.trim_start_matches('/').strip_prefix("pinacle-pod-") else { continue };
        let disk_usage_mb = container.size_root_fs.or(container.size_rw).unwrap_or(0).max(0) as u64 / (1024 * 1024);

        let mut stream = docker.stats(&id, Some(StatsOptions { stream: false, one_shot: true }));
        let Some(Ok(stats)) = stream.next().await else { continue };

        let cpu_delta = stats.cpu_stats.cpu_usage.total_usage.saturating_sub(stats.precpu_stats.cpu_usage.total_usage) as f64;
        let system_delta = stats.cpu_stats.system_cpu_usage.unwrap_or(0).saturating_sub(stats.precpu_stats.system_cpu_usage.unwrap_or(0)) as f64;
        let online_cpus = stats.cpu_stats.online_cpus.unwrap_or(1).max(1) as f64;
        let cpu_usage_percent = if system_delta > 0.0 { (cpu_delta / system_delta) * online_cpus * 100.0 } else { 0.0 };

        let memory_usage_mb = stats.memory_stats.usage.unwrap_or(0) / (1024 * 1024);

        let (rx, tx) = stats
            .networks
            .as_ref()
            .map(|nets| nets.values().fold((0u64, 0u64), |(rx, tx), n| (rx + n.rx_bytes, tx + n.tx_bytes)))
            .unwrap_or((0, 0));

        samples.push(ContainerSample {
            pod_id: pod_id.to_string(),
            container_id: id,
            cpu_usage_percent,
            memory_usage_mb,
            disk_usage_mb,
            network_rx_bytes: rx,
            network_tx_bytes: tx,
        });
    }

    Ok(samples)
}
