//! Reference adapter: a gVisor-style sandboxed runtime invoked through the
//! host's container CLI over a [`HostConnection`] (spec §4.2, §9). All
//! operations are argv vectors — never a shell string — so the orchestrator
//! never has to trust escaping at the call site.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::host::{exec_checked, ExecOptions, HostConnection};

use super::{ContainerFilter, ContainerRuntime, ContainerSpec, ContainerStats, ContainerSummary};

/// Adapter over a single host's container CLI. `runtime_class` selects the
/// sandboxed runtime registered with the container engine (e.g. `runsc`);
/// an empty string falls back to the engine's default (native) runtime,
/// which is useful for local-VM development hosts.
pub struct SandboxedRuntime {
    conn: Arc<dyn HostConnection>,
    cli: String,
    runtime_class: String,
}

impl SandboxedRuntime {
    pub fn new(conn: Arc<dyn HostConnection>, cli: impl Into<String>, runtime_class: impl Into<String>) -> Self {
        Self {
            conn,
            cli: cli.into(),
            runtime_class: runtime_class.into(),
        }
    }

    async fn run(&self, step: &str, args: Vec<String>) -> CoreResult<String> {
        let output = exec_checked(self.conn.as_ref(), step, &self.cli, &args, ExecOptions::default()).await?;
        Ok(output.stdout_string().trim().to_string())
    }

    /// Same as `run`, but idempotent callers pass an `already_exists`
    /// predicate over stderr so a repeat call succeeds silently (spec §4.2
    /// invariant: volume/network operations are idempotent).
    async fn run_idempotent(&self, step: &str, args: Vec<String>, already_exists: impl Fn(&str) -> bool) -> CoreResult<()> {
        let output = self.conn.exec(&self.cli, &args, ExecOptions::default()).await?;
        if output.success() || already_exists(&output.stderr_string()) {
            Ok(())
        } else {
            Err(CoreError::StepFailure {
                step: step.to_string(),
                message: output.stderr_string(),
            })
        }
    }
}

#[async_trait]
impl ContainerRuntime for SandboxedRuntime {
    async fn create_network(&self, pod_network_name: &str, subnet: &str) -> CoreResult<()> {
        self.run_idempotent(
            "create_network",
            vec![
                "network".into(),
                "create".into(),
                "--subnet".into(),
                subnet.into(),
                pod_network_name.into(),
            ],
            |stderr| stderr.contains("already exists"),
        )
        .await
    }

    async fn destroy_network(&self, pod_network_name: &str) -> CoreResult<()> {
        self.run_idempotent(
            "destroy_network",
            vec!["network".into(), "rm".into(), pod_network_name.into()],
            |stderr| stderr.contains("not found") || stderr.contains("No such network"),
        )
        .await
    }

    async fn create_volume(&self, name: &str) -> CoreResult<()> {
        self.run_idempotent(
            "create_volume",
            vec!["volume".into(), "create".into(), name.into()],
            |_| true,
        )
        .await
    }

    async fn remove_volume(&self, name: &str) -> CoreResult<()> {
        self.run_idempotent(
            "remove_volume",
            vec!["volume".into(), "rm".into(), name.into()],
            |stderr| stderr.contains("not found") || stderr.contains("No such volume"),
        )
        .await
    }

    async fn volume_exists(&self, name: &str) -> CoreResult<bool> {
        let output = self
            .conn
            .exec(&self.cli, &["volume".into(), "inspect".into(), name.into()], ExecOptions::default())
            .await?;
        Ok(output.success())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> CoreResult<String> {
        let mut args = vec!["create".to_string()];
        if !self.runtime_class.is_empty() {
            args.push("--runtime".into());
            args.push(self.runtime_class.clone());
        }
        args.push("--name".into());
        args.push(spec.name.clone());
        args.push("--network".into());
        args.push(spec.network_name.clone());
        args.push("--cpus".into());
        args.push(spec.limits.cpu_cores.to_string());
        args.push("--memory".into());
        args.push(format!("{}m", spec.limits.memory_mb));
        args.push("--pids-limit".into());
        args.push(spec.limits.pids_limit.to_string());

        for mount in &spec.mounts {
            args.push("--mount".into());
            args.push(format!(
                "type=volume,source={},target={}",
                mount.volume_name, mount.mount_path
            ));
        }
        for bind in &spec.host_binds {
            args.push("--mount".into());
            let ro = if bind.read_only { ",readonly" } else { "" };
            args.push(format!(
                "type=bind,source={},target={}{ro}",
                bind.host_path, bind.container_path
            ));
        }
        for port in &spec.published_ports {
            args.push("-p".into());
            args.push(format!("{}:{}", port.external, port.internal));
        }
        for (key, value) in &spec.env {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }
        for (key, value) in &spec.labels {
            args.push("--label".into());
            args.push(format!("{key}={value}"));
        }
        args.push(spec.image.clone());
        args.extend(spec.command.clone());

        let id = self.run("create_container", args).await?;
        if id.len() < 64 {
            // Some engines print a short form by default; re-inspect for
            // the full ID so every downstream call uses the 64-char form
            // (spec §4.2 invariant).
            let full = self
                .run("inspect_container_id", vec!["inspect".into(), "--format".into(), "{{.Id}}".into(), id.clone()])
                .await?;
            Ok(full)
        } else {
            Ok(id)
        }
    }

    async fn start_container(&self, container_id: &str) -> CoreResult<()> {
        self.run("start_container", vec!["start".into(), container_id.to_string()])
            .await
            .map(|_| ())
    }

    async fn stop_container(&self, container_id: &str, grace_period_secs: u32) -> CoreResult<()> {
        self.run(
            "stop_container",
            vec![
                "stop".into(),
                "--time".into(),
                grace_period_secs.to_string(),
                container_id.to_string(),
            ],
        )
        .await
        .map(|_| ())
    }

    async fn remove_container(&self, container_id: &str, force: bool) -> CoreResult<()> {
        let mut args = vec!["rm".to_string()];
        if force {
            args.push("-f".into());
        }
        args.push(container_id.to_string());
        self.run_idempotent("remove_container", args, |stderr| {
            stderr.contains("No such container")
        })
        .await
    }

    async fn list_containers(&self, filter: ContainerFilter) -> CoreResult<Vec<ContainerSummary>> {
        let mut args = vec![
            "ps".to_string(),
            "-a".to_string(),
            "--format".to_string(),
            "{{.ID}}\t{{.Names}}\t{{.Status}}".to_string(),
        ];
        if let Some((key, value)) = &filter.label {
            args.push("--filter".into());
            args.push(format!("label={key}={value}"));
        }
        if let Some(prefix) = &filter.name_prefix {
            args.push("--filter".into());
            args.push(format!("name={prefix}"));
        }

        let stdout = self.run("list_containers", args).await?;
        Ok(stdout
            .lines()
            .filter_map(|line| {
                let mut parts = line.splitn(3, '\t');
                Some(ContainerSummary {
                    id: parts.next()?.to_string(),
                    name: parts.next()?.to_string(),
                    status: parts.next().unwrap_or_default().to_string(),
                })
            })
            .collect())
    }

    async fn exec_in_container(&self, container_id: &str, cmd: &[String]) -> CoreResult<(String, String, i32)> {
        let mut args = vec!["exec".to_string(), container_id.to_string()];
        args.extend(cmd.iter().cloned());
        let output = self.conn.exec(&self.cli, &args, ExecOptions::default()).await?;
        Ok((output.stdout_string(), output.stderr_string(), output.exit_code))
    }

    async fn stats(&self, container_id: &str) -> CoreResult<ContainerStats> {
        let stdout = self
            .run(
                "stats",
                vec![
                    "stats".into(),
                    "--no-stream".into(),
                    "--format".into(),
                    "{{.CPUPerc}}\t{{.MemUsage}}\t{{.NetIO}}".into(),
                    container_id.to_string(),
                ],
            )
            .await?;
        parse_stats_line(&stdout)
    }

    async fn wait_container(&self, container_id: &str) -> CoreResult<i32> {
        let stdout = self.run("wait_container", vec!["wait".into(), container_id.to_string()]).await?;
        stdout
            .lines()
            .next()
            .and_then(|line| line.trim().parse::<i32>().ok())
            .ok_or_else(|| CoreError::StepFailure {
                step: "wait_container".into(),
                message: format!("could not parse exit code from {stdout:?}"),
            })
    }
}

fn parse_stats_line(line: &str) -> CoreResult<ContainerStats> {
    let mut parts = line.trim().splitn(3, '\t');
    let cpu = parts
        .next()
        .and_then(|s| s.trim_end_matches('%').parse::<f64>().ok())
        .unwrap_or(0.0);
    let mem_bytes = parts
        .next()
        .and_then(|s| s.split('/').next())
        .map(parse_byte_size)
        .unwrap_or(0);
    let (rx, tx) = parts
        .next()
        .map(|s| {
            let mut io = s.split('/');
            (
                io.next().map(|s| parse_byte_size(s.trim())).unwrap_or(0),
                io.next().map(|s| parse_byte_size(s.trim())).unwrap_or(0),
            )
        })
        .unwrap_or((0, 0));

    Ok(ContainerStats {
        cpu_percent: cpu,
        memory_bytes: mem_bytes,
        network_rx_bytes: rx,
        network_tx_bytes: tx,
    })
}

fn parse_byte_size(raw: &str) -> u64 {
    let raw = raw.trim();
    let split_at = raw.find(|c: char| !c.is_ascii_digit() && c != '.').unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split_at);
    let number: f64 = number.parse().unwrap_or(0.0);
    let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
        "B" | "" => 1.0,
        "KB" | "KIB" => 1024.0,
        "MB" | "MIB" => 1024.0 * 1024.0,
        "GB" | "GIB" => 1024.0 * 1024.0 * 1024.0,
        _ => 1.0,
    };
    (number * multiplier) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_docker_stats_line() {
        let stats = parse_stats_line("12.34%\t128MiB / 1GiB\t1.2kB / 3.4kB").unwrap();
        assert!((stats.cpu_percent - 12.34).abs() < 0.001);
        assert_eq!(stats.memory_bytes, 128 * 1024 * 1024);
    }

    #[test]
    fn parse_byte_size_handles_plain_bytes() {
        assert_eq!(parse_byte_size("512B"), 512);
        assert_eq!(parse_byte_size("1KiB"), 1024);
    }
}
