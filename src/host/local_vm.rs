//! Local-VM host connection (spec §4.1 "local-VM hosts" variant): dispatched
//! through the local VM-management CLI instead of SSH, for developer
//! machines where the host *is* the workstation's VM.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use super::{DialStream, ExecOptions, ExecOutput, HostConnection};
use crate::error::{CoreError, CoreResult};

pub struct LocalVmConnection {
    vm_name: String,
    vm_cli_path: String,
}

impl LocalVmConnection {
    pub fn new(vm_name: impl Into<String>) -> CoreResult<Self> {
        let vm_name = vm_name.into();
        if vm_name.is_empty() {
            return Err(CoreError::Invariant("local VM host requires a non-empty VM name".into()));
        }
        Ok(Self {
            vm_name,
            vm_cli_path: std::env::var("PINACLE_VM_CLI").unwrap_or_else(|_| "multipass".to_string()),
        })
    }
}

#[async_trait]
impl HostConnection for LocalVmConnection {
    async fn exec(&self, cmd: &str, args: &[String], opts: ExecOptions) -> CoreResult<ExecOutput> {
        let mut vm_args = vec!["exec".to_string(), self.vm_name.clone(), "--".to_string()];
        if let Some(dir) = &opts.working_dir {
            vm_args.push("sh".into());
            vm_args.push("-c".into());
            let mut inner = vec![cmd.to_string()];
            inner.extend(args.iter().cloned());
            vm_args.push(format!("cd {dir} && exec \"$@\""));
            vm_args.push("--".into());
            vm_args.extend(inner);
        } else {
            vm_args.push(cmd.to_string());
            vm_args.extend(args.iter().cloned());
        }

        for (key, value) in &opts.env {
            vm_args.insert(3, format!("{key}={value}"));
            vm_args.insert(3, "--env".into());
        }

        let mut command = Command::new(&self.vm_cli_path);
        command
            .args(&vm_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = command
            .spawn()
            .map_err(|e| CoreError::transient(format!("spawn {}: {e}", self.vm_cli_path)))?;

        if let Some(stdin_bytes) = &opts.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(stdin_bytes).await;
            }
        }

        let wait = async {
            let output = child
                .wait_with_output()
                .await
                .map_err(|e| CoreError::transient(format!("wait for {}: {e}", self.vm_cli_path)))?;
            Ok::<_, CoreError>(ExecOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: output.stdout,
                stderr: output.stderr,
                duration_ms: started.elapsed().as_millis() as i64,
            })
        };

        match opts.timeout {
            Some(timeout) => tokio::time::timeout(timeout, wait).await.map_err(|_| {
                CoreError::StepFailure {
                    step: cmd.to_string(),
                    message: "timed out".into(),
                }
            })?,
            None => wait.await,
        }
    }

    async fn copy_in(&self, local_path: &Path, remote_path: &str) -> CoreResult<()> {
        let status = Command::new(&self.vm_cli_path)
            .args([
                "transfer".to_string(),
                local_path.display().to_string(),
                format!("{}:{}", self.vm_name, remote_path),
            ])
            .status()
            .await
            .map_err(|e| CoreError::transient(format!("vm transfer: {e}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(CoreError::StepFailure {
                step: "copy_in".into(),
                message: format!("{} transfer exited with {status}", self.vm_cli_path),
            })
        }
    }

    async fn copy_out(&self, remote_path: &str, local_path: &Path) -> CoreResult<()> {
        let status = Command::new(&self.vm_cli_path)
            .args([
                "transfer".to_string(),
                format!("{}:{}", self.vm_name, remote_path),
                local_path.display().to_string(),
            ])
            .status()
            .await
            .map_err(|e| CoreError::transient(format!("vm transfer: {e}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(CoreError::StepFailure {
                step: "copy_out".into(),
                message: format!("{} transfer exited with {status}", self.vm_cli_path),
            })
        }
    }

    async fn dial(&self, target_port: u16) -> CoreResult<Box<dyn DialStream>> {
        // Local VMs expose ports on localhost via the hypervisor's port
        // forwarding; dialing is just a local TCP connect.
        let stream = tokio::net::TcpStream::connect(("127.0.0.1", target_port))
            .await
            .map_err(|e| CoreError::transient(format!("dial 127.0.0.1:{target_port}: {e}")))?;
        Ok(Box::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_vm_name() {
        assert!(LocalVmConnection::new("").is_err());
    }

    #[test]
    fn accepts_non_empty_vm_name() {
        assert!(LocalVmConnection::new("dev-vm").is_ok());
    }
}
