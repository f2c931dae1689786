//! Host Connection (spec §4.1, C1): execute shell commands and transfer
//! files on a remote host, hiding the SSH-vs-local-VM distinction behind one
//! trait. A connection is per-host and logically multiplexed — concurrent
//! `exec` calls must not serialize behind each other.

pub mod local_vm;
pub mod registry;
pub mod retry;
pub mod ssh;

pub use registry::{HostHandle, HostRegistry};

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::CoreResult;

#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub stdin: Option<Vec<u8>>,
    pub working_dir: Option<String>,
    pub env: HashMap<String, String>,
    pub timeout: Option<Duration>,
}

impl ExecOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout: Some(timeout), ..Default::default() }
    }
}

/// Result of a single `exec` call. A non-zero `exit_code` is data, not an
/// error (spec §4.1 failure semantics) — callers decide whether to
/// escalate.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
    pub duration_ms: i64,
}

impl ExecOutput {
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A duplex byte stream to a remote TCP port, used for stream-level
/// proxying (spec §4.1 `Dial`).
pub trait DialStream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> DialStream for T {}

#[async_trait]
pub trait HostConnection: Send + Sync {
    /// Execute `cmd` with `args` as an argv vector — never build a shell
    /// string from untrusted input (spec §9 "thin bindings" note).
    async fn exec(&self, cmd: &str, args: &[String], opts: ExecOptions) -> CoreResult<ExecOutput>;

    async fn copy_in(&self, local_path: &Path, remote_path: &str) -> CoreResult<()>;

    async fn copy_out(&self, remote_path: &str, local_path: &Path) -> CoreResult<()>;

    /// Open a stream-level connection to a port on the host, for proxying.
    async fn dial(&self, target_port: u16) -> CoreResult<Box<dyn DialStream>>;
}

/// Convenience used throughout the orchestrator and runtime adapter: run
/// `exec` and turn a non-zero exit into a [`crate::error::CoreError::StepFailure`].
pub async fn exec_checked(
    conn: &dyn HostConnection,
    step: &str,
    cmd: &str,
    args: &[String],
    opts: ExecOptions,
) -> CoreResult<ExecOutput> {
    let output = conn.exec(cmd, args, opts).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(crate::error::CoreError::StepFailure {
            step: step.to_string(),
            message: format!(
                "exit code {}: {}",
                output.exit_code,
                output.stderr_string()
            ),
        })
    }
}
