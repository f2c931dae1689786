//! Core error kinds shared by every subsystem.
//!
//! Errors are values at every boundary (spec §7, §9): no subsystem panics
//! across an `await` or FFI-ish boundary except to mark an invariant
//! violation, which is deliberately fatal and non-retryable.

use thiserror::Error;

/// Behavioral error kinds, not type-per-call-site errors. Each subsystem maps
/// its own failures onto one of these so callers (control plane, proxy) can
/// apply a uniform policy (retry, 404, 401/403, fail-fast).
#[derive(Debug, Error)]
pub enum CoreError {
    /// Connection refused, DNS failure, timeout under threshold. Retryable
    /// with exponential backoff by the caller.
    #[error("transient I/O error: {0}")]
    Transient(String),

    /// A provisioning step returned a non-zero exit code or hit its timeout.
    #[error("step {step} failed: {message}")]
    StepFailure { step: String, message: String },

    /// No host satisfies `SelectHost`, no port is available, or a storage
    /// quota was exceeded. Never retried automatically.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Missing/invalid/expired proxy token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Token/hostname mismatch, or team-membership denied.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Pod, snapshot, or host does not exist (or is archived).
    #[error("not found: {0}")]
    NotFound(String),

    /// Two operations raced for the same pod, or a version check failed.
    #[error("conflict: {0}")]
    Conflict(String),

    /// State that should be unreachable (e.g. `running` with no
    /// `container_id`). Marks the pod `error` and refuses further
    /// transitions until an operator intervenes.
    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Transient(_))
    }
}
