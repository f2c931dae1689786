//! Logging initialization shared by every binary.
//!
//! Follows the same shape as the teacher's `tracing`/`tracing-subscriber`
//! setup: an `EnvFilter` sourced from `RUST_LOG` (falling back to a
//! caller-supplied default), human-readable `fmt` output. Unlike the
//! teacher, which always logs to a rotating file on the user's machine, the
//! core's processes are meant to run as fleet daemons, so they log to
//! stderr and let the surrounding process supervisor capture it.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init(default_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .context("failed to initialize tracing subscriber")?;

    Ok(())
}
