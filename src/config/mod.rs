//! Process configuration, sourced entirely from the environment (spec §6).
//!
//! Unlike the teacher's YAML-file loader, this system's external interface
//! is explicitly environment-variable based, so `Settings::from_env` is the
//! single entry point every binary calls at startup.

mod timeouts;
mod types;

pub use timeouts::Timeouts;
pub use types::{DualTarget, S3StorageConfig, Settings, StorageBackend};
