//! Control Plane API (spec §4.5, C5): registration/heartbeat/metrics
//! ingestion from the Host Agent, pod CRUD delegating to the Orchestrator,
//! and host selection.

mod auth;
mod dto;
mod error;
mod handlers;
pub mod host_connect;
mod host_select;
pub mod server;
mod state;
pub mod sweep;

pub use error::{ApiError, ApiResult};
pub use host_select::select_host;
pub use state::AppState;
