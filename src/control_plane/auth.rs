//! Host Agent authentication: a static shared-secret `X-Api-Key` header
//! (spec §6). Pod-CRUD routes are assumed to sit behind the operator's own
//! user-auth layer (spec §4.7 step 1 notes user auth is out of scope); this
//! middleware only guards the agent-facing register/heartbeat/metrics
//! endpoints.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

use super::state::AppState;

const API_KEY_HEADER: &str = "x-api-key";

pub async fn require_agent_api_key(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if presented == state.agent_api_key {
        Ok(next.run(req).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}
