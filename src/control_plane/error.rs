//! Maps [`CoreError`] onto HTTP status codes (spec §7's behavioral kinds
//! drive a uniform policy here, per `SPEC_FULL.md`'s ambient error-handling
//! section).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::CoreError;

pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::StepFailure { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::ResourceExhausted(_) => StatusCode::CONFLICT,
            CoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::Invariant(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CoreError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
