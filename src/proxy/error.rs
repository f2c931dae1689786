//! Error-to-response mapping for the proxy (spec §4.7). Upstream and
//! forwarding failures surface as `502 Bad Gateway`, never `500`, since the
//! proxy itself is healthy — it's the pod's upstream that misbehaved.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::CoreError;

pub enum ProxyError {
    Core(CoreError),
    BadGateway(String),
}

impl From<CoreError> for ProxyError {
    fn from(err: CoreError) -> Self {
        ProxyError::Core(err)
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ProxyError::Core(CoreError::Unauthorized(msg)) => (StatusCode::UNAUTHORIZED, msg),
            ProxyError::Core(CoreError::Forbidden(msg)) => (StatusCode::FORBIDDEN, msg),
            ProxyError::Core(CoreError::NotFound(msg)) => (StatusCode::NOT_FOUND, msg),
            ProxyError::Core(CoreError::ResourceExhausted(msg)) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ProxyError::Core(other) => (StatusCode::BAD_GATEWAY, other.to_string()),
            ProxyError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };
        (status, message).into_response()
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;
