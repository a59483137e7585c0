//! Gateway errors and their HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use botfleet_core::InstanceId;
use serde_json::json;

/// Failures surfaced to HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No instance with this id. 404.
    #[error("instance not found: {0}")]
    InstanceNotFound(InstanceId),

    /// The instance exists but cannot send. 400.
    #[error("instance {0} cannot send messages")]
    SendUnavailable(InstanceId),

    /// The body could not be read, or the instance rejected or failed the
    /// send. 500.
    #[error("{0}")]
    SendFailed(String),
}

impl GatewayError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InstanceNotFound(_) => StatusCode::NOT_FOUND,
            Self::SendUnavailable(_) => StatusCode::BAD_REQUEST,
            Self::SendFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
