//! Relay error type and its JSON envelope.
//!
//! Every failure is answered as `{"error": ..., "detail": ...}` with `detail`
//! omitted when there is nothing to add.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Missing, non-string or blank input. No outbound call is made.
    #[error("{0}")]
    InvalidInput(String),

    /// Provider credentials are not configured. Not retryable.
    #[error("translation provider credentials are not configured")]
    NotConfigured,

    /// Outbound call failed: transport error or non-2xx answer.
    #[error("{message}")]
    Outbound {
        status: Option<StatusCode>,
        message: String,
        detail: Value,
    },

    /// The provider answered without a usable translation.
    #[error("invalid translation response")]
    MalformedResponse { detail: Value },

    #[error("not found")]
    NotFound,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<Value>,
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RelayError::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Outbound { status, .. } => {
                status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            RelayError::MalformedResponse { .. } => StatusCode::BAD_GATEWAY,
            RelayError::NotFound => StatusCode::NOT_FOUND,
        }
    }

    /// Build an outbound error from a reqwest failure.
    pub fn from_transport(message: &str, error: &reqwest::Error) -> Self {
        RelayError::Outbound {
            status: error
                .status()
                .and_then(|s| StatusCode::from_u16(s.as_u16()).ok()),
            message: message.to_string(),
            detail: Value::String(error.to_string()),
        }
    }

    /// Build an outbound error from a non-2xx answer, keeping its body for diagnosis.
    pub fn from_status(message: &str, status: u16, body: &[u8]) -> Self {
        RelayError::Outbound {
            status: StatusCode::from_u16(status).ok(),
            message: message.to_string(),
            detail: body_detail(body),
        }
    }
}

/// Parse `body` as JSON, falling back to its text.
pub(crate) fn body_detail(body: &[u8]) -> Value {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self, "relay request failed");
        }
        let error = self.to_string();
        let detail = match self {
            RelayError::Outbound { detail, .. } | RelayError::MalformedResponse { detail } => {
                Some(detail)
            }
            RelayError::InvalidInput(_) | RelayError::NotConfigured | RelayError::NotFound => None,
        };
        (status, Json(ErrorBody { error, detail })).into_response()
    }
}
