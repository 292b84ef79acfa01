use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// The error taxonomy of §7: each variant carries enough detail to render either
/// an HTTP response or a WebSocket `error` frame, and never leaks a backtrace.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Busy(String),

    #[error("browser page lost: {0}")]
    PageDead(String),

    #[error("browser unavailable: {0}")]
    BrowserDead(String),

    #[error("{0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HostError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            HostError::Validation(_) => StatusCode::BAD_REQUEST,
            HostError::NotFound(_) => StatusCode::NOT_FOUND,
            HostError::Busy(_) => StatusCode::CONFLICT,
            HostError::PageDead(_) | HostError::BrowserDead(_) => StatusCode::SERVICE_UNAVAILABLE,
            HostError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            HostError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HostError {
    fn into_response(self) -> Response {
        if matches!(self, HostError::Internal(_)) {
            tracing::error!(error = %self, "internal error");
        }
        let body = json!({ "status": "error", "error": self.to_string() });
        (self.status_code(), axum::Json(body)).into_response()
    }
}

impl From<std::io::Error> for HostError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => HostError::NotFound(e.to_string()),
            _ => HostError::Internal(e.to_string()),
        }
    }
}

impl From<anyhow::Error> for HostError {
    fn from(e: anyhow::Error) -> Self {
        HostError::Internal(e.to_string())
    }
}

pub type HostResult<T> = Result<T, HostError>;
