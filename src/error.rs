use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Unified error type for the Veil service
#[derive(Error, Debug)]
pub enum VeilError {
    // Proxy errors
    #[error("No proxies available")]
    NoProxiesAvailable,

    #[error("Proxy connection failed: {0}")]
    ProxyConnectionFailed(String),

    #[error("Invalid proxy address: {0}")]
    InvalidProxyAddress(String),

    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("CONNECT failed: {0}")]
    ConnectFailed(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Operation timed out")]
    Timeout,

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Veil operations
pub type Result<T> = std::result::Result<T, VeilError>;

impl VeilError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            VeilError::InvalidRequest(_)
            | VeilError::InvalidProxyAddress(_)
            | VeilError::UnsupportedProtocol(_)
            | VeilError::InvalidConfig(_) => StatusCode::BAD_REQUEST,

            // 502 Bad Gateway
            VeilError::ProxyConnectionFailed(_) | VeilError::ConnectFailed(_) => {
                StatusCode::BAD_GATEWAY
            }

            // 503 Service Unavailable
            VeilError::NoProxiesAvailable => StatusCode::SERVICE_UNAVAILABLE,

            // 504 Gateway Timeout
            VeilError::Timeout => StatusCode::GATEWAY_TIMEOUT,

            // 500 Internal Server Error
            VeilError::Io(_) | VeilError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for VeilError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

impl From<url::ParseError> for VeilError {
    fn from(err: url::ParseError) -> Self {
        VeilError::InvalidProxyAddress(err.to_string())
    }
}
