//! Error handling for the scopecam service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
///
/// Only device-open, frame-read and encode failures use this type at runtime;
/// parameter-level hardware faults are absorbed where they happen.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Camera could not be opened
    #[error("Camera not available: {0}")]
    DeviceUnavailable(String),

    /// Frame read failed after the device was opened
    #[error("Failed to capture image: {0}")]
    CaptureFailed(String),

    /// Image encoding failed
    #[error("Failed to encode frame: {0}")]
    EncodeFailed(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Error::DeviceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "DEVICE_UNAVAILABLE",
                msg.clone(),
            ),
            Error::CaptureFailed(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CAPTURE_FAILED",
                msg.clone(),
            ),
            Error::EncodeFailed(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ENCODE_FAILED",
                msg.clone(),
            ),
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            Error::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                msg.clone(),
            ),
            Error::Io(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                e.to_string(),
            ),
            Error::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
