use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::transcode::TranscodeError;

/// Main error type for the extract server
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("parse multipart failed: {0}")]
    Multipart(String),

    #[error("request body exceeds upload limit of {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("default video not found on server")]
    DefaultMediaNotFound,

    #[error("save upload failed: {0}")]
    SaveUpload(std::io::Error),

    #[error("ffmpeg extract failed: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("open output failed: {0}")]
    OpenOutput(std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ServerError::Multipart(_) | ServerError::DefaultMediaNotFound => {
                StatusCode::BAD_REQUEST
            }
            ServerError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Body text sent to the client. Client and ffmpeg errors are passed
    /// through; local resource failures only name the step that failed.
    fn public_message(&self) -> String {
        match self {
            ServerError::SaveUpload(_) => "save upload failed".to_string(),
            ServerError::OpenOutput(_) => "open output failed".to_string(),
            ServerError::Internal(_) | ServerError::Config(_) | ServerError::Io(_) => {
                "internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.status(), self.public_message()).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ServerError>;
