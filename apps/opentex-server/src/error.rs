//! Error types for the OpenTeX server

use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use opentex_core::{CompileDiagnostic, ProjectError};
use serde::Serialize;
use thiserror::Error;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Unsafe archive: {0}")]
    UnsafeArchive(String),

    #[error("Compilation failed")]
    CompileFailed {
        log: String,
        diagnostics: Vec<CompileDiagnostic>,
    },

    #[error("Compilation timeout after {0}s")]
    Timeout(u64),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Git is not configured")]
    GitNotConfigured,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    log: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostics: Option<Vec<CompileDiagnostic>>,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ServerError::InvalidName(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_NAME", msg.clone())
            }
            ServerError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Not found: {}", what),
            ),
            ServerError::AlreadyExists(what) => (
                StatusCode::CONFLICT,
                "ALREADY_EXISTS",
                format!("Already exists: {}", what),
            ),
            ServerError::UnsafeArchive(msg) => {
                (StatusCode::BAD_REQUEST, "UNSAFE_ARCHIVE", msg.clone())
            }
            ServerError::CompileFailed { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "COMPILE_FAILED",
                "Compilation failed, see log".to_string(),
            ),
            ServerError::Timeout(secs) => (
                StatusCode::GATEWAY_TIMEOUT,
                "TIMEOUT",
                format!("Compilation timeout after {}s", secs),
            ),
            ServerError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg.clone())
            }
            ServerError::GitNotConfigured => (
                StatusCode::BAD_REQUEST,
                "GIT_NOT_CONFIGURED",
                "Git not configured".to_string(),
            ),
            ServerError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal error".to_string(),
                )
            }
        };

        let (log, diagnostics) = match self {
            ServerError::CompileFailed { log, diagnostics } => (Some(log), Some(diagnostics)),
            _ => (None, None),
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code: code.to_string(),
            log,
            diagnostics,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ProjectError> for ServerError {
    fn from(err: ProjectError) -> Self {
        match err {
            ProjectError::InvalidName(msg) => ServerError::InvalidName(msg),
            ProjectError::NotFound(what) => ServerError::NotFound(what),
            ProjectError::AlreadyExists(what) => ServerError::AlreadyExists(what),
            ProjectError::UnsafeArchive(msg) => ServerError::UnsafeArchive(msg),
            ProjectError::CompileFailed { log, diagnostics } => {
                ServerError::CompileFailed { log, diagnostics }
            }
            ProjectError::Timeout(secs) => ServerError::Timeout(secs),
            ProjectError::InvalidRequest(msg) => ServerError::InvalidRequest(msg),
            ProjectError::GitNotConfigured => ServerError::GitNotConfigured,
            ProjectError::Archive(e) => ServerError::InvalidRequest(format!("Invalid zip archive: {}", e)),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::InvalidRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for ServerError {
    fn from(rejection: MultipartRejection) -> Self {
        ServerError::InvalidRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ServerError {
    fn from(err: MultipartError) -> Self {
        ServerError::InvalidRequest(format!("Malformed upload: {}", err.body_text()))
    }
}
