//! Error types for project, archive and compile operations

use thiserror::Error;

use crate::compiler::CompileDiagnostic;

/// Errors raised by the core operations
#[derive(Error, Debug)]
pub enum ProjectError {
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

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ProjectError>;
