// src/error.rs
//
// =============================================================================
// REPROLAB: ERROR TAXONOMY (v 0.1)
// =============================================================================
//
// One enum for every failure class the engine can surface.
//
// Classes:
// - Config:       malformed config.yaml. Fatal, never retried.
// - PathSecurity: a resolved path escaped its root. Surfaced as access denied.
// - Permission:   VIEWER attempted a mutating call. Fatal to that call only.
// - NotFound:     modify/get on a missing id. (remove_* is idempotent and
//                 deliberately does NOT raise this.)
// - UnknownStep:  no handler registered. Programmer/integration error.
//
// No retries live in this crate. Retry policy belongs to the caller.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LabError>;

#[derive(Debug, Error)]
pub enum LabError {
    #[error("configuration error at {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("path security violation: {path} escapes {root}")]
    PathSecurity { path: PathBuf, root: PathBuf },

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("{entity} with id {id} not found")]
    NotFound { entity: String, id: i64 },

    #[error("no handler registered for step type '{0}'")]
    UnknownStep(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("recipe error: {0}")]
    Recipe(String),

    #[error("variant already exists: {0}")]
    VariantExists(PathBuf),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LabError {
    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, id: i64) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id,
        }
    }
}
