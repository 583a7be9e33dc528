//! Core error types for the settings sync engine.
//!
//! Storage errors are kept backend-agnostic: concrete storage areas (SQLite,
//! in-memory, a browser bridge) convert their own failures into these types.

use thiserror::Error;

use crate::storage::StorageAreaKind;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the engine.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage operation failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Sync envelope is malformed: {0}")]
    Envelope(String),

    #[error("Sync quota exceeded: envelope is {size} bytes, limit is {limit}")]
    QuotaExceeded { size: usize, limit: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Backend-agnostic storage failures.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Read from {area} storage failed: {message}")]
    ReadFailed {
        area: StorageAreaKind,
        message: String,
    },

    #[error("Write to {area} storage failed: {message}")]
    WriteFailed {
        area: StorageAreaKind,
        message: String,
    },

    #[error("{area} storage is unavailable: {message}")]
    Unavailable {
        area: StorageAreaKind,
        message: String,
    },

    #[error("Internal storage error: {0}")]
    Internal(String),
}

impl StorageError {
    pub fn read_failed(area: StorageAreaKind, message: impl Into<String>) -> Self {
        Self::ReadFailed {
            area,
            message: message.into(),
        }
    }

    pub fn write_failed(area: StorageAreaKind, message: impl Into<String>) -> Self {
        Self::WriteFailed {
            area,
            message: message.into(),
        }
    }

    pub fn unavailable(area: StorageAreaKind, message: impl Into<String>) -> Self {
        Self::Unavailable {
            area,
            message: message.into(),
        }
    }
}

/// Errors raised while validating values at the `get`/`set` boundary.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Unknown setting key: {0}")]
    UnknownSettingKey(String),

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

impl ValidationError {
    pub fn invalid_value(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}
