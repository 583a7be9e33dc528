//! Storage-specific error types for SQLite operations.
//!
//! These wrap diesel and r2d2 errors and are converted into the
//! backend-agnostic `bookmarkwise_core` errors at the crate boundary.

use bookmarkwise_core::errors::{Error, StorageError};
use diesel::result::Error as DieselError;
use thiserror::Error;

/// Storage-specific errors that wrap Diesel and r2d2 types.
#[derive(Error, Debug)]
pub enum StorageSqliteError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[from] diesel::ConnectionError),

    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    #[error("Query execution failed: {0}")]
    QueryFailed(#[from] DieselError),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Stored value is not valid JSON: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Database directory could not be prepared: {0}")]
    Io(#[from] std::io::Error),

    #[error("Writer actor unavailable: {0}")]
    WriterUnavailable(String),

    #[error("Core error: {0}")]
    CoreError(String),
}

/// Convert core Error to StorageSqliteError (for the write actor's transaction wrapper)
impl From<Error> for StorageSqliteError {
    fn from(err: Error) -> Self {
        StorageSqliteError::CoreError(err.to_string())
    }
}

impl From<StorageSqliteError> for Error {
    fn from(err: StorageSqliteError) -> Self {
        match err {
            StorageSqliteError::CoreError(e) => Error::Storage(StorageError::Internal(e)),
            other => Error::Storage(StorageError::Internal(other.to_string())),
        }
    }
}

/// Extension trait for converting Diesel and r2d2 Results to core Results.
///
/// Orphan rules forbid `From<DieselError> for Error`, so the conversion goes
/// through [`StorageSqliteError`].
pub trait IntoCore<T> {
    fn into_core(self) -> bookmarkwise_core::Result<T>;
}

impl<T> IntoCore<T> for std::result::Result<T, DieselError> {
    fn into_core(self) -> bookmarkwise_core::Result<T> {
        self.map_err(|e| StorageSqliteError::from(e).into())
    }
}

impl<T> IntoCore<T> for std::result::Result<T, r2d2::Error> {
    fn into_core(self) -> bookmarkwise_core::Result<T> {
        self.map_err(|e| StorageSqliteError::from(e).into())
    }
}

impl<T> IntoCore<T> for std::result::Result<T, diesel::ConnectionError> {
    fn into_core(self) -> bookmarkwise_core::Result<T> {
        self.map_err(|e| StorageSqliteError::from(e).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_becomes_internal_storage_error() {
        let result: std::result::Result<(), DieselError> = Err(DieselError::NotFound);
        let err = result.into_core().unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::Internal(_))));
        assert!(err.to_string().contains("Query execution failed"));
    }

    #[test]
    fn test_core_error_round_trip_keeps_message() {
        let core = Error::Unexpected("boom".to_string());
        let storage = StorageSqliteError::from(core);
        let back: Error = storage.into();
        assert!(back.to_string().contains("boom"));
    }
}
