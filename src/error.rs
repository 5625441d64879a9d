//! Error types for Runplane
//!
//! Centralized error handling using thiserror. The first four variants are the
//! scheduling taxonomy callers are expected to branch on; the rest are
//! infrastructure failures.

use rusqlite::ErrorCode;
use thiserror::Error;

/// All error types that can occur in Runplane
#[derive(Debug, Error)]
pub enum PlaneError {
    /// Unknown project, work item, run, task or request
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: i64 },

    /// Missing approval, lease held elsewhere, quota exhausted, wrong state
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Transaction conflict or busy database; safe to retry
    #[error("Transient store error: {0}")]
    TransientStore(String),

    /// An agent-reported run failure
    #[error("Execution failed: {0}")]
    ExecutionFailure(String),

    /// Malformed caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unique constraint violated
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Encryption or decryption of sensitive values failed
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl PlaneError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(kind: &'static str, id: i64) -> Self {
        PlaneError::NotFound { kind, id }
    }

    /// Shorthand for a `PreconditionFailed` error.
    pub fn precondition(msg: impl Into<String>) -> Self {
        PlaneError::PreconditionFailed(msg.into())
    }

    /// Whether the operation may succeed if simply retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, PlaneError::TransientStore(_))
    }
}

impl From<rusqlite::Error> for PlaneError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                PlaneError::TransientStore(err.to_string())
            }
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
                let msg = err.to_string();
                if msg.contains("UNIQUE") {
                    PlaneError::AlreadyExists(msg)
                } else {
                    PlaneError::Storage(msg)
                }
            }
            _ => PlaneError::Storage(err.to_string()),
        }
    }
}

/// Result type alias for Runplane operations
pub type Result<T> = std::result::Result<T, PlaneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = PlaneError::not_found("work item", 7);
        assert_eq!(err.to_string(), "work item not found: 7");
    }

    #[test]
    fn test_precondition_error() {
        let err = PlaneError::precondition("approval required before starting run");
        assert_eq!(
            err.to_string(),
            "Precondition failed: approval required before starting run"
        );
    }

    #[test]
    fn test_only_transient_store_is_transient() {
        assert!(PlaneError::TransientStore("busy".into()).is_transient());
        assert!(!PlaneError::Storage("disk full".into()).is_transient());
        assert!(!PlaneError::precondition("lease held").is_transient());
    }

    #[test]
    fn test_busy_sqlite_error_is_transient() {
        let sqlite_err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        );
        let err: PlaneError = sqlite_err.into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_unique_violation_is_already_exists() {
        let sqlite_err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE),
            Some("UNIQUE constraint failed: projects.name".to_string()),
        );
        let err: PlaneError = sqlite_err.into();
        assert!(matches!(err, PlaneError::AlreadyExists(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PlaneError = io_err.into();
        assert!(matches!(err, PlaneError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: PlaneError = json_err.into();
        assert!(matches!(err, PlaneError::Json(_)));
    }
}
