//! Error types for admissions-crm

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    /// Record does not resolve within the caller's tenant
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request, rejected before it reaches the database
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The database cannot serve a connection right now; callers may retry
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Classify a diesel error, prefixing it with what was being attempted
    pub fn query(context: &str, err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match err {
            Error::DatabaseError(DatabaseErrorKind::UnableToSendCommand, info)
            | Error::DatabaseError(DatabaseErrorKind::ClosedConnection, info) => {
                StorageError::Unavailable(format!("{}: {}", context, info.message()))
            }
            Error::DatabaseError(_, ref info) if info.message().contains("database is locked") => {
                StorageError::Unavailable(format!("{}: {}", context, info.message()))
            }
            Error::NotFound => StorageError::NotFound(context.to_string()),
            other => StorageError::Internal(format!("{}: {}", context, other)),
        }
    }

    /// Whether the caller should retry the operation later
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_) | StorageError::Connection(_))
    }
}

impl From<diesel::result::Error> for StorageError {
    fn from(err: diesel::result::Error) -> Self {
        StorageError::query("Query failed", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_retryable() {
        assert!(StorageError::Unavailable("pool timeout".into()).is_retryable());
        assert!(!StorageError::NotFound("parent 1".into()).is_retryable());
        assert!(!StorageError::InvalidInput("page".into()).is_retryable());
    }

    #[test]
    fn test_diesel_not_found_maps_to_not_found() {
        let err = StorageError::query("Parent lookup", diesel::result::Error::NotFound);
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn test_rollback_maps_to_internal() {
        let err: StorageError = diesel::result::Error::RollbackTransaction.into();
        assert!(matches!(err, StorageError::Internal(_)));
    }
}
