//! Common error types for Sample Log Book

use crate::tag::TagId;
use thiserror::Error;

/// Common result type for Sample Log Book operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the host and web processes
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Scan state table missing, corrupt or holding rows that cannot be decoded
    #[error("Scan state store unreadable: {0}")]
    StoreUnreadable(String),

    /// Enrollment submitted for an identifier that is not the pending one.
    /// Rejected without touching the store.
    #[error("Tag {target} is not awaiting enrollment (pending: {})", pending.as_ref().map(|p| p.as_str()).unwrap_or("none"))]
    UnknownAcknowledgmentTarget {
        target: TagId,
        pending: Option<TagId>,
    },

    /// Enrollment for an identifier already present in the registry
    #[error("Tag {0} is already enrolled")]
    RegistryWriteConflict(TagId),

    /// The store's writer task has shut down
    #[error("Scan state store writer is closed")]
    StoreClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_target_message_names_both_ids() {
        let err = Error::UnknownAcknowledgmentTarget {
            target: TagId::parse("FFFFFFFF").unwrap(),
            pending: Some(TagId::parse("04A1B2C3").unwrap()),
        };
        let msg = err.to_string();
        assert!(msg.contains("FFFFFFFF"));
        assert!(msg.contains("04A1B2C3"));
    }

    #[test]
    fn test_unknown_target_without_pending() {
        let err = Error::UnknownAcknowledgmentTarget {
            target: TagId::parse("FFFFFFFF").unwrap(),
            pending: None,
        };
        assert!(err.to_string().contains("pending: none"));
    }
}
