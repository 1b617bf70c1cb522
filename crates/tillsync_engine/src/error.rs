//! Error types for the sync engine.

use thiserror::Error;
use tillsync_protocol::ProtocolError;
use tillsync_storage::StorageError;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote API answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// Response status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// A record store call failed.
    #[error("store error: {0}")]
    Store(String),

    /// Durable storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Protocol data could not be encoded, decoded or mapped.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,

    /// The table is not one of the synchronized tables.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// Another sync holds the single-flight guard.
    #[error("sync already in progress")]
    SyncInProgress,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Http { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            SyncError::Timeout | SyncError::NotConnected | SyncError::Store(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection reset").is_retryable());
        assert!(!SyncError::transport_fatal("invalid certificate").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::Http {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(!SyncError::Http {
            status: 404,
            message: "missing".into()
        }
        .is_retryable());
        assert!(!SyncError::UnknownTable("x".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        assert_eq!(SyncError::NotConnected.to_string(), "not connected to server");
        assert_eq!(
            SyncError::UnknownTable("widgets".into()).to_string(),
            "unknown table: widgets"
        );

        let err = SyncError::Http {
            status: 422,
            message: "price must be positive".into(),
        };
        assert_eq!(err.to_string(), "HTTP 422: price must be positive");
    }
}
