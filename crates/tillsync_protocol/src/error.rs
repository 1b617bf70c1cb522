//! Error types for protocol data.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding, decoding or mapping protocol data.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A payload is not a valid synchronizable record.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// An update or delete payload carries no usable `id`.
    #[error("{op_type} operation on {table} has no id in its payload")]
    MissingId {
        /// Operation type name.
        op_type: &'static str,
        /// Target table.
        table: String,
    },

    /// A request path segment could not be decoded.
    #[error("invalid path segment: {0}")]
    InvalidPath(String),
}
