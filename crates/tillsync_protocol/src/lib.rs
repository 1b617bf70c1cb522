//! # TillSync Protocol
//!
//! Data model and wire formats for the TillSync sync engine.
//!
//! This crate provides:
//! - [`QueuedOperation`] and [`OperationInput`] for the durable operation queue
//! - [`Record`] for rows of synchronized tables
//! - [`Conflict`] detection and last-writer-wins resolution
//! - [`SyncStatus`], [`QueueStats`], [`SyncReport`] and [`SyncSnapshot`]
//! - [`RemoteRequest`] mapping queued operations onto REST endpoints
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod endpoint;
mod error;
mod operation;
mod record;
mod status;

pub use conflict::{detect_conflict, resolve_conflict, Conflict, ConflictResolution};
pub use endpoint::{decode_segment, encode_segment, HttpMethod, RemoteRequest};
pub use error::{ProtocolError, ProtocolResult};
pub use operation::{
    decode_operations, encode_operations, queue_order, OperationId, OperationInput,
    OperationType, QueuedOperation, DEFAULT_MAX_RETRIES,
};
pub use record::Record;
pub use status::{QueueStats, SyncReport, SyncSnapshot, SyncStatus};
