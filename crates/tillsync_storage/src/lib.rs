//! # TillSync Storage
//!
//! Durable key-value slots for TillSync.
//!
//! This crate provides the lowest-level persistence used by the sync engine.
//! A slot is a named, opaque byte value that survives process restarts. The
//! engine mirrors its in-memory operation queue and sync status registry into
//! slots; stores never interpret the bytes they hold.
//!
//! ## Design Principles
//!
//! - Slots are whole-value writes (no partial updates, no appends)
//! - A write either fully replaces the slot or leaves the previous value
//! - Stores are `Send + Sync` and use interior locking
//! - The engine owns all serialization
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral devices
//! - [`FileStore`] - One file per slot inside a data directory
//!
//! ## Example
//!
//! ```rust
//! use tillsync_storage::{KeyValueStore, InMemoryStore};
//!
//! let store = InMemoryStore::new();
//! store.store("offline_queue", b"[]").unwrap();
//! assert_eq!(store.load("offline_queue").unwrap(), Some(b"[]".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{validate_key, KeyValueStore};
pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
