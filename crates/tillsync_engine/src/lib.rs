//! # TillSync Engine
//!
//! Offline-first synchronization for point-of-sale terminals.
//!
//! This crate provides:
//! - A durable, priority-ordered operation queue with dependencies and retries
//! - A sync orchestrator that drains the queue and reconciles tables
//! - A per-table sync status registry
//! - An automatic sync driver (interval and reconnect triggers)
//! - HTTP transport abstraction with a `reqwest` client
//!
//! ## Architecture
//!
//! Local writes land in the local [`RecordStore`] right away and are queued
//! as operations. A full sync:
//! 1. Drains the [`OperationQueue`] through the [`OperationTransport`]
//! 2. Reconciles every configured table between the local and remote stores
//! 3. Resolves conflicts by last-writer-wins on `updatedAt`
//!
//! ## Key Invariants
//!
//! - At most one sync runs at a time
//! - Nothing touches the network while offline
//! - A dependency is confirmed before any of its dependents is sent
//! - Queue and status survive restarts through a [`KeyValueStore`]
//!
//! [`KeyValueStore`]: tillsync_storage::KeyValueStore

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod auto_sync;
mod clock;
mod config;
mod connectivity;
mod error;
mod flight;
mod http;
mod listeners;
mod orchestrator;
mod queue;
mod registry;
mod store;
mod transport;

pub use auto_sync::AutoSync;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SyncConfig;
pub use connectivity::{Connectivity, ManualConnectivity};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpResponse, HttpTransport, ReqwestClient};
pub use listeners::{Listeners, Subscription};
pub use orchestrator::{SyncOrchestrator, SyncServices, SyncState};
pub use queue::{DrainReport, OperationQueue};
pub use registry::SyncStatusRegistry;
pub use store::{MemoryRecordStore, RecordStore};
pub use transport::{MockTransport, OperationTransport, StoreTransport};
