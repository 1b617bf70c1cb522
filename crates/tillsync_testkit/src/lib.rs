//! # TillSync Testkit
//!
//! Test utilities for TillSync.
//!
//! This crate provides:
//! - An in-memory harness wiring every engine collaborator
//! - File-backed storage in temporary directories
//! - Record and timestamp helpers
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tillsync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn syncs_products() {
//!     let harness = Harness::new(["products"]);
//!     let orchestrator = harness.orchestrator();
//!     assert!(orchestrator.perform_full_sync().await.success);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
