//! Test fixtures.
//!
//! Provides an in-memory wiring of the sync engine and helpers for
//! file-backed durability tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tillsync_engine::{
    ManualClock, ManualConnectivity, MemoryRecordStore, MockTransport, OperationQueue,
    OperationTransport, StoreTransport, SyncConfig, SyncOrchestrator, SyncServices,
};
use tillsync_protocol::Record;
use tillsync_storage::{FileStore, InMemoryStore, KeyValueStore};

/// A fixed instant all fixtures are anchored to.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0)
        .single()
        .expect("valid fixture timestamp")
}

/// Returns `t0()` shifted by `seconds`.
pub fn at(seconds: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(seconds)
}

/// Builds a record with a `name` column, modified `seconds` after `t0()`.
pub fn named_record(id: &str, seconds: i64, name: &str) -> Record {
    Record::new(id, at(seconds)).with_field("name", name)
}

/// How queued operations reach the remote store in a [`Harness`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Operations go to a [`MockTransport`] and are only recorded.
    Mock,
    /// Operations are applied to the harness's remote store.
    Remote,
}

/// Every engine collaborator, in memory, with test handles kept.
///
/// The clock starts one day after [`t0()`] so fixture records are always
/// older than "now".
pub struct Harness {
    /// Engine configuration.
    pub config: SyncConfig,
    /// Durable slots.
    pub storage: Arc<dyn KeyValueStore>,
    /// Connectivity switch.
    pub connectivity: Arc<ManualConnectivity>,
    /// Recording transport (also used for delivery in [`Delivery::Mock`]).
    pub transport: Arc<MockTransport>,
    /// Local database.
    pub local: Arc<MemoryRecordStore>,
    /// Remote database.
    pub remote: Arc<MemoryRecordStore>,
    /// Manual clock.
    pub clock: Arc<ManualClock>,
    delivery: Delivery,
}

impl Harness {
    /// Creates a harness syncing `tables`, with operations sent to a mock.
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_storage(SyncConfig::new(tables), Arc::new(InMemoryStore::new()))
    }

    /// Creates a harness with explicit config and storage.
    pub fn with_storage(config: SyncConfig, storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            config,
            storage,
            connectivity: Arc::new(ManualConnectivity::online()),
            transport: Arc::new(MockTransport::new()),
            local: Arc::new(MemoryRecordStore::new()),
            remote: Arc::new(MemoryRecordStore::new()),
            clock: Arc::new(ManualClock::new(t0() + Duration::days(1))),
            delivery: Delivery::Mock,
        }
    }

    /// Chooses where queued operations are delivered.
    pub fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Returns the transport operations are delivered through.
    pub fn operation_transport(&self) -> Arc<dyn OperationTransport> {
        match self.delivery {
            Delivery::Mock => self.transport.clone() as Arc<dyn OperationTransport>,
            Delivery::Remote => Arc::new(StoreTransport::new(
                self.remote.clone(),
                self.clock.clone(),
            )),
        }
    }

    /// Returns the collaborators for an orchestrator.
    pub fn services(&self) -> SyncServices {
        SyncServices {
            storage: Arc::clone(&self.storage),
            connectivity: self.connectivity.clone(),
            transport: self.operation_transport(),
            local: self.local.clone(),
            remote: self.remote.clone(),
            clock: self.clock.clone(),
        }
    }

    /// Builds an orchestrator over the harness.
    pub fn orchestrator(&self) -> SyncOrchestrator {
        SyncOrchestrator::new(self.config.clone(), self.services())
    }

    /// Builds a standalone queue over the harness.
    pub fn queue(&self) -> OperationQueue {
        OperationQueue::new(
            &self.config,
            Arc::clone(&self.storage),
            self.connectivity.clone(),
            self.operation_transport(),
            self.clock.clone(),
        )
    }

    /// Sets connectivity.
    pub fn set_online(&self, online: bool) {
        self.connectivity.set_online(online);
    }
}

/// A [`FileStore`] in a temporary directory that is removed on drop.
pub struct TempFileStore {
    store: Arc<FileStore>,
    dir: TempDir,
}

impl TempFileStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::open(dir.path()).expect("Failed to open file store");
        Self {
            store: Arc::new(store),
            dir,
        }
    }

    /// Returns the store.
    pub fn store(&self) -> Arc<FileStore> {
        Arc::clone(&self.store)
    }

    /// Opens the same directory again, as a restarted process would.
    pub fn reopen(&self) -> Arc<FileStore> {
        Arc::new(FileStore::open(self.dir.path()).expect("Failed to reopen file store"))
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl Default for TempFileStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test with a temporary file store.
///
/// # Example
///
/// ```rust,ignore
/// use tillsync_testkit::with_temp_store;
///
/// #[test]
/// fn my_test() {
///     with_temp_store(|store| {
///         store.store("offline_queue", b"[]").unwrap();
///     });
/// }
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(Arc<FileStore>) -> R,
{
    let temp = TempFileStore::new();
    f(temp.store())
}
