//! Sync orchestrator.
//!
//! Drives a full sync: drain the operation queue, then reconcile every
//! configured table between the local and the remote record store.
//!
//! ## State machine
//!
//! ```text
//! Idle ──perform_full_sync / sync_to_cloud──▶ Syncing ──done──▶ Idle
//! ```
//!
//! At most one sync runs at a time. A request made while syncing is refused
//! with [`SyncReport::IN_PROGRESS`] and leaves the running sync untouched.

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::connectivity::Connectivity;
use crate::error::{SyncError, SyncResult};
use crate::flight::FlightGuard;
use crate::listeners::{call_guarded, Listeners, Subscription};
use crate::queue::OperationQueue;
use crate::registry::SyncStatusRegistry;
use crate::store::RecordStore;
use crate::transport::OperationTransport;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tillsync_protocol::{
    ConflictResolution, OperationId, OperationInput, OperationType, Record, SyncReport,
    SyncSnapshot, SyncStatus,
};
use tillsync_storage::KeyValueStore;

/// The current state of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No sync is running.
    Idle,
    /// A sync is running.
    Syncing,
}

impl SyncState {
    /// Returns true if a sync is running.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Syncing)
    }

    /// Returns true if a new sync may start.
    pub fn can_start_sync(&self) -> bool {
        matches!(self, SyncState::Idle)
    }
}

/// Collaborators the orchestrator is composed from.
#[derive(Clone)]
pub struct SyncServices {
    /// Durable slots for the queue and the status registry.
    pub storage: Arc<dyn KeyValueStore>,
    /// Network reachability.
    pub connectivity: Arc<dyn Connectivity>,
    /// Delivery of queued operations.
    pub transport: Arc<dyn OperationTransport>,
    /// The on-device database.
    pub local: Arc<dyn RecordStore>,
    /// The cloud database.
    pub remote: Arc<dyn RecordStore>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}

/// What happened to one row during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowOutcome {
    Unchanged,
    Pulled,
    Pushed,
    Conflict(ConflictResolution),
}

/// State visible to status subscribers.
struct Shared {
    syncing: AtomicBool,
    queue: Arc<OperationQueue>,
    connectivity: Arc<dyn Connectivity>,
    last_sync_at: RwLock<Option<DateTime<Utc>>>,
    last_errors: RwLock<Vec<String>>,
    listeners: Listeners<SyncSnapshot>,
}

impl Shared {
    fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            is_online: self.connectivity.is_online(),
            is_syncing: self.syncing.load(Ordering::Acquire),
            last_sync_at: *self.last_sync_at.read(),
            pending_operations: self.queue.pending_count(),
            errors: self.last_errors.read().clone(),
        }
    }

    fn publish(&self) {
        if !self.listeners.is_empty() {
            self.listeners.notify(&self.snapshot());
        }
    }
}

/// Coordinates queue draining and table reconciliation.
pub struct SyncOrchestrator {
    config: SyncConfig,
    shared: Arc<Shared>,
    registry: SyncStatusRegistry,
    local: Arc<dyn RecordStore>,
    remote: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    _bridges: Vec<Subscription>,
}

impl SyncOrchestrator {
    /// Composes an orchestrator and its operation queue.
    pub fn new(config: SyncConfig, services: SyncServices) -> Self {
        let queue = Arc::new(OperationQueue::new(
            &config,
            Arc::clone(&services.storage),
            Arc::clone(&services.connectivity),
            services.transport,
            Arc::clone(&services.clock),
        ));
        let registry = SyncStatusRegistry::new(services.storage, config.status_key.clone());

        let shared = Arc::new(Shared {
            syncing: AtomicBool::new(false),
            queue: Arc::clone(&queue),
            connectivity: Arc::clone(&services.connectivity),
            last_sync_at: RwLock::new(None),
            last_errors: RwLock::new(Vec::new()),
            listeners: Listeners::new(),
        });

        let weak = Arc::downgrade(&shared);
        let queue_bridge = queue.subscribe(move |_| republish(&weak));
        let weak = Arc::downgrade(&shared);
        let connectivity_bridge = services
            .connectivity
            .subscribe(Box::new(move |_| republish(&weak)));

        Self {
            config,
            shared,
            registry,
            local: services.local,
            remote: services.remote,
            clock: services.clock,
            _bridges: vec![queue_bridge, connectivity_bridge],
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the operation queue.
    pub fn queue(&self) -> &Arc<OperationQueue> {
        &self.shared.queue
    }

    /// Returns the connectivity source.
    pub fn connectivity(&self) -> &Arc<dyn Connectivity> {
        &self.shared.connectivity
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        if self.is_syncing() {
            SyncState::Syncing
        } else {
            SyncState::Idle
        }
    }

    /// Returns true while a sync is running.
    pub fn is_syncing(&self) -> bool {
        self.shared.syncing.load(Ordering::Acquire)
    }

    /// Returns what status subscribers currently see.
    pub fn snapshot(&self) -> SyncSnapshot {
        self.shared.snapshot()
    }

    /// Runs a full sync: drain the queue, then reconcile every table.
    ///
    /// Per-table failures are collected, prefixed with the table name, and
    /// never abort the remaining tables.
    pub async fn perform_full_sync(&self) -> SyncReport {
        let Some(guard) = FlightGuard::try_acquire(&self.shared.syncing) else {
            tracing::debug!("full sync refused; another sync is running");
            return SyncReport::in_progress();
        };
        if !self.shared.connectivity.is_online() {
            tracing::debug!("full sync skipped; offline");
            return SyncReport::offline();
        }

        tracing::info!(tables = self.config.tables.len(), "full sync started");
        self.shared.publish();

        let drain = self.shared.queue.process_queue().await;
        tracing::debug!(?drain, "queue drained");

        let mut errors = Vec::new();
        for table in &self.config.tables {
            if !self.shared.connectivity.is_online() {
                errors.push(format!("{table}: {}", SyncReport::OFFLINE));
                continue;
            }
            self.sync_table(table, &mut errors).await;
        }

        *self.shared.last_sync_at.write() = Some(self.clock.now());
        *self.shared.last_errors.write() = errors.clone();
        drop(guard);

        if errors.is_empty() {
            tracing::info!("full sync finished");
        } else {
            tracing::warn!(errors = errors.len(), "full sync finished with errors");
        }
        self.shared.publish();
        SyncReport::from_errors(errors)
    }

    /// Runs one store call, giving up after the configured request timeout.
    async fn bounded<T>(&self, call: impl Future<Output = SyncResult<T>>) -> SyncResult<T> {
        tokio::time::timeout(self.config.request_timeout, call)
            .await
            .map_err(|_| SyncError::Timeout)?
    }

    /// Reconciles one table. Errors are appended to `errors`.
    ///
    /// `lastSyncAt` is taken before the fetch, so rows written while the pass
    /// runs are picked up by the next one.
    async fn sync_table(&self, table: &str, errors: &mut Vec<String>) {
        let since = self.registry.get(table).and_then(|status| status.last_sync_at);
        let started_at = self.clock.now();

        let fetched = async {
            let remote = self
                .bounded(self.remote.select_modified_since(table, since))
                .await?;
            let local = self
                .bounded(self.local.select_modified_since(table, since))
                .await?;
            Ok::<_, SyncError>((local, remote))
        }
        .await;
        let (local_rows, remote_rows) = match fetched {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(table, error = %e, "failed to fetch changes");
                errors.push(format!("{table}: {e}"));
                return;
            }
        };

        let local_by_id = index_by_id(local_rows);
        let remote_by_id = index_by_id(remote_rows);
        let ids: BTreeSet<&String> = local_by_id.keys().chain(remote_by_id.keys()).collect();

        let (mut pulled, mut pushed, mut conflicts) = (0usize, 0usize, 0usize);
        for id in ids {
            let outcome = self
                .reconcile_row(table, id, local_by_id.get(id), remote_by_id.get(id))
                .await;
            match outcome {
                Ok(RowOutcome::Unchanged) => {}
                Ok(RowOutcome::Pulled) => pulled += 1,
                Ok(RowOutcome::Pushed) => pushed += 1,
                Ok(RowOutcome::Conflict(_)) => conflicts += 1,
                Err(e) => {
                    tracing::warn!(table, id = %id, error = %e, "row reconciliation failed");
                    errors.push(format!("{table}: {id}: {e}"));
                }
            }
        }

        self.registry.update(table, Some(started_at), 0);
        tracing::info!(table, pulled, pushed, conflicts, "table reconciled");
    }

    async fn reconcile_row(
        &self,
        table: &str,
        id: &str,
        local: Option<&Record>,
        remote: Option<&Record>,
    ) -> SyncResult<RowOutcome> {
        let local = match local {
            Some(record) => Some(record.clone()),
            None => self.bounded(self.local.select_by_id(table, id)).await?,
        };
        let remote = match remote {
            Some(record) => Some(record.clone()),
            None => self.bounded(self.remote.select_by_id(table, id)).await?,
        };

        match (local, remote) {
            (None, None) => Ok(RowOutcome::Unchanged),
            (None, Some(remote)) => {
                self.bounded(self.local.upsert(table, &remote)).await?;
                Ok(RowOutcome::Pulled)
            }
            (Some(local), None) => {
                self.bounded(self.remote.upsert(table, &local)).await?;
                Ok(RowOutcome::Pushed)
            }
            (Some(local), Some(remote)) => {
                if !self.detect_conflict(&local, &remote) {
                    return Ok(RowOutcome::Unchanged);
                }

                let resolution = ConflictResolution::last_writer_wins(&local, &remote);
                self.registry.increment_conflict_count(table);
                tracing::debug!(table, id, ?resolution, "conflict resolved");

                match resolution {
                    ConflictResolution::KeepLocal => {
                        self.bounded(self.remote.upsert(table, &local)).await?
                    }
                    ConflictResolution::AcceptRemote => {
                        self.bounded(self.local.upsert(table, &remote)).await?
                    }
                }
                Ok(RowOutcome::Conflict(resolution))
            }
        }
    }

    /// Pushes local changes to the remote store without pulling.
    ///
    /// Fails fast when the remote store does not answer. Does not advance
    /// `lastSyncAt`, so the next full sync still pulls remote changes.
    pub async fn sync_to_cloud(&self) -> SyncReport {
        let Some(guard) = FlightGuard::try_acquire(&self.shared.syncing) else {
            tracing::debug!("cloud push refused; another sync is running");
            return SyncReport::in_progress();
        };
        if !self.shared.connectivity.is_online() {
            return SyncReport::offline();
        }

        tracing::info!("cloud push started");
        self.shared.publish();

        let errors = match self.bounded(self.remote.probe()).await {
            Ok(()) => self.push_tables().await,
            Err(e) => {
                tracing::warn!(error = %e, "cloud store unreachable");
                vec![SyncReport::CLOUD_UNREACHABLE.to_string()]
            }
        };

        drop(guard);
        self.shared.publish();
        SyncReport::from_errors(errors)
    }

    async fn push_tables(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for table in &self.config.tables {
            let since = self.registry.get(table).and_then(|status| status.last_sync_at);
            let rows = match self
                .bounded(self.local.select_modified_since(table, since))
                .await
            {
                Ok(rows) => rows,
                Err(e) => {
                    errors.push(format!("{table}: {e}"));
                    continue;
                }
            };

            let mut pushed = 0usize;
            for record in &rows {
                match self.bounded(self.remote.upsert(table, record)).await {
                    Ok(()) => pushed += 1,
                    Err(e) => errors.push(format!("{table}: {}: {e}", record.id)),
                }
            }
            tracing::debug!(table = table.as_str(), pushed, "table pushed");
        }
        errors
    }

    /// Registers a listener for status snapshots.
    ///
    /// The listener is called once right away with the current snapshot, then
    /// on every sync state change, queue change and connectivity change.
    pub fn subscribe_sync_status(
        &self,
        listener: impl Fn(&SyncSnapshot) + Send + Sync + 'static,
    ) -> Subscription {
        call_guarded(&listener, &self.shared.snapshot());
        self.shared.listeners.subscribe(listener)
    }

    /// Queues a local mutation for delivery to the remote store.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownTable`] if `table` is not synchronized.
    pub fn queue_operation(
        &self,
        op_type: OperationType,
        table: &str,
        data: Value,
        priority: i32,
    ) -> SyncResult<OperationId> {
        self.queue_input(
            OperationInput::new(op_type, table, data)
                .with_priority(priority)
                .with_max_retries(self.config.max_retries),
        )
    }

    /// Queues a fully specified mutation, e.g. one with dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownTable`] if the table is not synchronized.
    pub fn queue_input(&self, input: OperationInput) -> SyncResult<OperationId> {
        if !self.config.has_table(&input.table_name) {
            return Err(SyncError::UnknownTable(input.table_name));
        }
        Ok(self.shared.queue.enqueue(input))
    }

    /// Returns true if the two versions of a row disagree on content.
    pub fn detect_conflict(&self, local: &Record, remote: &Record) -> bool {
        tillsync_protocol::detect_conflict(local, remote)
    }

    /// Returns the last-writer-wins winner of two versions of a row.
    pub fn resolve_conflict(&self, local: &Record, remote: &Record) -> Record {
        tillsync_protocol::resolve_conflict(local, remote)
    }

    /// Returns the sync status of a table.
    pub fn get_sync_status(&self, table: &str) -> Option<SyncStatus> {
        self.registry.get(table)
    }

    /// Returns every recorded sync status, ordered by table name.
    pub fn get_all_sync_statuses(&self) -> Vec<SyncStatus> {
        self.registry.all()
    }

    /// Records progress for a table.
    pub fn update_sync_status(
        &self,
        table: &str,
        last_sync_at: Option<DateTime<Utc>>,
        conflict_delta: u64,
    ) -> SyncStatus {
        self.registry.update(table, last_sync_at, conflict_delta)
    }

    /// Adds one to a table's conflict counter.
    pub fn increment_conflict_count(&self, table: &str) -> u64 {
        self.registry.increment_conflict_count(table)
    }

    /// Clears a table's progress so the next sync fetches every row.
    pub fn reset_sync_status(&self, table: &str) -> SyncStatus {
        self.registry.reset(table)
    }
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("state", &self.state())
            .field("tables", &self.config.tables)
            .finish_non_exhaustive()
    }
}

fn republish(shared: &Weak<Shared>) {
    if let Some(shared) = shared.upgrade() {
        shared.publish();
    }
}

fn index_by_id(records: Vec<Record>) -> BTreeMap<String, Record> {
    records
        .into_iter()
        .map(|record| (record.id.clone(), record))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::connectivity::ManualConnectivity;
    use crate::store::MemoryRecordStore;
    use crate::transport::MockTransport;
    use chrono::{Duration, TimeZone};
    use parking_lot::Mutex;
    use serde_json::json;
    use tillsync_storage::InMemoryStore;

    struct Fixture {
        connectivity: Arc<ManualConnectivity>,
        transport: Arc<MockTransport>,
        local: Arc<MemoryRecordStore>,
        remote: Arc<MemoryRecordStore>,
        clock: Arc<ManualClock>,
        orchestrator: SyncOrchestrator,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn fixture(tables: &[&str]) -> Fixture {
        let connectivity = Arc::new(ManualConnectivity::online());
        let transport = Arc::new(MockTransport::new());
        let local = Arc::new(MemoryRecordStore::new());
        let remote = Arc::new(MemoryRecordStore::new());
        let clock = Arc::new(ManualClock::new(t0() + Duration::days(1)));
        let orchestrator = SyncOrchestrator::new(
            SyncConfig::new(tables.iter().copied()),
            SyncServices {
                storage: Arc::new(InMemoryStore::new()),
                connectivity: connectivity.clone(),
                transport: transport.clone(),
                local: local.clone(),
                remote: remote.clone(),
                clock: clock.clone(),
            },
        );
        Fixture {
            connectivity,
            transport,
            local,
            remote,
            clock,
            orchestrator,
        }
    }

    #[tokio::test]
    async fn offline_sync_is_refused() {
        let f = fixture(&["products"]);
        f.connectivity.set_online(false);
        f.orchestrator
            .queue_operation(OperationType::Create, "products", json!({"id": "1"}), 0)
            .unwrap();

        let report = f.orchestrator.perform_full_sync().await;
        assert_eq!(report, SyncReport::offline());
        assert_eq!(f.transport.call_count(), 0);
        assert_eq!(f.remote.read_count(), 0);
        assert_eq!(f.orchestrator.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn rows_flow_both_ways() {
        let f = fixture(&["products"]);
        f.local
            .insert("products", Record::new("local-only", t0()).with_field("name", "Muffin"));
        f.remote
            .insert("products", Record::new("remote-only", t0()).with_field("name", "Cookie"));

        let report = f.orchestrator.perform_full_sync().await;
        assert!(report.success, "{:?}", report.errors);

        assert!(f.remote.get("products", "local-only").is_some());
        assert!(f.local.get("products", "remote-only").is_some());

        let status = f.orchestrator.get_sync_status("products").unwrap();
        assert_eq!(status.last_sync_at, Some(f.clock.now()));
        assert_eq!(status.conflict_count, 0);
    }

    #[tokio::test]
    async fn conflict_takes_later_version() {
        let f = fixture(&["products"]);
        f.local
            .insert("products", Record::new("1", t0()).with_field("name", "Local"));
        f.remote.insert(
            "products",
            Record::new("1", t0() + Duration::hours(1)).with_field("name", "Cloud"),
        );

        assert!(f.orchestrator.perform_full_sync().await.success);

        assert_eq!(
            f.local.get("products", "1").unwrap().field("name"),
            Some(&json!("Cloud"))
        );
        assert_eq!(f.orchestrator.get_sync_status("products").unwrap().conflict_count, 1);
    }

    #[tokio::test]
    async fn identical_content_is_not_a_conflict() {
        let f = fixture(&["products"]);
        f.local
            .insert("products", Record::new("1", t0()).with_field("name", "Same"));
        f.remote.insert(
            "products",
            Record::new("1", t0() + Duration::hours(3)).with_field("name", "Same"),
        );

        f.orchestrator.perform_full_sync().await;
        assert_eq!(f.orchestrator.get_sync_status("products").unwrap().conflict_count, 0);
        assert_eq!(f.local.get("products", "1").unwrap().updated_at, t0());
    }

    #[tokio::test]
    async fn failing_table_does_not_stop_others() {
        let f = fixture(&["orders", "products"]);
        f.remote.fail_table("orders", true);
        f.remote
            .insert("products", Record::new("1", t0()).with_field("name", "Pie"));

        let report = f.orchestrator.perform_full_sync().await;
        assert!(!report.success);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("orders: "));

        assert!(f.local.get("products", "1").is_some());
        assert!(f.orchestrator.get_sync_status("orders").is_none());
        assert!(f.orchestrator.get_sync_status("products").is_some());
    }

    #[tokio::test]
    async fn overlapping_sync_is_rejected() {
        let f = fixture(&["products"]);
        f.remote.yield_on_read(true);

        let (first, second) = tokio::join!(
            f.orchestrator.perform_full_sync(),
            f.orchestrator.perform_full_sync()
        );
        assert!(first.success);
        assert!(second.is_rejected());
        assert_eq!(second.errors, vec![SyncReport::IN_PROGRESS]);
        assert!(!f.orchestrator.is_syncing());
    }

    #[tokio::test]
    async fn cloud_push_fails_fast_when_unreachable() {
        let f = fixture(&["products"]);
        f.local.insert("products", Record::new("1", t0()));
        f.remote.set_reachable(false);

        let report = f.orchestrator.sync_to_cloud().await;
        assert_eq!(report.errors, vec![SyncReport::CLOUD_UNREACHABLE]);
        assert_eq!(f.remote.write_count(), 0);
    }

    #[tokio::test]
    async fn cloud_push_leaves_last_sync_alone() {
        let f = fixture(&["products"]);
        f.local.insert("products", Record::new("1", t0()));

        let report = f.orchestrator.sync_to_cloud().await;
        assert!(report.success);
        assert!(f.remote.get("products", "1").is_some());
        assert!(f.orchestrator.get_sync_status("products").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_remote_times_out_and_frees_the_next_sync() {
        let f = fixture(&["products", "orders"]);
        f.remote.stall(true);

        let report = f.orchestrator.perform_full_sync().await;
        assert_eq!(
            report.errors,
            vec![
                "products: operation timed out".to_string(),
                "orders: operation timed out".to_string(),
            ]
        );
        assert!(!f.orchestrator.is_syncing());
        assert!(f.orchestrator.get_sync_status("products").is_none());

        f.remote.stall(false);
        f.remote.insert("products", Record::new("1", t0()));
        let report = f.orchestrator.perform_full_sync().await;
        assert!(report.success, "{:?}", report.errors);
        assert!(f.local.get("products", "1").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_row_lookup_is_reported_per_row() {
        let f = fixture(&["products"]);
        f.local.insert("products", Record::new("1", t0()));
        f.remote.after_fetch(|store| store.stall(true));

        let report = f.orchestrator.perform_full_sync().await;
        assert_eq!(report.errors, vec!["products: 1: operation timed out"]);
        assert!(!f.orchestrator.is_syncing());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_probe_means_cloud_unreachable() {
        let f = fixture(&["products"]);
        f.local.insert("products", Record::new("1", t0()));
        f.remote.stall(true);

        let report = f.orchestrator.sync_to_cloud().await;
        assert_eq!(report.errors, vec![SyncReport::CLOUD_UNREACHABLE]);
        assert!(!f.orchestrator.is_syncing());
    }

    #[tokio::test]
    async fn rows_written_during_a_pass_are_pulled_next_time() {
        let f = fixture(&["products"]);
        let clock = f.clock.clone();
        let written = AtomicBool::new(false);
        f.remote.after_fetch(move |store| {
            if !written.swap(true, Ordering::SeqCst) {
                store.insert(
                    "products",
                    Record::new("late", clock.now() + Duration::seconds(1))
                        .with_field("name", "Scone"),
                );
                clock.advance(Duration::seconds(2));
            }
        });

        let started = f.clock.now();
        assert!(f.orchestrator.perform_full_sync().await.success);
        assert!(f.local.get("products", "late").is_none());
        assert_eq!(
            f.orchestrator.get_sync_status("products").unwrap().last_sync_at,
            Some(started)
        );

        assert!(f.orchestrator.perform_full_sync().await.success);
        assert!(f.local.get("products", "late").is_some());
    }

    #[test]
    fn unknown_table_is_rejected() {
        let f = fixture(&["products"]);
        let err = f
            .orchestrator
            .queue_operation(OperationType::Create, "widgets", json!({}), 0)
            .unwrap_err();
        assert!(matches!(err, SyncError::UnknownTable(ref t) if t == "widgets"));
        assert!(f.orchestrator.queue().is_empty());
    }

    #[test]
    fn queued_operations_use_configured_retry_budget() {
        let f = fixture(&["orders"]);
        let id = f
            .orchestrator
            .queue_operation(OperationType::Update, "orders", json!({"id": "o1"}), 3)
            .unwrap();

        let op = f.orchestrator.queue().get_operation(&id).unwrap();
        assert_eq!(op.max_retries, 3);
        assert_eq!(op.priority, 3);
    }

    #[tokio::test]
    async fn status_subscribers_follow_state() {
        let f = fixture(&["products"]);
        let seen = Arc::new(Mutex::new(Vec::<SyncSnapshot>::new()));
        let sink = Arc::clone(&seen);
        let _sub = f
            .orchestrator
            .subscribe_sync_status(move |snapshot| sink.lock().push(snapshot.clone()));

        assert_eq!(seen.lock().len(), 1);
        assert!(!seen.lock()[0].is_syncing);

        f.orchestrator
            .queue_operation(OperationType::Create, "products", json!({"id": "9"}), 0)
            .unwrap();
        assert_eq!(seen.lock().last().unwrap().pending_operations, 1);

        f.orchestrator.perform_full_sync().await;
        let snapshots = seen.lock().clone();
        assert!(snapshots.iter().any(|s| s.is_syncing));
        let last = snapshots.last().unwrap();
        assert!(!last.is_syncing);
        assert_eq!(last.pending_operations, 0);
        assert_eq!(last.last_sync_at, Some(f.clock.now()));

        f.connectivity.set_online(false);
        assert!(!seen.lock().last().unwrap().is_online);
    }

    #[test]
    fn registry_pass_throughs() {
        let f = fixture(&["products"]);
        f.orchestrator.update_sync_status("products", Some(t0()), 2);
        assert_eq!(f.orchestrator.increment_conflict_count("products"), 3);
        assert_eq!(f.orchestrator.get_all_sync_statuses().len(), 1);

        let status = f.orchestrator.reset_sync_status("products");
        assert_eq!(status.last_sync_at, None);
        assert_eq!(status.conflict_count, 0);
    }
}
