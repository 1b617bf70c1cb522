//! Durable operation queue.
//!
//! Local mutations wait here until the remote store confirms them. The queue
//! is held in memory and mirrored to a single durable slot after every
//! mutation; on construction it is reloaded from that slot.
//!
//! ## Ordering
//!
//! Operations are processed by priority (highest first), then by enqueue
//! time. An operation is never attempted while one of its dependencies is
//! still queued, so a dependency is always confirmed before its dependents.
//!
//! A dependency that exhausts its retry budget stays in the queue and blocks
//! its dependents until it is retried or removed.

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::connectivity::Connectivity;
use crate::error::{SyncError, SyncResult};
use crate::flight::FlightGuard;
use crate::listeners::{Listeners, Subscription};
use crate::transport::OperationTransport;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tillsync_protocol::{
    decode_operations, encode_operations, queue_order, OperationId, OperationInput,
    QueueStats, QueuedOperation, RemoteRequest,
};
use tillsync_storage::KeyValueStore;

/// Outcome of one [`OperationQueue::process_queue`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Operations sent to the transport.
    pub attempted: usize,
    /// Operations confirmed and removed.
    pub succeeded: usize,
    /// Operations whose attempt failed.
    pub failed: usize,
    /// Operations passed over as failed or blocked by a dependency.
    pub skipped: usize,
    /// True if the pass did not run (or stopped) because the device is offline.
    pub skipped_offline: bool,
    /// True if another pass was already running.
    pub already_running: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    operations: Vec<QueuedOperation>,
    completed: usize,
}

impl QueueState {
    fn stats(&self) -> QueueStats {
        let failed = self.operations.iter().filter(|op| op.is_failed()).count();
        QueueStats {
            total_operations: self.operations.len(),
            pending_operations: self.operations.len() - failed,
            failed_operations: failed,
            completed_operations: self.completed,
        }
    }

    fn contains(&self, id: &OperationId) -> bool {
        self.operations.iter().any(|op| &op.id == id)
    }

    fn remove(&mut self, id: &OperationId) -> bool {
        let before = self.operations.len();
        self.operations.retain(|op| &op.id != id);
        self.operations.len() != before
    }
}

/// Priority-ordered, dependency-aware buffer of unconfirmed mutations.
pub struct OperationQueue {
    storage: Arc<dyn KeyValueStore>,
    connectivity: Arc<dyn Connectivity>,
    transport: Arc<dyn OperationTransport>,
    clock: Arc<dyn Clock>,
    key: String,
    request_timeout: Duration,
    state: RwLock<QueueState>,
    persist_lock: Mutex<()>,
    processing: AtomicBool,
    listeners: Listeners<QueueStats>,
}

impl OperationQueue {
    /// Creates a queue and reloads it from `config.queue_key`.
    ///
    /// A missing slot yields an empty queue. An unreadable or corrupt slot is
    /// logged and also yields an empty queue.
    pub fn new(
        config: &SyncConfig,
        storage: Arc<dyn KeyValueStore>,
        connectivity: Arc<dyn Connectivity>,
        transport: Arc<dyn OperationTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let operations = Self::load(storage.as_ref(), &config.queue_key);
        if !operations.is_empty() {
            tracing::info!(count = operations.len(), "restored queued operations");
        }

        Self {
            storage,
            connectivity,
            transport,
            clock,
            key: config.queue_key.clone(),
            request_timeout: config.request_timeout,
            state: RwLock::new(QueueState {
                operations,
                completed: 0,
            }),
            persist_lock: Mutex::new(()),
            processing: AtomicBool::new(false),
            listeners: Listeners::new(),
        }
    }

    fn load(storage: &dyn KeyValueStore, key: &str) -> Vec<QueuedOperation> {
        match storage.load(key) {
            Ok(Some(bytes)) => match decode_operations(&bytes) {
                Ok(operations) => operations,
                Err(e) => {
                    tracing::warn!(key, error = %e, "discarding unreadable operation queue");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to load operation queue");
                Vec::new()
            }
        }
    }

    /// Adds an operation and returns its id.
    pub fn enqueue(&self, input: OperationInput) -> OperationId {
        let operation = QueuedOperation::from_input(input, OperationId::generate(), self.clock.now());
        let id = operation.id.clone();
        tracing::debug!(
            %id,
            op_type = %operation.op_type,
            table = %operation.table_name,
            priority = operation.priority,
            "enqueued operation"
        );

        self.state.write().operations.push(operation);
        self.changed();
        id
    }

    /// Removes an operation. Returns false if it was not queued.
    pub fn dequeue(&self, id: &OperationId) -> bool {
        let removed = self.state.write().remove(id);
        if removed {
            tracing::debug!(%id, "dequeued operation");
            self.changed();
        }
        removed
    }

    /// Returns a queued operation.
    pub fn get_operation(&self, id: &OperationId) -> Option<QueuedOperation> {
        self.state
            .read()
            .operations
            .iter()
            .find(|op| &op.id == id)
            .cloned()
    }

    /// Returns all operations in processing order.
    pub fn get_all_operations(&self) -> Vec<QueuedOperation> {
        let mut operations = self.state.read().operations.clone();
        operations.sort_by(queue_order);
        operations
    }

    /// Returns queue counters.
    pub fn get_stats(&self) -> QueueStats {
        self.state.read().stats()
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.state.read().operations.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of operations still eligible for processing.
    pub fn pending_count(&self) -> usize {
        self.get_stats().pending_operations
    }

    /// Returns true while a drain pass is running.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Sends queued operations to the remote store, one at a time.
    ///
    /// Does nothing while offline or while another pass is running. Failed
    /// operations and operations with queued dependencies are skipped. A
    /// failed attempt counts against the operation's retry budget and is not
    /// retried within the same pass.
    pub async fn process_queue(&self) -> DrainReport {
        let mut report = DrainReport::default();

        if !self.connectivity.is_online() {
            tracing::debug!("offline; queue drain skipped");
            report.skipped_offline = true;
            return report;
        }

        let Some(_guard) = FlightGuard::try_acquire(&self.processing) else {
            tracing::debug!("queue drain already running");
            report.already_running = true;
            return report;
        };

        self.state.write().completed = 0;

        for candidate in self.get_all_operations() {
            if !self.connectivity.is_online() {
                tracing::info!("connectivity lost; stopping queue drain");
                report.skipped_offline = true;
                break;
            }

            let Some(operation) = self.eligible(&candidate.id) else {
                report.skipped += 1;
                continue;
            };

            report.attempted += 1;
            match self.attempt(&operation).await {
                Ok(()) => {
                    report.succeeded += 1;
                    self.complete(&operation.id);
                }
                Err(e) => {
                    report.failed += 1;
                    self.fail(&operation.id, &e);
                }
            }
        }

        tracing::info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            "queue drain finished"
        );
        report
    }

    /// Returns the operation if it is still queued, not failed and has no
    /// queued dependencies.
    fn eligible(&self, id: &OperationId) -> Option<QueuedOperation> {
        let state = self.state.read();
        let operation = state.operations.iter().find(|op| &op.id == id)?;

        if operation.is_failed() {
            return None;
        }
        if let Some(blocker) = operation.dependencies.iter().find(|dep| state.contains(dep)) {
            tracing::debug!(%id, %blocker, "operation waits for dependency");
            return None;
        }
        Some(operation.clone())
    }

    async fn attempt(&self, operation: &QueuedOperation) -> SyncResult<()> {
        let request = RemoteRequest::for_operation(operation)?;
        tokio::time::timeout(self.request_timeout, self.transport.send(&request))
            .await
            .map_err(|_| SyncError::Timeout)?
    }

    fn complete(&self, id: &OperationId) {
        {
            let mut state = self.state.write();
            if state.remove(id) {
                state.completed += 1;
            }
        }
        tracing::debug!(%id, "operation confirmed");
        self.changed();
    }

    fn fail(&self, id: &OperationId, error: &SyncError) {
        let outcome = {
            let mut state = self.state.write();
            state
                .operations
                .iter_mut()
                .find(|op| &op.id == id)
                .map(|op| (op.record_failure(), op.retry_count, op.max_retries))
        };

        if let Some((exhausted, retry_count, max_retries)) = outcome {
            if exhausted {
                tracing::warn!(%id, retry_count, error = %error, "operation failed permanently");
            } else {
                tracing::warn!(%id, retry_count, max_retries, error = %error, "operation attempt failed");
            }
            self.changed();
        }
    }

    /// Gives every failed operation a fresh retry budget. Returns how many
    /// operations were reset.
    pub fn retry_failed(&self) -> usize {
        let reset = {
            let mut state = self.state.write();
            let mut reset = 0;
            for operation in state.operations.iter_mut().filter(|op| op.is_failed()) {
                operation.retry_count = 0;
                reset += 1;
            }
            reset
        };

        if reset > 0 {
            tracing::info!(count = reset, "reset failed operations");
            self.changed();
        }
        reset
    }

    /// Removes every operation and the durable slot.
    pub fn clear(&self) {
        {
            let mut state = self.state.write();
            state.operations.clear();
            state.completed = 0;
        }

        {
            let _persist = self.persist_lock.lock();
            if let Err(e) = self.storage.remove(&self.key) {
                tracing::warn!(key = %self.key, error = %e, "failed to remove operation queue");
            }
        }
        tracing::info!("operation queue cleared");
        self.notify();
    }

    /// Registers a listener called with fresh stats after every change.
    pub fn subscribe(&self, listener: impl Fn(&QueueStats) + Send + Sync + 'static) -> Subscription {
        self.listeners.subscribe(listener)
    }

    fn changed(&self) {
        self.persist();
        self.notify();
    }

    /// Mirrors the current contents to durable storage. Failures are logged;
    /// the in-memory queue stays authoritative.
    fn persist(&self) {
        let _persist = self.persist_lock.lock();
        let encoded = encode_operations(&self.state.read().operations);
        let result = match encoded {
            Ok(bytes) => self.storage.store(&self.key, &bytes).map_err(SyncError::from),
            Err(e) => Err(SyncError::from(e)),
        };
        if let Err(e) = result {
            tracing::warn!(key = %self.key, error = %e, "failed to persist operation queue");
        }
    }

    fn notify(&self) {
        let stats = self.get_stats();
        self.listeners.notify(&stats);
    }
}

impl std::fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationQueue")
            .field("key", &self.key)
            .field("stats", &self.get_stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::connectivity::ManualConnectivity;
    use crate::transport::MockTransport;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use serde_json::json;
    use tillsync_storage::InMemoryStore;

    struct Fixture {
        storage: Arc<InMemoryStore>,
        connectivity: Arc<ManualConnectivity>,
        transport: Arc<MockTransport>,
        clock: Arc<ManualClock>,
        queue: OperationQueue,
    }

    fn fixture_with(storage: Arc<InMemoryStore>) -> Fixture {
        let connectivity = Arc::new(ManualConnectivity::online());
        let transport = Arc::new(MockTransport::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap(),
        ));
        let queue = OperationQueue::new(
            &SyncConfig::default(),
            storage.clone(),
            connectivity.clone(),
            transport.clone(),
            clock.clone(),
        );
        Fixture {
            storage,
            connectivity,
            transport,
            clock,
            queue,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(InMemoryStore::new()))
    }

    #[test]
    fn enqueue_assigns_defaults_and_persists() {
        let f = fixture();
        let id = f
            .queue
            .enqueue(OperationInput::create("products", json!({"name": "Tea"})));

        let op = f.queue.get_operation(&id).unwrap();
        assert_eq!(op.retry_count, 0);
        assert_eq!(op.timestamp, f.clock.now());

        let persisted = decode_operations(&f.storage.slot("offline_queue").unwrap()).unwrap();
        assert_eq!(persisted, vec![op]);
    }

    #[test]
    fn higher_priority_comes_first() {
        let f = fixture();
        let low = f
            .queue
            .enqueue(OperationInput::create("orders", json!({})).with_priority(1));
        f.clock.advance(ChronoDuration::seconds(1));
        let high = f
            .queue
            .enqueue(OperationInput::create("orders", json!({})).with_priority(5));

        let ids: Vec<_> = f.queue.get_all_operations().into_iter().map(|op| op.id).collect();
        assert_eq!(ids, vec![high, low]);
    }

    #[test]
    fn equal_priority_is_fifo() {
        let f = fixture();
        let first = f.queue.enqueue(OperationInput::create("orders", json!({})));
        let second = f.queue.enqueue(OperationInput::create("orders", json!({})));
        f.clock.advance(ChronoDuration::seconds(1));
        let third = f.queue.enqueue(OperationInput::create("orders", json!({})));

        let ids: Vec<_> = f.queue.get_all_operations().into_iter().map(|op| op.id).collect();
        assert_eq!(ids, vec![first, second, third]);
    }

    #[test]
    fn dequeue_unknown_id_changes_nothing() {
        let f = fixture();
        f.queue.enqueue(OperationInput::create("orders", json!({})));
        let before = f.queue.get_stats();

        let notified = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&notified);
        let _sub = f.queue.subscribe(move |_| *sink.lock() += 1);

        assert!(!f.queue.dequeue(&OperationId::from("missing")));
        assert_eq!(f.queue.get_stats(), before);
        assert_eq!(*notified.lock(), 0);
    }

    #[tokio::test]
    async fn dependent_waits_for_failed_dependency() {
        let f = fixture();
        f.transport.fail_path("/api/customers", true);

        let a = f
            .queue
            .enqueue(OperationInput::create("customers", json!({"name": "Ada"})));
        let b = f.queue.enqueue(
            OperationInput::create("orders", json!({"customer": "Ada"})).with_dependency(a.clone()),
        );

        let report = f.queue.process_queue().await;

        assert_eq!(f.transport.call_count(), 1);
        assert_eq!(f.transport.requests()[0].path, "/api/customers");
        assert_eq!(report.attempted, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert!(f.queue.get_operation(&a).is_some());
        assert!(f.queue.get_operation(&b).is_some());
        assert_eq!(f.queue.get_operation(&a).unwrap().retry_count, 1);
    }

    #[tokio::test]
    async fn dependency_confirmed_before_dependent_in_same_pass() {
        let f = fixture();
        let a = f.queue.enqueue(OperationInput::create("customers", json!({})));
        // Higher priority, but must still wait for its dependency.
        f.queue.enqueue(
            OperationInput::create("orders", json!({}))
                .with_priority(10)
                .with_dependency(a),
        );

        let report = f.queue.process_queue().await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.skipped, 1);

        let report = f.queue.process_queue().await;
        assert_eq!(report.succeeded, 1);
        assert!(f.queue.is_empty());

        let paths: Vec<_> = f.transport.requests().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["/api/customers", "/api/orders"]);
    }

    #[tokio::test]
    async fn success_dequeues_and_counts_completed() {
        let f = fixture();
        f.queue
            .enqueue(OperationInput::update("products", json!({"id": "p1", "price": 4})));
        f.queue
            .enqueue(OperationInput::delete("products", json!({"id": "p2"})));

        let report = f.queue.process_queue().await;
        assert_eq!(report.succeeded, 2);

        let stats = f.queue.get_stats();
        assert_eq!(stats.total_operations, 0);
        assert_eq!(stats.completed_operations, 2);
        assert_eq!(decode_operations(&f.storage.slot("offline_queue").unwrap()).unwrap(), vec![]);
    }

    #[tokio::test]
    async fn offline_drain_is_a_noop() {
        let f = fixture();
        f.connectivity.set_online(false);
        f.queue.enqueue(OperationInput::create("orders", json!({})));

        let report = f.queue.process_queue().await;
        assert!(report.skipped_offline);
        assert_eq!(f.transport.call_count(), 0);
        assert_eq!(f.queue.len(), 1);
    }

    #[tokio::test]
    async fn exhausted_operations_are_failed_until_retried() {
        let f = fixture();
        f.transport.fail_all(true);
        let id = f.queue.enqueue(OperationInput::create("orders", json!({})).with_max_retries(2));

        f.queue.process_queue().await;
        assert_eq!(f.queue.get_stats().failed_operations, 0);
        f.queue.process_queue().await;

        let stats = f.queue.get_stats();
        assert_eq!(stats.failed_operations, 1);
        assert_eq!(stats.pending_operations, 0);

        let report = f.queue.process_queue().await;
        assert_eq!(report.attempted, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(f.transport.call_count(), 2);

        assert_eq!(f.queue.retry_failed(), 1);
        assert_eq!(f.queue.get_operation(&id).unwrap().retry_count, 0);
        assert_eq!(f.queue.get_stats().pending_operations, 1);
        assert_eq!(f.queue.retry_failed(), 0);
    }

    #[tokio::test]
    async fn update_without_id_is_a_failed_attempt() {
        let f = fixture();
        let id = f.queue.enqueue(OperationInput::update("products", json!({"price": 1})));

        let report = f.queue.process_queue().await;
        assert_eq!(report.failed, 1);
        assert_eq!(f.transport.call_count(), 0);
        assert_eq!(f.queue.get_operation(&id).unwrap().retry_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_transport_times_out() {
        let storage = Arc::new(InMemoryStore::new());
        let connectivity = Arc::new(ManualConnectivity::online());
        let transport = Arc::new(MockTransport::new());
        transport.set_delay(Duration::from_secs(60));
        let queue = OperationQueue::new(
            &SyncConfig::default().with_request_timeout(Duration::from_secs(1)),
            storage,
            connectivity,
            transport,
            Arc::new(ManualClock::new(Utc::now())),
        );

        let id = queue.enqueue(OperationInput::create("orders", json!({})));
        let report = queue.process_queue().await;

        assert_eq!(report.failed, 1);
        assert_eq!(queue.get_operation(&id).unwrap().retry_count, 1);
    }

    #[tokio::test]
    async fn concurrent_drain_is_rejected() {
        let storage = Arc::new(InMemoryStore::new());
        let transport = Arc::new(MockTransport::new());
        transport.set_delay(Duration::from_millis(10));
        let queue = OperationQueue::new(
            &SyncConfig::default(),
            storage,
            Arc::new(ManualConnectivity::online()),
            transport.clone(),
            Arc::new(ManualClock::new(Utc::now())),
        );
        queue.enqueue(OperationInput::create("orders", json!({})));

        let (first, second) = tokio::join!(queue.process_queue(), queue.process_queue());
        assert_eq!(first.succeeded, 1);
        assert!(second.already_running);
        assert_eq!(transport.call_count(), 1);
        assert!(!queue.is_processing());
    }

    #[test]
    fn queue_survives_reload() {
        let storage = Arc::new(InMemoryStore::new());
        let id = {
            let f = fixture_with(storage.clone());
            f.queue
                .enqueue(OperationInput::create("orders", json!({"total": 9})).with_priority(2))
        };

        let f = fixture_with(storage);
        let op = f.queue.get_operation(&id).unwrap();
        assert_eq!(op.priority, 2);
        assert_eq!(op.data, json!({"total": 9}));
    }

    #[test]
    fn corrupt_slot_yields_empty_queue() {
        let storage = Arc::new(InMemoryStore::with_slot("offline_queue", b"{not json".to_vec()));
        let f = fixture_with(storage);
        assert!(f.queue.is_empty());
    }

    #[test]
    fn failing_save_keeps_mutation() {
        let f = fixture();
        f.storage.fail_writes(true);

        let id = f.queue.enqueue(OperationInput::create("orders", json!({})));
        assert!(f.queue.get_operation(&id).is_some());
        assert!(f.storage.slot("offline_queue").is_none());
    }

    #[test]
    fn clear_empties_queue_and_slot() {
        let f = fixture();
        f.queue.enqueue(OperationInput::create("orders", json!({})));
        f.queue.clear();

        assert!(f.queue.is_empty());
        assert_eq!(f.queue.get_stats(), QueueStats::default());
        assert!(f.storage.slot("offline_queue").is_none());
    }

    #[test]
    fn listeners_see_every_change() {
        let f = fixture();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = f.queue.subscribe(move |stats| sink.lock().push(stats.total_operations));
        let _bad = f.queue.subscribe(|_| panic!("listener bug"));

        let id = f.queue.enqueue(OperationInput::create("orders", json!({})));
        f.queue.enqueue(OperationInput::create("orders", json!({})));
        f.queue.dequeue(&id);
        f.queue.clear();

        assert_eq!(*seen.lock(), vec![1, 2, 1, 0]);
    }
}
