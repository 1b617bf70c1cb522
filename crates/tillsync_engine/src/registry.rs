//! Per-table sync status registry.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tillsync_protocol::SyncStatus;
use tillsync_storage::KeyValueStore;

/// Remembers when each table was last reconciled and how many conflicts it
/// produced.
///
/// Entries are mirrored as a JSON map to a durable slot after every change.
pub struct SyncStatusRegistry {
    storage: Arc<dyn KeyValueStore>,
    key: String,
    statuses: RwLock<BTreeMap<String, SyncStatus>>,
    persist_lock: Mutex<()>,
}

impl SyncStatusRegistry {
    /// Creates a registry and reloads it from `key`.
    ///
    /// Unreadable slots are logged and the registry starts empty.
    pub fn new(storage: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let statuses = match storage.load(&key) {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(%key, error = %e, "discarding unreadable sync status");
                BTreeMap::new()
            }),
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(%key, error = %e, "failed to load sync status");
                BTreeMap::new()
            }
        };

        Self {
            storage,
            key,
            statuses: RwLock::new(statuses),
            persist_lock: Mutex::new(()),
        }
    }

    /// Returns the status of `table`, if it was ever recorded.
    pub fn get(&self, table: &str) -> Option<SyncStatus> {
        self.statuses.read().get(table).cloned()
    }

    /// Returns all statuses ordered by table name.
    pub fn all(&self) -> Vec<SyncStatus> {
        self.statuses.read().values().cloned().collect()
    }

    /// Records progress for `table`.
    ///
    /// `last_sync_at` replaces the stored instant when given; `conflict_delta`
    /// is added to the conflict counter.
    pub fn update(
        &self,
        table: &str,
        last_sync_at: Option<DateTime<Utc>>,
        conflict_delta: u64,
    ) -> SyncStatus {
        let status = self.modify(table, |status| {
            if last_sync_at.is_some() {
                status.last_sync_at = last_sync_at;
            }
            status.conflict_count = status.conflict_count.saturating_add(conflict_delta);
        });
        tracing::debug!(
            table,
            last_sync_at = ?status.last_sync_at,
            conflicts = status.conflict_count,
            "sync status updated"
        );
        status
    }

    /// Adds one to the conflict counter of `table`. Returns the new count.
    pub fn increment_conflict_count(&self, table: &str) -> u64 {
        self.modify(table, |status| {
            status.conflict_count = status.conflict_count.saturating_add(1);
        })
        .conflict_count
    }

    /// Forgets progress for `table` so the next pass fetches every row.
    pub fn reset(&self, table: &str) -> SyncStatus {
        tracing::info!(table, "sync status reset");
        self.modify(table, |status| {
            status.last_sync_at = None;
            status.conflict_count = 0;
        })
    }

    fn modify(&self, table: &str, change: impl FnOnce(&mut SyncStatus)) -> SyncStatus {
        let status = {
            let mut statuses = self.statuses.write();
            let status = statuses
                .entry(table.to_string())
                .or_insert_with(|| SyncStatus::new(table));
            change(status);
            status.clone()
        };
        self.persist();
        status
    }

    fn persist(&self) {
        let _persist = self.persist_lock.lock();
        let encoded = serde_json::to_vec(&*self.statuses.read());
        let result = match encoded {
            Ok(bytes) => self.storage.store(&self.key, &bytes).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(error) = result {
            tracing::warn!(key = %self.key, %error, "failed to persist sync status");
        }
    }
}

impl std::fmt::Debug for SyncStatusRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncStatusRegistry")
            .field("key", &self.key)
            .field("tables", &self.statuses.read().len())
            .finish()
    }
}
