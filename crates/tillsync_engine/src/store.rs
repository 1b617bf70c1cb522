//! Record stores.
//!
//! The orchestrator reconciles rows between two [`RecordStore`]s: the local
//! database on the device and the remote database in the cloud. Both sides
//! speak the same trait, so reconciliation is symmetric.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tillsync_protocol::Record;

/// A table-oriented row store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns rows of `table` with `updatedAt >= since`, or every row when
    /// `since` is `None`.
    async fn select_modified_since(
        &self,
        table: &str,
        since: Option<DateTime<Utc>>,
    ) -> SyncResult<Vec<Record>>;

    /// Returns one row by primary key.
    async fn select_by_id(&self, table: &str, id: &str) -> SyncResult<Option<Record>>;

    /// Inserts or replaces a row.
    async fn upsert(&self, table: &str, record: &Record) -> SyncResult<()>;

    /// Deletes a row. Returns false if it did not exist.
    async fn delete(&self, table: &str, id: &str) -> SyncResult<bool>;

    /// Checks that the store answers at all.
    async fn probe(&self) -> SyncResult<()> {
        Ok(())
    }
}

type Tables = BTreeMap<String, BTreeMap<String, Record>>;
type FetchHook = Box<dyn Fn(&MemoryRecordStore) + Send + Sync>;

/// An in-memory record store.
///
/// Rows are stored exactly as given; `updatedAt` is never rewritten. Failure
/// switches let tests make a single table or the whole store misbehave.
#[derive(Default)]
pub struct MemoryRecordStore {
    tables: RwLock<Tables>,
    failing_tables: RwLock<BTreeSet<String>>,
    unreachable: AtomicBool,
    yield_on_read: AtomicBool,
    stalled: AtomicBool,
    after_fetch: RwLock<Option<FetchHook>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a row directly, bypassing failure switches and counters.
    pub fn insert(&self, table: &str, record: Record) {
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .insert(record.id.clone(), record);
    }

    /// Returns a row directly.
    pub fn get(&self, table: &str, id: &str) -> Option<Record> {
        self.tables.read().get(table).and_then(|rows| rows.get(id).cloned())
    }

    /// Returns all rows of a table ordered by id.
    pub fn records(&self, table: &str) -> Vec<Record> {
        self.tables
            .read()
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Makes every call touching `table` fail (or succeed again).
    pub fn fail_table(&self, table: &str, fail: bool) {
        let mut failing = self.failing_tables.write();
        if fail {
            failing.insert(table.to_string());
        } else {
            failing.remove(table);
        }
    }

    /// Makes every call fail with [`SyncError::NotConnected`] while false.
    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    /// Yields to the runtime at the start of each read.
    ///
    /// Lets single-threaded tests interleave two syncs at a real suspension
    /// point.
    pub fn yield_on_read(&self, enabled: bool) {
        self.yield_on_read.store(enabled, Ordering::SeqCst);
    }

    /// Makes every call hang forever (or answer again).
    pub fn stall(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    /// Runs `hook` after every `select_modified_since` has collected its rows.
    ///
    /// Stands in for a concurrent writer touching the store mid-sync.
    pub fn after_fetch(&self, hook: impl Fn(&MemoryRecordStore) + Send + Sync + 'static) {
        *self.after_fetch.write() = Some(Box::new(hook));
    }

    /// Number of read calls served through the trait.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of write calls served through the trait.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(&self, table: &str) -> SyncResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SyncError::NotConnected);
        }
        if self.failing_tables.read().contains(table) {
            return Err(SyncError::store(format!("table {table} is unavailable")));
        }
        Ok(())
    }

    async fn wait_if_stalled(&self) {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }

    async fn before_read(&self, table: &str) -> SyncResult<()> {
        self.wait_if_stalled().await;
        if self.yield_on_read.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check(table)
    }

    async fn before_write(&self, table: &str) -> SyncResult<()> {
        self.wait_if_stalled().await;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check(table)
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn select_modified_since(
        &self,
        table: &str,
        since: Option<DateTime<Utc>>,
    ) -> SyncResult<Vec<Record>> {
        self.before_read(table).await?;
        let rows = self
            .tables
            .read()
            .get(table)
            .map(|rows| {
                rows.values()
                    .filter(|record| since.is_none_or(|since| record.updated_at >= since))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some(hook) = &*self.after_fetch.read() {
            hook(self);
        }
        Ok(rows)
    }

    async fn select_by_id(&self, table: &str, id: &str) -> SyncResult<Option<Record>> {
        self.before_read(table).await?;
        Ok(self.get(table, id))
    }

    async fn upsert(&self, table: &str, record: &Record) -> SyncResult<()> {
        self.before_write(table).await?;
        self.insert(table, record.clone());
        Ok(())
    }

    async fn delete(&self, table: &str, id: &str) -> SyncResult<bool> {
        self.before_write(table).await?;
        Ok(self
            .tables
            .write()
            .get_mut(table)
            .is_some_and(|rows| rows.remove(id).is_some()))
    }

    async fn probe(&self) -> SyncResult<()> {
        self.wait_if_stalled().await;
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SyncError::NotConnected);
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRecordStore")
            .field("tables", &self.tables.read().len())
            .field("reads", &self.read_count())
            .field("writes", &self.write_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn select_modified_since_is_inclusive() {
        let store = MemoryRecordStore::new();
        store.insert("products", Record::new("a", t0()));
        store.insert("products", Record::new("b", t0() + Duration::minutes(1)));
        store.insert("products", Record::new("c", t0() - Duration::minutes(1)));

        let all = store.select_modified_since("products", None).await.unwrap();
        assert_eq!(all.len(), 3);

        let recent = store
            .select_modified_since("products", Some(t0()))
            .await
            .unwrap();
        let ids: Vec<_> = recent.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn upsert_and_delete() {
        let store = MemoryRecordStore::new();
        let record = Record::new("1", t0()).with_field("name", "Scone");

        store.upsert("products", &record).await.unwrap();
        assert_eq!(store.get("products", "1"), Some(record));

        assert!(store.delete("products", "1").await.unwrap());
        assert!(!store.delete("products", "1").await.unwrap());
        assert_eq!(store.write_count(), 3);
    }

    #[tokio::test]
    async fn unknown_table_reads_empty() {
        let store = MemoryRecordStore::new();
        assert!(store.select_modified_since("orders", None).await.unwrap().is_empty());
        assert!(store.select_by_id("orders", "1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failing_table_is_isolated() {
        let store = MemoryRecordStore::new();
        store.fail_table("orders", true);

        assert!(matches!(
            store.select_modified_since("orders", None).await,
            Err(SyncError::Store(_))
        ));
        assert!(store.select_modified_since("products", None).await.is_ok());

        store.fail_table("orders", false);
        assert!(store.select_modified_since("orders", None).await.is_ok());
    }

    #[tokio::test]
    async fn unreachable_store_fails_probe() {
        let store = MemoryRecordStore::new();
        assert!(store.probe().await.is_ok());

        store.set_reachable(false);
        assert!(matches!(store.probe().await, Err(SyncError::NotConnected)));
        assert!(store.upsert("products", &Record::new("1", t0())).await.is_err());
    }
}
