//! Transport layer for queued operations.

use crate::clock::Clock;
use crate::error::{SyncError, SyncResult};
use crate::store::RecordStore;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tillsync_protocol::{decode_segment, HttpMethod, OperationId, Record, RemoteRequest};

/// Delivers queued operations to the remote store.
///
/// This trait abstracts the network layer so the queue can be driven by HTTP
/// in production and by an in-process store or a mock in tests.
#[async_trait]
pub trait OperationTransport: Send + Sync {
    /// Sends one request. `Ok` means the remote store accepted it.
    async fn send(&self, request: &RemoteRequest) -> SyncResult<()>;
}

/// A mock transport for testing.
///
/// Records every request it sees. Requests whose path starts with a failing
/// prefix are rejected with a retryable error.
#[derive(Default)]
pub struct MockTransport {
    requests: Mutex<Vec<RemoteRequest>>,
    failing_paths: RwLock<BTreeSet<String>>,
    fail_all: AtomicBool,
    delay: RwLock<Option<Duration>>,
}

impl MockTransport {
    /// Creates a transport that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects (or stops rejecting) requests whose path starts with `prefix`.
    pub fn fail_path(&self, prefix: impl Into<String>, fail: bool) {
        let prefix = prefix.into();
        let mut failing = self.failing_paths.write();
        if fail {
            failing.insert(prefix);
        } else {
            failing.remove(&prefix);
        }
    }

    /// Rejects every request while set.
    pub fn fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Sleeps for `delay` before answering each request.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.write() = Some(delay);
    }

    /// Returns the requests seen so far.
    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.requests.lock().clone()
    }

    /// Returns how many requests were sent.
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Forgets recorded requests.
    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    fn should_fail(&self, path: &str) -> bool {
        self.fail_all.load(Ordering::SeqCst)
            || self
                .failing_paths
                .read()
                .iter()
                .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

#[async_trait]
impl OperationTransport for MockTransport {
    async fn send(&self, request: &RemoteRequest) -> SyncResult<()> {
        self.requests.lock().push(request.clone());

        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.should_fail(&request.path) {
            return Err(SyncError::transport_retryable(format!(
                "mock rejected {request}"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("calls", &self.call_count())
            .finish()
    }
}

/// Applies requests directly to a [`RecordStore`].
///
/// Behaves like the REST API in front of the remote database: it resolves
/// `/api/{table}[/{id}]`, stamps `updatedAt` when the payload lacks one and
/// assigns an id to creates that come without.
pub struct StoreTransport {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl StoreTransport {
    /// Creates a transport writing into `store`.
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn route(path: &str) -> SyncResult<(String, Option<String>)> {
        let no_route = || SyncError::transport_fatal(format!("no route for {path}"));
        let rest = path.strip_prefix("/api/").ok_or_else(no_route)?;
        match rest.split_once('/') {
            Some((table, id)) if !table.is_empty() && !id.is_empty() && !id.contains('/') => {
                Ok((decode_segment(table)?, Some(decode_segment(id)?)))
            }
            None if !rest.is_empty() => Ok((decode_segment(rest)?, None)),
            _ => Err(no_route()),
        }
    }

    fn to_record(&self, body: Option<&Value>, id: Option<&str>) -> SyncResult<Record> {
        let mut object = match body {
            Some(Value::Object(object)) => object.clone(),
            _ => return Err(SyncError::transport_fatal("request body must be an object")),
        };

        match id {
            Some(id) => {
                let matches_path = match object.get("id") {
                    Some(Value::String(body_id)) => body_id == id,
                    Some(Value::Number(n)) => n.to_string() == id,
                    _ => false,
                };
                if !matches_path {
                    object.insert("id".into(), Value::String(id.to_string()));
                }
            }
            None => {
                if !object.contains_key("id") {
                    object.insert(
                        "id".into(),
                        Value::String(OperationId::generate().to_string()),
                    );
                }
            }
        }
        if !object.contains_key("updatedAt") {
            object.insert(
                "updatedAt".into(),
                Value::String(self.clock.now().to_rfc3339()),
            );
        }

        Ok(Record::from_value(Value::Object(object))?)
    }
}

#[async_trait]
impl OperationTransport for StoreTransport {
    async fn send(&self, request: &RemoteRequest) -> SyncResult<()> {
        let (table, id) = Self::route(&request.path)?;
        match (request.method, id.as_deref()) {
            (HttpMethod::Post, None) | (HttpMethod::Put, Some(_)) => {
                let record = self.to_record(request.body.as_ref(), id.as_deref())?;
                self.store.upsert(&table, &record).await
            }
            (HttpMethod::Delete, Some(id)) => {
                self.store.delete(&table, id).await?;
                Ok(())
            }
            _ => Err(SyncError::transport_fatal(format!(
                "unsupported request {request}"
            ))),
        }
    }
}

impl std::fmt::Debug for StoreTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreTransport").finish_non_exhaustive()
    }
}
