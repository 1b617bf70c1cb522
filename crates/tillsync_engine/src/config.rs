//! Configuration for the sync engine.

use std::time::Duration;
use tillsync_protocol::DEFAULT_MAX_RETRIES;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Synchronized tables, reconciled in this order.
    pub tables: Vec<String>,
    /// Base URL of the REST API queued operations are pushed to.
    pub api_base_url: String,
    /// Timeout applied to every remote call.
    pub request_timeout: Duration,
    /// Retry budget for operations queued through the orchestrator.
    pub max_retries: u32,
    /// Interval for automatic sync.
    pub sync_interval: Option<Duration>,
    /// Durable slot holding the operation queue.
    pub queue_key: String,
    /// Durable slot holding per-table sync status.
    pub status_key: String,
}

impl SyncConfig {
    /// Creates a configuration for the given tables.
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
            api_base_url: String::new(),
            request_timeout: Duration::from_secs(30),
            max_retries: DEFAULT_MAX_RETRIES,
            sync_interval: None,
            queue_key: "offline_queue".into(),
            status_key: "sync_status".into(),
        }
    }

    /// Tables a point-of-sale terminal keeps in sync.
    pub fn default_tables() -> Vec<String> {
        [
            "categories",
            "products",
            "customers",
            "orders",
            "order_items",
            "inventory",
            "receipt_settings",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    /// Sets the API base URL.
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the sync interval for automatic sync.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Sets the durable slot for the operation queue.
    pub fn with_queue_key(mut self, key: impl Into<String>) -> Self {
        self.queue_key = key.into();
        self
    }

    /// Sets the durable slot for sync status.
    pub fn with_status_key(mut self, key: impl Into<String>) -> Self {
        self.status_key = key.into();
        self
    }

    /// Returns true if `table` is synchronized.
    pub fn has_table(&self, table: &str) -> bool {
        self.tables.iter().any(|t| t == table)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(Self::default_tables())
    }
}
