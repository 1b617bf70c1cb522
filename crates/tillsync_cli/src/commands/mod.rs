//! CLI command implementations.

pub mod queue;
pub mod status;

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tillsync_engine::{
    ManualConnectivity, OperationQueue, OperationTransport, SyncConfig, SyncError, SyncResult,
    SyncStatusRegistry, SystemClock,
};
use tillsync_protocol::RemoteRequest;
use tillsync_storage::{FileStore, StorageResult};

/// How results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable lines.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses `text` or `json`.
    pub fn parse(name: &str) -> Result<Self, String> {
        match name {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format: {other} (expected text or json)")),
        }
    }

    /// Prints `value` as JSON, or `text` otherwise.
    pub fn emit(&self, value: &Value, text: impl FnOnce() -> String) -> serde_json::Result<()> {
        match self {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => println!("{}", text()),
        }
        Ok(())
    }
}

/// A terminal's data directory.
pub struct DataDir {
    store: Arc<FileStore>,
    config: SyncConfig,
}

impl DataDir {
    /// Opens (or creates) the directory.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Ok(Self {
            store: Arc::new(FileStore::open(path)?),
            config: SyncConfig::default(),
        })
    }

    /// Returns the engine configuration used for slot names.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Loads the queue without network access.
    pub fn offline_queue(&self) -> OperationQueue {
        self.queue(
            Arc::new(ManualConnectivity::offline()),
            Arc::new(Disconnected),
        )
    }

    /// Loads the queue with the given connectivity and transport.
    pub fn queue(
        &self,
        connectivity: Arc<ManualConnectivity>,
        transport: Arc<dyn OperationTransport>,
    ) -> OperationQueue {
        OperationQueue::new(
            &self.config,
            self.store.clone(),
            connectivity,
            transport,
            Arc::new(SystemClock),
        )
    }

    /// Loads the sync status registry.
    pub fn registry(&self) -> SyncStatusRegistry {
        SyncStatusRegistry::new(self.store.clone(), self.config.status_key.clone())
    }
}

/// Transport for commands that must never reach the network.
struct Disconnected;

#[async_trait]
impl OperationTransport for Disconnected {
    async fn send(&self, _request: &RemoteRequest) -> SyncResult<()> {
        Err(SyncError::NotConnected)
    }
}
