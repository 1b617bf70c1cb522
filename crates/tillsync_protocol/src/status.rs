//! Sync bookkeeping and reporting types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reconciliation progress of one synchronized table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Table name.
    pub table_name: String,
    /// End of the last reconciliation pass, if any.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Conflicts resolved since the last explicit reset.
    pub conflict_count: u64,
}

impl SyncStatus {
    /// Creates a status for a table that has never been synced.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            last_sync_at: None,
            conflict_count: 0,
        }
    }
}

/// Counters describing the operation queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    /// Operations held in the queue.
    pub total_operations: usize,
    /// Operations still eligible for processing.
    pub pending_operations: usize,
    /// Operations that used up their retry budget.
    pub failed_operations: usize,
    /// Operations confirmed during the most recent drain pass.
    pub completed_operations: usize,
}

/// Outcome of a sync request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// True when no errors were collected.
    pub success: bool,
    /// Human-readable errors, one per failure.
    pub errors: Vec<String>,
}

impl SyncReport {
    /// Error reported when the device is offline.
    pub const OFFLINE: &'static str = "No internet connection";
    /// Error reported when another sync is running.
    pub const IN_PROGRESS: &'static str = "Sync already in progress";
    /// Error reported when the remote store does not answer a probe.
    pub const CLOUD_UNREACHABLE: &'static str = "Cannot connect to cloud database";

    /// Builds a report from collected errors.
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            success: errors.is_empty(),
            errors,
        }
    }

    /// Builds a failed report with a single error.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            errors: vec![error.into()],
        }
    }

    /// Report for a sync refused because the device is offline.
    pub fn offline() -> Self {
        Self::failure(Self::OFFLINE)
    }

    /// Report for a sync refused by the single-flight guard.
    pub fn in_progress() -> Self {
        Self::failure(Self::IN_PROGRESS)
    }

    /// Returns true if the request was refused by the single-flight guard
    /// rather than failing while syncing.
    pub fn is_rejected(&self) -> bool {
        !self.success && self.errors.len() == 1 && self.errors[0] == Self::IN_PROGRESS
    }
}

/// What status subscribers see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    /// Current connectivity.
    pub is_online: bool,
    /// True while a sync is running.
    pub is_syncing: bool,
    /// End of the last full sync.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Pending operations in the queue.
    pub pending_operations: usize,
    /// Errors of the last full sync.
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_success_follows_errors() {
        assert!(SyncReport::from_errors(vec![]).success);
        assert!(!SyncReport::from_errors(vec!["orders: boom".into()]).success);
    }

    #[test]
    fn rejection_is_distinguishable() {
        assert!(SyncReport::in_progress().is_rejected());
        assert!(!SyncReport::offline().is_rejected());
        assert_eq!(SyncReport::offline().errors, vec!["No internet connection"]);
    }

    #[test]
    fn status_starts_unsynced() {
        let status = SyncStatus::new("products");
        assert_eq!(status.last_sync_at, None);
        assert_eq!(status.conflict_count, 0);
    }
}
