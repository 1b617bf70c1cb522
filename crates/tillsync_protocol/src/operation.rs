//! Queued operations.

use crate::error::ProtocolResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Retry budget given to operations that don't ask for another one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Type of queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// A new row.
    Create,
    /// A change to an existing row.
    Update,
    /// Removal of a row.
    Delete,
}

impl OperationType {
    /// Returns the lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
        }
    }

    /// Parses a wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "create" => Some(OperationType::Create),
            "update" => Some(OperationType::Update),
            "delete" => Some(OperationType::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier assigned to an operation when it is enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OperationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for OperationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a caller supplies when enqueuing a mutation.
///
/// The queue fills in the id, timestamp and retry count.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationInput {
    /// Operation type.
    pub op_type: OperationType,
    /// Target table.
    pub table_name: String,
    /// Row payload (`{"id": ...}` is enough for deletes).
    pub data: Value,
    /// Higher values are processed first.
    pub priority: i32,
    /// Attempts allowed before the operation is considered failed.
    pub max_retries: u32,
    /// Operations that must succeed before this one is attempted.
    pub dependencies: Vec<OperationId>,
}

impl OperationInput {
    /// Creates an input with default priority, retry budget and no dependencies.
    pub fn new(op_type: OperationType, table_name: impl Into<String>, data: Value) -> Self {
        Self {
            op_type,
            table_name: table_name.into(),
            data,
            priority: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            dependencies: Vec::new(),
        }
    }

    /// Creates a `create` input.
    pub fn create(table_name: impl Into<String>, data: Value) -> Self {
        Self::new(OperationType::Create, table_name, data)
    }

    /// Creates an `update` input.
    pub fn update(table_name: impl Into<String>, data: Value) -> Self {
        Self::new(OperationType::Update, table_name, data)
    }

    /// Creates a `delete` input.
    pub fn delete(table_name: impl Into<String>, data: Value) -> Self {
        Self::new(OperationType::Delete, table_name, data)
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Adds a dependency.
    pub fn with_dependency(mut self, id: OperationId) -> Self {
        self.dependencies.push(id);
        self
    }

    /// Replaces the dependency list.
    pub fn with_dependencies(mut self, ids: impl IntoIterator<Item = OperationId>) -> Self {
        self.dependencies = ids.into_iter().collect();
        self
    }
}

/// A mutation waiting for confirmation by the remote store.
///
/// Serialized field names match the persisted queue layout:
/// `{id, type, tableName, data, timestamp, retryCount, priority, maxRetries,
/// dependencies}` with `timestamp` in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedOperation {
    /// Unique operation ID.
    pub id: OperationId,
    /// Operation type.
    #[serde(rename = "type")]
    pub op_type: OperationType,
    /// Target table.
    pub table_name: String,
    /// Row payload.
    pub data: Value,
    /// Enqueue time.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Failed attempts so far.
    pub retry_count: u32,
    /// Higher values are processed first.
    pub priority: i32,
    /// Attempts allowed before the operation is considered failed.
    pub max_retries: u32,
    /// Operations that must succeed first.
    #[serde(default)]
    pub dependencies: Vec<OperationId>,
}

impl QueuedOperation {
    /// Builds a queued operation from caller input.
    pub fn from_input(input: OperationInput, id: OperationId, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            op_type: input.op_type,
            table_name: input.table_name,
            data: input.data,
            timestamp,
            retry_count: 0,
            priority: input.priority,
            max_retries: input.max_retries,
            dependencies: input.dependencies,
        }
    }

    /// Returns true once the retry budget is used up.
    pub fn is_failed(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Returns true if `id` is one of this operation's dependencies.
    pub fn depends_on(&self, id: &OperationId) -> bool {
        self.dependencies.contains(id)
    }

    /// Records a failed attempt. Returns true if the operation is now failed.
    pub fn record_failure(&mut self) -> bool {
        self.retry_count = self.retry_count.saturating_add(1);
        self.is_failed()
    }

    /// Returns the `id` field of the payload, if it has a usable one.
    ///
    /// String ids are returned as-is; integer ids are formatted.
    pub fn record_id(&self) -> Option<String> {
        match self.data.get("id")? {
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Processing order: priority descending, then enqueue time ascending.
pub fn queue_order(a: &QueuedOperation, b: &QueuedOperation) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.timestamp.cmp(&b.timestamp))
}

/// Serializes a queue snapshot for durable storage.
pub fn encode_operations(operations: &[QueuedOperation]) -> ProtocolResult<Vec<u8>> {
    Ok(serde_json::to_vec(operations)?)
}

/// Parses a queue snapshot read from durable storage.
pub fn decode_operations(bytes: &[u8]) -> ProtocolResult<Vec<QueuedOperation>> {
    Ok(serde_json::from_slice(bytes)?)
}
