//! Queue commands.

use super::{DataDir, OutputFormat};
use serde_json::json;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tillsync_engine::{HttpTransport, ManualConnectivity, ReqwestClient};
use tillsync_protocol::{OperationId, QueueStats, QueuedOperation};

type CommandResult = Result<(), Box<dyn Error>>;

/// Lists operations in processing order.
pub fn list(data: &DataDir, format: OutputFormat) -> CommandResult {
    let operations = data.offline_queue().get_all_operations();
    format.emit(&serde_json::to_value(&operations)?, || {
        if operations.is_empty() {
            return "Queue is empty".to_string();
        }
        operations
            .iter()
            .map(describe)
            .collect::<Vec<_>>()
            .join("\n")
    })?;
    Ok(())
}

fn describe(operation: &QueuedOperation) -> String {
    let state = if operation.is_failed() { "failed" } else { "pending" };
    let mut line = format!(
        "{}  {:<6}  {:<16}  priority={}  retries={}/{}  {}",
        operation.id,
        operation.op_type,
        operation.table_name,
        operation.priority,
        operation.retry_count,
        operation.max_retries,
        state,
    );
    if !operation.dependencies.is_empty() {
        let deps: Vec<_> = operation.dependencies.iter().map(OperationId::as_str).collect();
        line.push_str(&format!("  after={}", deps.join(",")));
    }
    line
}

/// Shows queue counters.
pub fn stats(data: &DataDir, format: OutputFormat) -> CommandResult {
    let stats = data.offline_queue().get_stats();
    format.emit(&serde_json::to_value(stats)?, || render_stats(&stats))?;
    Ok(())
}

fn render_stats(stats: &QueueStats) -> String {
    format!(
        "Total:     {}\nPending:   {}\nFailed:    {}",
        stats.total_operations, stats.pending_operations, stats.failed_operations
    )
}

/// Resets failed operations.
pub fn retry_failed(data: &DataDir, format: OutputFormat) -> CommandResult {
    let reset = data.offline_queue().retry_failed();
    format.emit(&json!({ "reset": reset }), || {
        format!("Reset {reset} failed operation(s)")
    })?;
    Ok(())
}

/// Removes one operation.
pub fn remove(data: &DataDir, id: &str, format: OutputFormat) -> CommandResult {
    let removed = data.offline_queue().dequeue(&OperationId::from(id));
    if !removed {
        return Err(format!("No queued operation with id {id}").into());
    }
    format.emit(&json!({ "removed": id }), || format!("Removed {id}"))?;
    Ok(())
}

/// Removes every operation.
pub fn clear(data: &DataDir, format: OutputFormat) -> CommandResult {
    let queue = data.offline_queue();
    let count = queue.len();
    queue.clear();
    format.emit(&json!({ "cleared": count }), || {
        format!("Cleared {count} operation(s)")
    })?;
    Ok(())
}

/// Drains the queue against the API at `api_url`.
pub fn push(data: &DataDir, api_url: &str, timeout: Duration, format: OutputFormat) -> CommandResult {
    let config = data.config().clone().with_api_base_url(api_url).with_request_timeout(timeout);
    let transport = HttpTransport::new(config.api_base_url.clone(), ReqwestClient::new(timeout)?);
    let queue = data.queue(Arc::new(ManualConnectivity::online()), Arc::new(transport));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(queue.process_queue());
    let stats = queue.get_stats();

    format.emit(
        &json!({
            "attempted": report.attempted,
            "succeeded": report.succeeded,
            "failed": report.failed,
            "skipped": report.skipped,
            "stats": stats,
        }),
        || {
            format!(
                "Sent {} operation(s): {} succeeded, {} failed, {} skipped\n{}",
                report.attempted,
                report.succeeded,
                report.failed,
                report.skipped,
                render_stats(&stats)
            )
        },
    )?;
    Ok(())
}
