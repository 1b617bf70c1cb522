//! Sync status commands.

use super::{DataDir, OutputFormat};
use std::error::Error;

type CommandResult = Result<(), Box<dyn Error>>;

/// Lists the sync status of every configured table.
///
/// Tables that were never synced are listed too.
pub fn list(data: &DataDir, format: OutputFormat) -> CommandResult {
    let registry = data.registry();
    let mut statuses = registry.all();
    for table in &data.config().tables {
        if !statuses.iter().any(|status| &status.table_name == table) {
            statuses.push(tillsync_protocol::SyncStatus::new(table.as_str()));
        }
    }
    statuses.sort_by(|a, b| a.table_name.cmp(&b.table_name));

    format.emit(&serde_json::to_value(&statuses)?, || {
        statuses
            .iter()
            .map(|status| {
                let last = status
                    .last_sync_at
                    .map_or_else(|| "never".to_string(), |at| at.to_rfc3339());
                format!(
                    "{:<16}  last_sync={}  conflicts={}",
                    status.table_name, last, status.conflict_count
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    })?;
    Ok(())
}

/// Forgets sync progress of `table` so the next sync fetches every row.
pub fn reset(data: &DataDir, table: &str, format: OutputFormat) -> CommandResult {
    if !data.config().has_table(table) {
        return Err(format!("Unknown table: {table}").into());
    }
    let status = data.registry().reset(table);
    format.emit(&serde_json::to_value(&status)?, || format!("Reset {table}"))?;
    Ok(())
}
