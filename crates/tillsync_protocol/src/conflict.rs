//! Conflict detection and resolution.

use crate::record::Record;

/// A row that changed on both sides since the last sync.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    /// Table the row belongs to.
    pub table_name: String,
    /// Local version.
    pub local: Record,
    /// Remote version.
    pub remote: Record,
    /// Resolution (if any).
    pub resolution: Option<ConflictResolution>,
}

impl Conflict {
    /// Creates an unresolved conflict.
    pub fn new(table_name: impl Into<String>, local: Record, remote: Record) -> Self {
        Self {
            table_name: table_name.into(),
            local,
            remote,
            resolution: None,
        }
    }

    /// Resolves the conflict by last-writer-wins.
    pub fn resolve(&mut self) -> ConflictResolution {
        let resolution = ConflictResolution::last_writer_wins(&self.local, &self.remote);
        self.resolution = Some(resolution);
        resolution
    }

    /// Returns true if the conflict has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    /// Returns the winning record, once resolved.
    pub fn winner(&self) -> Option<&Record> {
        self.resolution.map(|resolution| match resolution {
            ConflictResolution::KeepLocal => &self.local,
            ConflictResolution::AcceptRemote => &self.remote,
        })
    }
}

/// Which side of a conflict won.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Keep the local version and overwrite the remote one.
    KeepLocal,
    /// Accept the remote version and overwrite the local one.
    AcceptRemote,
}

impl ConflictResolution {
    /// The later `updatedAt` wins; ties go to the remote record.
    pub fn last_writer_wins(local: &Record, remote: &Record) -> Self {
        if local.updated_at > remote.updated_at {
            ConflictResolution::KeepLocal
        } else {
            ConflictResolution::AcceptRemote
        }
    }
}

/// Returns true if the two versions of a row disagree on content.
///
/// `updatedAt` is ignored: a timestamp-only change is not a conflict.
pub fn detect_conflict(local: &Record, remote: &Record) -> bool {
    !local.same_content(remote)
}

/// Picks the whole-record winner of a conflict. The loser is discarded.
pub fn resolve_conflict(local: &Record, remote: &Record) -> Record {
    match ConflictResolution::last_writer_wins(local, remote) {
        ConflictResolution::KeepLocal => local.clone(),
        ConflictResolution::AcceptRemote => remote.clone(),
    }
}
