//! Bounded, newest-first activity log.

use crate::model::{SyncLogEntry, SyncLogLevel};
use std::collections::VecDeque;
use uuid::Uuid;

/// Maximum number of retained entries; the oldest are dropped first.
pub const MAX_LOG_ENTRIES: usize = 200;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityLog {
    entries: VecDeque<SyncLogEntry>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore persisted entries (newest first), enforcing the cap.
    pub fn from_entries(entries: Vec<SyncLogEntry>) -> Self {
        let mut entries: VecDeque<_> = entries.into();
        entries.truncate(MAX_LOG_ENTRIES);
        Self { entries }
    }

    /// Prepend a new entry and return a copy of it.
    pub fn push(
        &mut self,
        level: SyncLogLevel,
        message: impl Into<String>,
        timestamp: i64,
    ) -> SyncLogEntry {
        let entry = SyncLogEntry {
            id: Uuid::new_v4().to_string(),
            timestamp,
            level,
            message: message.into(),
        };
        self.entries.push_front(entry.clone());
        self.entries.truncate(MAX_LOG_ENTRIES);
        entry
    }

    /// Entries, newest first.
    pub fn entries(&self) -> Vec<SyncLogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&SyncLogEntry> {
        self.entries.front()
    }
}
