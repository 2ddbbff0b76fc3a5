//! Coarse sync state derived for status displays.

use crate::model::SyncPhase;
use crate::queue::UploadQueue;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Syncing,
    PartialFailure,
}

impl SyncState {
    pub fn label(&self) -> &'static str {
        match self {
            SyncState::Idle => "Idle",
            SyncState::Syncing => "Syncing",
            SyncState::PartialFailure => "Partial Failure",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Any active phase reads as syncing; otherwise failures win over idle.
pub fn derive_sync_state(phase: SyncPhase, queue: &UploadQueue) -> SyncState {
    match phase {
        SyncPhase::Scanning | SyncPhase::Syncing => SyncState::Syncing,
        SyncPhase::Idle if queue.has_failures() => SyncState::PartialFailure,
        SyncPhase::Idle => SyncState::Idle,
    }
}
