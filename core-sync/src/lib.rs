//! # Photo Sync Engine
//!
//! Turns newly discovered local media into confirmed uploads on a remote
//! file server.
//!
//! ## Overview
//!
//! This crate owns the upload queue and everything that decides what happens
//! to it:
//! - Discovering new assets newer than a watermark and merging them by id
//! - Uploading pending items one at a time, oldest first
//! - Bounding retries with a cumulative per-item attempt budget
//! - Stopping cooperatively after the in-flight item on request
//! - Enforcing the Wi-Fi only network policy
//! - Removing completed items after a configurable number of days
//! - Recording a capped, user-visible activity log
//!
//! ## Components
//!
//! - **Data Model** (`model`): Upload items, status machine, phases, metadata
//! - **Settings** (`settings`): Sync policy with lenient decoding and clamping
//! - **Upload Queue** (`queue`): Merge, attempt, retry and cleanup transitions
//! - **Remote Paths** (`remote_path`): Deterministic destination path builder
//! - **Activity Log** (`activity`): Newest-first log capped at 200 entries
//! - **Network Gate** (`network_gate`): Wi-Fi only policy evaluation
//! - **Repository** (`repository`): Persistence over the host key-value stores
//! - **Background Registration** (`scheduler`): Platform task registration
//! - **Sync Engine** (`engine`): Single-flight orchestration of scans and runs

pub mod activity;
pub mod engine;
pub mod error;
pub mod model;
pub mod network_gate;
pub mod queue;
pub mod remote_path;
pub mod repository;
pub mod scheduler;
pub mod settings;
pub mod state;

pub use activity::{ActivityLog, MAX_LOG_ENTRIES};
pub use engine::{EngineDependencies, SyncEngine};
pub use error::{Result, SyncError};
pub use model::{
    QueueCounts, RunOptions, SyncLogEntry, SyncLogLevel, SyncMetadata, SyncPhase, SyncTrigger,
    UploadItem, UploadStatus,
};
pub use network_gate::GateDecision;
pub use queue::UploadQueue;
pub use remote_path::build_remote_path;
pub use repository::{KeyValueSyncRepository, PersistedState, SyncStateRepository};
pub use scheduler::{BackgroundRegistration, RegistrationChange, BACKGROUND_TASK_NAME};
pub use settings::{FilenameStrategy, FolderStrategy, SyncSettings};
pub use state::{derive_sync_state, SyncState};
