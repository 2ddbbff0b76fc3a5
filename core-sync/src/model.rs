//! # Sync Data Model
//!
//! Value types tracked by the engine: upload items and their status machine,
//! the engine phase, run options, the incremental-discovery watermark, and
//! activity log entries.
//!
//! ## Upload Status Machine
//!
//! ```text
//! pending ──▶ uploading ──▶ completed
//!    ▲            │
//!    │            ▼
//!    └─ retry ── failed   (only while attemptCount < maxRetryAttempts)
//! ```
//!
//! All records serialize with camelCase field names so persisted state stays
//! readable by other clients of the same store.

use crate::{Result, SyncError};
use bridge_traits::media::{MediaType, ScannedAsset};
use bridge_traits::transfer::UploadRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

// ============================================================================
// Upload Status
// ============================================================================

/// Per-item transfer status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    #[default]
    Pending,
    Uploading,
    Completed,
    Failed,
}

impl UploadStatus {
    /// Check if this status represents a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Failed)
    }

    /// Get the string representation used in persisted records
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
        }
    }
}

impl FromStr for UploadStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(UploadStatus::Pending),
            "uploading" => Ok(UploadStatus::Uploading),
            "completed" => Ok(UploadStatus::Completed),
            "failed" => Ok(UploadStatus::Failed),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Upload Item
// ============================================================================

/// One tracked unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadItem {
    /// Source asset identity; unique within the queue
    pub id: String,
    pub filename: String,
    pub local_location: String,
    pub media_type: MediaType,
    /// Milliseconds since the Unix epoch, from the source library
    pub creation_time: i64,
    /// Fraction in `[0, 1]`
    pub progress: f64,
    pub status: UploadStatus,
    /// Attempts made so far; never reset by retry
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<i64>,
    /// Present only while `status == failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl UploadItem {
    /// New `pending` item with zero attempts
    pub fn from_asset(asset: ScannedAsset) -> Self {
        Self {
            id: asset.id,
            filename: asset.filename,
            local_location: asset.local_location,
            media_type: asset.media_type,
            creation_time: asset.creation_time,
            progress: 0.0,
            status: UploadStatus::Pending,
            attempt_count: 0,
            last_attempt_at: None,
            uploaded_at: None,
            error_message: None,
        }
    }

    /// Whether the run loop may pick this item up
    pub fn is_eligible(&self, max_retry_attempts: u32) -> bool {
        matches!(self.status, UploadStatus::Pending | UploadStatus::Failed)
            && self.attempt_count < max_retry_attempts
    }

    /// Whether the retry budget is spent
    pub fn is_retry_exhausted(&self, max_retry_attempts: u32) -> bool {
        self.attempt_count >= max_retry_attempts
    }

    /// Build the transfer request for this item
    pub fn upload_request(&self, remote_path: impl Into<String>) -> UploadRequest {
        UploadRequest {
            id: self.id.clone(),
            filename: self.filename.clone(),
            local_location: self.local_location.clone(),
            media_type: self.media_type,
            creation_time: self.creation_time,
            remote_path: remote_path.into(),
        }
    }

    /// Lenient decoding of a persisted record.
    ///
    /// Returns `None` when `id` or `filename` is not a string. Other fields
    /// fall back to safe values: unknown media types become photos, unknown
    /// statuses become pending, progress is clamped to `[0, 1]` and negative
    /// attempt counts become zero.
    pub fn from_value(value: &Value) -> Option<Self> {
        let id = value.get("id")?.as_str()?.to_string();
        let filename = value.get("filename")?.as_str()?.to_string();

        let media_type = match value.get("mediaType").and_then(Value::as_str) {
            Some("video") => MediaType::Video,
            _ => MediaType::Photo,
        };
        let status = value
            .get("status")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let progress = value
            .get("progress")
            .and_then(Value::as_f64)
            .filter(|p| p.is_finite())
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);
        let attempt_count = value
            .get("attemptCount")
            .and_then(Value::as_f64)
            .filter(|n| n.is_finite())
            .map(|n| n.trunc().clamp(0.0, u32::MAX as f64) as u32)
            .unwrap_or(0);

        Some(Self {
            id,
            filename,
            local_location: string_field(value, "localLocation").unwrap_or_default(),
            media_type,
            creation_time: int_field(value, "creationTime").unwrap_or(0),
            progress,
            status,
            attempt_count,
            last_attempt_at: int_field(value, "lastAttemptAt"),
            uploaded_at: int_field(value, "uploadedAt"),
            error_message: string_field(value, "errorMessage"),
        })
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn int_field(value: &Value, key: &str) -> Option<i64> {
    let raw = value.get(key)?;
    raw.as_i64()
        .or_else(|| raw.as_f64().filter(|n| n.is_finite()).map(|n| n.trunc() as i64))
}

/// Per-status item counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: u64,
    pub uploading: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.uploading + self.completed + self.failed
    }
}

// ============================================================================
// Engine Phase & Run Options
// ============================================================================

/// Engine-wide activity, distinct from per-item status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    #[default]
    Idle,
    Scanning,
    Syncing,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Scanning => "scanning",
            SyncPhase::Syncing => "syncing",
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            SyncPhase::Idle => 0,
            SyncPhase::Scanning => 1,
            SyncPhase::Syncing => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => SyncPhase::Scanning,
            2 => SyncPhase::Syncing,
            _ => SyncPhase::Idle,
        }
    }
}

/// What initiated an upload run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncTrigger {
    Manual,
    Background,
    Launch,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::Manual => "manual",
            SyncTrigger::Background => "background",
            SyncTrigger::Launch => "launch",
        }
    }
}

/// Options for [`SyncEngine::run_sync`](crate::SyncEngine::run_sync)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunOptions {
    pub trigger: Option<SyncTrigger>,
    /// Suppress informational "nothing happened" log entries
    pub silent: bool,
}

impl RunOptions {
    pub fn manual() -> Self {
        Self {
            trigger: Some(SyncTrigger::Manual),
            silent: false,
        }
    }

    pub fn background() -> Self {
        Self {
            trigger: Some(SyncTrigger::Background),
            silent: true,
        }
    }

    pub fn launch() -> Self {
        Self {
            trigger: Some(SyncTrigger::Launch),
            silent: true,
        }
    }
}

// ============================================================================
// Metadata & Activity Log
// ============================================================================

/// Incremental discovery watermark and run bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    /// Highest creation time among successfully uploaded items (ms)
    #[serde(default)]
    pub last_synced_asset_time: Option<i64>,
    /// When the last upload run finished (ms)
    #[serde(default)]
    pub last_completed_at: Option<i64>,
}

impl SyncMetadata {
    pub fn from_value(value: &Value) -> Self {
        Self {
            last_synced_asset_time: int_field(value, "lastSyncedAssetTime"),
            last_completed_at: int_field(value, "lastCompletedAt"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncLogLevel {
    Info,
    Error,
}

impl SyncLogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncLogLevel::Info => "info",
            SyncLogLevel::Error => "error",
        }
    }
}

/// User-visible activity record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub id: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub level: SyncLogLevel,
    pub message: String,
}

impl SyncLogEntry {
    /// Lenient decoding; entries without a message are dropped.
    pub fn from_value(value: &Value) -> Option<Self> {
        let message = value.get("message")?.as_str()?.to_string();
        let level = match value.get("level").and_then(Value::as_str) {
            Some("error") => SyncLogLevel::Error,
            _ => SyncLogLevel::Info,
        };
        Some(Self {
            id: string_field(value, "id").unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            timestamp: int_field(value, "timestamp").unwrap_or(0),
            level,
            message,
        })
    }
}
