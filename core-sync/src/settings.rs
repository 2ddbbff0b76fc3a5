//! Sync policy and connection settings with lenient decoding.
//!
//! Persisted records may come from older clients or be hand-edited, so every
//! loader here accepts arbitrary JSON and falls back to the default for any
//! missing, mistyped, or out-of-range field.

use bridge_traits::media::ScanFilter;
use bridge_traits::transfer::{
    SftpAuthType, SftpConfig, SmbConfig, TransportKind, DEFAULT_SFTP_PORT, DEFAULT_SMB_PORT,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAX_ITEMS_PER_RUN_RANGE: (u32, u32) = (1, 500);
pub const MAX_RETRY_ATTEMPTS_RANGE: (u32, u32) = (1, 10);
pub const BACKGROUND_INTERVAL_MINUTES_RANGE: (u32, u32) = (15, 720);
pub const CLEAR_COMPLETED_AFTER_DAYS_RANGE: (u32, u32) = (0, 90);

/// Whether uploads are grouped into `YYYY-MM` folders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FolderStrategy {
    #[default]
    #[serde(rename = "byMonth")]
    ByMonth,
    #[serde(rename = "flat")]
    Flat,
}

impl FolderStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FolderStrategy::ByMonth => "byMonth",
            FolderStrategy::Flat => "flat",
        }
    }
}

/// How the remote filename is derived from the source filename
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilenameStrategy {
    #[default]
    #[serde(rename = "original")]
    Original,
    #[serde(rename = "timestampPrefix")]
    TimestampPrefix,
}

impl FilenameStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilenameStrategy::Original => "original",
            FilenameStrategy::TimestampPrefix => "timestampPrefix",
        }
    }
}

/// User-facing sync policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    pub auto_scan_on_launch: bool,
    pub background_sync_enabled: bool,
    /// Discovery batch cap
    pub max_items_per_run: u32,
    pub upload_photos: bool,
    pub upload_videos: bool,
    pub wifi_only: bool,
    /// Cumulative per-item attempt cap
    pub max_retry_attempts: u32,
    pub background_interval_minutes: u32,
    pub folder_strategy: FolderStrategy,
    pub filename_strategy: FilenameStrategy,
    /// 0 disables age-based cleanup
    pub clear_completed_after_days: u32,
    pub transport: TransportKind,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            auto_scan_on_launch: true,
            background_sync_enabled: false,
            max_items_per_run: 100,
            upload_photos: true,
            upload_videos: true,
            wifi_only: false,
            max_retry_attempts: 3,
            background_interval_minutes: 15,
            folder_strategy: FolderStrategy::ByMonth,
            filename_strategy: FilenameStrategy::Original,
            clear_completed_after_days: 7,
            transport: TransportKind::Smb,
        }
    }
}

fn clamp_range(value: u32, (min, max): (u32, u32)) -> u32 {
    value.clamp(min, max)
}

impl SyncSettings {
    /// Clamp every numeric field into its allowed range.
    pub fn normalized(&self) -> Self {
        Self {
            max_items_per_run: clamp_range(self.max_items_per_run, MAX_ITEMS_PER_RUN_RANGE),
            max_retry_attempts: clamp_range(self.max_retry_attempts, MAX_RETRY_ATTEMPTS_RANGE),
            background_interval_minutes: clamp_range(
                self.background_interval_minutes,
                BACKGROUND_INTERVAL_MINUTES_RANGE,
            ),
            clear_completed_after_days: clamp_range(
                self.clear_completed_after_days,
                CLEAR_COMPLETED_AFTER_DAYS_RANGE,
            ),
            ..self.clone()
        }
    }

    pub fn scan_filter(&self) -> ScanFilter {
        ScanFilter {
            include_photos: self.upload_photos,
            include_videos: self.upload_videos,
        }
    }

    /// Lenient decoding of a persisted settings record.
    pub fn from_value(value: &Value) -> Self {
        let defaults = Self::default();
        let flag = |key: &str, fallback: bool| {
            value.get(key).and_then(Value::as_bool).unwrap_or(fallback)
        };
        let number = |key: &str, fallback: u32, range: (u32, u32)| {
            clamped_int(value.get(key), range.0 as i64, range.1 as i64)
                .map(|n| n as u32)
                .unwrap_or(fallback)
        };

        Self {
            auto_scan_on_launch: flag("autoScanOnLaunch", defaults.auto_scan_on_launch),
            background_sync_enabled: flag(
                "backgroundSyncEnabled",
                defaults.background_sync_enabled,
            ),
            max_items_per_run: number(
                "maxItemsPerRun",
                defaults.max_items_per_run,
                MAX_ITEMS_PER_RUN_RANGE,
            ),
            upload_photos: flag("uploadPhotos", defaults.upload_photos),
            upload_videos: flag("uploadVideos", defaults.upload_videos),
            wifi_only: flag("wifiOnly", defaults.wifi_only),
            max_retry_attempts: number(
                "maxRetryAttempts",
                defaults.max_retry_attempts,
                MAX_RETRY_ATTEMPTS_RANGE,
            ),
            background_interval_minutes: number(
                "backgroundIntervalMinutes",
                defaults.background_interval_minutes,
                BACKGROUND_INTERVAL_MINUTES_RANGE,
            ),
            folder_strategy: match value.get("folderStrategy").and_then(Value::as_str) {
                Some("flat") => FolderStrategy::Flat,
                _ => FolderStrategy::ByMonth,
            },
            filename_strategy: match value.get("filenameStrategy").and_then(Value::as_str) {
                Some("timestampPrefix") => FilenameStrategy::TimestampPrefix,
                _ => FilenameStrategy::Original,
            },
            clear_completed_after_days: number(
                "clearCompletedAfterDays",
                defaults.clear_completed_after_days,
                CLEAR_COMPLETED_AFTER_DAYS_RANGE,
            ),
            transport: value
                .get("transport")
                .and_then(Value::as_str)
                .and_then(TransportKind::parse)
                .unwrap_or(defaults.transport),
        }
    }
}

/// Truncate a JSON number and clamp it; non-numbers yield `None`.
fn clamped_int(value: Option<&Value>, min: i64, max: i64) -> Option<i64> {
    let value = value?;
    let n = value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))?;
    Some(n.clamp(min, max))
}

fn text(value: &Value, key: &str, fallback: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}

/// Clamp a user-entered port into the valid TCP range.
pub fn clamp_port(port: u32) -> u32 {
    port.clamp(1, 65_535)
}

pub fn smb_config_from_value(value: &Value) -> SmbConfig {
    let defaults = SmbConfig::default();
    SmbConfig {
        host: text(value, "host", &defaults.host),
        port: clamped_int(value.get("port"), 1, 65_535)
            .map(|p| p as u32)
            .unwrap_or(DEFAULT_SMB_PORT),
        share: text(value, "share", &defaults.share),
        remote_path: text(value, "remotePath", &defaults.remote_path),
        username: text(value, "username", &defaults.username),
    }
}

pub fn sftp_config_from_value(value: &Value) -> SftpConfig {
    let defaults = SftpConfig::default();
    SftpConfig {
        host: text(value, "host", &defaults.host),
        port: clamped_int(value.get("port"), 1, 65_535)
            .map(|p| p as u32)
            .unwrap_or(DEFAULT_SFTP_PORT),
        remote_path: text(value, "remotePath", &defaults.remote_path),
        username: text(value, "username", &defaults.username),
        auth_type: match value.get("authType").and_then(Value::as_str) {
            Some("key") => SftpAuthType::Key,
            _ => SftpAuthType::Password,
        },
    }
}
