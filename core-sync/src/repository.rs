//! # Sync State Repository
//!
//! Persistence for everything the engine owns: sync policy, per-transport
//! connection settings and secrets, the discovery watermark, the activity log
//! and the upload queue.
//!
//! ## Overview
//!
//! [`KeyValueSyncRepository`] stores each record as a JSON string in the host
//! [`SettingsStore`] and keeps secrets in the [`SecureStore`]. When the secure
//! store fails, secrets are written to the settings store under a
//! `.fallback` key so a broken keychain never prevents startup.
//!
//! Loading is lenient: a record that fails to parse yields its default and a
//! warning. Only failures of the underlying store surface as errors.

use crate::activity::MAX_LOG_ENTRIES;
use crate::model::{SyncLogEntry, SyncMetadata, UploadItem};
use crate::settings::{sftp_config_from_value, smb_config_from_value, SyncSettings};
use crate::Result;
use async_trait::async_trait;
use bridge_traits::storage::{SecureStore, SettingsStore};
use bridge_traits::transfer::{SftpConfig, SmbConfig, TransportKind};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub const SETTINGS_KEY: &str = "photosync.settings";
pub const SMB_CONFIG_KEY: &str = "photosync.smbConfig";
pub const SFTP_CONFIG_KEY: &str = "photosync.sftpConfig";
pub const METADATA_KEY: &str = "photosync.metadata";
pub const LOGS_KEY: &str = "photosync.logs";
pub const QUEUE_KEY: &str = "photosync.queue";
pub const SMB_PASSWORD_KEY: &str = "photosync.smbPassword";
pub const SFTP_PASSWORD_KEY: &str = "photosync.sftpPassword";
pub const FALLBACK_SUFFIX: &str = ".fallback";

/// Secure-store key holding the secret for `transport`
pub fn secret_key(transport: TransportKind) -> &'static str {
    match transport {
        TransportKind::Smb => SMB_PASSWORD_KEY,
        TransportKind::Sftp => SFTP_PASSWORD_KEY,
    }
}

fn fallback_key(key: &str) -> String {
    format!("{key}{FALLBACK_SUFFIX}")
}

/// Everything loaded at engine start-up
#[derive(Debug, Clone, Default)]
pub struct PersistedState {
    pub settings: SyncSettings,
    pub smb_config: SmbConfig,
    pub sftp_config: SftpConfig,
    pub smb_password: String,
    pub sftp_secret: String,
    pub metadata: SyncMetadata,
    pub queue: Vec<UploadItem>,
    pub logs: Vec<SyncLogEntry>,
}

// ============================================================================
// Repository Trait
// ============================================================================

/// Repository trait for engine state persistence
#[async_trait]
pub trait SyncStateRepository: Send + Sync {
    /// Load sync policy, falling back to defaults for unusable records
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails
    async fn load_settings(&self) -> Result<SyncSettings>;

    /// Persist sync policy
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails
    async fn save_settings(&self, settings: &SyncSettings) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the underlying store fails
    async fn load_smb_config(&self) -> Result<SmbConfig>;

    /// # Errors
    ///
    /// Returns an error if the underlying store fails
    async fn save_smb_config(&self, config: &SmbConfig) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the underlying store fails
    async fn load_sftp_config(&self) -> Result<SftpConfig>;

    /// # Errors
    ///
    /// Returns an error if the underlying store fails
    async fn save_sftp_config(&self, config: &SftpConfig) -> Result<()>;

    /// Load the secret for a transport; empty when none is stored
    ///
    /// # Errors
    ///
    /// Returns an error if both the secure store and the fallback fail
    async fn load_secret(&self, transport: TransportKind) -> Result<String>;

    /// Store the trimmed secret for a transport. An empty secret clears it.
    ///
    /// # Errors
    ///
    /// Returns an error if neither the secure store nor the fallback could
    /// be written
    async fn save_secret(&self, transport: TransportKind, secret: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the underlying store fails
    async fn load_metadata(&self) -> Result<SyncMetadata>;

    /// # Errors
    ///
    /// Returns an error if the underlying store fails
    async fn save_metadata(&self, metadata: &SyncMetadata) -> Result<()>;

    /// Load the upload queue, dropping records without an id or filename
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails
    async fn load_queue(&self) -> Result<Vec<UploadItem>>;

    /// # Errors
    ///
    /// Returns an error if the underlying store fails
    async fn save_queue(&self, queue: &[UploadItem]) -> Result<()>;

    /// Load activity entries (newest first), capped
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails
    async fn load_logs(&self) -> Result<Vec<SyncLogEntry>>;

    /// # Errors
    ///
    /// Returns an error if the underlying store fails
    async fn save_logs(&self, logs: &[SyncLogEntry]) -> Result<()>;

    /// Load every record at once
    ///
    /// # Errors
    ///
    /// Returns the first store failure encountered
    async fn load_snapshot(&self) -> Result<PersistedState> {
        Ok(PersistedState {
            settings: self.load_settings().await?,
            smb_config: self.load_smb_config().await?,
            sftp_config: self.load_sftp_config().await?,
            smb_password: self.load_secret(TransportKind::Smb).await?,
            sftp_secret: self.load_secret(TransportKind::Sftp).await?,
            metadata: self.load_metadata().await?,
            queue: self.load_queue().await?,
            logs: self.load_logs().await?,
        })
    }
}

// ============================================================================
// Key-Value Implementation
// ============================================================================

/// Repository backed by the host settings and secure stores
pub struct KeyValueSyncRepository {
    settings: Arc<dyn SettingsStore>,
    secrets: Arc<dyn SecureStore>,
}

impl KeyValueSyncRepository {
    pub fn new(settings: Arc<dyn SettingsStore>, secrets: Arc<dyn SecureStore>) -> Self {
        Self { settings, secrets }
    }

    /// Read and parse a JSON record. `None` when absent or unparsable.
    async fn read_json(&self, key: &str) -> Result<Option<Value>> {
        let Some(raw) = self.settings.get_string(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Ignoring unreadable record {}: {}", key, e);
                Ok(None)
            }
        }
    }

    async fn write_json<T: Serialize + ?Sized + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.settings.set_string(key, &raw).await?;
        Ok(())
    }
}

#[async_trait]
impl SyncStateRepository for KeyValueSyncRepository {
    async fn load_settings(&self) -> Result<SyncSettings> {
        Ok(self
            .read_json(SETTINGS_KEY)
            .await?
            .map(|value| SyncSettings::from_value(&value))
            .unwrap_or_default())
    }

    async fn save_settings(&self, settings: &SyncSettings) -> Result<()> {
        self.write_json(SETTINGS_KEY, settings).await
    }

    async fn load_smb_config(&self) -> Result<SmbConfig> {
        Ok(self
            .read_json(SMB_CONFIG_KEY)
            .await?
            .map(|value| smb_config_from_value(&value))
            .unwrap_or_default())
    }

    async fn save_smb_config(&self, config: &SmbConfig) -> Result<()> {
        self.write_json(SMB_CONFIG_KEY, config).await
    }

    async fn load_sftp_config(&self) -> Result<SftpConfig> {
        Ok(self
            .read_json(SFTP_CONFIG_KEY)
            .await?
            .map(|value| sftp_config_from_value(&value))
            .unwrap_or_default())
    }

    async fn save_sftp_config(&self, config: &SftpConfig) -> Result<()> {
        self.write_json(SFTP_CONFIG_KEY, config).await
    }

    async fn load_secret(&self, transport: TransportKind) -> Result<String> {
        let key = secret_key(transport);
        match self.secrets.get_secret(key).await {
            Ok(Some(bytes)) => {
                if let Ok(secret) = String::from_utf8(bytes) {
                    if !secret.is_empty() {
                        return Ok(secret);
                    }
                }
            }
            Ok(None) => {}
            Err(e) if e.is_not_available() => debug!("No secure store for {}: {}", key, e),
            Err(e) => warn!("Secure store read failed for {}: {}", key, e),
        }

        Ok(self
            .settings
            .get_string(&fallback_key(key))
            .await?
            .unwrap_or_default())
    }

    async fn save_secret(&self, transport: TransportKind, secret: &str) -> Result<()> {
        let key = secret_key(transport);
        let fallback = fallback_key(key);
        let secret = secret.trim();

        if secret.is_empty() {
            if let Err(e) = self.secrets.delete_secret(key).await {
                debug!("Secure store delete failed for {}: {}", key, e);
            }
            if let Err(e) = self.settings.delete(&fallback).await {
                debug!("Fallback delete failed for {}: {}", fallback, e);
            }
            return Ok(());
        }

        match self.secrets.set_secret(key, secret.as_bytes()).await {
            Ok(()) => {
                if let Err(e) = self.settings.delete(&fallback).await {
                    debug!("Fallback delete failed for {}: {}", fallback, e);
                }
                Ok(())
            }
            Err(e) => {
                warn!(
                    "Secure store unavailable for {}, using settings fallback: {}",
                    key, e
                );
                self.settings.set_string(&fallback, secret).await?;
                Ok(())
            }
        }
    }

    async fn load_metadata(&self) -> Result<SyncMetadata> {
        Ok(self
            .read_json(METADATA_KEY)
            .await?
            .map(|value| SyncMetadata::from_value(&value))
            .unwrap_or_default())
    }

    async fn save_metadata(&self, metadata: &SyncMetadata) -> Result<()> {
        self.write_json(METADATA_KEY, metadata).await
    }

    async fn load_queue(&self) -> Result<Vec<UploadItem>> {
        let Some(Value::Array(records)) = self.read_json(QUEUE_KEY).await? else {
            return Ok(Vec::new());
        };
        Ok(records.iter().filter_map(UploadItem::from_value).collect())
    }

    async fn save_queue(&self, queue: &[UploadItem]) -> Result<()> {
        self.write_json(QUEUE_KEY, queue).await
    }

    async fn load_logs(&self) -> Result<Vec<SyncLogEntry>> {
        let Some(Value::Array(records)) = self.read_json(LOGS_KEY).await? else {
            return Ok(Vec::new());
        };
        Ok(records
            .iter()
            .filter_map(SyncLogEntry::from_value)
            .take(MAX_LOG_ENTRIES)
            .collect())
    }

    async fn save_logs(&self, logs: &[SyncLogEntry]) -> Result<()> {
        self.write_json(LOGS_KEY, logs).await
    }
}
