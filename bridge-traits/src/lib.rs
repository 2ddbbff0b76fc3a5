//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the photo sync core and
//! platform-specific implementations. Each trait represents a capability that
//! the core requires but that must be implemented differently per platform
//! (desktop, iOS, Android).
//!
//! ## Traits
//!
//! ### Media & Transfer
//! - [`AssetSource`](media::AssetSource) - Enumerates new photos and videos in the local library
//! - [`Uploader`](transfer::Uploader) - Moves one file to an SMB share or SFTP server
//!
//! ### Security & Storage
//! - [`SecureStore`](storage::SecureStore) - Credential persistence (Keychain/Keystore)
//! - [`SettingsStore`](storage::SettingsStore) - Key-value persistence for settings, queue and logs
//!
//! ### Platform Integration
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity class for the Wi-Fi only policy
//! - [`BackgroundExecutor`](background::BackgroundExecutor) - Periodic task scheduling
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ In Progress |
//! | iOS      | TBD                 | 📋 Planned |
//! | Android  | TBD                 | 📋 Planned |
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a required capability is
//! missing:
//!
//! ```ignore
//! let settings_store = config.settings_store
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "SettingsStore".to_string(),
//!         message: "No settings store provided. \
//!                  Desktop: enable the desktop-shims feature. \
//!                  Mobile: inject platform-native adapter.".to_string()
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type.
//! Platform implementations should convert platform-specific errors to
//! `BridgeError` and include context such as paths or hosts. Secrets never
//! appear in error messages.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent
//! usage across async tasks.

pub mod background;
pub mod error;
pub mod media;
pub mod network;
pub mod storage;
pub mod time;
pub mod transfer;

pub use error::BridgeError;

// Re-export commonly used types
pub use background::{BackgroundExecutor, TaskConstraints, TaskId, TaskStatus};
pub use media::{AssetSource, MediaType, PermissionState, ScanFilter, ScannedAsset};
pub use network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use storage::{SecureStore, SettingsStore};
pub use time::{Clock, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
pub use transfer::{
    ConnectionConfig, ConnectionTestResult, ProgressSink, RemoteEntry, RemoteEntryKind,
    SftpAuthType, SftpConfig, SmbConfig, TransportKind, UnavailableUploader, UploadProgress,
    UploadRequest, Uploader,
};
