//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `SettingsStore` using an SQLite-backed key-value table
//! - `SecureStore` using the `keyring` crate
//! - `NetworkMonitor` using a TCP reachability check
//! - `BackgroundExecutor` using the Tokio timer wheel
//! - `AssetSource` over a local folder tree
//! - `Uploader` writing into a locally mounted SMB/SSHFS share
//!
//! ## Feature Flags
//!
//! - `secure-store`: Enable OS keychain integration (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DirectoryAssetSource, MountedShareUploader, SqliteSettingsStore};
//! use bridge_traits::TransportKind;
//!
//! #[tokio::main]
//! async fn main() {
//!     let settings = SqliteSettingsStore::new(bridge_desktop::default_data_dir().join("settings.db"))
//!         .await
//!         .unwrap();
//!     let library = DirectoryAssetSource::new("/home/alice/Pictures");
//!     let smb = MountedShareUploader::new(TransportKind::Smb, "/mnt/nas");
//! }
//! ```

mod background;
mod media_source;
mod network;
mod settings;
mod uploader;

#[cfg(feature = "secure-store")]
mod secure_store;

use std::path::PathBuf;

pub use background::TokioBackgroundExecutor;
pub use media_source::{media_type_for, DirectoryAssetSource};
pub use network::DesktopNetworkMonitor;
pub use settings::SqliteSettingsStore;
pub use uploader::MountedShareUploader;

#[cfg(feature = "secure-store")]
pub use secure_store::{KeyringSecureStore, DEFAULT_SERVICE_NAME};

/// Per-user data directory for the settings database.
///
/// Falls back to `./photosync` when the platform reports no data directory.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("photosync"))
        .unwrap_or_else(|| PathBuf::from("photosync"))
}
