//! # Core Configuration Module
//!
//! Provides configuration management for the PhotoSync core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the host bridges and runtime settings the sync engine
//! needs. It enforces fail-fast validation so a missing capability is reported
//! at startup rather than on the first upload.
//!
//! ## Required Dependencies
//!
//! - `SecureStore` - Transport passwords and private keys
//! - `SettingsStore` - Sync settings, connection settings, queue, activity log
//!
//! ## Optional Dependencies
//!
//! - `NetworkMonitor` - Required to honour the Wi-Fi only policy
//! - `BackgroundExecutor` - Periodic background uploads
//! - `Clock` - Defaults to the system clock
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults for
//! `SecureStore` and `SettingsStore` are injected automatically if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .data_dir("/home/me/.local/share/photosync")
//!     .network_monitor(Arc::new(DesktopNetworkMonitor::new()))
//!     .enable_network_awareness(true)
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // Panics with an actionable error message
//! let config = CoreConfig::builder()
//!     .build()
//!     .expect("Should fail - missing data directory");
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{
    BackgroundExecutor, Clock, NetworkMonitor, SecureStore, SettingsStore, SystemClock,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Core configuration for the PhotoSync core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Directory for the settings database and other local state
    pub data_dir: PathBuf,

    /// Secure credential storage (required)
    pub secure_store: Arc<dyn SecureStore>,

    /// Durable key-value storage (required)
    pub settings_store: Arc<dyn SettingsStore>,

    /// Network connectivity monitor (optional)
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,

    /// Background task executor (optional)
    pub background_executor: Option<Arc<dyn BackgroundExecutor>>,

    /// Time source
    pub clock: Arc<dyn Clock>,

    /// Per-subscriber buffer of the event bus
    pub event_buffer_size: usize,

    pub features: FeatureFlags,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("data_dir", &self.data_dir)
            .field("secure_store", &"SecureStore { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .field(
                "network_monitor",
                &self
                    .network_monitor
                    .as_ref()
                    .map(|_| "NetworkMonitor { ... }"),
            )
            .field(
                "background_executor",
                &self
                    .background_executor
                    .as_ref()
                    .map(|_| "BackgroundExecutor { ... }"),
            )
            .field("event_buffer_size", &self.event_buffer_size)
            .field("features", &self.features)
            .finish()
    }
}

/// Feature flags control optional functionality.
///
/// Enabling a feature requires the corresponding bridge implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureFlags {
    /// Enable periodic background uploads (requires BackgroundExecutor)
    pub enable_background_sync: bool,

    /// Enable the Wi-Fi only policy check (requires NetworkMonitor)
    pub enable_network_awareness: bool,
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Data directory is not empty
    /// - Event buffer is within bounds
    /// - Feature flags are consistent with available bridges
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::Config("Data directory cannot be empty".to_string()));
        }

        if self.event_buffer_size == 0 || self.event_buffer_size > 10_000 {
            return Err(Error::Config(
                "Event buffer size must be between 1 and 10,000".to_string(),
            ));
        }

        if self.features.enable_background_sync && self.background_executor.is_none() {
            return Err(Error::Config(
                "Background sync enabled but no BackgroundExecutor provided. \
                 Disable the feature or inject a BackgroundExecutor implementation."
                    .to_string(),
            ));
        }

        if self.features.enable_network_awareness && self.network_monitor.is_none() {
            return Err(Error::Config(
                "Network awareness enabled but no NetworkMonitor provided. \
                 Disable the feature or inject a NetworkMonitor implementation."
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Location of the default SQLite settings database
    pub fn settings_db_path(&self) -> PathBuf {
        settings_db_path(&self.data_dir)
    }
}

fn settings_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("settings.db")
}

#[cfg(not(feature = "desktop-shims"))]
fn secure_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SecureStore".to_string(),
        message: "SecureStore implementation is required for transport credentials. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default KeyringSecureStore. \
                 Mobile: inject platform-native secure storage (Keychain/Keystore)."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn settings_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "SettingsStore implementation is required for the upload queue and settings. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default SqliteSettingsStore. \
                 Mobile: inject platform-native settings (UserDefaults/DataStore)."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    use bridge_desktop::KeyringSecureStore;

    let store: Arc<dyn SecureStore> = Arc::new(KeyringSecureStore::new());
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Err(secure_store_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_settings_store(data_dir: &Path) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::SqliteSettingsStore;
    use std::thread;
    use tokio::runtime::{Builder, Handle};

    let path = settings_db_path(data_dir);

    let init_store = |path: PathBuf| -> Result<_> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                Error::Internal(format!(
                    "Failed to create Tokio runtime for default settings store: {}",
                    e
                ))
            })?;

        runtime
            .block_on(SqliteSettingsStore::new(path))
            .map_err(|e| Error::bridge("SettingsStore", e))
    };

    // block_on panics inside a runtime, so build on a helper thread there
    let store = match Handle::try_current() {
        Ok(_) => thread::spawn(move || init_store(path))
            .join()
            .map_err(|_| {
                Error::Internal(
                    "Worker thread panicked while creating default SettingsStore".to_string(),
                )
            })??,
        Err(_) => init_store(path)?,
    };

    let store: Arc<dyn SettingsStore> = Arc::new(store);
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_settings_store(_data_dir: &Path) -> Result<Arc<dyn SettingsStore>> {
    Err(settings_store_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    data_dir: Option<PathBuf>,
    secure_store: Option<Arc<dyn SecureStore>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    background_executor: Option<Arc<dyn BackgroundExecutor>>,
    clock: Option<Arc<dyn Clock>>,
    event_buffer_size: Option<usize>,
    features: FeatureFlags,
}

impl CoreConfigBuilder {
    /// Sets the directory used for local state.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().data_dir("/var/lib/photosync");
    /// ```
    pub fn data_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// Sets the secure store implementation.
    ///
    /// Required unless the `desktop-shims` feature provides the keyring default.
    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    /// Sets the settings store implementation.
    ///
    /// Required unless the `desktop-shims` feature provides the SQLite default.
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    pub fn background_executor(mut self, executor: Arc<dyn BackgroundExecutor>) -> Self {
        self.background_executor = Some(executor);
        self
    }

    /// Overrides the time source (tests, replays).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Enables periodic background uploads.
    ///
    /// Requires a `BackgroundExecutor`.
    pub fn enable_background_sync(mut self, enabled: bool) -> Self {
        self.features.enable_background_sync = enabled;
        self
    }

    /// Enables the Wi-Fi only policy check.
    ///
    /// Requires a `NetworkMonitor`.
    pub fn enable_network_awareness(mut self, enabled: bool) -> Self {
        self.features.enable_network_awareness = enabled;
        self
    }

    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when the data directory is missing or the feature
    ///   flags do not match the provided bridges
    /// - [`Error::CapabilityMissing`] when a required store is missing and no
    ///   platform default is available
    pub fn build(self) -> Result<CoreConfig> {
        let data_dir = self.data_dir.ok_or_else(|| {
            Error::Config("Data directory is required. Use .data_dir() to set it.".to_string())
        })?;

        let secure_store = match self.secure_store {
            Some(store) => store,
            None => provide_default_secure_store()?,
        };

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(&data_dir)?,
        };

        let config = CoreConfig {
            data_dir,
            secure_store,
            settings_store,
            network_monitor: self.network_monitor,
            background_executor: self.background_executor,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            features: self.features,
        };

        config.validate()?;

        Ok(config)
    }
}
