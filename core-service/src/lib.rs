//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (settings and
//! secure storage, the photo library, uploaders, network monitor, background
//! scheduler) into a running [`SyncEngine`]. Desktop apps typically enable the
//! `desktop-shims` feature (which depends on `bridge-desktop`) and call
//! [`bootstrap_desktop`]; mobile hosts inject their own adapters through
//! [`CoreDependencies`].

pub mod background;
pub mod error;

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
mod desktop;

pub use background::{run_background_pass, BackgroundOutcome};
pub use error::{CoreError, Result};

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub use desktop::{bootstrap_desktop, DesktopOptions};

use std::sync::Arc;

use bridge_traits::{
    media::AssetSource,
    transfer::{ConnectionConfig, Uploader},
};
use core_runtime::{
    config::CoreConfig,
    events::{EventBus, EventStream},
};
use core_sync::{EngineDependencies, KeyValueSyncRepository, SyncEngine};
use tracing::info;

/// Aggregated handle to all bridge dependencies the core requires.
pub struct CoreDependencies {
    pub config: CoreConfig,
    pub asset_source: Arc<dyn AssetSource>,
    /// One per transport; a missing transport fails its uploads with a
    /// "not available" message instead of refusing to start.
    pub uploaders: Vec<Arc<dyn Uploader>>,
}

impl CoreDependencies {
    pub fn new(config: CoreConfig, asset_source: Arc<dyn AssetSource>) -> Self {
        Self {
            config,
            asset_source,
            uploaders: Vec::new(),
        }
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn Uploader>) -> Self {
        self.uploaders.push(uploader);
        self
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    engine: Arc<SyncEngine>,
}

impl CoreService {
    /// Build the engine from validated dependencies. Nothing is loaded until
    /// [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Runtime`] if the configuration is inconsistent
    pub fn new(deps: CoreDependencies) -> Result<Self> {
        let CoreDependencies {
            config,
            asset_source,
            uploaders,
        } = deps;
        config.validate()?;

        let repository = Arc::new(KeyValueSyncRepository::new(
            Arc::clone(&config.settings_store),
            Arc::clone(&config.secure_store),
        ));
        let background_executor = if config.features.enable_background_sync {
            config.background_executor.clone()
        } else {
            None
        };

        info!(
            data_dir = ?config.data_dir,
            uploaders = uploaders.len(),
            background = background_executor.is_some(),
            "Creating sync engine"
        );

        let engine = SyncEngine::new(EngineDependencies {
            repository,
            asset_source,
            uploaders,
            network_monitor: config.network_monitor.clone(),
            background_executor,
            event_bus: EventBus::new(config.event_buffer_size),
            clock: Arc::clone(&config.clock),
        });

        Ok(Self {
            engine: Arc::new(engine),
        })
    }

    /// Load persisted state, then run the once-per-launch sync if enabled.
    ///
    /// Returns the number of items uploaded by the launch sync.
    pub async fn start(&self) -> usize {
        self.engine.initialize().await;
        self.engine.run_launch_sync().await
    }

    /// Validate, persist and activate a connection.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Sync`] if the settings could not be stored
    pub async fn configure_connection(&self, connection: ConnectionConfig) -> Result<()> {
        self.engine.save_connection_settings(connection).await?;
        Ok(())
    }

    /// Run one silent background pass and classify the result for the OS.
    pub async fn run_background_task(&self) -> BackgroundOutcome {
        run_background_pass(Arc::clone(&self.engine)).await
    }

    pub fn engine(&self) -> Arc<SyncEngine> {
        Arc::clone(&self.engine)
    }

    /// Subscribe to engine events.
    pub fn events(&self) -> EventStream {
        self.engine.subscribe()
    }
}
