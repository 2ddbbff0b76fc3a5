//! Desktop bootstrap: SQLite settings, OS keychain, folder library, mounted
//! shares and the in-process background scheduler.

use crate::{run_background_pass, CoreDependencies, CoreError, CoreService, Result};
use bridge_desktop::{
    default_data_dir, DesktopNetworkMonitor, DirectoryAssetSource, KeyringSecureStore,
    MountedShareUploader, SqliteSettingsStore, TokioBackgroundExecutor,
};
use bridge_traits::{transfer::TransportKind, NetworkMonitor};
use core_runtime::config::CoreConfig;
use core_sync::BACKGROUND_TASK_NAME;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info};

/// Host-chosen locations for the desktop adapters.
#[derive(Debug, Clone, Default)]
pub struct DesktopOptions {
    /// Defaults to the per-user data directory
    pub data_dir: Option<PathBuf>,
    /// Folder scanned as the photo library; defaults to the Pictures folder
    pub library_root: Option<PathBuf>,
    /// Where the SMB share is mounted
    pub smb_mount: Option<PathBuf>,
    /// Where the SFTP server is mounted (SSHFS)
    pub sftp_mount: Option<PathBuf>,
    /// `host:port` used for the reachability check
    pub network_target: Option<String>,
}

/// Assemble a [`CoreService`] from the desktop adapters.
///
/// The background handler is registered before returning; call
/// [`CoreService::start`] to load state and schedule it.
///
/// # Errors
///
/// Returns [`CoreError::InitializationFailed`] when no library folder can be
/// determined or the settings database cannot be opened
pub async fn bootstrap_desktop(options: DesktopOptions) -> Result<CoreService> {
    let data_dir = options.data_dir.unwrap_or_else(default_data_dir);

    let library = match options.library_root {
        Some(root) => DirectoryAssetSource::new(root),
        None => DirectoryAssetSource::pictures().ok_or_else(|| {
            CoreError::InitializationFailed(
                "No Pictures folder found. Set DesktopOptions::library_root.".to_string(),
            )
        })?,
    };

    let settings_store = SqliteSettingsStore::new(data_dir.join("settings.db"))
        .await
        .map_err(|e| CoreError::InitializationFailed(format!("Settings store: {}", e)))?;

    let network_monitor: Arc<dyn NetworkMonitor> = Arc::new(match options.network_target {
        Some(target) => DesktopNetworkMonitor::with_target(target, Duration::from_secs(3)),
        None => DesktopNetworkMonitor::new(),
    });
    let executor = Arc::new(TokioBackgroundExecutor::with_network_monitor(Some(
        Arc::clone(&network_monitor),
    )));

    let config = CoreConfig::builder()
        .data_dir(data_dir)
        .settings_store(Arc::new(settings_store))
        .secure_store(Arc::new(KeyringSecureStore::new()))
        .network_monitor(network_monitor)
        .background_executor(executor.clone())
        .enable_network_awareness(true)
        .enable_background_sync(true)
        .build()?;

    info!(library = ?library.root(), "Bootstrapping desktop core");

    let mut deps = CoreDependencies::new(config, Arc::new(library));
    if let Some(mount) = options.smb_mount {
        deps = deps.with_uploader(Arc::new(MountedShareUploader::new(TransportKind::Smb, mount)));
    }
    if let Some(mount) = options.sftp_mount {
        deps = deps.with_uploader(Arc::new(MountedShareUploader::new(TransportKind::Sftp, mount)));
    }

    let service = CoreService::new(deps)?;

    // Weak so the executor's handler does not keep the engine alive
    let engine = Arc::downgrade(&service.engine());
    executor
        .register_task_handler(BACKGROUND_TASK_NAME, move || {
            let engine: Weak<_> = engine.clone();
            async move {
                match engine.upgrade() {
                    Some(engine) => {
                        let outcome = run_background_pass(engine).await;
                        debug!(outcome = outcome.as_str(), "Desktop background task finished");
                    }
                    None => debug!("Engine dropped; skipping background task"),
                }
                Ok(())
            }
        })
        .await;

    Ok(service)
}
