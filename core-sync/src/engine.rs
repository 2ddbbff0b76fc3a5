//! # Sync Engine
//!
//! Owns the upload queue and drives discovery and upload runs.
//!
//! ## Overview
//!
//! The `SyncEngine` is the single writer for all sync state. It coordinates:
//! - Incremental discovery through the host [`AssetSource`]
//! - Sequential, oldest-first uploads through the active [`Uploader`]
//! - The Wi-Fi only network policy
//! - Cumulative per-item retry budgets and cooperative cancellation
//! - Age-based cleanup of completed items
//! - Persistence of every mutation through a [`SyncStateRepository`]
//! - The user-visible activity log and [`CoreEvent`] emission
//!
//! ## Single Flight
//!
//! At most one scan or upload run is active at any instant. A second request
//! while one is running returns `0` without touching the queue. The phase is
//! reset to idle and the cancellation flag cleared on every exit path,
//! including panics and dropped futures.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{RunOptions, SyncEngine};
//!
//! # async fn example(engine: &SyncEngine) {
//! engine.initialize().await;
//! let uploaded = engine.run_sync(RunOptions::manual()).await;
//! println!("Uploaded {} item(s)", uploaded);
//! # }
//! ```

use crate::{
    activity::ActivityLog,
    model::{
        QueueCounts, RunOptions, SyncLogEntry, SyncLogLevel, SyncMetadata, SyncPhase,
        UploadItem,
    },
    network_gate::{self, GateDecision},
    queue::UploadQueue,
    remote_path::{build_remote_path, normalize_listing_path},
    repository::SyncStateRepository,
    scheduler::BackgroundRegistration,
    settings::{clamp_port, SyncSettings},
    state::{derive_sync_state, SyncState},
    Result, SyncError,
};
use bridge_traits::{
    background::BackgroundExecutor,
    media::{AssetSource, PermissionState},
    network::NetworkMonitor,
    time::Clock,
    transfer::{
        ConnectionConfig, ConnectionTestResult, ProgressSink, RemoteEntry, SftpConfig, SmbConfig,
        TransportKind, UnavailableUploader, UploadProgress, UploadRequest, Uploader,
    },
};
use core_runtime::events::{
    ActivityEvent, CoreEvent, EventBus, EventStream, QueueEvent, SyncEvent,
};
use core_runtime::logging::strip_path;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex as SyncMutex};
use std::time::Instant;
use tokio::sync::{mpsc, Mutex, MutexGuard, RwLock};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Collaborators the engine is built from
pub struct EngineDependencies {
    pub repository: Arc<dyn SyncStateRepository>,
    pub asset_source: Arc<dyn AssetSource>,
    /// One uploader per transport; missing transports get an
    /// [`UnavailableUploader`]
    pub uploaders: Vec<Arc<dyn Uploader>>,
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,
    pub background_executor: Option<Arc<dyn BackgroundExecutor>>,
    pub event_bus: EventBus,
    pub clock: Arc<dyn Clock>,
}

/// Mutable state guarded by the engine's state lock
#[derive(Default)]
struct EngineState {
    settings: SyncSettings,
    smb_config: SmbConfig,
    sftp_config: SftpConfig,
    smb_password: String,
    sftp_secret: String,
    metadata: SyncMetadata,
    queue: UploadQueue,
    logs: ActivityLog,
    permission: PermissionState,
}

impl EngineState {
    fn connection(&self, transport: TransportKind) -> ConnectionConfig {
        match transport {
            TransportKind::Smb => ConnectionConfig::Smb {
                config: self.smb_config.clone(),
                password: self.smb_password.clone(),
            },
            TransportKind::Sftp => ConnectionConfig::Sftp {
                config: self.sftp_config.clone(),
                secret: self.sftp_secret.clone(),
            },
        }
    }

    fn active_connection(&self) -> ConnectionConfig {
        self.connection(self.settings.transport)
    }
}

/// Tally of one upload run
#[derive(Debug, Default)]
struct RunTally {
    uploaded: usize,
    failed: usize,
    stopped_early: bool,
    max_synced_time: Option<i64>,
}

/// Photo library to file server sync engine
pub struct SyncEngine {
    /// Persistence for settings, queue, logs and metadata
    repository: Arc<dyn SyncStateRepository>,

    /// Local media enumeration
    asset_source: Arc<dyn AssetSource>,

    /// Registered uploaders by transport
    uploaders: RwLock<HashMap<TransportKind, Arc<dyn Uploader>>>,

    /// Network monitor for the Wi-Fi only policy
    network_monitor: Option<Arc<dyn NetworkMonitor>>,

    /// Platform scheduler registration, if background execution exists
    background: Option<BackgroundRegistration>,

    event_bus: EventBus,
    clock: Arc<dyn Clock>,

    state: Mutex<EngineState>,

    /// Current [`SyncPhase`], readable without the state lock
    phase: AtomicU8,

    /// Stop the run loop at the next item boundary
    cancel_requested: AtomicBool,

    launch_started: AtomicBool,

    /// Held for the whole duration of a scan or upload run
    flight: Mutex<()>,

    /// Item between `begin_attempt` and its terminal status
    in_flight: SyncMutex<Option<String>>,

    /// Items whose run was dropped mid-upload, failed on next state access
    interrupted: SyncMutex<Vec<String>>,
}

/// Restores the idle phase when a scan or run ends, however it ends.
struct PhaseReset<'a> {
    engine: &'a SyncEngine,
}

impl<'a> PhaseReset<'a> {
    fn new(engine: &'a SyncEngine) -> Self {
        Self { engine }
    }
}

impl Drop for PhaseReset<'_> {
    fn drop(&mut self) {
        // An aborted upload future leaves its item in `uploading`.
        if let Some(id) = lock_sync(&self.engine.in_flight).take() {
            warn!("Run ended during upload of {}", id);
            lock_sync(&self.engine.interrupted).push(id);
        }

        self.engine.set_phase(SyncPhase::Idle);
        self.engine.cancel_requested.store(false, Ordering::SeqCst);
    }
}

fn lock_sync<T>(mutex: &SyncMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SyncEngine {
    pub fn new(deps: EngineDependencies) -> Self {
        let uploaders = deps
            .uploaders
            .into_iter()
            .map(|uploader| (uploader.transport(), uploader))
            .collect();

        Self {
            repository: deps.repository,
            asset_source: deps.asset_source,
            uploaders: RwLock::new(uploaders),
            network_monitor: deps.network_monitor,
            background: deps.background_executor.map(BackgroundRegistration::new),
            event_bus: deps.event_bus,
            clock: deps.clock,
            state: Mutex::new(EngineState::default()),
            phase: AtomicU8::new(SyncPhase::Idle.as_u8()),
            cancel_requested: AtomicBool::new(false),
            launch_started: AtomicBool::new(false),
            flight: Mutex::new(()),
            in_flight: SyncMutex::new(None),
            interrupted: SyncMutex::new(Vec::new()),
        }
    }

    /// Register (or replace) the uploader for its transport
    pub async fn register_uploader(&self, uploader: Arc<dyn Uploader>) {
        let kind = uploader.transport();
        let name = uploader.implementation_name().to_string();
        self.uploaders.write().await.insert(kind, uploader);
        info!("Registered uploader: {} ({})", kind, name);
    }

    async fn uploader_for(&self, kind: TransportKind) -> Arc<dyn Uploader> {
        match self.uploaders.read().await.get(&kind) {
            Some(uploader) => uploader.clone(),
            None => Arc::new(UnavailableUploader::new(kind)),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Load persisted state and prepare the engine.
    ///
    /// Items left `uploading` by a killed process become `failed`. Load
    /// failures keep defaults and are reported in the activity log; the
    /// engine is usable afterwards either way.
    #[instrument(skip(self))]
    pub async fn initialize(&self) {
        match self.repository.load_snapshot().await {
            Ok(snapshot) => {
                let now = self.now();
                let mut state = self.lock_state().await;

                let mut queue = UploadQueue::from_items(snapshot.queue);
                let recovered = queue.recover_interrupted();
                let removed =
                    queue.cleanup_completed(snapshot.settings.clear_completed_after_days, now);

                state.settings = snapshot.settings;
                state.smb_config = snapshot.smb_config;
                state.sftp_config = snapshot.sftp_config;
                state.smb_password = snapshot.smb_password;
                state.sftp_secret = snapshot.sftp_secret;
                state.metadata = snapshot.metadata;
                state.logs = ActivityLog::from_entries(snapshot.logs);
                state.queue = queue;

                if recovered > 0 {
                    info!("Recovered {} interrupted upload(s)", recovered);
                }
                if recovered > 0 || removed > 0 {
                    self.persist_queue(&state).await;
                }
                self.emit_queue_changed(&state);
                debug!(
                    "Loaded {} queued item(s), {} log entries",
                    state.queue.len(),
                    state.logs.len()
                );
            }
            Err(e) => {
                self.log(
                    SyncLogLevel::Error,
                    format!("Failed to load initial state: {e}"),
                )
                .await;
            }
        }

        let permission = self
            .asset_source
            .permission_state()
            .await
            .unwrap_or(PermissionState::Unknown);
        self.set_permission(permission).await;

        self.apply_background_registration().await;
    }

    /// Run the launch sync once per engine if enabled in settings.
    pub async fn run_launch_sync(&self) -> usize {
        if !self.lock_state().await.settings.auto_scan_on_launch {
            return 0;
        }
        if self.launch_started.swap(true, Ordering::SeqCst) {
            return 0;
        }
        self.run_sync(RunOptions::launch()).await
    }

    /// Entry point for the platform background task.
    pub async fn run_background_sync(&self) -> usize {
        self.run_sync(RunOptions::background()).await
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Ask the host for photo library access.
    pub async fn request_permission(&self) -> PermissionState {
        let permission = self
            .asset_source
            .request_permission()
            .await
            .unwrap_or(PermissionState::Denied);
        self.set_permission(permission).await;

        if permission == PermissionState::Granted {
            self.log(SyncLogLevel::Info, "Photo library permission granted.")
                .await;
        } else {
            self.log(
                SyncLogLevel::Error,
                "Photo library permission was not granted.",
            )
            .await;
        }
        permission
    }

    /// Persist connection settings and make their transport active.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings could not be persisted
    pub async fn save_connection_settings(&self, connection: ConnectionConfig) -> Result<()> {
        let mut state = self.lock_state().await;
        let kind = connection.kind();

        match connection {
            ConnectionConfig::Smb { config, password } => {
                let mut config = config.sanitized();
                config.port = clamp_port(config.port);
                self.repository.save_smb_config(&config).await?;
                self.repository.save_secret(kind, &password).await?;
                state.smb_config = config;
                state.smb_password = password.trim().to_string();
            }
            ConnectionConfig::Sftp { config, secret } => {
                let mut config = config.sanitized();
                config.port = clamp_port(config.port);
                self.repository.save_sftp_config(&config).await?;
                self.repository.save_secret(kind, &secret).await?;
                state.sftp_config = config;
                state.sftp_secret = secret.trim().to_string();
            }
        }

        if state.settings.transport != kind {
            state.settings.transport = kind;
            self.repository.save_settings(&state.settings).await?;
        }

        self.append_log(&mut state, SyncLogLevel::Info, "Connection settings saved.")
            .await;
        self.emit(CoreEvent::Activity(ActivityEvent::SettingsSaved {
            section: "connection".to_string(),
        }));
        Ok(())
    }

    /// Normalize and persist sync policy, then re-apply dependent state.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings could not be persisted
    pub async fn save_sync_settings(&self, settings: SyncSettings) -> Result<SyncSettings> {
        let normalized = settings.normalized();
        {
            let mut state = self.lock_state().await;
            self.repository.save_settings(&normalized).await?;
            state.settings = normalized.clone();

            self.cleanup_locked(&mut state, true).await;
            self.append_log(&mut state, SyncLogLevel::Info, "Sync settings saved.")
                .await;
        }
        self.emit(CoreEvent::Activity(ActivityEvent::SettingsSaved {
            section: "sync".to_string(),
        }));

        self.apply_background_registration().await;
        Ok(normalized)
    }

    /// Discover new media and merge it into the queue.
    ///
    /// Returns the number of items added, or `0` when another scan or run is
    /// active.
    #[instrument(skip(self))]
    pub async fn scan_for_new_media(&self) -> usize {
        let Ok(_flight) = self.flight.try_lock() else {
            debug!("Scan requested while another operation is active");
            return 0;
        };
        let _reset = PhaseReset::new(self);
        self.discover(false).await
    }

    /// Run one upload pass. Returns the number of items uploaded.
    #[instrument(skip(self), fields(trigger = ?options.trigger, silent = options.silent))]
    pub async fn run_sync(&self, options: RunOptions) -> usize {
        let Ok(_flight) = self.flight.try_lock() else {
            debug!("Sync requested while another operation is active");
            return 0;
        };
        let _reset = PhaseReset::new(self);
        self.cancel_requested.store(false, Ordering::SeqCst);

        let (connection, settings) = {
            let state = self.lock_state().await;
            (state.active_connection(), state.settings.clone())
        };

        if let Some(first) = connection.validate().into_iter().next() {
            self.log(SyncLogLevel::Error, first).await;
            return 0;
        }

        if let GateDecision::Blocked(reason) =
            network_gate::evaluate(settings.wifi_only, self.network_monitor.as_deref()).await
        {
            self.log(SyncLogLevel::Error, reason).await;
            return 0;
        }

        self.apply_cleanup(true).await;

        let max_retry_attempts = settings.max_retry_attempts;
        let mut pending = self.pending_ids(max_retry_attempts).await;
        if pending.is_empty() {
            // The run reports "Nothing to upload." itself.
            self.discover(true).await;
            pending = self.pending_ids(max_retry_attempts).await;
        }

        if pending.is_empty() {
            if !options.silent {
                self.log(SyncLogLevel::Info, "Nothing to upload.").await;
            }
            return 0;
        }

        self.set_phase(SyncPhase::Syncing);
        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        self.emit(CoreEvent::Sync(SyncEvent::RunStarted {
            run_id: run_id.clone(),
            trigger: options.trigger.map(|t| t.as_str().to_string()),
            pending_items: pending.len() as u64,
        }));
        info!("Starting upload run {} with {} item(s)", run_id, pending.len());

        let uploader = self.uploader_for(connection.kind()).await;
        let tally = self
            .upload_pending(&run_id, pending, &connection, &settings, uploader.as_ref())
            .await;

        {
            let now = self.now();
            let mut state = self.lock_state().await;
            state.metadata = SyncMetadata {
                last_synced_asset_time: state
                    .metadata
                    .last_synced_asset_time
                    .max(tally.max_synced_time),
                last_completed_at: Some(now),
            };
            if let Err(e) = self.repository.save_metadata(&state.metadata).await {
                warn!("Failed to persist sync metadata: {}", e);
            }
        }

        self.apply_cleanup(true).await;

        if tally.uploaded > 0 {
            let message = match options.trigger {
                Some(trigger) => {
                    format!("Uploaded {} item(s) ({}).", tally.uploaded, trigger.as_str())
                }
                None => format!("Uploaded {} item(s).", tally.uploaded),
            };
            self.log(SyncLogLevel::Info, message).await;
        } else if !options.silent {
            self.log(
                SyncLogLevel::Info,
                "Upload run finished without successful uploads.",
            )
            .await;
        }

        self.emit(CoreEvent::Sync(SyncEvent::RunFinished {
            run_id,
            uploaded: tally.uploaded as u64,
            failed: tally.failed as u64,
            stopped_early: tally.stopped_early,
            duration_ms: started.elapsed().as_millis() as u64,
        }));

        tally.uploaded
    }

    /// Stop the current run after the in-flight item finishes.
    ///
    /// Only accepted while syncing; returns whether the request was taken.
    pub fn request_cancel_after_current_item(&self) -> bool {
        if self.phase() != SyncPhase::Syncing {
            return false;
        }
        self.cancel_requested.store(true, Ordering::SeqCst);
        info!("Cancellation requested after current item");
        true
    }

    /// Move one failed item back to pending if its retry budget allows.
    pub async fn retry_item(&self, id: &str) -> bool {
        let mut state = self.lock_state().await;
        let max = state.settings.max_retry_attempts;
        let retried = state.queue.retry_item(id, max);
        if retried {
            self.persist_queue(&state).await;
            self.emit_queue_changed(&state);
        }
        retried
    }

    /// Move every retryable failed item back to pending.
    pub async fn retry_all_failed(&self) -> usize {
        let mut state = self.lock_state().await;
        let max = state.settings.max_retry_attempts;
        let retried = state.queue.retry_all_failed(max);
        if retried > 0 {
            self.persist_queue(&state).await;
            self.emit_queue_changed(&state);
            self.append_log(
                &mut state,
                SyncLogLevel::Info,
                format!("Moved {retried} failed item(s) back to pending."),
            )
            .await;
        }
        retried
    }

    pub async fn clear_completed(&self) -> usize {
        self.remove_items(UploadQueue::clear_completed).await
    }

    pub async fn clear_failed(&self) -> usize {
        self.remove_items(UploadQueue::clear_failed).await
    }

    /// Remove every item except one currently uploading.
    pub async fn clear_all(&self) -> usize {
        self.remove_items(UploadQueue::clear_all).await
    }

    /// Apply the age-based cleanup now and report what was removed.
    pub async fn apply_auto_cleanup(&self) -> usize {
        self.apply_cleanup(false).await
    }

    /// Test a connection without saving it. Uses the active connection when
    /// `target` is `None`.
    pub async fn test_connection(&self, target: Option<ConnectionConfig>) -> ConnectionTestResult {
        let connection = match target {
            Some(connection) => connection,
            None => self.lock_state().await.active_connection(),
        };

        if let Some(first) = connection.validate().into_iter().next() {
            return ConnectionTestResult::failure(first);
        }

        let uploader = self.uploader_for(connection.kind()).await;
        let result = uploader.test_connection(&connection).await;
        debug!(
            "Connection test against {} via {}: ok={}",
            connection.host(),
            uploader.implementation_name(),
            result.ok
        );
        result
    }

    /// List a directory on the active remote. `None` lists the configured
    /// base path.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` with the first validation message when the
    /// active connection is incomplete, or `Transport` when listing fails
    pub async fn list_remote_directory(&self, path: Option<&str>) -> Result<Vec<RemoteEntry>> {
        let connection = self.lock_state().await.active_connection();

        if let Some(first) = connection.validate().into_iter().next() {
            return Err(SyncError::InvalidConfig(first));
        }

        let path = normalize_listing_path(path.unwrap_or(connection.remote_path()));
        let uploader = self.uploader_for(connection.kind()).await;
        uploader
            .list_directory(&connection, &path)
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn phase(&self) -> SyncPhase {
        SyncPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    pub async fn permission_state(&self) -> PermissionState {
        self.lock_state().await.permission
    }

    /// Snapshot of the queue, oldest first
    pub async fn queue(&self) -> Vec<UploadItem> {
        self.lock_state().await.queue.items().to_vec()
    }

    pub async fn queue_counts(&self) -> QueueCounts {
        self.lock_state().await.queue.counts()
    }

    /// Activity log, newest first
    pub async fn logs(&self) -> Vec<SyncLogEntry> {
        self.lock_state().await.logs.entries()
    }

    pub async fn metadata(&self) -> SyncMetadata {
        self.lock_state().await.metadata
    }

    pub async fn settings(&self) -> SyncSettings {
        self.lock_state().await.settings.clone()
    }

    pub async fn smb_config(&self) -> SmbConfig {
        self.lock_state().await.smb_config.clone()
    }

    pub async fn sftp_config(&self) -> SftpConfig {
        self.lock_state().await.sftp_config.clone()
    }

    /// Stored connection, including its secret, for a transport
    pub async fn connection(&self, transport: TransportKind) -> ConnectionConfig {
        self.lock_state().await.connection(transport)
    }

    pub async fn sync_state(&self) -> SyncState {
        let phase = self.phase();
        derive_sync_state(phase, &self.lock_state().await.queue)
    }

    /// Name of the uploader serving the active transport
    pub async fn uploader_implementation(&self) -> String {
        let kind = self.lock_state().await.settings.transport;
        self.uploader_for(kind)
            .await
            .implementation_name()
            .to_string()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Lock the engine state, first failing any item a dropped run left
    /// `uploading`.
    async fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        let mut state = self.state.lock().await;

        let interrupted = std::mem::take(&mut *lock_sync(&self.interrupted));
        let recovered = interrupted
            .iter()
            .filter(|id| state.queue.recover_item(id))
            .count();
        if recovered > 0 {
            info!("Marked {} interrupted upload(s) as failed", recovered);
            self.persist_queue(&state).await;
            self.emit_queue_changed(&state);
        }
        state
    }

    fn now(&self) -> i64 {
        self.clock.unix_timestamp_millis()
    }

    fn emit(&self, event: CoreEvent) {
        self.event_bus.emit(event).ok();
    }

    fn set_phase(&self, phase: SyncPhase) {
        let previous = self.phase.swap(phase.as_u8(), Ordering::SeqCst);
        if previous != phase.as_u8() {
            debug!("Phase changed to {}", phase.as_str());
            self.emit(CoreEvent::Sync(SyncEvent::PhaseChanged {
                phase: phase.as_str().to_string(),
            }));
        }
    }

    async fn set_permission(&self, permission: PermissionState) {
        let mut state = self.lock_state().await;
        if state.permission != permission {
            state.permission = permission;
            self.emit(CoreEvent::Activity(ActivityEvent::PermissionChanged {
                state: permission.as_str().to_string(),
            }));
        }
    }

    async fn pending_ids(&self, max_retry_attempts: u32) -> Vec<String> {
        self.lock_state().await.queue.pending_ids(max_retry_attempts)
    }

    async fn log(&self, level: SyncLogLevel, message: impl Into<String>) {
        let mut state = self.lock_state().await;
        self.append_log(&mut state, level, message).await;
    }

    async fn append_log(
        &self,
        state: &mut EngineState,
        level: SyncLogLevel,
        message: impl Into<String>,
    ) {
        let message = message.into();
        match level {
            SyncLogLevel::Info => info!(target: "core_sync::activity", "{}", message),
            SyncLogLevel::Error => error!(target: "core_sync::activity", "{}", message),
        }

        let entry = state.logs.push(level, message, self.now());
        self.emit(CoreEvent::Activity(ActivityEvent::LogAppended {
            entry_id: entry.id,
            level: level.as_str().to_string(),
            message: entry.message,
        }));

        if let Err(e) = self.repository.save_logs(&state.logs.entries()).await {
            warn!("Failed to persist activity log: {}", e);
        }
    }

    async fn persist_queue(&self, state: &EngineState) {
        if let Err(e) = self.repository.save_queue(state.queue.items()).await {
            warn!("Failed to persist upload queue: {}", e);
        }
    }

    fn emit_queue_changed(&self, state: &EngineState) {
        let counts = state.queue.counts();
        self.emit(CoreEvent::Queue(QueueEvent::Changed {
            pending: counts.pending,
            uploading: counts.uploading,
            completed: counts.completed,
            failed: counts.failed,
        }));
    }

    async fn remove_items(&self, remove: impl FnOnce(&mut UploadQueue) -> usize) -> usize {
        let mut state = self.lock_state().await;
        let removed = remove(&mut state.queue);
        if removed > 0 {
            self.persist_queue(&state).await;
            self.emit_queue_changed(&state);
        }
        removed
    }

    async fn apply_cleanup(&self, silent: bool) -> usize {
        let mut state = self.lock_state().await;
        self.cleanup_locked(&mut state, silent).await
    }

    async fn cleanup_locked(&self, state: &mut EngineState, silent: bool) -> usize {
        let days = state.settings.clear_completed_after_days;
        let removed = state.queue.cleanup_completed(days, self.now());
        if removed == 0 {
            return 0;
        }

        self.persist_queue(state).await;
        self.emit_queue_changed(state);
        if !silent {
            self.append_log(
                state,
                SyncLogLevel::Info,
                format!("Auto-cleanup removed {removed} completed item(s) older than {days} day(s)."),
            )
            .await;
        }
        removed
    }

    async fn apply_background_registration(&self) {
        let Some(background) = &self.background else {
            return;
        };
        let settings = self.lock_state().await.settings.clone();
        if let Err(e) = background.apply(&settings).await {
            self.log(
                SyncLogLevel::Error,
                format!("Background task registration failed: {e}"),
            )
            .await;
        }
    }

    /// Discovery pass. The caller must hold the flight lock.
    async fn discover(&self, silent: bool) -> usize {
        let (settings, watermark, mut permission) = {
            let state = self.lock_state().await;
            (
                state.settings.clone(),
                state.metadata.last_synced_asset_time,
                state.permission,
            )
        };

        let filter = settings.scan_filter();
        if filter.is_empty() {
            self.log(
                SyncLogLevel::Error,
                "Both media filters are disabled. Enable photos or videos in settings.",
            )
            .await;
            return 0;
        }

        if permission != PermissionState::Granted {
            permission = self
                .asset_source
                .request_permission()
                .await
                .unwrap_or(PermissionState::Denied);
            self.set_permission(permission).await;
        }
        if permission != PermissionState::Granted {
            self.log(
                SyncLogLevel::Error,
                "Cannot scan without photo library permission.",
            )
            .await;
            return 0;
        }

        self.set_phase(SyncPhase::Scanning);

        let created_after = watermark.map(|t| t.saturating_add(1));
        let max_items = settings.max_items_per_run as usize;
        let added = match self
            .asset_source
            .scan_new_assets(created_after, max_items, filter)
            .await
        {
            Ok(assets) => {
                let discovered: Vec<_> = assets
                    .into_iter()
                    .filter(|asset| filter.accepts(asset.media_type))
                    .filter(|asset| created_after.map_or(true, |after| asset.creation_time >= after))
                    .take(max_items)
                    .collect();
                let discovered_count = discovered.len();

                let mut state = self.lock_state().await;
                let added = state.queue.merge_discovered(discovered);
                if added > 0 {
                    self.persist_queue(&state).await;
                    self.emit_queue_changed(&state);
                    self.append_log(
                        &mut state,
                        SyncLogLevel::Info,
                        format!("Discovered {added} new item(s)."),
                    )
                    .await;
                } else if !silent {
                    self.append_log(
                        &mut state,
                        SyncLogLevel::Info,
                        "No new media found for current filters.",
                    )
                    .await;
                }

                self.emit(CoreEvent::Sync(SyncEvent::ScanCompleted {
                    discovered: discovered_count as u64,
                    added: added as u64,
                }));
                added
            }
            Err(e) => {
                self.log(SyncLogLevel::Error, format!("Media scan failed: {e}"))
                    .await;
                0
            }
        };

        self.set_phase(SyncPhase::Idle);
        added
    }

    /// Upload loop over a fixed list of ids, oldest first.
    async fn upload_pending(
        &self,
        run_id: &str,
        pending: Vec<String>,
        connection: &ConnectionConfig,
        settings: &SyncSettings,
        uploader: &dyn Uploader,
    ) -> RunTally {
        let max_retry_attempts = settings.max_retry_attempts;
        let default_base = connection.kind().default_remote_path();
        let mut tally = RunTally::default();

        for id in pending {
            if self.cancel_requested.load(Ordering::SeqCst) {
                self.log(
                    SyncLogLevel::Info,
                    "Sync stopped after current item as requested.",
                )
                .await;
                tally.stopped_early = true;
                break;
            }

            let (item, remote_path) = {
                let mut state = self.lock_state().await;
                let Some(item) = state
                    .queue
                    .begin_attempt(&id, self.now(), max_retry_attempts)
                else {
                    debug!("Skipping {}: no longer eligible", id);
                    continue;
                };
                *lock_sync(&self.in_flight) = Some(item.id.clone());
                let remote_path = build_remote_path(
                    connection.remote_path(),
                    default_base,
                    &item,
                    settings.folder_strategy,
                    settings.filename_strategy,
                );
                self.persist_queue(&state).await;
                self.emit_queue_changed(&state);
                (item, remote_path)
            };

            debug!(
                file = strip_path(&item.local_location),
                remote = %remote_path,
                attempt = item.attempt_count,
                "Uploading item"
            );
            self.emit(CoreEvent::Sync(SyncEvent::ItemStarted {
                run_id: run_id.to_string(),
                item_id: item.id.clone(),
                attempt: item.attempt_count,
                remote_path: remote_path.clone(),
            }));

            let request = item.upload_request(remote_path.clone());
            let outcome = self
                .upload_with_progress(run_id, uploader, connection, &request)
                .await;

            let mut state = self.lock_state().await;
            match outcome {
                Ok(()) => {
                    state.queue.mark_completed(&item.id, self.now());
                    lock_sync(&self.in_flight).take();
                    self.persist_queue(&state).await;
                    self.emit_queue_changed(&state);

                    tally.uploaded += 1;
                    tally.max_synced_time = tally.max_synced_time.max(Some(item.creation_time));
                    self.emit(CoreEvent::Sync(SyncEvent::ItemCompleted {
                        run_id: run_id.to_string(),
                        item_id: item.id.clone(),
                        remote_path,
                    }));
                }
                Err(e) => {
                    let message = e.to_string();
                    state.queue.mark_failed(&item.id, message.clone());
                    lock_sync(&self.in_flight).take();
                    self.persist_queue(&state).await;
                    self.emit_queue_changed(&state);

                    tally.failed += 1;
                    let attempt = item.attempt_count;
                    let exhausted = item.is_retry_exhausted(max_retry_attempts);
                    let detail = if exhausted {
                        "(retry limit reached)".to_string()
                    } else {
                        format!("(attempt {attempt}/{max_retry_attempts})")
                    };
                    self.append_log(
                        &mut state,
                        SyncLogLevel::Error,
                        format!("Failed to upload {}: {} {}", item.filename, message, detail),
                    )
                    .await;
                    self.emit(CoreEvent::Sync(SyncEvent::ItemFailed {
                        run_id: run_id.to_string(),
                        item_id: item.id.clone(),
                        message,
                        attempt,
                        retry_exhausted: exhausted,
                    }));
                }
            }
        }

        tally
    }

    /// Drive one upload while applying its progress reports to the queue.
    async fn upload_with_progress(
        &self,
        run_id: &str,
        uploader: &dyn Uploader,
        connection: &ConnectionConfig,
        request: &UploadRequest,
    ) -> bridge_traits::error::Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<UploadProgress>();
        let sink: ProgressSink = Arc::new(move |progress| {
            tx.send(progress).ok();
        });

        let upload = uploader.upload_file(connection, request, sink);
        tokio::pin!(upload);

        let mut last_percent = None;
        let result = loop {
            tokio::select! {
                result = &mut upload => break result,
                Some(progress) = rx.recv() => {
                    self.apply_progress(run_id, &request.id, progress, &mut last_percent).await;
                }
            }
        };

        while let Ok(progress) = rx.try_recv() {
            self.apply_progress(run_id, &request.id, progress, &mut last_percent)
                .await;
        }
        result
    }

    async fn apply_progress(
        &self,
        run_id: &str,
        item_id: &str,
        progress: UploadProgress,
        last_percent: &mut Option<u8>,
    ) {
        let fraction = {
            let mut state = self.lock_state().await;
            if !state.queue.set_progress(item_id, progress.fraction) {
                return;
            }
            state.queue.get(item_id).map(|item| item.progress)
        };

        let Some(fraction) = fraction else {
            return;
        };
        let percent = (fraction * 100.0).round().clamp(0.0, 100.0) as u8;
        if *last_percent != Some(percent) {
            *last_percent = Some(percent);
            self.emit(CoreEvent::Sync(SyncEvent::ItemProgress {
                run_id: run_id.to_string(),
                item_id: item_id.to_string(),
                percent,
            }));
        }
    }
}
