//! Integration tests for the sync engine
//!
//! These tests drive a `SyncEngine` over in-memory stores, a scripted asset
//! source and a scripted uploader to verify:
//! - Idempotent discovery merge
//! - Single-flight scans and runs
//! - Cumulative retry budgets and retry gating
//! - Cooperative cancellation after the in-flight item
//! - Startup recovery of interrupted uploads
//! - Recovery of uploads abandoned by an aborted run
//! - Store and library failures
//! - Network policy, validation and housekeeping behavior

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result as BridgeResult},
    media::{AssetSource, MediaType, PermissionState, ScanFilter, ScannedAsset},
    network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
    storage::{SecureStore, SettingsStore},
    transfer::{
        ConnectionConfig, ConnectionTestResult, ProgressSink, RemoteEntry, RemoteEntryKind,
        SftpAuthType, SftpConfig, SmbConfig, TransportKind, UploadProgress, UploadRequest,
        Uploader,
    },
    FixedClock,
};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_sync::{
    queue::INTERRUPTED_MESSAGE,
    repository::{LOGS_KEY, QUEUE_KEY},
    EngineDependencies, KeyValueSyncRepository, RunOptions, SyncEngine,
    SyncError, SyncLogLevel, SyncPhase, SyncSettings, SyncState, SyncStateRepository,
    UploadStatus,
};
use mockall::mock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, Notify};

const DAY_MS: i64 = 86_400_000;
const NOW: i64 = 1_710_504_000_000;

// ============================================================================
// Mock Implementations
// ============================================================================

/// Parks the next write to `key` until released
struct WriteGate {
    key: String,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[derive(Default)]
struct MemorySettings {
    values: AsyncMutex<HashMap<String, String>>,
    fail_reads: AtomicBool,
    write_gate: StdMutex<Option<WriteGate>>,
}

impl MemorySettings {
    fn gate_next_write(&self, key: &str, entered: Arc<Notify>, release: Arc<Notify>) {
        *self.write_gate.lock().unwrap() = Some(WriteGate {
            key: key.to_string(),
            entered,
            release,
        });
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
        let gate = {
            let mut gate = self.write_gate.lock().unwrap();
            if gate.as_ref().is_some_and(|g| g.key == key) {
                gate.take()
            } else {
                None
            }
        };
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("disk locked".to_string()));
        }
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set_bool(&self, key: &str, value: bool) -> BridgeResult<()> {
        self.set_string(key, &value.to_string()).await
    }

    async fn get_bool(&self, key: &str) -> BridgeResult<Option<bool>> {
        Ok(self.get_string(key).await?.and_then(|v| v.parse().ok()))
    }

    async fn set_i64(&self, key: &str, value: i64) -> BridgeResult<()> {
        self.set_string(key, &value.to_string()).await
    }

    async fn get_i64(&self, key: &str) -> BridgeResult<Option<i64>> {
        Ok(self.get_string(key).await?.and_then(|v| v.parse().ok()))
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.values.lock().await.remove(key);
        Ok(())
    }

    async fn has_key(&self, key: &str) -> BridgeResult<bool> {
        Ok(self.values.lock().await.contains_key(key))
    }

    async fn list_keys(&self) -> BridgeResult<Vec<String>> {
        Ok(self.values.lock().await.keys().cloned().collect())
    }

    async fn clear_all(&self) -> BridgeResult<()> {
        self.values.lock().await.clear();
        Ok(())
    }
}

#[derive(Default)]
struct MemorySecrets {
    values: AsyncMutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl SecureStore for MemorySecrets {
    async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()> {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> BridgeResult<Option<Vec<u8>>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn delete_secret(&self, key: &str) -> BridgeResult<()> {
        self.values.lock().await.remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> BridgeResult<Vec<String>> {
        Ok(self.values.lock().await.keys().cloned().collect())
    }

    async fn clear_all(&self) -> BridgeResult<()> {
        self.values.lock().await.clear();
        Ok(())
    }
}

/// Asset source serving a fixed library, honoring the scan contract
struct ScriptedSource {
    assets: AsyncMutex<Vec<ScannedAsset>>,
    permission: AsyncMutex<PermissionState>,
    grant_on_request: bool,
    scan_error: Option<String>,
    scans: AsyncMutex<Vec<Option<i64>>>,
}

impl ScriptedSource {
    fn new(assets: Vec<ScannedAsset>) -> Self {
        Self {
            assets: AsyncMutex::new(assets),
            permission: AsyncMutex::new(PermissionState::Granted),
            grant_on_request: true,
            scan_error: None,
            scans: AsyncMutex::new(Vec::new()),
        }
    }

    fn failing_scan(message: &str) -> Self {
        Self {
            scan_error: Some(message.to_string()),
            ..Self::new(Vec::new())
        }
    }

    fn denying(assets: Vec<ScannedAsset>) -> Self {
        Self {
            permission: AsyncMutex::new(PermissionState::Denied),
            grant_on_request: false,
            ..Self::new(assets)
        }
    }

    async fn scan_count(&self) -> usize {
        self.scans.lock().await.len()
    }
}

#[async_trait]
impl AssetSource for ScriptedSource {
    async fn permission_state(&self) -> BridgeResult<PermissionState> {
        Ok(*self.permission.lock().await)
    }

    async fn request_permission(&self) -> BridgeResult<PermissionState> {
        let mut permission = self.permission.lock().await;
        if self.grant_on_request {
            *permission = PermissionState::Granted;
        }
        Ok(*permission)
    }

    async fn scan_new_assets(
        &self,
        created_after: Option<i64>,
        max_items: usize,
        filter: ScanFilter,
    ) -> BridgeResult<Vec<ScannedAsset>> {
        self.scans.lock().await.push(created_after);
        if let Some(message) = &self.scan_error {
            return Err(BridgeError::OperationFailed(message.clone()));
        }
        let mut assets: Vec<_> = self
            .assets
            .lock()
            .await
            .iter()
            .filter(|a| created_after.map_or(true, |after| a.creation_time >= after))
            .filter(|a| filter.accepts(a.media_type))
            .cloned()
            .collect();
        assets.sort_by_key(|a| a.creation_time);
        assets.truncate(max_items);
        Ok(assets)
    }
}

/// Uploader that reports progress, can fail per id, and can be held open
struct ScriptedUploader {
    transport: TransportKind,
    failures: AsyncMutex<HashMap<String, u32>>,
    fail_always: HashSet<String>,
    uploads: AsyncMutex<Vec<UploadRequest>>,
    calls: AtomicUsize,
    hold_first: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl ScriptedUploader {
    fn new() -> Self {
        Self {
            transport: TransportKind::Smb,
            failures: AsyncMutex::new(HashMap::new()),
            fail_always: HashSet::new(),
            uploads: AsyncMutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            hold_first: None,
        }
    }

    fn failing(ids: &[&str]) -> Self {
        Self {
            fail_always: ids.iter().map(|id| id.to_string()).collect(),
            ..Self::new()
        }
    }

    /// First upload signals `started` then waits for `release`.
    fn held(started: Arc<Notify>, release: Arc<Notify>) -> Self {
        Self {
            hold_first: Some((started, release)),
            ..Self::new()
        }
    }

    async fn fail_times(&self, id: &str, times: u32) {
        self.failures.lock().await.insert(id.to_string(), times);
    }

    async fn uploaded_paths(&self) -> Vec<String> {
        self.uploads
            .lock()
            .await
            .iter()
            .map(|r| r.remote_path.clone())
            .collect()
    }
}

#[async_trait]
impl Uploader for ScriptedUploader {
    fn transport(&self) -> TransportKind {
        self.transport
    }

    fn implementation_name(&self) -> &str {
        "scripted"
    }

    async fn test_connection(&self, _config: &ConnectionConfig) -> ConnectionTestResult {
        ConnectionTestResult::success("Connected", 3)
    }

    async fn upload_file(
        &self,
        _config: &ConnectionConfig,
        request: &UploadRequest,
        progress: ProgressSink,
    ) -> BridgeResult<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            if let Some((started, release)) = &self.hold_first {
                started.notify_one();
                release.notified().await;
            }
        }

        progress(UploadProgress::new(50, 100));
        progress(UploadProgress::new(25, 100));

        if self.fail_always.contains(&request.id) {
            return Err(BridgeError::OperationFailed("share offline".to_string()));
        }
        {
            let mut failures = self.failures.lock().await;
            if let Some(remaining) = failures.get_mut(&request.id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(BridgeError::OperationFailed("timeout".to_string()));
                }
            }
        }

        progress(UploadProgress::new(100, 100));
        self.uploads.lock().await.push(request.clone());
        Ok(())
    }

    async fn list_directory(
        &self,
        _config: &ConnectionConfig,
        path: &str,
    ) -> BridgeResult<Vec<RemoteEntry>> {
        Ok(vec![RemoteEntry {
            name: "2024-03".to_string(),
            kind: RemoteEntryKind::Directory,
            path: format!("{}/2024-03", path.trim_end_matches('/')),
            size: None,
            modified_time: None,
        }])
    }
}

mock! {
    pub Monitor {}

    #[async_trait]
    impl NetworkMonitor for Monitor {
        async fn get_network_info(&self) -> BridgeResult<NetworkInfo>;
    }
}

fn cellular_monitor() -> MockMonitor {
    let mut monitor = MockMonitor::new();
    monitor.expect_get_network_info().times(1).returning(|| {
        Ok(NetworkInfo {
            status: NetworkStatus::Connected,
            network_type: Some(NetworkType::Cellular),
            is_metered: true,
            is_expensive: false,
        })
    });
    monitor
}

// ============================================================================
// Harness
// ============================================================================

fn asset(id: &str, creation_time: i64) -> ScannedAsset {
    ScannedAsset {
        id: id.to_string(),
        filename: format!("{id}.jpg"),
        local_location: format!("/dcim/{id}.jpg"),
        media_type: MediaType::Photo,
        creation_time,
    }
}

fn smb_connection() -> ConnectionConfig {
    ConnectionConfig::Smb {
        config: SmbConfig {
            host: "nas.local".to_string(),
            share: "photos".to_string(),
            username: "alice".to_string(),
            ..SmbConfig::default()
        },
        password: "hunter2".to_string(),
    }
}

struct Harness {
    engine: Arc<SyncEngine>,
    settings_store: Arc<MemorySettings>,
    source: Arc<ScriptedSource>,
    uploader: Arc<ScriptedUploader>,
    clock: Arc<FixedClock>,
}

struct HarnessBuilder {
    settings: SyncSettings,
    source: ScriptedSource,
    uploader: ScriptedUploader,
    monitor: Option<Arc<dyn NetworkMonitor>>,
    configured: bool,
    seed_queue: Option<String>,
    failing_reads: bool,
}

impl HarnessBuilder {
    fn new(assets: Vec<ScannedAsset>) -> Self {
        Self {
            settings: SyncSettings::default(),
            source: ScriptedSource::new(assets),
            uploader: ScriptedUploader::new(),
            monitor: None,
            configured: true,
            seed_queue: None,
            failing_reads: false,
        }
    }

    fn settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    fn source(mut self, source: ScriptedSource) -> Self {
        self.source = source;
        self
    }

    fn uploader(mut self, uploader: ScriptedUploader) -> Self {
        self.uploader = uploader;
        self
    }

    fn monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    /// Settings reads fail while the engine initializes
    fn failing_reads(mut self) -> Self {
        self.failing_reads = true;
        self
    }

    fn seed_queue(mut self, json: &str) -> Self {
        self.seed_queue = Some(json.to_string());
        self
    }

    async fn build(self) -> Harness {
        let settings_store = Arc::new(MemorySettings::default());
        let repository = Arc::new(KeyValueSyncRepository::new(
            settings_store.clone(),
            Arc::new(MemorySecrets::default()),
        ));

        repository.save_settings(&self.settings).await.unwrap();
        if self.configured {
            if let ConnectionConfig::Smb { config, password } = smb_connection() {
                repository.save_smb_config(&config).await.unwrap();
                repository
                    .save_secret(TransportKind::Smb, &password)
                    .await
                    .unwrap();
            }
        }
        if let Some(queue) = &self.seed_queue {
            settings_store.set_string(QUEUE_KEY, queue).await.unwrap();
        }
        settings_store
            .fail_reads
            .store(self.failing_reads, Ordering::SeqCst);

        let source = Arc::new(self.source);
        let uploader = Arc::new(self.uploader);
        let clock = Arc::new(FixedClock::new(NOW));

        let engine = Arc::new(SyncEngine::new(EngineDependencies {
            repository,
            asset_source: source.clone(),
            uploaders: vec![uploader.clone()],
            network_monitor: self.monitor,
            background_executor: None,
            event_bus: EventBus::new(256),
            clock: clock.clone(),
        }));
        engine.initialize().await;

        Harness {
            engine,
            settings_store,
            source,
            uploader,
            clock,
        }
    }
}

impl Harness {
    async fn log_messages(&self) -> Vec<(SyncLogLevel, String)> {
        self.engine
            .logs()
            .await
            .into_iter()
            .map(|entry| (entry.level, entry.message))
            .collect()
    }

    async fn status_of(&self, id: &str) -> (UploadStatus, u32) {
        let queue = self.engine.queue().await;
        let item = queue.iter().find(|item| item.id == id).unwrap();
        (item.status, item.attempt_count)
    }
}

// ============================================================================
// Discovery
// ============================================================================

#[tokio::test]
async fn test_discovery_merge_is_idempotent() {
    let harness = HarnessBuilder::new(vec![asset("b", 20), asset("a", 10), asset("c", 30)])
        .build()
        .await;

    assert_eq!(harness.engine.scan_for_new_media().await, 3);
    let first = harness.engine.queue().await;

    assert_eq!(harness.engine.scan_for_new_media().await, 0);
    let second = harness.engine.queue().await;

    assert_eq!(first, second);
    let ids: Vec<_> = second.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);

    let logs = harness.log_messages().await;
    assert_eq!(logs[0].1, "No new media found for current filters.");
    assert_eq!(logs[1].1, "Discovered 3 new item(s).");
    assert!(harness
        .settings_store
        .get_string(QUEUE_KEY)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_scan_refused_when_filters_disabled() {
    let harness = HarnessBuilder::new(vec![asset("a", 10)])
        .settings(SyncSettings {
            upload_photos: false,
            upload_videos: false,
            ..SyncSettings::default()
        })
        .build()
        .await;

    assert_eq!(harness.engine.scan_for_new_media().await, 0);
    assert_eq!(harness.source.scan_count().await, 0);
    assert_eq!(
        harness.log_messages().await,
        vec![(
            SyncLogLevel::Error,
            "Both media filters are disabled. Enable photos or videos in settings.".to_string()
        )]
    );
}

#[tokio::test]
async fn test_scan_requires_permission() {
    let harness = HarnessBuilder::new(vec![asset("a", 10)])
        .source(ScriptedSource::denying(vec![asset("a", 10)]))
        .build()
        .await;

    assert_eq!(harness.engine.scan_for_new_media().await, 0);
    assert_eq!(harness.source.scan_count().await, 0);
    assert_eq!(
        harness.engine.permission_state().await,
        PermissionState::Denied
    );
    assert_eq!(
        harness.log_messages().await[0].1,
        "Cannot scan without photo library permission."
    );
    assert_eq!(harness.engine.phase(), SyncPhase::Idle);
}

#[tokio::test]
async fn test_scan_failure_leaves_queue_untouched() {
    let queue = r#"[
        {"id":"b","filename":"b.jpg","localLocation":"/b","mediaType":"photo","creationTime":20,"progress":0,"status":"pending","attemptCount":0}
    ]"#;
    let harness = HarnessBuilder::new(vec![])
        .source(ScriptedSource::failing_scan("library offline"))
        .seed_queue(queue)
        .build()
        .await;
    let before = harness.engine.queue().await;

    assert_eq!(harness.engine.scan_for_new_media().await, 0);

    assert_eq!(harness.source.scan_count().await, 1);
    assert_eq!(harness.engine.queue().await, before);
    assert_eq!(
        harness.log_messages().await,
        vec![(
            SyncLogLevel::Error,
            "Media scan failed: Bridge operation failed: library offline".to_string()
        )]
    );
    assert_eq!(harness.engine.phase(), SyncPhase::Idle);
}

// ============================================================================
// Upload Runs
// ============================================================================

#[tokio::test]
async fn test_run_uploads_oldest_first_and_advances_watermark() {
    let harness = HarnessBuilder::new(vec![
        asset("late", 1_710_600_000_000),
        asset("early", 1_710_504_000_000),
    ])
    .build()
    .await;
    let mut events = harness.engine.subscribe();

    let uploaded = harness.engine.run_sync(RunOptions::manual()).await;
    assert_eq!(uploaded, 2);

    assert_eq!(
        harness.uploader.uploaded_paths().await,
        vec![
            "/Camera Roll/2024-03/early.jpg".to_string(),
            "/Camera Roll/2024-03/late.jpg".to_string(),
        ]
    );

    for item in harness.engine.queue().await {
        assert_eq!(item.status, UploadStatus::Completed);
        assert_eq!(item.progress, 1.0);
        assert_eq!(item.uploaded_at, Some(NOW));
        assert_eq!(item.attempt_count, 1);
    }

    let metadata = harness.engine.metadata().await;
    assert_eq!(metadata.last_synced_asset_time, Some(1_710_600_000_000));
    assert_eq!(metadata.last_completed_at, Some(NOW));
    assert_eq!(
        harness.log_messages().await[0].1,
        "Uploaded 2 item(s) (manual)."
    );

    // Next discovery starts after the watermark.
    harness.engine.scan_for_new_media().await;
    assert_eq!(
        harness.source.scans.lock().await.last().copied().flatten(),
        Some(1_710_600_000_001)
    );

    // Progress never goes backwards within an item.
    let mut last_percent: HashMap<String, u8> = HashMap::new();
    let mut finished = false;
    while let Some(Ok(event)) = events.try_recv() {
        match event {
            CoreEvent::Sync(SyncEvent::ItemProgress {
                item_id, percent, ..
            }) => {
                let previous = last_percent.insert(item_id, percent).unwrap_or(0);
                assert!(percent >= previous);
            }
            CoreEvent::Sync(SyncEvent::RunFinished {
                uploaded, failed, ..
            }) => {
                assert_eq!((uploaded, failed), (2, 0));
                finished = true;
            }
            _ => {}
        }
    }
    assert!(finished);
}

#[tokio::test]
async fn test_empty_queue_sync_logs_nothing_to_upload_once() {
    let harness = HarnessBuilder::new(vec![]).build().await;

    assert_eq!(harness.engine.run_sync(RunOptions::default()).await, 0);
    assert_eq!(
        harness.log_messages().await,
        vec![(SyncLogLevel::Info, "Nothing to upload.".to_string())]
    );
    assert_eq!(harness.source.scan_count().await, 1);
}

#[tokio::test]
async fn test_silent_empty_sync_logs_nothing() {
    let harness = HarnessBuilder::new(vec![]).build().await;

    assert_eq!(harness.engine.run_background_sync().await, 0);
    assert!(harness.log_messages().await.is_empty());
}

#[tokio::test]
async fn test_invalid_connection_aborts_run() {
    let harness = HarnessBuilder::new(vec![asset("a", 10)])
        .unconfigured()
        .build()
        .await;

    assert_eq!(harness.engine.run_sync(RunOptions::manual()).await, 0);
    assert_eq!(
        harness.log_messages().await,
        vec![(SyncLogLevel::Error, "SMB host is required.".to_string())]
    );
    assert_eq!(harness.source.scan_count().await, 0);
    assert!(harness.engine.queue().await.is_empty());
    assert_eq!(harness.engine.phase(), SyncPhase::Idle);
}

#[tokio::test]
async fn test_wifi_only_blocks_on_cellular() {
    let harness = HarnessBuilder::new(vec![asset("a", 10)])
        .settings(SyncSettings {
            wifi_only: true,
            ..SyncSettings::default()
        })
        .monitor(Arc::new(cellular_monitor()))
        .build()
        .await;
    harness.engine.scan_for_new_media().await;
    let before = harness.engine.queue().await;
    let logs_before = harness.engine.logs().await.len();

    assert_eq!(harness.engine.run_sync(RunOptions::manual()).await, 0);

    assert_eq!(harness.engine.queue().await, before);
    let logs = harness.log_messages().await;
    assert_eq!(logs.len(), logs_before + 1);
    assert_eq!(
        logs[0],
        (
            SyncLogLevel::Error,
            "Wi-Fi only is enabled. Current network: CELLULAR.".to_string()
        )
    );
}

// ============================================================================
// Retry Budget
// ============================================================================

#[tokio::test]
async fn test_exhausted_retries_are_excluded() {
    let harness = HarnessBuilder::new(vec![asset("a", 10)])
        .uploader(ScriptedUploader::failing(&["a"]))
        .build()
        .await;

    for attempt in 1..=3u32 {
        assert_eq!(harness.engine.run_sync(RunOptions::manual()).await, 0);
        let (status, attempts) = harness.status_of("a").await;
        assert_eq!(status, UploadStatus::Failed);
        assert_eq!(attempts, attempt);
    }

    let logs = harness.log_messages().await;
    assert!(logs.iter().any(|(level, message)| *level == SyncLogLevel::Error
        && message
            == "Failed to upload a.jpg: Bridge operation failed: share offline (attempt 1/3)"));
    assert!(logs.iter().any(|(_, message)| message
        == "Failed to upload a.jpg: Bridge operation failed: share offline (retry limit reached)"));

    // Fourth run: nothing eligible, discovery re-surfaces the same id.
    assert_eq!(harness.engine.run_sync(RunOptions::manual()).await, 0);
    assert_eq!(harness.uploader.calls.load(Ordering::SeqCst), 3);
    assert_eq!(harness.status_of("a").await, (UploadStatus::Failed, 3));
    assert_eq!(harness.log_messages().await[0].1, "Nothing to upload.");

    assert!(!harness.engine.retry_item("a").await);
    assert_eq!(harness.engine.retry_all_failed().await, 0);
    assert_eq!(harness.status_of("a").await, (UploadStatus::Failed, 3));
}

#[tokio::test]
async fn test_retry_keeps_attempt_count() {
    let harness = HarnessBuilder::new(vec![asset("a", 10), asset("b", 20)])
        .uploader(ScriptedUploader::new())
        .build()
        .await;
    harness.uploader.fail_times("a", 1).await;
    harness.uploader.fail_times("b", 1).await;

    assert_eq!(harness.engine.run_sync(RunOptions::manual()).await, 0);
    assert_eq!(harness.engine.sync_state().await, SyncState::PartialFailure);

    assert!(harness.engine.retry_item("a").await);
    let (status, attempts) = harness.status_of("a").await;
    assert_eq!((status, attempts), (UploadStatus::Pending, 1));

    assert_eq!(harness.engine.retry_all_failed().await, 1);
    assert_eq!(
        harness.log_messages().await[0].1,
        "Moved 1 failed item(s) back to pending."
    );

    assert_eq!(harness.engine.run_sync(RunOptions::manual()).await, 2);
    assert_eq!(harness.status_of("a").await, (UploadStatus::Completed, 2));
    assert_eq!(harness.status_of("b").await, (UploadStatus::Completed, 2));
    assert_eq!(harness.engine.sync_state().await, SyncState::Idle);
}

// ============================================================================
// Single Flight & Cancellation
// ============================================================================

#[tokio::test]
async fn test_single_flight_and_cancel_after_current_item() {
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let harness = HarnessBuilder::new(vec![asset("a", 10), asset("b", 20), asset("c", 30)])
        .uploader(ScriptedUploader::held(started.clone(), release.clone()))
        .build()
        .await;
    harness.engine.scan_for_new_media().await;

    let engine = harness.engine.clone();
    let run = tokio::spawn(async move { engine.run_sync(RunOptions::manual()).await });

    tokio::time::timeout(Duration::from_secs(5), started.notified())
        .await
        .unwrap();
    assert_eq!(harness.engine.phase(), SyncPhase::Syncing);

    // Concurrent requests are refused without touching the queue.
    let snapshot = harness.engine.queue().await;
    assert_eq!(harness.engine.run_sync(RunOptions::manual()).await, 0);
    assert_eq!(harness.engine.scan_for_new_media().await, 0);
    assert_eq!(harness.engine.queue().await, snapshot);
    assert_eq!(harness.engine.sync_state().await, SyncState::Syncing);

    assert!(harness.engine.request_cancel_after_current_item());
    release.notify_one();

    let uploaded = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(uploaded, 1);

    assert_eq!(harness.status_of("a").await, (UploadStatus::Completed, 1));
    assert_eq!(harness.status_of("b").await, (UploadStatus::Pending, 0));
    assert_eq!(harness.status_of("c").await, (UploadStatus::Pending, 0));
    assert_eq!(harness.engine.phase(), SyncPhase::Idle);
    assert!(!harness.engine.is_cancel_requested());
    assert!(harness
        .engine
        .queue()
        .await
        .iter()
        .all(|item| item.status != UploadStatus::Uploading));
    assert!(harness
        .log_messages()
        .await
        .iter()
        .any(|(_, message)| message == "Sync stopped after current item as requested."));
}

#[tokio::test]
async fn test_aborted_run_fails_in_flight_item() {
    let started = Arc::new(Notify::new());
    let harness = HarnessBuilder::new(vec![asset("a", 10), asset("b", 20)])
        .uploader(ScriptedUploader::held(started.clone(), Arc::new(Notify::new())))
        .build()
        .await;

    let engine = harness.engine.clone();
    let run = tokio::spawn(async move { engine.run_sync(RunOptions::manual()).await });
    tokio::time::timeout(Duration::from_secs(5), started.notified())
        .await
        .unwrap();
    assert_eq!(harness.status_of("a").await, (UploadStatus::Uploading, 1));

    run.abort();
    assert!(run.await.unwrap_err().is_cancelled());
    assert_eq!(harness.engine.phase(), SyncPhase::Idle);

    let queue = harness.engine.queue().await;
    let a = queue.iter().find(|item| item.id == "a").unwrap();
    assert_eq!(a.status, UploadStatus::Failed);
    assert_eq!(a.attempt_count, 1);
    assert_eq!(a.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
    assert_eq!(harness.status_of("b").await, (UploadStatus::Pending, 0));

    let persisted = harness
        .settings_store
        .get_string(QUEUE_KEY)
        .await
        .unwrap()
        .unwrap();
    assert!(!persisted.contains("\"uploading\""));

    assert!(harness.engine.retry_item("a").await);
    assert_eq!(harness.engine.run_sync(RunOptions::manual()).await, 2);
    assert_eq!(harness.status_of("a").await, (UploadStatus::Completed, 2));
}

#[tokio::test]
async fn test_aborted_run_recovers_while_state_is_busy() {
    let started = Arc::new(Notify::new());
    let harness = HarnessBuilder::new(vec![asset("a", 10)])
        .uploader(ScriptedUploader::held(started.clone(), Arc::new(Notify::new())))
        .build()
        .await;

    let engine = harness.engine.clone();
    let run = tokio::spawn(async move { engine.run_sync(RunOptions::manual()).await });
    tokio::time::timeout(Duration::from_secs(5), started.notified())
        .await
        .unwrap();

    // Park a command inside the state lock while the run is torn down.
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    harness
        .settings_store
        .gate_next_write(LOGS_KEY, entered.clone(), release.clone());
    let engine = harness.engine.clone();
    let permission = tokio::spawn(async move { engine.request_permission().await });
    tokio::time::timeout(Duration::from_secs(5), entered.notified())
        .await
        .unwrap();

    run.abort();
    assert!(run.await.unwrap_err().is_cancelled());
    assert_eq!(harness.engine.phase(), SyncPhase::Idle);

    release.notify_one();
    assert_eq!(permission.await.unwrap(), PermissionState::Granted);

    assert_eq!(harness.status_of("a").await, (UploadStatus::Failed, 1));
    assert!(harness.engine.retry_item("a").await);
    assert_eq!(harness.engine.run_sync(RunOptions::manual()).await, 1);
    assert_eq!(harness.status_of("a").await, (UploadStatus::Completed, 2));
}

#[tokio::test]
async fn test_cancel_rejected_when_idle() {
    let harness = HarnessBuilder::new(vec![]).build().await;
    assert!(!harness.engine.request_cancel_after_current_item());
    assert!(!harness.engine.is_cancel_requested());
}

// ============================================================================
// Startup & Housekeeping
// ============================================================================

#[tokio::test]
async fn test_startup_recovers_interrupted_uploads() {
    let queue = r#"[
        {"id":"a","filename":"a.jpg","localLocation":"/a","mediaType":"photo","creationTime":10,"progress":0.4,"status":"uploading","attemptCount":1},
        {"id":"b","filename":"b.jpg","localLocation":"/b","mediaType":"photo","creationTime":20,"progress":0,"status":"pending","attemptCount":0},
        {"id":"c","filename":"c.jpg","localLocation":"/c","mediaType":"video","creationTime":5,"progress":0,"status":"failed","attemptCount":2,"errorMessage":"denied"}
    ]"#;
    let harness = HarnessBuilder::new(vec![]).seed_queue(queue).build().await;

    let items = harness.engine.queue().await;
    assert_eq!(items[0].id, "c");

    let a = items.iter().find(|item| item.id == "a").unwrap();
    assert_eq!(a.status, UploadStatus::Failed);
    assert!(!a.error_message.as_deref().unwrap_or_default().is_empty());
    assert_eq!(a.attempt_count, 1);

    assert_eq!(harness.status_of("b").await, (UploadStatus::Pending, 0));
    let c = items.iter().find(|item| item.id == "c").unwrap();
    assert_eq!(c.status, UploadStatus::Failed);
    assert_eq!(c.error_message.as_deref(), Some("denied"));

    let persisted = harness
        .settings_store
        .get_string(QUEUE_KEY)
        .await
        .unwrap()
        .unwrap();
    assert!(!persisted.contains("\"uploading\""));
}

#[tokio::test]
async fn test_startup_load_failure_keeps_defaults() {
    let harness = HarnessBuilder::new(vec![asset("a", 10)])
        .settings(SyncSettings {
            max_items_per_run: 7,
            ..SyncSettings::default()
        })
        .failing_reads()
        .build()
        .await;

    assert_eq!(harness.engine.settings().await, SyncSettings::default());
    assert!(harness.engine.queue().await.is_empty());
    assert_eq!(
        harness.log_messages().await,
        vec![(
            SyncLogLevel::Error,
            "Failed to load initial state: Bridge operation failed: disk locked".to_string()
        )]
    );

    // Still usable once the store recovers.
    harness
        .settings_store
        .fail_reads
        .store(false, Ordering::SeqCst);
    harness
        .engine
        .save_connection_settings(smb_connection())
        .await
        .unwrap();
    assert_eq!(harness.engine.run_sync(RunOptions::manual()).await, 1);
    assert_eq!(harness.status_of("a").await, (UploadStatus::Completed, 1));
}

#[tokio::test]
async fn test_completed_items_expire_at_both_ends_of_run() {
    let harness = HarnessBuilder::new(vec![asset("a", 10), asset("b", 20)])
        .settings(SyncSettings {
            clear_completed_after_days: 7,
            ..SyncSettings::default()
        })
        .build()
        .await;
    harness.uploader.fail_times("b", 1).await;

    assert_eq!(harness.engine.run_sync(RunOptions::manual()).await, 1);
    assert_eq!(harness.engine.queue().await.len(), 2);

    harness.clock.advance(8 * DAY_MS);
    assert_eq!(harness.engine.run_sync(RunOptions::manual()).await, 1);

    // "a" expired before the run; "b" completed just now and stays.
    let items = harness.engine.queue().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, "b");
    assert_eq!(items[0].status, UploadStatus::Completed);
}

#[tokio::test]
async fn test_clear_commands() {
    let harness = HarnessBuilder::new(vec![asset("a", 10), asset("b", 20), asset("c", 30)])
        .build()
        .await;
    harness.uploader.fail_times("b", 5).await;
    harness.engine.run_sync(RunOptions::manual()).await;

    assert_eq!(harness.engine.clear_completed().await, 2);
    assert_eq!(harness.engine.clear_failed().await, 1);
    assert!(harness.engine.queue().await.is_empty());

    harness
        .source
        .assets
        .lock()
        .await
        .extend([asset("d", 40), asset("e", 50)]);
    assert_eq!(harness.engine.scan_for_new_media().await, 2);
    assert_eq!(harness.engine.clear_all().await, 2);
    assert_eq!(harness.engine.queue_counts().await.total(), 0);
}

#[tokio::test]
async fn test_launch_sync_runs_once() {
    let harness = HarnessBuilder::new(vec![asset("a", 10)]).build().await;

    assert_eq!(harness.engine.run_launch_sync().await, 1);
    assert_eq!(
        harness.log_messages().await[0].1,
        "Uploaded 1 item(s) (launch)."
    );

    harness.source.assets.lock().await.push(asset("b", 20));
    assert_eq!(harness.engine.run_launch_sync().await, 0);
    assert_eq!(harness.uploader.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_launch_sync_respects_setting() {
    let harness = HarnessBuilder::new(vec![asset("a", 10)])
        .settings(SyncSettings {
            auto_scan_on_launch: false,
            ..SyncSettings::default()
        })
        .build()
        .await;

    assert_eq!(harness.engine.run_launch_sync().await, 0);
    assert_eq!(harness.source.scan_count().await, 0);
}

// ============================================================================
// Settings & Connections
// ============================================================================

#[tokio::test]
async fn test_save_sync_settings_normalizes() {
    let harness = HarnessBuilder::new(vec![]).build().await;

    let saved = harness
        .engine
        .save_sync_settings(SyncSettings {
            max_items_per_run: 9_999,
            max_retry_attempts: 0,
            ..SyncSettings::default()
        })
        .await
        .unwrap();

    assert_eq!(saved.max_items_per_run, 500);
    assert_eq!(saved.max_retry_attempts, 1);
    assert_eq!(harness.engine.settings().await, saved);
    assert_eq!(harness.log_messages().await[0].1, "Sync settings saved.");
}

#[tokio::test]
async fn test_connection_commands() {
    let harness = HarnessBuilder::new(vec![asset("a", 10)])
        .unconfigured()
        .build()
        .await;

    let result = harness.engine.test_connection(None).await;
    assert!(!result.ok);
    assert_eq!(result.message, "SMB host is required.");
    assert!(matches!(
        harness.engine.list_remote_directory(None).await,
        Err(SyncError::InvalidConfig(message)) if message == "SMB host is required."
    ));

    harness
        .engine
        .save_connection_settings(smb_connection())
        .await
        .unwrap();
    assert!(harness.engine.test_connection(None).await.ok);
    let entries = harness
        .engine
        .list_remote_directory(Some("Camera Roll\\"))
        .await
        .unwrap();
    assert_eq!(entries[0].path, "/Camera Roll/2024-03");
    assert_eq!(harness.engine.uploader_implementation().await, "scripted");
}

#[tokio::test]
async fn test_sftp_without_uploader_fails_items() {
    let harness = HarnessBuilder::new(vec![asset("a", 10)]).build().await;

    harness
        .engine
        .save_connection_settings(ConnectionConfig::Sftp {
            config: SftpConfig {
                host: " sftp.example.com ".to_string(),
                username: "bob".to_string(),
                remote_path: "   ".to_string(),
                auth_type: SftpAuthType::Key,
                port: 70_000,
            },
            secret: "-----BEGIN KEY-----".to_string(),
        })
        .await
        .unwrap();

    let sftp = harness.engine.sftp_config().await;
    assert_eq!(sftp.host, "sftp.example.com");
    assert_eq!(sftp.port, 65_535);
    assert_eq!(sftp.remote_path, "/home/user/photos");
    assert_eq!(
        harness.engine.settings().await.transport,
        TransportKind::Sftp
    );

    assert_eq!(harness.engine.run_sync(RunOptions::manual()).await, 0);
    let queue = harness.engine.queue().await;
    assert_eq!(queue[0].status, UploadStatus::Failed);
    assert_eq!(
        queue[0].error_message.as_deref(),
        Some("Bridge capability not available: SFTP transport not available")
    );
    assert_eq!(harness.uploader.calls.load(Ordering::SeqCst), 0);
}
