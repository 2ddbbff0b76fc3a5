//! Directory-backed photo library

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    media::{AssetSource, MediaType, PermissionState, ScanFilter, ScannedAsset},
};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

const PHOTO_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "heic", "heif", "gif", "webp", "dng", "tif", "tiff",
];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "avi", "mkv", "3gp", "webm"];

/// Classify a file by extension, case-insensitively.
pub fn media_type_for(path: &Path) -> Option<MediaType> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if PHOTO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaType::Photo)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaType::Video)
    } else {
        None
    }
}

/// Treats a folder tree (a camera import folder, a synced DCIM copy) as the
/// photo library.
///
/// - Asset id: path relative to the root with `/` separators, so ids stay
///   stable across rescans.
/// - Creation time: file birth time when the filesystem records one, else
///   modification time.
/// - Hidden files and directories are skipped.
pub struct DirectoryAssetSource {
    root: PathBuf,
}

impl DirectoryAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The user's Pictures folder, if the platform defines one.
    pub fn pictures() -> Option<Self> {
        dirs::picture_dir().map(Self::new)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn readable(&self) -> bool {
        tokio::fs::read_dir(&self.root).await.is_ok()
    }

    async fn walk(&self, filter: ScanFilter) -> Result<Vec<ScannedAsset>> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || walk_library(&root, filter))
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Library scan aborted: {}", e)))?
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn walk_library(root: &Path, filter: ScanFilter) -> Result<Vec<ScannedAsset>> {
    // An unreadable root is an error; unreadable subtrees are skipped.
    std::fs::read_dir(root)?;

    let mut assets = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = ?e.path(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(media_type) = media_type_for(path) else {
            continue;
        };
        if !filter.accepts(media_type) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!(path = ?path, error = %e, "Skipping entry without metadata");
                continue;
            }
        };

        assets.push(ScannedAsset {
            id: asset_id(root, path),
            filename: entry.file_name().to_string_lossy().into_owned(),
            local_location: path.to_string_lossy().into_owned(),
            media_type,
            creation_time: creation_millis(&metadata),
        });
    }

    Ok(assets)
}

fn asset_id(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn creation_millis(metadata: &Metadata) -> i64 {
    metadata
        .created()
        .or_else(|_| metadata.modified())
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as i64)
                .unwrap_or_default()
        })
}

#[async_trait]
impl AssetSource for DirectoryAssetSource {
    async fn permission_state(&self) -> Result<PermissionState> {
        Ok(if self.readable().await {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        })
    }

    async fn request_permission(&self) -> Result<PermissionState> {
        // Nothing to prompt for: access is whatever the filesystem allows
        self.permission_state().await
    }

    async fn scan_new_assets(
        &self,
        created_after: Option<i64>,
        max_items: usize,
        filter: ScanFilter,
    ) -> Result<Vec<ScannedAsset>> {
        let mut assets = self.walk(filter).await?;
        if let Some(after) = created_after {
            assets.retain(|asset| asset.creation_time >= after);
        }
        assets.sort_by(|a, b| {
            a.creation_time
                .cmp(&b.creation_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        assets.truncate(max_items);

        debug!(
            root = ?self.root,
            found = assets.len(),
            created_after = ?created_after,
            "Scanned directory library"
        );
        Ok(assets)
    }
}
