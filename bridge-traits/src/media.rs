//! Local Media Library Abstraction
//!
//! The asset source enumerates candidate photos and videos on the device.
//! The core treats it as a black box that returns [`ScannedAsset`] tuples
//! newer than a watermark, bounded by a count and a media-type filter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Kind of media tracked by the sync queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Photo,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Photo => "photo",
            MediaType::Video => "video",
        }
    }
}

/// Photo library access state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    #[default]
    Unknown,
    Granted,
    Denied,
}

impl PermissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionState::Unknown => "unknown",
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
        }
    }
}

/// Media-type filter applied during enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanFilter {
    pub include_photos: bool,
    pub include_videos: bool,
}

impl ScanFilter {
    pub fn is_empty(&self) -> bool {
        !self.include_photos && !self.include_videos
    }

    pub fn accepts(&self, media_type: MediaType) -> bool {
        match media_type {
            MediaType::Photo => self.include_photos,
            MediaType::Video => self.include_videos,
        }
    }
}

impl Default for ScanFilter {
    fn default() -> Self {
        Self {
            include_photos: true,
            include_videos: true,
        }
    }
}

/// One candidate asset returned by the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannedAsset {
    /// Stable source identity, used as the queue de-duplication key
    pub id: String,
    pub filename: String,
    /// Opaque reference the uploader reads bytes from
    pub local_location: String,
    pub media_type: MediaType,
    /// Milliseconds since the Unix epoch
    pub creation_time: i64,
}

/// Local media enumeration trait
///
/// - **iOS**: PHPhotoLibrary / PHAsset fetch with a creation-date predicate
/// - **Android**: MediaStore query
/// - **Desktop**: Directory tree walk (see `bridge-desktop`)
///
/// # Contract
///
/// `scan_new_assets` must only return assets with
/// `creation_time >= created_after` (when set), in ascending creation-time
/// order, at most `max_items` entries, and only media types accepted by the
/// filter.
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Current permission without prompting the user
    async fn permission_state(&self) -> Result<PermissionState>;

    /// Prompt for library access if the platform supports it
    async fn request_permission(&self) -> Result<PermissionState>;

    /// Enumerate assets created at or after `created_after` (ms)
    async fn scan_new_assets(
        &self,
        created_after: Option<i64>,
        max_items: usize,
        filter: ScanFilter,
    ) -> Result<Vec<ScannedAsset>>;
}
