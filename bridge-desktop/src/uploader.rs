//! Uploads into a locally mounted share

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    transfer::{
        ConnectionConfig, ConnectionTestResult, ProgressSink, RemoteEntry, RemoteEntryKind,
        TransportKind, UploadProgress, UploadRequest, Uploader,
    },
};
use std::path::{Path, PathBuf};
use std::time::{Instant, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

const CHUNK_SIZE: usize = 256 * 1024;
const PART_SUFFIX: &str = ".part";

/// Uploader writing into a directory where the remote is already mounted
/// (an SMB share via the OS, or an SFTP server via SSHFS).
///
/// Remote paths are interpreted relative to `mount_root`; the host and
/// credentials in the connection config are only used for messages since
/// the OS mount already carries the session. Files land under a `.part`
/// name and are renamed once complete, so a partial copy never looks like
/// a finished upload.
pub struct MountedShareUploader {
    transport: TransportKind,
    mount_root: PathBuf,
}

impl MountedShareUploader {
    pub fn new(transport: TransportKind, mount_root: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            mount_root: mount_root.into(),
        }
    }

    pub fn mount_root(&self) -> &Path {
        &self.mount_root
    }

    /// Map a remote path onto the mount. `..` segments are rejected.
    fn resolve(&self, remote_path: &str) -> Result<PathBuf> {
        let mut resolved = self.mount_root.clone();
        for segment in remote_path.split(['/', '\\']) {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(BridgeError::PermissionDenied(format!(
                        "Remote path escapes the share: {}",
                        remote_path
                    )))
                }
                other => resolved.push(other),
            }
        }
        Ok(resolved)
    }

    async fn copy_with_progress(
        &self,
        source: &Path,
        part: &Path,
        progress: &ProgressSink,
    ) -> Result<u64> {
        let mut reader = tokio::fs::File::open(source).await?;
        let total = reader.metadata().await?.len();
        let mut writer = tokio::fs::File::create(part).await?;

        progress(UploadProgress::new(0, total));
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut written = 0u64;
        loop {
            let read = reader.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            writer.write_all(&buffer[..read]).await?;
            written += read as u64;
            progress(UploadProgress::new(written.min(total), total));
        }

        writer.flush().await?;
        writer.sync_all().await?;
        Ok(written)
    }
}

fn modified_millis(metadata: &std::fs::Metadata) -> Option<i64> {
    metadata
        .modified()
        .ok()?
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_millis() as i64)
}

fn join_remote(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches('/');
    format!("{}/{}", parent, name)
}

#[async_trait]
impl Uploader for MountedShareUploader {
    fn transport(&self) -> TransportKind {
        self.transport
    }

    fn implementation_name(&self) -> &str {
        "mounted-share"
    }

    async fn test_connection(&self, config: &ConnectionConfig) -> ConnectionTestResult {
        let started = Instant::now();
        match tokio::fs::metadata(&self.mount_root).await {
            Ok(metadata) if metadata.is_dir() => ConnectionTestResult::success(
                format!(
                    "Connected to {} ({}).",
                    config.host(),
                    self.transport.as_str().to_uppercase()
                ),
                started.elapsed().as_millis() as u64,
            ),
            Ok(_) => ConnectionTestResult::failure(format!(
                "Mount point {} is not a directory.",
                self.mount_root.display()
            )),
            Err(e) => ConnectionTestResult::failure(format!(
                "Share not mounted at {}: {}",
                self.mount_root.display(),
                e
            )),
        }
    }

    async fn upload_file(
        &self,
        _config: &ConnectionConfig,
        request: &UploadRequest,
        progress: ProgressSink,
    ) -> Result<()> {
        let destination = self.resolve(&request.remote_path)?;
        if destination == self.mount_root {
            return Err(BridgeError::OperationFailed(format!(
                "Remote path has no file name: {}",
                request.remote_path
            )));
        }
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut part = destination.clone().into_os_string();
        part.push(PART_SUFFIX);
        let part = PathBuf::from(part);

        let copied = self
            .copy_with_progress(Path::new(&request.local_location), &part, &progress)
            .await;
        let bytes = match copied {
            Ok(bytes) => bytes,
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&part).await {
                    debug!(path = ?part, error = %cleanup, "No partial file to remove");
                }
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&part, &destination).await {
            warn!(path = ?destination, error = %e, "Failed to finalize upload");
            let _ = tokio::fs::remove_file(&part).await;
            return Err(BridgeError::Io(e));
        }

        debug!(
            id = %request.id,
            remote = %request.remote_path,
            bytes = bytes,
            "Upload finished"
        );
        Ok(())
    }

    async fn list_directory(
        &self,
        _config: &ConnectionConfig,
        path: &str,
    ) -> Result<Vec<RemoteEntry>> {
        let directory = self.resolve(path)?;
        let mut entries = tokio::fs::read_dir(&directory).await?;
        let mut listing = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(PART_SUFFIX) {
                continue;
            }
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };

            let kind = if metadata.is_dir() {
                RemoteEntryKind::Directory
            } else {
                RemoteEntryKind::File
            };
            listing.push(RemoteEntry {
                path: join_remote(path, &name),
                size: (kind == RemoteEntryKind::File).then(|| metadata.len()),
                modified_time: modified_millis(&metadata),
                name,
                kind,
            });
        }

        listing.sort_by(|a, b| {
            let a_dir = a.kind == RemoteEntryKind::Directory;
            let b_dir = b.kind == RemoteEntryKind::Directory;
            b_dir
                .cmp(&a_dir)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        Ok(listing)
    }
}
