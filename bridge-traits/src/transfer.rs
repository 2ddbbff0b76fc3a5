//! Remote Transfer Abstraction
//!
//! Connection settings for the supported file-server transports and the
//! [`Uploader`] capability that moves a single local asset to a remote path.
//!
//! One uploader instance exists per [`TransportKind`]. The core selects the
//! instance for the active transport when a run starts and never branches on
//! the transport inside the upload loop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{BridgeError, Result};
use crate::media::MediaType;

pub const DEFAULT_SMB_PORT: u32 = 445;
pub const DEFAULT_SFTP_PORT: u32 = 22;
pub const DEFAULT_SMB_REMOTE_PATH: &str = "/Camera Roll";
pub const DEFAULT_SFTP_REMOTE_PATH: &str = "/home/user/photos";

/// Supported remote transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Smb,
    Sftp,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Smb => "smb",
            TransportKind::Sftp => "sftp",
        }
    }

    /// Base path used when the configured remote path is empty
    pub fn default_remote_path(&self) -> &'static str {
        match self {
            TransportKind::Smb => DEFAULT_SMB_REMOTE_PATH,
            TransportKind::Sftp => DEFAULT_SFTP_REMOTE_PATH,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "smb" => Some(TransportKind::Smb),
            "sftp" => Some(TransportKind::Sftp),
            _ => None,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SMB share connection settings (the password is stored separately)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmbConfig {
    pub host: String,
    pub port: u32,
    pub share: String,
    pub remote_path: String,
    pub username: String,
}

impl Default for SmbConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_SMB_PORT,
            share: String::new(),
            remote_path: DEFAULT_SMB_REMOTE_PATH.to_string(),
            username: String::new(),
        }
    }
}

impl SmbConfig {
    /// Trim text fields and restore the default remote path when blank.
    pub fn sanitized(&self) -> Self {
        let remote_path = self.remote_path.trim();
        Self {
            host: self.host.trim().to_string(),
            port: self.port,
            share: self.share.trim().to_string(),
            remote_path: if remote_path.is_empty() {
                DEFAULT_SMB_REMOTE_PATH.to_string()
            } else {
                remote_path.to_string()
            },
            username: self.username.trim().to_string(),
        }
    }
}

/// SFTP authentication method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SftpAuthType {
    #[default]
    Password,
    Key,
}

/// SFTP server connection settings (the secret is stored separately)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SftpConfig {
    pub host: String,
    pub port: u32,
    pub remote_path: String,
    pub username: String,
    pub auth_type: SftpAuthType,
}

impl Default for SftpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_SFTP_PORT,
            remote_path: DEFAULT_SFTP_REMOTE_PATH.to_string(),
            username: String::new(),
            auth_type: SftpAuthType::Password,
        }
    }
}

impl SftpConfig {
    /// Trim text fields and restore the default remote path when blank.
    pub fn sanitized(&self) -> Self {
        let remote_path = self.remote_path.trim();
        Self {
            host: self.host.trim().to_string(),
            port: self.port,
            remote_path: if remote_path.is_empty() {
                DEFAULT_SFTP_REMOTE_PATH.to_string()
            } else {
                remote_path.to_string()
            },
            username: self.username.trim().to_string(),
            auth_type: self.auth_type,
        }
    }
}

/// Complete connection settings for one transport, including its secret.
///
/// For SFTP the secret is the password or the private key, depending on
/// [`SftpConfig::auth_type`].
#[derive(Clone, PartialEq, Eq)]
pub enum ConnectionConfig {
    Smb { config: SmbConfig, password: String },
    Sftp { config: SftpConfig, secret: String },
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionConfig::Smb { config, .. } => f
                .debug_struct("Smb")
                .field("config", config)
                .field("password", &"[REDACTED]")
                .finish(),
            ConnectionConfig::Sftp { config, .. } => f
                .debug_struct("Sftp")
                .field("config", config)
                .field("secret", &"[REDACTED]")
                .finish(),
        }
    }
}

fn port_in_range(port: u32) -> bool {
    (1..=65_535).contains(&port)
}

impl ConnectionConfig {
    pub fn kind(&self) -> TransportKind {
        match self {
            ConnectionConfig::Smb { .. } => TransportKind::Smb,
            ConnectionConfig::Sftp { .. } => TransportKind::Sftp,
        }
    }

    pub fn host(&self) -> &str {
        match self {
            ConnectionConfig::Smb { config, .. } => &config.host,
            ConnectionConfig::Sftp { config, .. } => &config.host,
        }
    }

    /// Configured remote base directory (not yet normalized)
    pub fn remote_path(&self) -> &str {
        match self {
            ConnectionConfig::Smb { config, .. } => &config.remote_path,
            ConnectionConfig::Sftp { config, .. } => &config.remote_path,
        }
    }

    /// Check required fields without touching the network.
    ///
    /// Returns human-readable messages in a stable order; an empty list
    /// means the configuration is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        match self {
            ConnectionConfig::Smb { config, password } => {
                if config.host.trim().is_empty() {
                    errors.push("SMB host is required.".to_string());
                }
                if config.share.trim().is_empty() {
                    errors.push("SMB share is required.".to_string());
                }
                if config.username.trim().is_empty() {
                    errors.push("SMB username is required.".to_string());
                }
                if password.trim().is_empty() {
                    errors.push("SMB password is required.".to_string());
                }
                if !port_in_range(config.port) {
                    errors.push("SMB port must be an integer between 1 and 65535.".to_string());
                }
            }
            ConnectionConfig::Sftp { config, secret } => {
                if config.host.trim().is_empty() {
                    errors.push("SFTP host is required.".to_string());
                }
                if config.username.trim().is_empty() {
                    errors.push("SFTP username is required.".to_string());
                }
                if secret.trim().is_empty() {
                    errors.push(match config.auth_type {
                        SftpAuthType::Password => {
                            "SFTP password is required for password authentication.".to_string()
                        }
                        SftpAuthType::Key => {
                            "Private key is required for key-based authentication.".to_string()
                        }
                    });
                }
                if !port_in_range(config.port) {
                    errors.push("SFTP port must be an integer between 1 and 65535.".to_string());
                }
            }
        }
        errors
    }
}

/// One file to transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub id: String,
    pub filename: String,
    pub local_location: String,
    pub media_type: MediaType,
    pub creation_time: i64,
    /// Absolute destination path on the server
    pub remote_path: String,
}

/// Transfer progress snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UploadProgress {
    /// Completed fraction in `[0, 1]`
    pub fraction: f64,
    pub transferred_bytes: u64,
    pub total_bytes: u64,
}

impl UploadProgress {
    pub fn new(transferred_bytes: u64, total_bytes: u64) -> Self {
        let fraction = if total_bytes == 0 {
            1.0
        } else {
            (transferred_bytes as f64 / total_bytes as f64).clamp(0.0, 1.0)
        };
        Self {
            fraction,
            transferred_bytes,
            total_bytes,
        }
    }
}

/// Progress callback invoked synchronously from the uploader's task.
///
/// Implementations must keep it cheap; the core only forwards the value.
pub type ProgressSink = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// Outcome of a connection test. Never an error: failures are encoded here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestResult {
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl ConnectionTestResult {
    pub fn success(message: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            ok: true,
            message: message.into(),
            latency_ms: Some(latency_ms),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            latency_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteEntryKind {
    File,
    Directory,
}

/// Entry returned by a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RemoteEntryKind,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Milliseconds since the Unix epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<i64>,
}

/// Transport-independent upload capability
///
/// # Contract
///
/// - `test_connection` never fails; problems are reported in the result.
/// - `upload_file` creates missing remote parent directories and reports
///   non-decreasing progress fractions. Any error is treated by the core as
///   a per-item failure.
/// - Implementations are not expected to validate the configuration; the
///   core calls [`ConnectionConfig::validate`] before any I/O.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Transport served by this instance
    fn transport(&self) -> TransportKind;

    /// Human-readable implementation name, used in logs
    fn implementation_name(&self) -> &str;

    async fn test_connection(&self, config: &ConnectionConfig) -> ConnectionTestResult;

    async fn upload_file(
        &self,
        config: &ConnectionConfig,
        request: &UploadRequest,
        progress: ProgressSink,
    ) -> Result<()>;

    async fn list_directory(&self, config: &ConnectionConfig, path: &str)
        -> Result<Vec<RemoteEntry>>;
}

/// Placeholder used when the host did not provide an uploader for a
/// transport. Tests report failure and transfers are rejected.
#[derive(Debug, Clone)]
pub struct UnavailableUploader {
    transport: TransportKind,
}

impl UnavailableUploader {
    pub fn new(transport: TransportKind) -> Self {
        Self { transport }
    }

    fn message(&self) -> String {
        format!("{} transport not available", self.transport.as_str().to_uppercase())
    }
}

#[async_trait]
impl Uploader for UnavailableUploader {
    fn transport(&self) -> TransportKind {
        self.transport
    }

    fn implementation_name(&self) -> &str {
        "unavailable"
    }

    async fn test_connection(&self, _config: &ConnectionConfig) -> ConnectionTestResult {
        ConnectionTestResult::failure(self.message())
    }

    async fn upload_file(
        &self,
        _config: &ConnectionConfig,
        _request: &UploadRequest,
        _progress: ProgressSink,
    ) -> Result<()> {
        Err(BridgeError::NotAvailable(self.message()))
    }

    async fn list_directory(
        &self,
        _config: &ConnectionConfig,
        _path: &str,
    ) -> Result<Vec<RemoteEntry>> {
        Err(BridgeError::NotAvailable(self.message()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smb(host: &str, share: &str, user: &str, password: &str, port: u32) -> ConnectionConfig {
        ConnectionConfig::Smb {
            config: SmbConfig {
                host: host.to_string(),
                port,
                share: share.to_string(),
                remote_path: "/Camera Roll".to_string(),
                username: user.to_string(),
            },
            password: password.to_string(),
        }
    }

    #[test]
    fn test_valid_smb_config() {
        assert!(smb("nas.local", "photos", "me", "pw", 445).validate().is_empty());
    }

    #[test]
    fn test_smb_validation_order() {
        let errors = smb(" ", "", "", "", 0).validate();
        assert_eq!(
            errors,
            vec![
                "SMB host is required.",
                "SMB share is required.",
                "SMB username is required.",
                "SMB password is required.",
                "SMB port must be an integer between 1 and 65535.",
            ]
        );
    }

    #[test]
    fn test_sftp_secret_message_depends_on_auth_type() {
        let mut config = SftpConfig {
            host: "example.org".to_string(),
            username: "me".to_string(),
            ..Default::default()
        };
        let errors = ConnectionConfig::Sftp {
            config: config.clone(),
            secret: String::new(),
        }
        .validate();
        assert_eq!(
            errors,
            vec!["SFTP password is required for password authentication."]
        );

        config.auth_type = SftpAuthType::Key;
        config.port = 70_000;
        let errors = ConnectionConfig::Sftp {
            config,
            secret: "  ".to_string(),
        }
        .validate();
        assert_eq!(
            errors,
            vec![
                "Private key is required for key-based authentication.",
                "SFTP port must be an integer between 1 and 65535.",
            ]
        );
    }

    #[test]
    fn test_sanitized_restores_default_remote_path() {
        let config = SmbConfig {
            host: "  nas ".to_string(),
            remote_path: "   ".to_string(),
            ..Default::default()
        }
        .sanitized();

        assert_eq!(config.host, "nas");
        assert_eq!(config.remote_path, DEFAULT_SMB_REMOTE_PATH);
        assert_eq!(
            SftpConfig::default().sanitized().remote_path,
            DEFAULT_SFTP_REMOTE_PATH
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", smb("nas", "s", "u", "super-secret", 445));
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_upload_progress_fraction() {
        assert_eq!(UploadProgress::new(50, 200).fraction, 0.25);
        assert_eq!(UploadProgress::new(0, 0).fraction, 1.0);
        assert_eq!(UploadProgress::new(300, 200).fraction, 1.0);
    }

    #[test]
    fn test_remote_entry_serializes_type_field() {
        let entry = RemoteEntry {
            name: "2024-01".to_string(),
            kind: RemoteEntryKind::Directory,
            path: "/Camera Roll/2024-01".to_string(),
            size: None,
            modified_time: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "directory");
        assert!(json.get("size").is_none());
    }

    #[tokio::test]
    async fn test_unavailable_uploader() {
        let uploader = UnavailableUploader::new(TransportKind::Sftp);
        let config = ConnectionConfig::Sftp {
            config: SftpConfig::default(),
            secret: String::new(),
        };

        let result = uploader.test_connection(&config).await;
        assert!(!result.ok);
        assert_eq!(result.message, "SFTP transport not available");
        assert!(uploader.list_directory(&config, "/").await.is_err());
    }
}
