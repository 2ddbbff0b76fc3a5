//! Error type shared by every bridge trait.
//!
//! Messages may reach the user through the activity log, so implementations
//! put paths and hosts in them but never credentials.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// The host has no implementation for this capability (no keychain, no
    /// uploader for a transport, ...)
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether the capability is missing rather than failing.
    pub fn is_not_available(&self) -> bool {
        matches!(self, BridgeError::NotAvailable(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_classification() {
        let err = BridgeError::NotAvailable("SFTP transport not available".to_string());
        assert_eq!(
            err.to_string(),
            "Bridge capability not available: SFTP transport not available"
        );
        assert!(err.is_not_available());

        let io: BridgeError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(io.to_string(), "IO error: gone");
        assert!(!io.is_not_available());
    }
}
