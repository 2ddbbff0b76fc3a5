//! Secure Credential Storage using OS Keychain

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureStore,
};
use keyring::Entry;
use tracing::{debug, warn};

/// Keychain service name used for connection secrets.
pub const DEFAULT_SERVICE_NAME: &str = "photosync";

/// Keyring-based secure storage
///
/// Uses platform-specific secure storage:
/// - macOS: Keychain
/// - Windows: Credential Manager (DPAPI)
/// - Linux: Secret Service (libsecret)
///
/// Values are base64-encoded because the keyring API only stores strings.
/// Headless Linux sessions often have no Secret Service; every call then
/// fails and the sync repository falls back to its settings-store copy.
pub struct KeyringSecureStore {
    service_name: String,
}

impl KeyringSecureStore {
    pub fn new() -> Self {
        Self::with_service_name(DEFAULT_SERVICE_NAME)
    }

    pub fn with_service_name(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service_name, key).map_err(map_keyring_error)
    }
}

impl Default for KeyringSecureStore {
    fn default() -> Self {
        Self::new()
    }
}

fn map_keyring_error(e: keyring::Error) -> BridgeError {
    match e {
        keyring::Error::NoStorageAccess(inner) => {
            BridgeError::NotAvailable(format!("Keyring not accessible: {}", inner))
        }
        keyring::Error::PlatformFailure(inner) => {
            BridgeError::NotAvailable(format!("Keyring platform failure: {}", inner))
        }
        other => BridgeError::OperationFailed(format!("Keyring error: {}", other)),
    }
}

#[async_trait]
impl SecureStore for KeyringSecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entry(key)?
            .set_password(&STANDARD.encode(value))
            .map_err(map_keyring_error)?;

        debug!(key = key, "Stored secret in keyring");
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.entry(key)?.get_password() {
            Ok(encoded) => {
                let decoded = STANDARD.decode(encoded.as_bytes()).map_err(|e| {
                    warn!(key = key, "Stored secret is not valid base64");
                    BridgeError::OperationFailed(format!("Failed to decode secret: {}", e))
                })?;
                Ok(Some(decoded))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(map_keyring_error(e)),
        }
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {
                debug!(key = key, "Deleted secret from keyring");
                Ok(())
            }
            Err(e) => Err(map_keyring_error(e)),
        }
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        // The keyring API cannot enumerate entries
        Ok(Vec::new())
    }

    async fn clear_all(&self) -> Result<()> {
        Err(BridgeError::NotAvailable(
            "Keyring entries must be deleted individually".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_service_name() {
        assert_eq!(KeyringSecureStore::new().service_name(), "photosync");
        assert_eq!(
            KeyringSecureStore::with_service_name("photosync-test").service_name(),
            "photosync-test"
        );
    }

    #[test]
    fn test_storage_access_errors_map_to_not_available() {
        let err = map_keyring_error(keyring::Error::NoStorageAccess("locked".into()));
        assert!(matches!(err, BridgeError::NotAvailable(_)));

        let err = map_keyring_error(keyring::Error::NoEntry);
        assert!(matches!(err, BridgeError::OperationFailed(_)));
    }

    #[tokio::test]
    async fn test_set_get_delete_when_keyring_available() {
        let store = KeyringSecureStore::with_service_name("photosync-test");
        let key = format!("photosync.smbPassword.{}", uuid::Uuid::new_v4());

        // CI machines frequently run without a Secret Service
        if let Err(e) = store.set_secret(&key, b"hunter2").await {
            println!("Keyring not available ({}), skipping test", e);
            return;
        }

        match store.get_secret(&key).await {
            Ok(Some(value)) => assert_eq!(value, b"hunter2".to_vec()),
            other => println!("Keyring read-back unsupported here: {:?}", other.map(|v| v.is_some())),
        }

        store.delete_secret(&key).await.unwrap();
        store.delete_secret(&key).await.unwrap();
    }
}
