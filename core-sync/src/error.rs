use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("A scan or upload run is already in progress")]
    SyncInProgress,

    #[error("Policy violation: {0}")]
    Policy(String),

    #[error("Invalid connection settings: {0}")]
    InvalidConfig(String),

    #[error("Photo library permission not granted")]
    PermissionDenied,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid upload status: {0}")]
    InvalidStatus(String),

    #[error("Upload item {id} not found")]
    ItemNotFound { id: String },

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
