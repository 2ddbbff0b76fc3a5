//! Runtime errors raised while assembling the core (configuration, default
//! bridges, logging bootstrap).

use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    /// A default bridge could not be created
    #[error("Bridge setup failed for {capability}: {source}")]
    Bridge {
        capability: String,
        #[source]
        source: BridgeError,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn bridge(capability: impl Into<String>, source: BridgeError) -> Self {
        Self::Bridge {
            capability: capability.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
