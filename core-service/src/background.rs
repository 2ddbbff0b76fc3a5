//! Background pass entry point shared by every host scheduler.

use core_sync::SyncEngine;
use std::sync::Arc;
use tracing::{debug, error};

/// Result reported back to the OS scheduler after a background pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundOutcome {
    /// At least one item was uploaded
    NewData,
    NoData,
    /// The pass aborted (panicked or was cancelled by the runtime)
    Failed,
}

impl BackgroundOutcome {
    pub fn from_uploaded(uploaded: usize) -> Self {
        if uploaded > 0 {
            Self::NewData
        } else {
            Self::NoData
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewData => "new_data",
            Self::NoData => "no_data",
            Self::Failed => "failed",
        }
    }
}

/// Run a silent background sync on its own task.
///
/// The engine reports run failures through its activity log, so only an
/// aborted task maps to [`BackgroundOutcome::Failed`].
pub async fn run_background_pass(engine: Arc<SyncEngine>) -> BackgroundOutcome {
    let outcome = match tokio::spawn(async move { engine.run_background_sync().await }).await {
        Ok(uploaded) => BackgroundOutcome::from_uploaded(uploaded),
        Err(e) => {
            error!("Background sync task aborted: {}", e);
            BackgroundOutcome::Failed
        }
    };
    debug!(outcome = outcome.as_str(), "Background pass finished");
    outcome
}
