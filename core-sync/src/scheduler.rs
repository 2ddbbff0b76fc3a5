//! Background task registration.
//!
//! Keeps the platform scheduler in line with the user's background sync
//! settings. The recurring task itself only triggers a silent upload run;
//! see [`SyncEngine::run_background_sync`](crate::SyncEngine::run_background_sync).

use crate::settings::SyncSettings;
use crate::Result;
use bridge_traits::background::{BackgroundExecutor, TaskConstraints, TaskId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const BACKGROUND_TASK_NAME: &str = "photosync.background.sync";
pub const MIN_BACKGROUND_INTERVAL: Duration = Duration::from_secs(60);

/// Scheduler interval for a configured number of minutes
pub fn background_interval(minutes: u32) -> Duration {
    Duration::from_secs(u64::from(minutes) * 60).max(MIN_BACKGROUND_INTERVAL)
}

/// What [`BackgroundRegistration::apply`] changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationChange {
    Unchanged,
    Scheduled,
    Cancelled,
    /// The executor reported that background execution is unavailable
    Unavailable,
}

pub struct BackgroundRegistration {
    executor: Arc<dyn BackgroundExecutor>,
}

impl BackgroundRegistration {
    pub fn new(executor: Arc<dyn BackgroundExecutor>) -> Self {
        Self { executor }
    }

    pub async fn is_registered(&self) -> Result<bool> {
        let tasks = self.executor.list_tasks().await?;
        Ok(tasks.iter().any(|task| task.as_str() == BACKGROUND_TASK_NAME))
    }

    /// Register or unregister the recurring task to match `settings`.
    ///
    /// An already registered task is left as is, even if the interval
    /// changed.
    pub async fn apply(&self, settings: &SyncSettings) -> Result<RegistrationChange> {
        if !self.executor.is_available().await {
            debug!("Background execution unavailable, skipping registration");
            return Ok(RegistrationChange::Unavailable);
        }

        let registered = self.is_registered().await?;

        match (settings.background_sync_enabled, registered) {
            (false, true) => {
                self.executor
                    .cancel_task(&TaskId::new(BACKGROUND_TASK_NAME))
                    .await?;
                info!("Unregistered background task {}", BACKGROUND_TASK_NAME);
                Ok(RegistrationChange::Cancelled)
            }
            (true, false) => {
                let interval = background_interval(settings.background_interval_minutes);
                let constraints = TaskConstraints {
                    requires_wifi: settings.wifi_only,
                    requires_network: true,
                    requires_charging: false,
                };
                self.executor
                    .schedule_task(BACKGROUND_TASK_NAME, interval, constraints)
                    .await?;
                info!(
                    "Registered background task {} every {}s",
                    BACKGROUND_TASK_NAME,
                    interval.as_secs()
                );
                Ok(RegistrationChange::Scheduled)
            }
            _ => Ok(RegistrationChange::Unchanged),
        }
    }
}
