//! Background Execution and Task Scheduling
//!
//! Provides platform-aware periodic task scheduling. The sync engine registers
//! a single recurring task that runs a silent upload pass.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Task execution constraints
#[derive(Debug, Clone)]
pub struct TaskConstraints {
    /// Require WiFi connection
    pub requires_wifi: bool,
    /// Require any network connection
    pub requires_network: bool,
    /// Require device to be charging
    pub requires_charging: bool,
}

impl Default for TaskConstraints {
    fn default() -> Self {
        Self {
            requires_wifi: false,
            requires_network: true,
            requires_charging: false,
        }
    }
}

/// Scheduled task identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Task execution status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Task is scheduled but not yet running
    Scheduled,
    /// Task is currently executing
    Running,
    /// Task completed successfully
    Completed,
    /// Task failed
    Failed,
    /// Task was cancelled
    Cancelled,
}

/// Background task executor trait
///
/// Abstracts platform-specific periodic scheduling:
/// - **iOS**: BGTaskScheduler (minimum interval is advisory)
/// - **Android**: WorkManager (respects Doze mode)
/// - **Desktop**: In-process Tokio scheduler
///
/// Executors only decide *when* a task fires; the work itself is registered
/// with the concrete executor by the host.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::background::{BackgroundExecutor, TaskConstraints};
/// use std::time::Duration;
///
/// async fn schedule_uploads(executor: &dyn BackgroundExecutor) -> Result<()> {
///     executor
///         .schedule_task(
///             "photosync.background.sync",
///             Duration::from_secs(15 * 60),
///             TaskConstraints::default(),
///         )
///         .await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait BackgroundExecutor: Send + Sync {
    /// Schedule a recurring task
    ///
    /// # Arguments
    ///
    /// * `task_id` - Unique identifier for the task
    /// * `interval` - Minimum interval between runs
    /// * `constraints` - Execution constraints (network, charging, etc.)
    async fn schedule_task(
        &self,
        task_id: &str,
        interval: Duration,
        constraints: TaskConstraints,
    ) -> Result<TaskId>;

    /// Cancel a scheduled task
    async fn cancel_task(&self, task_id: &TaskId) -> Result<()>;

    /// Get status of a task
    async fn get_task_status(&self, task_id: &TaskId) -> Result<TaskStatus>;

    /// List all scheduled tasks
    async fn list_tasks(&self) -> Result<Vec<TaskId>>;

    /// Check if background execution is available
    async fn is_available(&self) -> bool {
        true
    }
}
