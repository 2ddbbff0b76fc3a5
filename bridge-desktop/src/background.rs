//! Background Task Execution Implementation

use async_trait::async_trait;
use bridge_traits::{
    background::{BackgroundExecutor, TaskConstraints, TaskId, TaskStatus},
    error::{BridgeError, Result},
    network::{NetworkInfo, NetworkMonitor, NetworkStatus},
};
use futures_util::{future::BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

type TaskHandler = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;
type TaskTable = Arc<RwLock<HashMap<TaskId, TaskInfo>>>;

/// In-process periodic scheduler for desktop hosts.
///
/// The host registers the work for a task name with
/// [`register_task_handler`](Self::register_task_handler); the sync engine
/// then only decides whether that task is scheduled and how often. The first
/// run happens one full interval after scheduling, since launch already
/// triggers a sync of its own.
pub struct TokioBackgroundExecutor {
    tasks: TaskTable,
    handlers: Arc<RwLock<HashMap<String, TaskHandler>>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
}

struct TaskInfo {
    status: TaskStatus,
    handle: Option<JoinHandle<()>>,
    cancel: Option<oneshot::Sender<()>>,
}

impl TokioBackgroundExecutor {
    pub fn new() -> Self {
        Self::with_network_monitor(None)
    }

    /// Executor that checks task network constraints before every run.
    pub fn with_network_monitor(monitor: Option<Arc<dyn NetworkMonitor>>) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            network_monitor: monitor,
        }
    }

    /// Register the work invoked when `task_id` fires.
    pub async fn register_task_handler<F, Fut>(&self, task_id: &str, handler: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        self.handlers
            .write()
            .await
            .insert(task_id.to_string(), Arc::new(move || handler().boxed()));
    }

    async fn handler_for(&self, task_id: &str) -> Option<TaskHandler> {
        self.handlers.read().await.get(task_id).cloned()
    }

    async fn constraints_satisfied(
        monitor: Option<&Arc<dyn NetworkMonitor>>,
        constraints: &TaskConstraints,
    ) -> bool {
        if !(constraints.requires_network || constraints.requires_wifi) {
            return true;
        }

        let Some(monitor) = monitor else {
            return true;
        };

        match monitor.get_network_info().await {
            Ok(NetworkInfo {
                status: NetworkStatus::Connected,
                network_type,
                ..
            }) => {
                !constraints.requires_wifi
                    || network_type.is_some_and(|kind| kind.is_unmetered_class())
            }
            Ok(_) => false,
            Err(err) => {
                warn!("Network monitor error: {}", err);
                false
            }
        }
    }

    async fn set_status(tasks: &TaskTable, id: &TaskId, status: TaskStatus) {
        if let Some(info) = tasks.write().await.get_mut(id) {
            info.status = status;
        }
    }

    async fn run_recurring_task(
        tasks: TaskTable,
        id: TaskId,
        handler: TaskHandler,
        period: Duration,
        constraints: TaskConstraints,
        mut cancel_rx: oneshot::Receiver<()>,
        monitor: Option<Arc<dyn NetworkMonitor>>,
    ) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    Self::set_status(&tasks, &id, TaskStatus::Cancelled).await;
                    break;
                }
                _ = ticker.tick() => {
                    if !Self::constraints_satisfied(monitor.as_ref(), &constraints).await {
                        debug!(task_id = %id.as_str(), "Constraints not satisfied; skipping run");
                        continue;
                    }

                    Self::set_status(&tasks, &id, TaskStatus::Running).await;
                    let status = match handler().await {
                        Ok(()) => TaskStatus::Completed,
                        Err(err) => {
                            warn!(task_id = %id.as_str(), error = %err, "Recurring task failed");
                            TaskStatus::Failed
                        }
                    };
                    Self::set_status(&tasks, &id, status).await;
                }
            }
        }
    }

    fn task_not_found(task_id: &TaskId) -> BridgeError {
        BridgeError::OperationFailed(format!("Task not found: {}", task_id.as_str()))
    }
}

impl Default for TokioBackgroundExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackgroundExecutor for TokioBackgroundExecutor {
    async fn schedule_task(
        &self,
        task_id: &str,
        interval: Duration,
        constraints: TaskConstraints,
    ) -> Result<TaskId> {
        let id = TaskId::new(task_id);
        let handler = self.handler_for(task_id).await.ok_or_else(|| {
            BridgeError::OperationFailed(format!("No handler registered for task: {}", task_id))
        })?;

        // Rescheduling replaces the previous timer
        if let Some(previous) = self.tasks.write().await.remove(&id) {
            stop(previous);
        }

        debug!(
            task_id = task_id,
            interval_secs = interval.as_secs(),
            requires_wifi = constraints.requires_wifi,
            "Scheduling recurring task"
        );

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let mut tasks = self.tasks.write().await;
        let handle = tokio::spawn(Self::run_recurring_task(
            Arc::clone(&self.tasks),
            id.clone(),
            handler,
            interval,
            constraints,
            cancel_rx,
            self.network_monitor.clone(),
        ));
        tasks.insert(
            id.clone(),
            TaskInfo {
                status: TaskStatus::Scheduled,
                handle: Some(handle),
                cancel: Some(cancel_tx),
            },
        );

        Ok(id)
    }

    async fn cancel_task(&self, task_id: &TaskId) -> Result<()> {
        debug!(task_id = %task_id.as_str(), "Cancelling task");

        let info = self
            .tasks
            .write()
            .await
            .remove(task_id)
            .ok_or_else(|| Self::task_not_found(task_id))?;
        stop(info);
        Ok(())
    }

    async fn get_task_status(&self, task_id: &TaskId) -> Result<TaskStatus> {
        self.tasks
            .read()
            .await
            .get(task_id)
            .map(|info| info.status.clone())
            .ok_or_else(|| Self::task_not_found(task_id))
    }

    async fn list_tasks(&self) -> Result<Vec<TaskId>> {
        Ok(self.tasks.read().await.keys().cloned().collect())
    }
}

fn stop(mut info: TaskInfo) {
    if let Some(cancel) = info.cancel.take() {
        let _ = cancel.send(());
    }
    if let Some(handle) = info.handle.take() {
        handle.abort();
    }
}
