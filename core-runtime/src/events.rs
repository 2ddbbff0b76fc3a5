//! # Event Bus System
//!
//! Publishes engine state changes to hosts (UI layers, notification daemons,
//! CLI progress bars) through `tokio::sync::broadcast`. The sync engine is the
//! single producer; any number of consumers may subscribe.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     emit      ┌───────────┐     subscribe    ┌────────────┐
//! │ Sync Engine ├──────────────>│ EventBus  ├─────────────────>│ UI / Host  │
//! └─────────────┘               │ (broadcast│                  └────────────┘
//!                               │  channel) │     subscribe    ┌────────────┐
//!                               │           ├─────────────────>│ Notifier   │
//!                               └───────────┘                  └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Sync(SyncEvent::PhaseChanged {
//!         phase: "syncing".to_string(),
//!     }))
//!     .ok();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert_eq!(event.description(), "Engine phase changed");
//! # }
//! ```
//!
//! ## Event Types
//!
//! ### Sync Events
//! - `PhaseChanged`: Engine moved between idle, scanning and syncing
//! - `ScanCompleted`: A discovery pass merged new items into the queue
//! - `RunStarted` / `RunFinished`: Upload pass boundaries
//! - `ItemStarted`, `ItemProgress`, `ItemCompleted`, `ItemFailed`: Per-item transfer lifecycle
//!
//! ### Queue Events
//! - `Changed`: Per-status counts after any queue mutation
//!
//! ### Activity Events
//! - `LogAppended`: A user-visible activity entry was recorded
//! - `SettingsSaved`: Connection or sync settings were persisted
//! - `PermissionChanged`: Photo library permission state changed
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   Progress ticks are the usual cause; the next `Queue::Changed` carries the
//!   full picture again.
//! - **`RecvError::Closed`**: The engine was dropped.
//!
//! The engine emits with `.ok()`: having no subscriber is normal.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Scan and upload run events
    Sync(SyncEvent),
    /// Upload queue changes
    Queue(QueueEvent),
    /// Activity log, settings and permission events
    Activity(ActivityEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Queue(e) => e.description(),
            CoreEvent::Activity(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Activity(ActivityEvent::LogAppended { level, .. }) if level == "error" => {
                EventSeverity::Error
            }
            CoreEvent::Sync(SyncEvent::ItemFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::RunFinished { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::ScanCompleted { .. }) => EventSeverity::Info,
            CoreEvent::Activity(_) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted while scanning the library or uploading the queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// Engine phase changed.
    PhaseChanged {
        /// `idle`, `scanning` or `syncing`.
        phase: String,
    },
    /// A discovery pass finished.
    ScanCompleted {
        /// Assets returned by the source.
        discovered: u64,
        /// Ids that were not yet in the queue.
        added: u64,
    },
    /// An upload pass started.
    RunStarted {
        run_id: String,
        /// What initiated the run (e.g. "manual", "background", "launch").
        trigger: Option<String>,
        /// Items selected for this pass.
        pending_items: u64,
    },
    /// An item transfer started.
    ItemStarted {
        run_id: String,
        item_id: String,
        /// Attempt number, starting at 1.
        attempt: u32,
        remote_path: String,
    },
    /// Transfer progress for the current item.
    ItemProgress {
        run_id: String,
        item_id: String,
        /// Progress percentage (0-100).
        percent: u8,
    },
    /// Item reached `completed`.
    ItemCompleted {
        run_id: String,
        item_id: String,
        remote_path: String,
    },
    /// Item reached `failed`.
    ItemFailed {
        run_id: String,
        item_id: String,
        message: String,
        attempt: u32,
        /// No further automatic or manual retries are allowed.
        retry_exhausted: bool,
    },
    /// An upload pass finished, whether completed or stopped early.
    RunFinished {
        run_id: String,
        uploaded: u64,
        failed: u64,
        /// The loop stopped because cancellation was requested.
        stopped_early: bool,
        duration_ms: u64,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::PhaseChanged { .. } => "Engine phase changed",
            SyncEvent::ScanCompleted { .. } => "Media scan completed",
            SyncEvent::RunStarted { .. } => "Upload run started",
            SyncEvent::ItemStarted { .. } => "Upload started",
            SyncEvent::ItemProgress { .. } => "Upload in progress",
            SyncEvent::ItemCompleted { .. } => "Upload completed",
            SyncEvent::ItemFailed { .. } => "Upload failed",
            SyncEvent::RunFinished { .. } => "Upload run finished",
        }
    }
}

// ============================================================================
// Queue Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum QueueEvent {
    /// Queue contents changed.
    Changed {
        pending: u64,
        uploading: u64,
        completed: u64,
        failed: u64,
    },
}

impl QueueEvent {
    fn description(&self) -> &str {
        match self {
            QueueEvent::Changed { .. } => "Upload queue changed",
        }
    }
}

// ============================================================================
// Activity Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ActivityEvent {
    /// An activity log entry was recorded.
    LogAppended {
        entry_id: String,
        /// `info` or `error`.
        level: String,
        message: String,
    },
    /// Settings were persisted.
    SettingsSaved {
        /// `connection` or `sync`.
        section: String,
    },
    /// Photo library permission changed.
    PermissionChanged {
        /// `unknown`, `granted` or `denied`.
        state: String,
    },
}

impl ActivityEvent {
    fn description(&self) -> &str {
        match self {
            ActivityEvent::LogAppended { .. } => "Activity recorded",
            ActivityEvent::SettingsSaved { .. } => "Settings saved",
            ActivityEvent::PermissionChanged { .. } => "Library permission changed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let queue_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Queue(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events that match the predicate will be returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
