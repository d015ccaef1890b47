//! # Event Bus System
//!
//! Provides an event-driven view of the backup engine using `tokio::sync::broadcast`.
//! Observers (the CLI, tests, a future status endpoint) subscribe to typed
//! events without the engine knowing who is listening.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies per engine stage
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐
//! │   Detector   ├──────────────>│           │
//! └──────────────┘               │           │
//!                                │ EventBus  │
//! ┌──────────────┐     emit      │ (broadcast│     subscribe    ┌────────────┐
//! │ Coordinator  ├──────────────>│  channel) ├─────────────────>│ Subscriber │
//! └──────────────┘               │           │                  └────────────┘
//!                                │           │
//! ┌──────────────┐     emit      │           │     subscribe    ┌────────────┐
//! │  Retention   ├──────────────>│           ├─────────────────>│ Subscriber │
//! └──────────────┘               └───────────┘                  └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, TransferEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Transfer(TransferEvent::Started {
//!         artifact: "daily.tar".to_string(),
//!         size_bytes: 1024,
//!     }))
//!     .ok();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert_eq!(event.description(), "Transfer started");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Emitting with no subscribers returns `SendError`; publishers treat that as
//! "nobody listening", not as a failure.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
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
    /// Arrival detection events
    Detection(DetectionEvent),
    /// Copy and verification events
    Transfer(TransferEvent),
    /// Destination cleanup events
    Retention(RetentionEvent),
    /// Monitoring lifecycle events
    Monitor(MonitorEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Detection(e) => e.description(),
            CoreEvent::Transfer(e) => e.description(),
            CoreEvent::Retention(e) => e.description(),
            CoreEvent::Monitor(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Transfer(TransferEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Transfer(TransferEvent::AttemptFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Retention(RetentionEvent::DeletionFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Transfer(TransferEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Retention(RetentionEvent::Applied { .. }) => EventSeverity::Info,
            CoreEvent::Monitor(_) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Detection Events
// ============================================================================

/// Events raised while watching the source directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DetectionEvent {
    /// A new artifact passed filtering and debouncing.
    ArtifactDetected {
        /// Artifact file name.
        artifact: String,
        /// Full path in the source directory.
        path: String,
    },
    /// A duplicate event inside the debounce window was dropped.
    Debounced {
        /// Artifact file name.
        artifact: String,
    },
}

impl DetectionEvent {
    fn description(&self) -> &str {
        match self {
            DetectionEvent::ArtifactDetected { .. } => "New backup artifact detected",
            DetectionEvent::Debounced { .. } => "Duplicate event suppressed",
        }
    }
}

// ============================================================================
// Transfer Events
// ============================================================================

/// Events for a single artifact's copy to the destination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum TransferEvent {
    /// Copy is about to begin.
    Started {
        artifact: String,
        size_bytes: u64,
    },
    /// One attempt failed; another may follow.
    AttemptFailed {
        artifact: String,
        /// 1-based attempt ordinal.
        attempt: u32,
        reason: String,
    },
    /// Artifact is on the destination and verified.
    Completed {
        artifact: String,
        size_bytes: u64,
        attempts: u32,
        duration_ms: u64,
        /// `None` when the checksum was skipped for a large artifact.
        checksum_match: Option<bool>,
    },
    /// All attempts failed, or the source was unusable.
    Failed {
        artifact: String,
        attempts: u32,
        error: String,
    },
}

impl TransferEvent {
    fn description(&self) -> &str {
        match self {
            TransferEvent::Started { .. } => "Transfer started",
            TransferEvent::AttemptFailed { .. } => "Transfer attempt failed",
            TransferEvent::Completed { .. } => "Transfer completed",
            TransferEvent::Failed { .. } => "Transfer failed",
        }
    }
}

// ============================================================================
// Retention Events
// ============================================================================

/// Events from destination cleanup passes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum RetentionEvent {
    /// A cleanup pass finished.
    Applied {
        /// Names deleted, oldest first.
        deleted: Vec<String>,
        /// Artifacts remaining on the destination.
        kept: usize,
        freed_bytes: u64,
    },
    /// One artifact could not be deleted; the pass continued.
    DeletionFailed {
        artifact: String,
        error: String,
    },
}

impl RetentionEvent {
    fn description(&self) -> &str {
        match self {
            RetentionEvent::Applied { .. } => "Retention applied",
            RetentionEvent::DeletionFailed { .. } => "Failed to delete old artifact",
        }
    }
}

// ============================================================================
// Monitor Events
// ============================================================================

/// Events for the monitoring loop itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum MonitorEvent {
    /// Watching the source directory.
    Started {
        source_dir: String,
        destination_dir: String,
    },
    /// Monitoring loop exited.
    Stopped {
        processed: u64,
        failed: u64,
    },
    /// Startup sync of pre-existing artifacts finished.
    BulkSyncCompleted {
        synced: Vec<String>,
        failed: usize,
    },
}

impl MonitorEvent {
    fn description(&self) -> &str {
        match self {
            MonitorEvent::Started { .. } => "Monitoring started",
            MonitorEvent::Stopped { .. } => "Monitoring stopped",
            MonitorEvent::BulkSyncCompleted { .. } => "Existing backups synced",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cloning is cheap; all clones publish into the same channel.
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
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
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

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with predicate filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let transfers = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Transfer(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned.
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

    /// Receives the next event that passes the filter (if any).
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
