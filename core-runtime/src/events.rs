//! # Event Bus System
//!
//! Provides an event-driven architecture for the asset database orchestrator using
//! `tokio::sync::broadcast` (through `core_async::sync`). Editor panels, status bars
//! and tests observe startup, pause and task progress without holding a reference
//! to the orchestrator internals.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies for different domains
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//! - **Subscription Management**: Multiple subscribers can listen independently
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐    emit     ┌───────────┐
//! │   Startup    ├────────────>│           │
//! └──────────────┘             │           │
//!                              │ EventBus  │
//! ┌──────────────┐    emit     │ (broadcast│    subscribe    ┌────────────┐
//! │  Scheduler   ├────────────>│  channel) ├────────────────>│ Subscriber │
//! └──────────────┘             │           │                 └────────────┘
//!                              │           │
//! ┌──────────────┐    emit     │           │    subscribe    ┌────────────┐
//! │    Pause     ├────────────>│           ├────────────────>│ Subscriber │
//! └──────────────┘             └───────────┘                 └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{AssetDbEvent, CoreEvent, EventBus};
//!
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::AssetDb(AssetDbEvent::DatabaseReady {
//!         database: "assets".to_string(),
//!     }))
//!     .ok();
//!
//! assert!(subscriber.try_recv().is_ok());
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! `emit` fails only when nobody is subscribed; publishers in this workspace
//! ignore that case.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published and received through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Asset database orchestration events
    AssetDb(AssetDbEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::AssetDb(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::AssetDb(AssetDbEvent::DatabaseStartFailed { .. }) => EventSeverity::Error,
            CoreEvent::AssetDb(AssetDbEvent::TaskFailed { .. }) => EventSeverity::Error,
            CoreEvent::AssetDb(AssetDbEvent::CacheRestoreFallback { .. }) => {
                EventSeverity::Warning
            }
            CoreEvent::AssetDb(AssetDbEvent::DatabaseReady { .. }) => EventSeverity::Info,
            CoreEvent::AssetDb(AssetDbEvent::RegistryReady { .. }) => EventSeverity::Info,
            CoreEvent::AssetDb(AssetDbEvent::PauseStateChanged { .. }) => EventSeverity::Info,
            CoreEvent::AssetDb(AssetDbEvent::ShutDown) => EventSeverity::Info,
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
// Asset Database Events
// ============================================================================

/// Pause lifecycle as reported on the bus.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PausePhase {
    /// A pause was requested while busy work is running.
    Requested,
    /// Queue processing is halted.
    Paused,
    /// Queue processing resumed.
    Active,
}

/// Events related to database lifecycle, the task queue and pausing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AssetDbEvent {
    /// A database was added to the registry.
    DatabaseRegistered {
        /// Database name.
        database: String,
        /// Start priority; higher starts first.
        priority: i32,
    },
    /// A database was stopped and removed from the registry.
    DatabaseRemoved {
        /// Database name.
        database: String,
    },
    /// Pre-import finished; scripts and effects of the database are usable.
    DatabaseReachable {
        /// Database name.
        database: String,
    },
    /// A hot-added database finished starting.
    DatabaseReady {
        /// Database name.
        database: String,
    },
    /// Starting a database failed.
    DatabaseStartFailed {
        /// Database name.
        database: String,
        /// Which step failed (`pre_import`, `full_import`).
        phase: String,
        /// Human-readable error message.
        message: String,
    },
    /// Restoring from cache failed or no cache existed; two-phase start follows.
    CacheRestoreFallback {
        /// Database name.
        database: String,
        /// Why the cache could not be used.
        reason: String,
    },
    /// `start_all` completed and the task queue opened.
    RegistryReady {
        /// Databases that reached the started state, in start order.
        started: Vec<String>,
        /// Databases whose start failed.
        failed: Vec<String>,
    },
    /// The pause controller changed state.
    PauseStateChanged {
        /// New pause phase.
        phase: PausePhase,
        /// Who requested the pause, if any.
        source: Option<String>,
    },
    /// A queued task rejected its waiters.
    TaskFailed {
        /// Operation label.
        operation: String,
        /// Human-readable error message.
        message: String,
    },
    /// A lazy refresh batch was flushed to the import engine.
    LazyRefreshFlushed {
        /// Distinct paths refreshed, in request order.
        paths: Vec<String>,
    },
    /// The orchestrator shut down.
    ShutDown,
}

impl AssetDbEvent {
    fn description(&self) -> &str {
        match self {
            AssetDbEvent::DatabaseRegistered { .. } => "Database registered",
            AssetDbEvent::DatabaseRemoved { .. } => "Database removed",
            AssetDbEvent::DatabaseReachable { .. } => "Database pre-imported",
            AssetDbEvent::DatabaseReady { .. } => "Database ready",
            AssetDbEvent::DatabaseStartFailed { .. } => "Database failed to start",
            AssetDbEvent::CacheRestoreFallback { .. } => "Cache restore skipped",
            AssetDbEvent::RegistryReady { .. } => "All databases started",
            AssetDbEvent::PauseStateChanged { .. } => "Pause state changed",
            AssetDbEvent::TaskFailed { .. } => "Task failed",
            AssetDbEvent::LazyRefreshFlushed { .. } => "Lazy refresh flushed",
            AssetDbEvent::ShutDown => "Orchestrator shut down",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to orchestrator events.
///
/// Cloning the bus is cheap; all clones publish into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// When a subscriber falls behind by more than `capacity` events it
    /// receives `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
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

    /// Publishes an orchestrator event, ignoring the no-subscriber case.
    pub fn publish(&self, event: AssetDbEvent) {
        let _ = self.emit(CoreEvent::AssetDb(event));
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

/// A wrapper around `broadcast::Receiver` with additional filtering capabilities.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{AssetDbEvent, CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let ready_only = EventStream::new(event_bus.subscribe()).filter(|event| {
///     matches!(event, CoreEvent::AssetDb(AssetDbEvent::RegistryReady { .. }))
/// });
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

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
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

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
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
