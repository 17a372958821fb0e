//! # Pause Controller
//!
//! Cooperative pause of the task queue with a bounded wait.
//!
//! ```text
//! Active ──pause (idle)──────────────────────────> Paused
//! Active ──pause (busy)──> PauseRequested ──idle─> Paused
//!                                 └──────timeout─> Paused
//! Paused / PauseRequested ──resume──> Active
//! ```
//!
//! A requested pause resolves once a scheduler pass observes the system idle,
//! or when the configured timeout elapses. The timeout never cancels
//! in-flight work; it only stops the pause from waiting forever.

use bridge_traits::Clock;
use chrono::{DateTime, Utc};
use core_async::sync::oneshot;
use core_async::time::{sleep, Duration};
use core_runtime::events::{AssetDbEvent, EventBus, PausePhase};
use futures::future::{self, BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// Future returned by [`PauseController::pause`].
///
/// Resolves `true` once paused, `false` if the request was lifted by a
/// resume first.
pub type PauseFuture = Shared<BoxFuture<'static, bool>>;

/// An outstanding pause request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PauseRequest {
    pub source: String,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PauseState {
    Active,
    PauseRequested(PauseRequest),
    Paused { source: String },
}

struct Outstanding {
    generation: u64,
    future: PauseFuture,
    resolve: oneshot::Sender<bool>,
    // Dropping this ends the timeout task.
    _cancel_timeout: oneshot::Sender<()>,
}

struct Inner {
    state: PauseState,
    outstanding: Option<Outstanding>,
    generation: u64,
}

/// Shared handle; clones control the same pause state.
#[derive(Clone)]
pub struct PauseController {
    inner: Arc<Mutex<Inner>>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    events: EventBus,
}

impl PauseController {
    pub fn new(clock: Arc<dyn Clock>, timeout: Duration, events: EventBus) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: PauseState::Active,
                outstanding: None,
                generation: 0,
            })),
            clock,
            timeout,
            events,
        }
    }

    /// Request a pause on behalf of `source`.
    ///
    /// Must be called from within the async runtime when `busy` is true,
    /// since the timeout runs as a spawned task.
    pub fn pause(&self, source: &str, busy: bool) -> PauseFuture {
        let mut inner = self.inner.lock();

        match &inner.state {
            PauseState::Paused { .. } => return resolved(true),
            PauseState::PauseRequested(_) => {
                if let Some(outstanding) = &inner.outstanding {
                    return outstanding.future.clone();
                }
            }
            PauseState::Active => {}
        }

        if !busy {
            inner.state = PauseState::Paused {
                source: source.to_string(),
            };
            drop(inner);
            info!(source, "Asset databases paused");
            self.publish(PausePhase::Paused, Some(source));
            return resolved(true);
        }

        inner.generation += 1;
        let generation = inner.generation;

        let (resolve, receiver) = oneshot::channel();
        let future = receiver.map(|result| result.unwrap_or(false)).boxed().shared();

        let (cancel_timeout, cancelled) = oneshot::channel::<()>();
        let controller = self.clone();
        let timeout = self.timeout;
        core_async::spawn(async move {
            core_async::select! {
                _ = cancelled => {}
                _ = sleep(timeout) => controller.force(generation),
            }
        });

        inner.state = PauseState::PauseRequested(PauseRequest {
            source: source.to_string(),
            requested_at: self.clock.now(),
        });
        inner.outstanding = Some(Outstanding {
            generation,
            future: future.clone(),
            resolve,
            _cancel_timeout: cancel_timeout,
        });
        drop(inner);

        debug!(source, timeout_ms = timeout.as_millis() as u64, "Pause requested while busy");
        self.publish(PausePhase::Requested, Some(source));
        future
    }

    /// Complete a requested pause if the system is idle.
    ///
    /// Returns `true` if a pending request was resolved.
    pub fn try_resolve(&self, busy: bool) -> bool {
        if busy {
            return false;
        }

        let source = {
            let mut inner = self.inner.lock();
            let PauseState::PauseRequested(request) = &inner.state else {
                return false;
            };
            let source = request.source.clone();
            inner.state = PauseState::Paused {
                source: source.clone(),
            };
            if let Some(outstanding) = inner.outstanding.take() {
                let _ = outstanding.resolve.send(true);
            }
            source
        };

        info!(source = %source, "Asset databases paused");
        self.publish(PausePhase::Paused, Some(&source));
        true
    }

    fn force(&self, generation: u64) {
        let request = {
            let mut inner = self.inner.lock();
            let current = inner
                .outstanding
                .as_ref()
                .is_some_and(|outstanding| outstanding.generation == generation);
            if !current {
                return;
            }
            let PauseState::PauseRequested(request) = inner.state.clone() else {
                return;
            };
            inner.state = PauseState::Paused {
                source: request.source.clone(),
            };
            if let Some(outstanding) = inner.outstanding.take() {
                let _ = outstanding.resolve.send(true);
            }
            request
        };

        let waited_ms = (self.clock.now() - request.requested_at).num_milliseconds();
        debug!(
            source = %request.source,
            waited_ms,
            "Pause timed out waiting for busy work; pausing anyway"
        );
        self.publish(PausePhase::Paused, Some(&request.source));
    }

    /// Lift a pause or pending pause request.
    ///
    /// Returns `false` when already active.
    pub fn resume(&self) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.state == PauseState::Active {
                return false;
            }
            inner.state = PauseState::Active;
            if let Some(outstanding) = inner.outstanding.take() {
                let _ = outstanding.resolve.send(false);
            }
        }

        info!("Asset databases resumed");
        self.publish(PausePhase::Active, None);
        true
    }

    /// Only a completed pause counts; a merely requested one does not.
    pub fn is_paused(&self) -> bool {
        matches!(self.inner.lock().state, PauseState::Paused { .. })
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().state == PauseState::Active
    }

    pub fn state(&self) -> PauseState {
        self.inner.lock().state.clone()
    }

    fn publish(&self, phase: PausePhase, source: Option<&str>) {
        self.events.publish(AssetDbEvent::PauseStateChanged {
            phase,
            source: source.map(str::to_string),
        });
    }
}

impl std::fmt::Debug for PauseController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PauseController")
            .field("state", &self.state())
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn resolved(value: bool) -> PauseFuture {
    future::ready(value).boxed().shared()
}
