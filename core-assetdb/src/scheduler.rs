//! # Task Scheduler
//!
//! Single ordered queue for every mutating entry point.
//!
//! ## Overview
//!
//! - Every task is queued. Adding a task to an open, unpaused scheduler
//!   with no drain running starts one; tasks added meanwhile wait behind the
//!   running one, so no two tasks ever run at once.
//! - A task equal to the current tail is merged into it: the new caller is
//!   added as another waiter and the operation runs once.
//! - [`TaskScheduler::step`] drains the queue in FIFO order, one task at a
//!   time. While the system is busy, refresh-class tasks keep their place and
//!   later tasks run past them.
//! - A failing task rejects only its own waiters; the drain continues.
//!
//! ## Usage
//!
//! ```ignore
//! let handle = scheduler.add_task(
//!     Operation::new(OperationKind::Refresh),
//!     task_fn(move || async move { refresh_everything().await }),
//! );
//! let value = handle.await?;
//! ```

use core_async::sync::oneshot;
use core_runtime::events::{AssetDbEvent, EventBus};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, trace, warn};

use crate::busy::BusyTracker;
use crate::error::TaskError;
use crate::operation::Operation;
use crate::pause::PauseController;

/// Value produced by a task body.
pub type TaskOutput = Value;

/// Settled outcome delivered to every waiter of a task.
pub type TaskResult = std::result::Result<TaskOutput, TaskError>;

/// Deferred task body.
pub type TaskFn = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<TaskOutput>> + Send>;

/// Box an async closure as a [`TaskFn`].
pub fn task_fn<F, Fut>(f: F) -> TaskFn
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<TaskOutput>> + Send + 'static,
{
    Box::new(move || f().boxed())
}

struct Task {
    operation: Operation,
    run: TaskFn,
    waiters: Vec<oneshot::Sender<TaskResult>>,
}

impl Task {
    fn abandon(self) {
        let error = TaskError::Abandoned {
            operation: self.operation.label(),
        };
        for waiter in self.waiters {
            let _ = waiter.send(Err(error.clone()));
        }
    }
}

/// Resolves to the outcome of a task added with [`TaskScheduler::add_task`].
///
/// The task keeps its place in the queue even if the handle is dropped.
pub struct TaskHandle {
    operation: String,
    receiver: oneshot::Receiver<TaskResult>,
}

impl TaskHandle {
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl Future for TaskHandle {
    type Output = TaskResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        Pin::new(&mut this.receiver).poll(cx).map(|result| {
            result.unwrap_or_else(|_| {
                Err(TaskError::Abandoned {
                    operation: this.operation.clone(),
                })
            })
        })
    }
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<Task>,
    open: bool,
    closed: bool,
    draining: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    busy: BusyTracker,
    pause: PauseController,
    events: EventBus,
}

/// Shared handle; clones feed the same queue.
#[derive(Clone)]
pub struct TaskScheduler {
    shared: Arc<Shared>,
}

impl TaskScheduler {
    /// Create a scheduler. It queues tasks until [`open`](Self::open) is called.
    pub fn new(busy: BusyTracker, pause: PauseController, events: EventBus) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                busy,
                pause,
                events,
            }),
        }
    }

    /// Run or enqueue `operation`; the handle resolves with its outcome.
    pub fn add_task(&self, operation: Operation, run: TaskFn) -> TaskHandle {
        let (sender, receiver) = oneshot::channel();
        let label = operation.label();
        self.schedule(operation, run, Some(sender));
        TaskHandle {
            operation: label,
            receiver,
        }
    }

    /// Queue `operation` without waiting for it.
    pub fn submit(&self, operation: Operation, run: TaskFn) {
        self.schedule(operation, run, None);
    }

    fn schedule(
        &self,
        operation: Operation,
        run: TaskFn,
        waiter: Option<oneshot::Sender<TaskResult>>,
    ) {
        let task = Task {
            operation,
            run,
            waiters: waiter.into_iter().collect(),
        };

        let start_drain = {
            let mut state = self.shared.state.lock();

            if state.closed {
                drop(state);
                task.abandon();
                return;
            }

            trace!(operation = %task.operation, pending = state.queue.len(), "Queueing task");
            enqueue(&mut state.queue, task);

            let start = !state.draining && state.open && !self.shared.pause.is_paused();
            if start {
                state.draining = true;
            }
            start
        };

        if start_drain {
            let scheduler = self.clone();
            core_async::spawn(async move {
                scheduler.drain().await;
            });
        }
    }

    /// Spawn a [`step`](Self::step) pass.
    pub fn schedule_step(&self) {
        let scheduler = self.clone();
        core_async::spawn(async move {
            scheduler.step().await;
        });
    }

    /// Drain the queue as far as the busy and pause state allow.
    ///
    /// Only one drain runs at a time; a running drain picks up whatever is
    /// queued while it works.
    pub async fn step(&self) {
        self.shared.pause.try_resolve(self.shared.busy.is_busy());

        {
            let mut state = self.shared.state.lock();
            if state.draining || !state.open || state.queue.is_empty() {
                return;
            }
            state.draining = true;
        }

        self.drain().await;
    }

    /// Run queued tasks one at a time. The caller has set `draining`.
    async fn drain(&self) {
        while let Some(task) = self.next_runnable() {
            self.execute(task).await;
        }
    }

    /// Pop the first task allowed to run, skipping refreshes while busy.
    /// Clears `draining` when nothing can run.
    fn next_runnable(&self) -> Option<Task> {
        self.shared.pause.try_resolve(self.shared.busy.is_busy());

        // Read under the queue lock, together with clearing `draining`.
        let mut state = self.shared.state.lock();
        let busy = self.shared.busy.is_busy();
        let paused = self.shared.pause.is_paused();
        if !state.open || paused {
            if paused && !state.queue.is_empty() {
                debug!(pending = state.queue.len(), "Paused; holding queued tasks");
            }
            state.draining = false;
            return None;
        }

        let index = state
            .queue
            .iter()
            .position(|task| !(busy && task.operation.kind.is_refresh_like()));
        if index != Some(0) && !state.queue.is_empty() {
            debug!(pending = state.queue.len(), "Deferring refresh while busy");
        }

        let next = index.and_then(|index| state.queue.remove(index));
        if next.is_none() {
            state.draining = false;
        }
        next
    }

    async fn execute(&self, task: Task) {
        let Task {
            operation,
            run,
            waiters,
        } = task;
        let label = operation.label();

        let guard = operation
            .kind
            .is_asset_mutating()
            .then(|| self.shared.busy.track(&label));

        let outcome = AssertUnwindSafe(async move { run().await })
            .catch_unwind()
            .await;
        drop(guard);

        let result = match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(TaskError::Failed {
                operation: label.clone(),
                message: format!("{:#}", error),
            }),
            Err(_) => Err(TaskError::Failed {
                operation: label.clone(),
                message: "task panicked".to_string(),
            }),
        };

        if let Err(error) = &result {
            warn!(operation = %operation, error = %error, "Task failed");
            self.shared.events.publish(AssetDbEvent::TaskFailed {
                operation: label,
                message: error.to_string(),
            });
        }

        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }

        self.schedule_step();
    }

    /// Allow tasks to run and drain anything queued so far.
    pub fn open(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.closed || state.open {
                return;
            }
            state.open = true;
        }
        self.schedule_step();
    }

    /// Stop accepting tasks and reject every queued waiter.
    ///
    /// Returns the number of abandoned tasks.
    pub fn close(&self) -> usize {
        let abandoned: Vec<Task> = {
            let mut state = self.shared.state.lock();
            state.open = false;
            state.closed = true;
            state.queue.drain(..).collect()
        };

        let count = abandoned.len();
        for task in abandoned {
            task.abandon();
        }
        count
    }

    pub fn is_open(&self) -> bool {
        self.shared.state.lock().open
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Queued operations in execution order.
    pub fn queued_operations(&self) -> Vec<Operation> {
        self.shared
            .state
            .lock()
            .queue
            .iter()
            .map(|task| task.operation.clone())
            .collect()
    }

    pub fn busy(&self) -> &BusyTracker {
        &self.shared.busy
    }

    pub fn pause_controller(&self) -> &PauseController {
        &self.shared.pause
    }
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("TaskScheduler")
            .field("pending", &state.queue.len())
            .field("open", &state.open)
            .field("draining", &state.draining)
            .finish()
    }
}

fn enqueue(queue: &mut VecDeque<Task>, mut task: Task) {
    if let Some(tail) = queue.back_mut() {
        if tail.operation == task.operation {
            trace!(operation = %task.operation, "Merging into queued task");
            tail.waiters.append(&mut task.waiters);
            return;
        }
    }
    queue.push_back(task);
}
