//! # Asset Database Orchestration
//!
//! Coordinates the asset databases of an editor project.
//!
//! ## Overview
//!
//! This module owns the lifecycle of every registered database and
//! serializes the operations that mutate them:
//! - Registering databases and ordering them by priority
//! - Starting them in two phases, or from cache with fallback
//! - Queueing refreshes, database changes and asset mutations
//! - Pausing the queue on behalf of external consumers
//! - Debouncing per-path refreshes from file watchers
//!
//! ## Components
//!
//! - **Registry** (`registry`): Database configs and validated runtime states
//! - **Startup Orchestrator** (`startup`): Two-phase and cache-restore startup
//! - **Busy Tracker** (`busy`): Outstanding asset mutations
//! - **Pause Controller** (`pause`): Cooperative pause with a bounded wait
//! - **Task Scheduler** (`scheduler`): FIFO queue with tail merging
//! - **Lazy Refresh** (`lazy_refresh`): Debounced per-path refreshes
//! - **Manager** (`manager`): The facade hosts use

pub mod busy;
pub mod error;
pub mod lazy_refresh;
pub mod manager;
pub mod operation;
pub mod pause;
pub mod registry;
pub mod scheduler;
pub mod startup;

pub use bridge_traits::DatabaseConfig;
pub use busy::{BusyGuard, BusyId, BusyTracker};
pub use error::{AssetDbError, Result, StartPhase, StartupFailure, TaskError};
pub use lazy_refresh::LazyRefreshDebouncer;
pub use manager::AssetDbManager;
pub use operation::{AssetOperation, Operation, OperationKind};
pub use pause::{PauseController, PauseFuture, PauseRequest, PauseState};
pub use registry::{DatabaseRegistry, DatabaseRuntime, DatabaseState};
pub use scheduler::{task_fn, TaskFn, TaskHandle, TaskOutput, TaskResult, TaskScheduler};
pub use startup::{pre_import_extensions, StartupOrchestrator, StartupReport};
