//! Async runtime facade for the asset database orchestrator.
//!
//! Every `core-*` and `bridge-*` crate in the workspace goes through this crate
//! instead of depending on Tokio directly. Keeping the executor behind one seam
//! means the orchestrator only ever names `core_async::{sync, time, task}`.
//!
//! # Modules
//!
//! - `task`: task spawning, abortable join handles, cooperative yielding
//! - `time`: sleeping, timeouts, instants
//! - `sync`: locks, channels, notification and cancellation primitives
//! - `runtime`: blocking entry points used by the attribute macros
//! - `fs`: the few filesystem probes the orchestrator needs
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{sleep, Duration};
//!
//! # core_async::runtime::block_on(async {
//! let handle = core_async::spawn(async {
//!     sleep(Duration::from_millis(5)).await;
//!     42
//! });
//! assert_eq!(handle.await.unwrap(), 42);
//! # });
//! ```

// Re-export the async entry-point/test macros so downstream crates never need
// direct Tokio dependencies.
pub use core_async_macros::{main, test};

pub mod fs;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

/// Waits on several branches and runs the first one that completes.
///
/// Re-exported so timer-or-event races read the same everywhere in the
/// workspace: `core_async::select! { _ = cancel => ..., _ = sleep(d) => ... }`.
pub use tokio::select;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};
