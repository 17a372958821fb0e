//! Task spawning.
//!
//! Spawned tasks run on the ambient Tokio runtime and may move between
//! threads, so futures must be `Send + 'static`. Dropping a [`JoinHandle`]
//! detaches the task; [`JoinHandle::abort`] cancels it at its next suspension
//! point.
//!
//! ```rust
//! use core_async::task;
//!
//! # core_async::runtime::block_on(async {
//! let handle = task::spawn(async { 7 });
//! assert_eq!(handle.await.unwrap(), 7);
//! # });
//! ```

pub use tokio::task::{spawn_blocking, yield_now, AbortHandle, JoinError, JoinHandle};

/// Spawns a new asynchronous task on the current runtime.
///
/// # Panics
///
/// Panics when called outside a runtime context, like `tokio::spawn`.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, JoinError>;
