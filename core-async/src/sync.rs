//! Synchronization primitives.
//!
//! Async-aware locks and channels backed by `tokio::sync`, plus the
//! cancellation token from `tokio-util`.
//!
//! Use these locks when a guard has to live across an `.await`. State that is
//! only touched in short synchronous sections can stay behind a plain
//! `parking_lot::Mutex` instead.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::{oneshot, RwLock};
//!
//! # core_async::runtime::block_on(async {
//! let lock = RwLock::new(vec!["internal"]);
//! lock.write().await.push("assets");
//! assert_eq!(lock.read().await.len(), 2);
//!
//! let (tx, rx) = oneshot::channel();
//! tx.send(true).unwrap();
//! assert!(rx.await.unwrap());
//! # });
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, OwnedMutexGuard, RwLock,
    RwLockReadGuard, RwLockWriteGuard, Semaphore,
};

pub use tokio_util::sync::CancellationToken;
