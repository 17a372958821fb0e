//! Runtime entry points.
//!
//! Downstream crates never build a Tokio runtime themselves: the attribute
//! macros and embedding hosts go through [`block_on`], and library code that
//! needs to know whether it is already inside a runtime asks [`Handle`].

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Runs the provided future to completion on a fresh current-thread runtime
/// with timers and I/O enabled.
pub fn block_on<F>(future: F) -> F::Output
where
    F: std::future::Future,
{
    Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("core_async::runtime::block_on: failed to build Tokio runtime")
        .block_on(future)
}
