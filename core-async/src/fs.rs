//! Async filesystem probes re-exported from the underlying runtime.
//!
//! The orchestrator never reads or writes asset files itself; it only asks
//! whether a cache directory left by a previous run is still there.

pub use tokio::fs::{metadata, try_exists};

/// Returns `true` when `path` exists and is a directory.
///
/// Permission errors and missing entries both count as "not a directory".
pub async fn is_dir(path: impl AsRef<std::path::Path>) -> bool {
    match metadata(path).await {
        Ok(meta) => meta.is_dir(),
        Err(_) => false,
    }
}
