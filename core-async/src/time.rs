//! Time-related abstractions.
//!
//! Tokio's timer wheel for sleeping and deadlines, standard library types for
//! durations and instants.
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{sleep, timeout, Duration};
//!
//! # core_async::runtime::block_on(async {
//! let late = timeout(Duration::from_millis(5), sleep(Duration::from_secs(1))).await;
//! assert!(late.is_err());
//! # });
//! ```

pub use tokio::time::{error::Elapsed, interval, sleep, sleep_until, timeout, Interval, Sleep};

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, saturating to zero for clocks set
/// before 1970.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
