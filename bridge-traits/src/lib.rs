//! # Host Bridge Traits
//!
//! Contracts between the asset database orchestrator and the editor that
//! embeds it.
//!
//! ## Overview
//!
//! The orchestrator decides *when* databases start, refresh or stop. Every
//! piece of work that actually touches asset files is done by host-supplied
//! implementations of the traits below.
//!
//! ## Traits
//!
//! ### Import
//! - [`ImportEngine`](import::ImportEngine) - pre-import, full import, cache restore, refresh, stop
//! - [`StartupHook`](import::StartupHook) - registry-wide work once every database is up
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to the host
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert their own failures into it with an actionable message that
//! names the database or path involved.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`; the orchestrator shares them
//! across spawned tasks behind `Arc`.

pub mod error;
pub mod import;
pub mod time;

pub use error::{BridgeError, Result};

pub use import::{DatabaseConfig, ImportEngine, StartupHook};
pub use time::{Clock, ConsoleLogger, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
