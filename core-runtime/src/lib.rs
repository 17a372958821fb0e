//! # Core Runtime Module
//!
//! Provides the ambient runtime infrastructure for the asset database
//! orchestrator:
//! - Logging and tracing infrastructure
//! - Configuration management (`CoreConfig` builder)
//! - Event bus system
//!
//! ## Overview
//!
//! `core-assetdb` depends on this crate for everything that is not
//! orchestration logic: how it is configured, how it logs, and how it tells
//! the host editor what happened.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
