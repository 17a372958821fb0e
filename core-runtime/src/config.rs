//! # Core Configuration Module
//!
//! Provides configuration management for the asset database orchestrator.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the host-supplied collaborators and the orchestrator's
//! timing knobs. It enforces fail-fast validation so a misconfigured editor
//! backend refuses to boot instead of stalling later.
//!
//! ## Required Dependencies
//!
//! - `ImportEngine` - performs every import, restore and refresh
//!
//! ## Optional Dependencies (with defaults)
//!
//! - `Clock` - timestamps pause requests (default: `SystemClock`)
//! - `StartupHook`s - registry-wide work after all databases started
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, StartupMode};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .import_engine(Arc::new(MyImportEngine))
//!     .startup_mode(StartupMode::CacheRestore)
//!     .pause_timeout(Duration::from_secs(30))
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! A missing import engine is reported as [`Error::CapabilityMissing`];
//! out-of-range timings are reported as [`Error::Config`].

use crate::error::{Error, Result};
use bridge_traits::{Clock, ImportEngine, StartupHook, SystemClock};
use std::sync::Arc;
use std::time::Duration;

/// Default bounded wait for a pause request before it is forced (2 minutes).
pub const DEFAULT_PAUSE_TIMEOUT: Duration = Duration::from_secs(120);

/// Default quiet period before a lazy refresh batch flushes.
pub const DEFAULT_LAZY_REFRESH_DELAY: Duration = Duration::from_millis(100);

/// Default buffer size for the event bus.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// How `start_all` brings each database up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartupMode {
    /// Pre-import the allow-listed extensions, then import everything else.
    #[default]
    TwoPhase,
    /// Try to resume from a previous run's library cache first, falling back
    /// to `TwoPhase` per database when that fails.
    CacheRestore,
}

impl StartupMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StartupMode::TwoPhase => "two_phase",
            StartupMode::CacheRestore => "cache_restore",
        }
    }
}

impl std::fmt::Display for StartupMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core configuration for the orchestrator.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Import engine performing all content work (required)
    pub import_engine: Arc<dyn ImportEngine>,

    /// Time source for pause request timestamps
    pub clock: Arc<dyn Clock>,

    /// Hooks run once after every `start_all`
    pub startup_hooks: Vec<Arc<dyn StartupHook>>,

    /// Process-wide startup protocol
    pub startup_mode: StartupMode,

    /// How long a pause request waits for busy work before forcing the pause
    pub pause_timeout: Duration,

    /// Quiet period before queued lazy refreshes flush
    pub lazy_refresh_delay: Duration,

    /// Event bus channel capacity
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("import_engine", &"ImportEngine { ... }")
            .field("clock", &"Clock { ... }")
            .field(
                "startup_hooks",
                &self
                    .startup_hooks
                    .iter()
                    .map(|hook| hook.name().to_string())
                    .collect::<Vec<_>>(),
            )
            .field("startup_mode", &self.startup_mode)
            .field("pause_timeout", &self.pause_timeout)
            .field("lazy_refresh_delay", &self.lazy_refresh_delay)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Pause timeout is non-zero and at most one hour
    /// - Lazy refresh delay is non-zero and shorter than the pause timeout
    /// - Event buffer size is non-zero
    pub fn validate(&self) -> Result<()> {
        if self.pause_timeout.is_zero() {
            return Err(Error::Config(
                "Pause timeout must be greater than 0".to_string(),
            ));
        }

        if self.pause_timeout > Duration::from_secs(3600) {
            return Err(Error::Config(
                "Pause timeout exceeds maximum of 1 hour".to_string(),
            ));
        }

        if self.lazy_refresh_delay.is_zero() {
            return Err(Error::Config(
                "Lazy refresh delay must be greater than 0".to_string(),
            ));
        }

        if self.lazy_refresh_delay >= self.pause_timeout {
            return Err(Error::Config(format!(
                "Lazy refresh delay ({:?}) must be shorter than the pause timeout ({:?})",
                self.lazy_refresh_delay, self.pause_timeout
            )));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn import_engine_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "ImportEngine".to_string(),
        message: "An ImportEngine implementation is required to start, refresh and stop \
                 asset databases. Inject the editor's importer with .import_engine()."
            .to_string(),
    }
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Call [`build()`](CoreConfigBuilder::build) to validate and create the
/// final config.
#[derive(Default)]
pub struct CoreConfigBuilder {
    import_engine: Option<Arc<dyn ImportEngine>>,
    clock: Option<Arc<dyn Clock>>,
    startup_hooks: Vec<Arc<dyn StartupHook>>,
    startup_mode: StartupMode,
    pause_timeout: Option<Duration>,
    lazy_refresh_delay: Option<Duration>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the import engine (required).
    pub fn import_engine(mut self, engine: Arc<dyn ImportEngine>) -> Self {
        self.import_engine = Some(engine);
        self
    }

    /// Sets the clock used to timestamp pause requests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Adds a hook run after every database has started.
    ///
    /// Hooks run in registration order.
    pub fn startup_hook(mut self, hook: Arc<dyn StartupHook>) -> Self {
        self.startup_hooks.push(hook);
        self
    }

    /// Sets the process-wide startup protocol.
    ///
    /// Default: [`StartupMode::TwoPhase`]
    pub fn startup_mode(mut self, mode: StartupMode) -> Self {
        self.startup_mode = mode;
        self
    }

    /// Sets the bounded wait of a pause request.
    ///
    /// Default: 2 minutes
    pub fn pause_timeout(mut self, timeout: Duration) -> Self {
        self.pause_timeout = Some(timeout);
        self
    }

    /// Sets the lazy refresh quiet period.
    ///
    /// Default: 100 ms
    pub fn lazy_refresh_delay(mut self, delay: Duration) -> Self {
        self.lazy_refresh_delay = Some(delay);
        self
    }

    /// Sets the event bus capacity.
    ///
    /// Default: 100
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when no import engine was provided
    /// - [`Error::Config`] when a timing value is out of range
    pub fn build(self) -> Result<CoreConfig> {
        let import_engine = self
            .import_engine
            .ok_or_else(import_engine_missing_error)?;

        let config = CoreConfig {
            import_engine,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            startup_hooks: self.startup_hooks,
            startup_mode: self.startup_mode,
            pause_timeout: self.pause_timeout.unwrap_or(DEFAULT_PAUSE_TIMEOUT),
            lazy_refresh_delay: self
                .lazy_refresh_delay
                .unwrap_or(DEFAULT_LAZY_REFRESH_DELAY),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{DatabaseConfig, FixedClock};

    struct NoopEngine;

    #[async_trait]
    impl ImportEngine for NoopEngine {
        async fn pre_import(
            &self,
            _db: &DatabaseConfig,
            _extensions: &[String],
        ) -> bridge_traits::Result<()> {
            Ok(())
        }

        async fn full_import(&self, _db: &DatabaseConfig) -> bridge_traits::Result<()> {
            Ok(())
        }

        async fn restore_from_cache(&self, _db: &DatabaseConfig) -> bridge_traits::Result<()> {
            Ok(())
        }

        async fn refresh_database(&self, _db: &DatabaseConfig) -> bridge_traits::Result<()> {
            Ok(())
        }

        async fn refresh_path(&self, _path: &str) -> bridge_traits::Result<()> {
            Ok(())
        }

        async fn stop(&self, _db: &DatabaseConfig) -> bridge_traits::Result<()> {
            Ok(())
        }
    }

    struct NamedHook(&'static str);

    #[async_trait]
    impl StartupHook for NamedHook {
        fn name(&self) -> &str {
            self.0
        }

        async fn after_start(&self, _databases: &[DatabaseConfig]) -> bridge_traits::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_builder_requires_import_engine() {
        let result = CoreConfig::builder().build();

        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "ImportEngine");
            }
            other => panic!("expected CapabilityMissing, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_builder_defaults() {
        let config = CoreConfig::builder()
            .import_engine(Arc::new(NoopEngine))
            .build()
            .unwrap();

        assert_eq!(config.startup_mode, StartupMode::TwoPhase);
        assert_eq!(config.pause_timeout, DEFAULT_PAUSE_TIMEOUT);
        assert_eq!(config.lazy_refresh_delay, DEFAULT_LAZY_REFRESH_DELAY);
        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
        assert!(config.startup_hooks.is_empty());
    }

    #[test]
    fn test_builder_with_all_fields() {
        let instant = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let config = CoreConfig::builder()
            .import_engine(Arc::new(NoopEngine))
            .clock(Arc::new(FixedClock::new(instant)))
            .startup_hook(Arc::new(NamedHook("compile-effects")))
            .startup_hook(Arc::new(NamedHook("compile-scripts")))
            .startup_mode(StartupMode::CacheRestore)
            .pause_timeout(Duration::from_secs(5))
            .lazy_refresh_delay(Duration::from_millis(20))
            .event_buffer_size(16)
            .build()
            .unwrap();

        assert_eq!(config.startup_mode, StartupMode::CacheRestore);
        assert_eq!(config.pause_timeout, Duration::from_secs(5));
        assert_eq!(config.lazy_refresh_delay, Duration::from_millis(20));
        assert_eq!(config.event_buffer_size, 16);
        assert_eq!(config.clock.now(), instant);
        let names: Vec<_> = config.startup_hooks.iter().map(|h| h.name()).collect();
        assert_eq!(names, vec!["compile-effects", "compile-scripts"]);
    }

    #[test]
    fn test_validate_rejects_zero_pause_timeout() {
        let result = CoreConfig::builder()
            .import_engine(Arc::new(NoopEngine))
            .pause_timeout(Duration::ZERO)
            .build();

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_excessive_pause_timeout() {
        let result = CoreConfig::builder()
            .import_engine(Arc::new(NoopEngine))
            .pause_timeout(Duration::from_secs(7200))
            .build();

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_delay_longer_than_pause_timeout() {
        let result = CoreConfig::builder()
            .import_engine(Arc::new(NoopEngine))
            .pause_timeout(Duration::from_millis(50))
            .lazy_refresh_delay(Duration::from_millis(50))
            .build();

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_buffer() {
        let result = CoreConfig::builder()
            .import_engine(Arc::new(NoopEngine))
            .event_buffer_size(0)
            .build();

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_startup_mode_display() {
        assert_eq!(StartupMode::TwoPhase.to_string(), "two_phase");
        assert_eq!(StartupMode::CacheRestore.to_string(), "cache_restore");
        assert_eq!(StartupMode::default(), StartupMode::TwoPhase);
    }

    #[test]
    fn test_config_debug_hides_bridges() {
        let config = CoreConfig::builder()
            .import_engine(Arc::new(NoopEngine))
            .startup_hook(Arc::new(NamedHook("compile-effects")))
            .build()
            .unwrap();

        let debug = format!("{:?}", config);
        assert!(debug.contains("ImportEngine { ... }"));
        assert!(debug.contains("compile-effects"));
    }
}
