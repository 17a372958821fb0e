//! # Startup Orchestrator
//!
//! Brings registered databases up one at a time in priority order.
//!
//! ## Two-Phase Protocol
//!
//! 1. **Pre-import**: the engine imports only the script and effect
//!    extensions (plus any the database adds). Once it returns, the database
//!    is *reachable*: dependent compilation may start.
//! 2. **Full import**: everything else.
//!
//! ## Cache Restore
//!
//! With [`StartupMode::CacheRestore`] an eligible database with a cache is
//! resumed in a single `restore_from_cache` call. Any failure is logged,
//! clears the database's eligibility, and falls back to the two-phase
//! protocol. It never fails the start on its own.
//!
//! ## Failure Isolation
//!
//! A database that fails to start does not stop its siblings. Failures are
//! collected into the [`StartupReport`].

use bridge_traits::{DatabaseConfig, ImportEngine, StartupHook};
use core_async::sync::{Mutex, RwLock};
use core_runtime::config::{CoreConfig, StartupMode};
use core_runtime::events::{AssetDbEvent, EventBus};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{AssetDbError, Result, StartPhase, StartupFailure};
use crate::registry::{DatabaseRegistry, DatabaseState};

/// Extensions every database imports during the pre-import phase.
pub const BASELINE_PRE_IMPORT_EXTENSIONS: &[&str] = &[".ts", ".js", ".chunk", ".effect"];

/// Pre-import allow-list for `db`: the baseline plus the database's own
/// extensions, with a leading dot, lower-cased and without duplicates.
pub fn pre_import_extensions(db: &DatabaseConfig) -> Vec<String> {
    let mut extensions: Vec<String> = Vec::new();

    let candidates = BASELINE_PRE_IMPORT_EXTENSIONS
        .iter()
        .copied()
        .chain(db.pre_import_extensions.iter().map(String::as_str));

    for candidate in candidates {
        let trimmed = candidate.trim().trim_start_matches('.');
        if trimmed.is_empty() {
            continue;
        }
        let normalized = format!(".{}", trimmed.to_lowercase());
        if !extensions.contains(&normalized) {
            extensions.push(normalized);
        }
    }

    extensions
}

/// Result of a `start_all` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    /// Databases that reached the started state, in start order
    pub started: Vec<String>,
    pub failures: Vec<StartupFailure>,
}

impl StartupReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_result(self) -> Result<()> {
        match AssetDbError::from_failures(self.failures) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub struct StartupOrchestrator {
    engine: Arc<dyn ImportEngine>,
    registry: Arc<RwLock<DatabaseRegistry>>,
    hooks: Vec<Arc<dyn StartupHook>>,
    mode: StartupMode,
    events: EventBus,
    outcome: Mutex<Option<StartupReport>>,
}

impl StartupOrchestrator {
    pub fn new(
        engine: Arc<dyn ImportEngine>,
        registry: Arc<RwLock<DatabaseRegistry>>,
        hooks: Vec<Arc<dyn StartupHook>>,
        mode: StartupMode,
        events: EventBus,
    ) -> Self {
        Self {
            engine,
            registry,
            hooks,
            mode,
            events,
            outcome: Mutex::new(None),
        }
    }

    pub fn from_config(
        config: &CoreConfig,
        registry: Arc<RwLock<DatabaseRegistry>>,
        events: EventBus,
    ) -> Self {
        Self::new(
            Arc::clone(&config.import_engine),
            registry,
            config.startup_hooks.clone(),
            config.startup_mode,
            events,
        )
    }

    pub fn mode(&self) -> StartupMode {
        self.mode
    }

    /// Start every registered database, then run the startup hooks.
    ///
    /// Runs once; later calls return the first run's report. Concurrent
    /// callers wait for the run in progress.
    #[instrument(skip(self), fields(mode = %self.mode))]
    pub async fn start_all(&self) -> StartupReport {
        let mut outcome = self.outcome.lock().await;
        if let Some(report) = outcome.as_ref() {
            debug!("Databases already started");
            return report.clone();
        }

        let names = self.registry.read().await.list();
        info!(databases = names.len(), "Starting asset databases");

        let mut report = StartupReport::default();
        for name in names {
            let state = self.registry.read().await.runtime(&name).map(|r| r.state);
            match state {
                None => continue,
                Some(DatabaseState::Started) => {
                    report.started.push(name);
                    continue;
                }
                Some(_) => {}
            }

            match self.start_database(&name, self.mode).await {
                Ok(()) => report.started.push(name),
                Err(AssetDbError::StartupFailed(failure)) => report.failures.push(failure),
                Err(other) => report.failures.push(StartupFailure {
                    database: name,
                    phase: StartPhase::PreImport,
                    message: other.to_string(),
                }),
            }
        }

        self.run_hooks().await;

        info!(
            started = report.started.len(),
            failed = report.failures.len(),
            "Asset databases ready"
        );
        self.events.publish(AssetDbEvent::RegistryReady {
            started: report.started.clone(),
            failed: report
                .failures
                .iter()
                .map(|failure| failure.database.clone())
                .collect(),
        });

        *outcome = Some(report.clone());
        report
    }

    /// Whether `start_all` has completed.
    pub async fn is_complete(&self) -> bool {
        self.outcome.lock().await.is_some()
    }

    /// Start a single, newly added database with the two-phase protocol.
    #[instrument(skip(self))]
    pub async fn start_one(&self, name: &str) -> Result<()> {
        self.start_database(name, StartupMode::TwoPhase).await?;
        info!(database = name, "Database ready");
        self.events.publish(AssetDbEvent::DatabaseReady {
            database: name.to_string(),
        });
        Ok(())
    }

    async fn start_database(&self, name: &str, mode: StartupMode) -> Result<()> {
        let config = self.config(name).await?;

        if mode == StartupMode::CacheRestore && self.try_restore(&config).await {
            return Ok(());
        }

        self.start_two_phase(&config).await
    }

    async fn config(&self, name: &str) -> Result<DatabaseConfig> {
        self.registry
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| AssetDbError::DatabaseNotFound {
                name: name.to_string(),
            })
    }

    async fn set_state(&self, name: &str, state: DatabaseState) -> Result<DatabaseState> {
        self.registry.write().await.set_state(name, state)
    }

    /// Returns `true` if the database was started from its cache.
    async fn try_restore(&self, config: &DatabaseConfig) -> bool {
        let name = config.name.as_str();
        let eligible = self
            .registry
            .read()
            .await
            .runtime(name)
            .is_some_and(|runtime| runtime.cache_eligible);
        if !eligible {
            debug!(database = name, "Not eligible for cache restore");
            return false;
        }

        if !self.engine.has_cache(config).await {
            debug!(database = name, "No cache available; starting normally");
            self.mark_ineligible(name, "no cache available").await;
            return false;
        }

        if let Err(err) = self.set_state(name, DatabaseState::Restoring).await {
            warn!(database = name, error = %err, "Cannot restore from cache");
            return false;
        }

        match self.engine.restore_from_cache(config).await {
            Ok(()) => match self.set_state(name, DatabaseState::Started).await {
                Ok(_) => {
                    info!(database = name, "Restored from cache");
                    true
                }
                Err(err) => {
                    warn!(database = name, error = %err, "Restored database vanished");
                    false
                }
            },
            Err(source) => {
                let err = AssetDbError::CacheRestore {
                    name: name.to_string(),
                    message: source.to_string(),
                };
                warn!(database = name, error = %err, "Falling back to two-phase start");
                if let Err(err) = self.set_state(name, DatabaseState::None).await {
                    warn!(database = name, error = %err, "Failed to reset database state");
                }
                self.mark_ineligible(name, &source.to_string()).await;
                false
            }
        }
    }

    async fn mark_ineligible(&self, name: &str, reason: &str) {
        if let Err(err) = self.registry.write().await.set_cache_eligible(name, false) {
            debug!(database = name, error = %err, "Failed to clear cache eligibility");
        }
        self.events.publish(AssetDbEvent::CacheRestoreFallback {
            database: name.to_string(),
            reason: reason.to_string(),
        });
    }

    async fn start_two_phase(&self, config: &DatabaseConfig) -> Result<()> {
        let name = config.name.as_str();

        self.set_state(name, DatabaseState::PreImporting).await?;
        let extensions = pre_import_extensions(config);
        debug!(database = name, extensions = ?extensions, "Pre-importing");

        if let Err(source) = self.engine.pre_import(config, &extensions).await {
            if let Err(err) = self.set_state(name, DatabaseState::None).await {
                warn!(database = name, error = %err, "Failed to reset database state");
            }
            return Err(self.failed(name, StartPhase::PreImport, source.to_string()));
        }

        self.set_state(name, DatabaseState::PreImported).await?;
        info!(database = name, "Database reachable");
        self.events.publish(AssetDbEvent::DatabaseReachable {
            database: name.to_string(),
        });

        self.set_state(name, DatabaseState::FullImporting).await?;
        if let Err(source) = self.engine.full_import(config).await {
            if let Err(err) = self.set_state(name, DatabaseState::PreImported).await {
                warn!(database = name, error = %err, "Failed to reset database state");
            }
            return Err(self.failed(name, StartPhase::FullImport, source.to_string()));
        }

        self.set_state(name, DatabaseState::Started).await?;
        info!(database = name, "Database started");
        Ok(())
    }

    fn failed(&self, name: &str, phase: StartPhase, message: String) -> AssetDbError {
        error!(database = name, phase = %phase, error = %message, "Database failed to start");
        self.events.publish(AssetDbEvent::DatabaseStartFailed {
            database: name.to_string(),
            phase: phase.to_string(),
            message: message.clone(),
        });
        AssetDbError::StartupFailed(StartupFailure {
            database: name.to_string(),
            phase,
            message,
        })
    }

    async fn run_hooks(&self) {
        if self.hooks.is_empty() {
            return;
        }

        let started = self.registry.read().await.started_configs();
        for hook in &self.hooks {
            debug!(hook = hook.name(), "Running startup hook");
            if let Err(err) = hook.after_start(&started).await {
                warn!(hook = hook.name(), error = %err, "Startup hook failed");
            }
        }
    }

    /// Ask the engine to stop `name` and return it to the `None` state.
    ///
    /// Databases that never started are left untouched.
    #[instrument(skip(self))]
    pub async fn stop_database(&self, name: &str) -> Result<()> {
        let config = self.config(name).await?;
        let state = self
            .registry
            .read()
            .await
            .runtime(name)
            .map(|runtime| runtime.state)
            .unwrap_or(DatabaseState::None);

        if state == DatabaseState::None {
            return Ok(());
        }

        self.engine
            .stop(&config)
            .await
            .map_err(|source| AssetDbError::Engine {
                database: name.to_string(),
                message: source.to_string(),
            })?;

        if matches!(state, DatabaseState::Started | DatabaseState::PreImported) {
            self.set_state(name, DatabaseState::None).await?;
        }
        info!(database = name, "Database stopped");
        Ok(())
    }
}

impl std::fmt::Debug for StartupOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupOrchestrator")
            .field("mode", &self.mode)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::BridgeError;
    use mockall::mock;
    use mockall::predicate::*;
    use mockall::Sequence;

    mock! {
        pub Engine {}

        #[async_trait]
        impl ImportEngine for Engine {
            async fn pre_import(&self, db: &DatabaseConfig, extensions: &[String]) -> bridge_traits::Result<()>;
            async fn full_import(&self, db: &DatabaseConfig) -> bridge_traits::Result<()>;
            async fn has_cache(&self, db: &DatabaseConfig) -> bool;
            async fn restore_from_cache(&self, db: &DatabaseConfig) -> bridge_traits::Result<()>;
            async fn refresh_database(&self, db: &DatabaseConfig) -> bridge_traits::Result<()>;
            async fn refresh_path(&self, path: &str) -> bridge_traits::Result<()>;
            async fn stop(&self, db: &DatabaseConfig) -> bridge_traits::Result<()>;
        }
    }

    mock! {
        pub Hook {}

        #[async_trait]
        impl StartupHook for Hook {
            fn name(&self) -> &str;
            async fn after_start(&self, databases: &[DatabaseConfig]) -> bridge_traits::Result<()>;
        }
    }

    fn registry_with(dbs: &[(&str, i32)]) -> Arc<RwLock<DatabaseRegistry>> {
        let mut registry = DatabaseRegistry::new();
        for (name, priority) in dbs {
            registry
                .register(
                    DatabaseConfig::new(*name, format!("/project/{}", name))
                        .with_priority(*priority),
                    false,
                )
                .unwrap();
        }
        Arc::new(RwLock::new(registry))
    }

    fn orchestrator(
        engine: MockEngine,
        registry: Arc<RwLock<DatabaseRegistry>>,
        mode: StartupMode,
    ) -> StartupOrchestrator {
        StartupOrchestrator::new(
            Arc::new(engine),
            registry,
            Vec::new(),
            mode,
            EventBus::new(32),
        )
    }

    async fn state_of(registry: &Arc<RwLock<DatabaseRegistry>>, name: &str) -> DatabaseState {
        registry.read().await.runtime(name).unwrap().state
    }

    #[test]
    fn test_pre_import_extensions_merge() {
        let db = DatabaseConfig::new("assets", "/project/assets")
            .with_pre_import_extensions(["GLSL", ".ts", " .Effect ", "", ".wgsl"]);

        assert_eq!(
            pre_import_extensions(&db),
            vec![".ts", ".js", ".chunk", ".effect", ".glsl", ".wgsl"]
        );
    }

    #[core_async::test]
    async fn test_two_phase_in_priority_order() {
        let mut engine = MockEngine::new();
        let mut seq = Sequence::new();
        for name in ["internal", "assets"] {
            engine
                .expect_pre_import()
                .withf(move |db, extensions| {
                    db.name == name && extensions.iter().any(|e| e == ".effect")
                })
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, _| Ok(()));
            engine
                .expect_full_import()
                .withf(move |db| db.name == name)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
        }

        let registry = registry_with(&[("assets", 98), ("internal", 99)]);
        let startup = orchestrator(engine, Arc::clone(&registry), StartupMode::TwoPhase);

        let report = startup.start_all().await;
        assert_eq!(report.started, vec!["internal", "assets"]);
        assert!(report.is_success());
        assert_eq!(state_of(&registry, "internal").await, DatabaseState::Started);
        assert_eq!(state_of(&registry, "assets").await, DatabaseState::Started);
    }

    #[core_async::test]
    async fn test_start_all_runs_once() {
        let mut engine = MockEngine::new();
        engine.expect_pre_import().times(1).returning(|_, _| Ok(()));
        engine.expect_full_import().times(1).returning(|_| Ok(()));

        let registry = registry_with(&[("assets", 0)]);
        let startup = orchestrator(engine, registry, StartupMode::TwoPhase);

        let first = startup.start_all().await;
        let second = startup.start_all().await;
        assert_eq!(first, second);
        assert!(startup.is_complete().await);
    }

    #[core_async::test]
    async fn test_pre_import_failure_is_isolated() {
        let mut engine = MockEngine::new();
        engine
            .expect_pre_import()
            .returning(|db, _| {
                if db.name == "broken" {
                    Err(BridgeError::ImportFailed {
                        database: db.name.clone(),
                        message: "corrupt meta file".to_string(),
                    })
                } else {
                    Ok(())
                }
            });
        engine
            .expect_full_import()
            .withf(|db| db.name == "assets")
            .times(1)
            .returning(|_| Ok(()));

        let registry = registry_with(&[("broken", 99), ("assets", 98)]);
        let startup = orchestrator(engine, Arc::clone(&registry), StartupMode::TwoPhase);

        let report = startup.start_all().await;
        assert_eq!(report.started, vec!["assets"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].database, "broken");
        assert_eq!(report.failures[0].phase, StartPhase::PreImport);
        assert_eq!(state_of(&registry, "broken").await, DatabaseState::None);
        assert_eq!(state_of(&registry, "assets").await, DatabaseState::Started);

        assert!(matches!(
            report.into_result(),
            Err(AssetDbError::StartupFailed(_))
        ));
    }

    #[core_async::test]
    async fn test_full_import_failure_leaves_reachable() {
        let mut engine = MockEngine::new();
        engine.expect_pre_import().returning(|_, _| Ok(()));
        engine
            .expect_full_import()
            .returning(|_| Err(BridgeError::OperationFailed("disk full".to_string())));

        let registry = registry_with(&[("assets", 0)]);
        let startup = orchestrator(engine, Arc::clone(&registry), StartupMode::TwoPhase);

        let report = startup.start_all().await;
        assert_eq!(report.failures[0].phase, StartPhase::FullImport);
        assert_eq!(
            state_of(&registry, "assets").await,
            DatabaseState::PreImported
        );
    }

    #[core_async::test]
    async fn test_cache_restore_skips_phases() {
        let mut engine = MockEngine::new();
        engine.expect_has_cache().returning(|_| true);
        engine
            .expect_restore_from_cache()
            .times(1)
            .returning(|_| Ok(()));
        engine.expect_pre_import().never();
        engine.expect_full_import().never();

        let registry = registry_with(&[("assets", 0)]);
        let startup = orchestrator(engine, Arc::clone(&registry), StartupMode::CacheRestore);

        let report = startup.start_all().await;
        assert!(report.is_success());
        assert_eq!(state_of(&registry, "assets").await, DatabaseState::Started);
    }

    #[core_async::test]
    async fn test_cache_restore_failure_falls_back() {
        let mut engine = MockEngine::new();
        engine.expect_has_cache().returning(|_| true);
        engine
            .expect_restore_from_cache()
            .times(1)
            .returning(|_| Err(BridgeError::OperationFailed("stale cache".to_string())));
        engine.expect_pre_import().times(1).returning(|_, _| Ok(()));
        engine.expect_full_import().times(1).returning(|_| Ok(()));

        let registry = registry_with(&[("assets", 0)]);
        let startup = orchestrator(engine, Arc::clone(&registry), StartupMode::CacheRestore);

        let report = startup.start_all().await;
        assert!(report.is_success());

        let registry = registry.read().await;
        let runtime = registry.runtime("assets").unwrap();
        assert_eq!(runtime.state, DatabaseState::Started);
        assert!(!runtime.cache_eligible);
    }

    #[core_async::test]
    async fn test_missing_cache_falls_back() {
        let mut engine = MockEngine::new();
        engine.expect_has_cache().returning(|_| false);
        engine.expect_restore_from_cache().never();
        engine.expect_pre_import().times(1).returning(|_, _| Ok(()));
        engine.expect_full_import().times(1).returning(|_| Ok(()));

        let registry = registry_with(&[("assets", 0)]);
        let startup = orchestrator(engine, registry, StartupMode::CacheRestore);

        assert!(startup.start_all().await.is_success());
    }

    #[core_async::test]
    async fn test_hooks_see_started_databases_and_failures_are_ignored() {
        let mut engine = MockEngine::new();
        engine.expect_pre_import().returning(|_, _| Ok(()));
        engine.expect_full_import().returning(|_| Ok(()));

        let mut failing = MockHook::new();
        failing.expect_name().return_const("compile-effects".to_string());
        failing
            .expect_after_start()
            .times(1)
            .returning(|_| Err(BridgeError::OperationFailed("shader error".to_string())));

        let mut recording = MockHook::new();
        recording.expect_name().return_const("compile-scripts".to_string());
        recording
            .expect_after_start()
            .withf(|dbs| dbs.iter().map(|db| db.name.as_str()).eq(["internal", "assets"]))
            .times(1)
            .returning(|_| Ok(()));

        let registry = registry_with(&[("internal", 99), ("assets", 98)]);
        let startup = StartupOrchestrator::new(
            Arc::new(engine),
            registry,
            vec![Arc::new(failing), Arc::new(recording)],
            StartupMode::TwoPhase,
            EventBus::new(32),
        );

        assert!(startup.start_all().await.is_success());
    }

    #[core_async::test]
    async fn test_stop_database() {
        let mut engine = MockEngine::new();
        engine.expect_pre_import().returning(|_, _| Ok(()));
        engine.expect_full_import().returning(|_| Ok(()));
        engine
            .expect_stop()
            .with(function(|db: &DatabaseConfig| db.name == "assets"))
            .times(1)
            .returning(|_| Ok(()));

        let registry = registry_with(&[("assets", 0), ("idle", 0)]);
        let startup = orchestrator(engine, Arc::clone(&registry), StartupMode::TwoPhase);
        startup.start_one("assets").await.unwrap();

        startup.stop_database("assets").await.unwrap();
        startup.stop_database("idle").await.unwrap();
        assert_eq!(state_of(&registry, "assets").await, DatabaseState::None);
    }

    #[core_async::test]
    async fn test_start_one_emits_ready() {
        let mut engine = MockEngine::new();
        engine.expect_has_cache().never();
        engine.expect_pre_import().returning(|_, _| Ok(()));
        engine.expect_full_import().returning(|_| Ok(()));

        let events = EventBus::new(32);
        let mut receiver = events.subscribe();
        let registry = registry_with(&[("plugins", 0)]);
        let startup = StartupOrchestrator::new(
            Arc::new(engine),
            registry,
            Vec::new(),
            StartupMode::CacheRestore,
            events,
        );

        startup.start_one("plugins").await.unwrap();

        let mut saw_ready = false;
        while let Ok(core_runtime::events::CoreEvent::AssetDb(event)) = receiver.try_recv() {
            if event
                == (AssetDbEvent::DatabaseReady {
                    database: "plugins".to_string(),
                })
            {
                saw_ready = true;
            }
        }
        assert!(saw_ready);

        assert!(matches!(
            startup.start_one("missing").await,
            Err(AssetDbError::DatabaseNotFound { .. })
        ));
    }
}
