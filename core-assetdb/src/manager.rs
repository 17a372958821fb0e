//! # Asset Database Manager
//!
//! The facade hosts interact with. One value per editor process, owned by
//! the host and passed to whoever needs it:
//!
//! ```ignore
//! let manager = AssetDbManager::new(config)?;
//! manager.init(vec![internal, assets]).await?;
//! manager.start_all().await?;
//! // serve
//! manager.shutdown().await;
//! ```
//!
//! Every mutating entry point goes through the [`TaskScheduler`]; reads go
//! straight to the registry.

use bridge_traits::DatabaseConfig;
use core_async::sync::RwLock;
use core_runtime::config::CoreConfig;
use core_runtime::events::{AssetDbEvent, CoreEvent, EventBus, Receiver};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::busy::BusyTracker;
use crate::error::{AssetDbError, Result};
use crate::lazy_refresh::LazyRefreshDebouncer;
use crate::operation::{AssetOperation, Operation, OperationKind};
use crate::pause::{PauseController, PauseState};
use crate::registry::{DatabaseRegistry, DatabaseState};
use crate::scheduler::{task_fn, TaskFn, TaskScheduler};
use crate::startup::StartupOrchestrator;

pub struct AssetDbManager {
    config: CoreConfig,
    registry: Arc<RwLock<DatabaseRegistry>>,
    events: EventBus,
    busy: BusyTracker,
    pause: PauseController,
    scheduler: TaskScheduler,
    startup: Arc<StartupOrchestrator>,
    lazy: LazyRefreshDebouncer,
}

impl AssetDbManager {
    /// Wire up every component from `config`.
    pub fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new(config.event_buffer_size);
        let registry = Arc::new(RwLock::new(DatabaseRegistry::new()));
        let busy = BusyTracker::new();
        let pause = PauseController::new(
            Arc::clone(&config.clock),
            config.pause_timeout,
            events.clone(),
        );
        let scheduler = TaskScheduler::new(busy.clone(), pause.clone(), events.clone());
        let startup = Arc::new(StartupOrchestrator::from_config(
            &config,
            Arc::clone(&registry),
            events.clone(),
        ));
        let lazy = LazyRefreshDebouncer::new(
            Arc::clone(&config.import_engine),
            config.lazy_refresh_delay,
            events.clone(),
        );

        Ok(Self {
            config,
            registry,
            events,
            busy,
            pause,
            scheduler,
            startup,
            lazy,
        })
    }

    /// Register the initial set of databases.
    ///
    /// Nothing is registered unless every config is valid and every name
    /// unique.
    #[instrument(skip(self, configs), fields(databases = configs.len()))]
    pub async fn init(&self, configs: Vec<DatabaseConfig>) -> Result<()> {
        if configs.is_empty() {
            return Err(AssetDbError::EmptyConfiguration);
        }

        let mut registry = self.registry.write().await;

        let mut seen = HashSet::new();
        for config in &configs {
            DatabaseRegistry::validate(config)?;
            if !seen.insert(config.name.as_str()) || registry.contains(&config.name) {
                return Err(AssetDbError::DuplicateDatabase {
                    name: config.name.clone(),
                });
            }
        }

        for config in configs {
            let database = config.name.clone();
            let priority = config.priority;
            registry.register(config, false)?;
            self.events.publish(AssetDbEvent::DatabaseRegistered { database, priority });
        }

        info!(order = ?registry.list(), "Asset databases registered");
        Ok(())
    }

    /// Start every registered database and open the task queue.
    ///
    /// Tasks added before this completes wait in the queue. The queue opens
    /// even when some databases failed; the error lists them.
    #[instrument(skip(self))]
    pub async fn start_all(&self) -> Result<()> {
        if self.registry.read().await.is_empty() {
            return Err(AssetDbError::NotReady(
                "no databases registered; call init first".to_string(),
            ));
        }

        let report = self.startup.start_all().await;
        self.scheduler.open();
        report.into_result()
    }

    /// Register and start a database once the queue reaches it.
    #[instrument(skip(self, config), fields(database = %config.name))]
    pub async fn add_database(&self, config: DatabaseConfig) -> Result<()> {
        DatabaseRegistry::validate(&config)?;
        if self.registry.read().await.contains(&config.name) {
            return Err(AssetDbError::DuplicateDatabase { name: config.name });
        }

        let args = serde_json::to_value(&config).map_err(|err| AssetDbError::InvalidConfig {
            name: config.name.clone(),
            reason: err.to_string(),
        })?;

        let registry = Arc::clone(&self.registry);
        let startup = Arc::clone(&self.startup);
        let events = self.events.clone();
        let run = task_fn(move || async move {
            let database = config.name.clone();
            let priority = config.priority;
            registry.write().await.register(config, false)?;
            events.publish(AssetDbEvent::DatabaseRegistered {
                database: database.clone(),
                priority,
            });
            startup.start_one(&database).await?;
            anyhow::Ok(Value::Null)
        });

        self.scheduler
            .add_task(Operation::new(OperationKind::AddDatabase).arg(args), run)
            .await?;
        Ok(())
    }

    /// Stop and unregister a database once the queue reaches it.
    #[instrument(skip(self))]
    pub async fn remove_database(&self, name: &str) -> Result<()> {
        if !self.registry.read().await.contains(name) {
            return Err(AssetDbError::DatabaseNotFound {
                name: name.to_string(),
            });
        }

        let registry = Arc::clone(&self.registry);
        let startup = Arc::clone(&self.startup);
        let events = self.events.clone();
        let database = name.to_string();
        let run = task_fn(move || async move {
            startup.stop_database(&database).await?;
            registry.write().await.unregister(&database)?;
            events.publish(AssetDbEvent::DatabaseRemoved { database });
            anyhow::Ok(Value::Null)
        });

        self.scheduler
            .add_task(Operation::new(OperationKind::RemoveDatabase).arg(name), run)
            .await?;
        Ok(())
    }

    /// Re-scan every started database, in start order.
    ///
    /// Waits while asset mutations are running; merges with a refresh that
    /// is already last in the queue.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<()> {
        let registry = Arc::clone(&self.registry);
        let engine = Arc::clone(&self.config.import_engine);
        let run = task_fn(move || async move {
            let databases = registry.read().await.started_configs();

            let mut failed = Vec::new();
            for db in &databases {
                if let Err(err) = engine.refresh_database(db).await {
                    warn!(database = %db.name, error = %err, "Refresh failed");
                    failed.push(format!("{}: {}", db.name, err));
                }
            }

            if !failed.is_empty() {
                anyhow::bail!("refresh failed for {}", failed.join(", "));
            }

            let refreshed: Vec<&str> = databases.iter().map(|db| db.name.as_str()).collect();
            Ok(json!({ "refreshed": refreshed }))
        });

        self.scheduler
            .add_task(Operation::new(OperationKind::Refresh), run)
            .await?;
        Ok(())
    }

    /// Queue a busy-tracked asset mutation.
    pub async fn run_asset_operation(
        &self,
        operation: AssetOperation,
        args: Vec<Value>,
        run: TaskFn,
    ) -> Result<Value> {
        self.add_task(OperationKind::Asset(operation), args, run)
            .await
    }

    /// Queue an operation and wait for its outcome.
    pub async fn add_task(&self, kind: OperationKind, args: Vec<Value>, run: TaskFn) -> Result<Value> {
        let value = self
            .scheduler
            .add_task(Operation::with_args(kind, args), run)
            .await?;
        Ok(value)
    }

    /// Queue an operation without waiting for it.
    pub fn submit(&self, kind: OperationKind, args: Vec<Value>, run: TaskFn) {
        self.scheduler.submit(Operation::with_args(kind, args), run);
    }

    /// Hold off queued work on behalf of `source`.
    ///
    /// Resolves `true` once paused, which may take until running asset
    /// mutations finish or the pause timeout elapses; `false` if resumed
    /// first.
    pub async fn pause(&self, source: &str) -> bool {
        self.pause.pause(source, self.busy.is_busy()).await
    }

    /// Returns `false` when nothing was paused.
    pub fn resume(&self) -> bool {
        let lifted = self.pause.resume();
        if lifted {
            self.scheduler.schedule_step();
        }
        lifted
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    pub fn pause_state(&self) -> PauseState {
        self.pause.state()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    /// Refresh `path` with the next debounced batch.
    pub async fn request_lazy_refresh(&self, path: &str) -> bool {
        self.lazy.request(path).await
    }

    /// Whether `start_all` has completed and the queue is open.
    pub fn is_ready(&self) -> bool {
        self.scheduler.is_open()
    }

    /// Names in start order.
    pub async fn database_names(&self) -> Vec<String> {
        self.registry.read().await.list()
    }

    pub async fn database_state(&self, name: &str) -> Option<DatabaseState> {
        self.registry
            .read()
            .await
            .runtime(name)
            .map(|runtime| runtime.state)
    }

    pub async fn database_config(&self, name: &str) -> Option<DatabaseConfig> {
        self.registry.read().await.get(name).cloned()
    }

    pub fn pending_tasks(&self) -> usize {
        self.scheduler.pending()
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Reject queued work, drop pending lazy refreshes and stop every
    /// database in reverse start order. Engine failures are logged.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let abandoned = self.scheduler.close();
        let cancelled = self.lazy.cancel();
        self.pause.resume();

        let names = self.registry.read().await.list();
        for name in names.iter().rev() {
            if let Err(err) = self.startup.stop_database(name).await {
                warn!(database = %name, error = %err, "Failed to stop database");
            }
        }

        info!(abandoned, cancelled, "Asset databases shut down");
        self.events.publish(AssetDbEvent::ShutDown);
    }
}

impl std::fmt::Debug for AssetDbManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetDbManager")
            .field("config", &self.config)
            .field("scheduler", &self.scheduler)
            .field("pause", &self.pause)
            .field("busy", &self.busy.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::ImportEngine;
    use mockall::mock;

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

    fn manager(engine: MockEngine) -> AssetDbManager {
        let config = CoreConfig::builder()
            .import_engine(Arc::new(engine))
            .build()
            .unwrap();
        AssetDbManager::new(config).unwrap()
    }

    fn db(name: &str, priority: i32) -> DatabaseConfig {
        DatabaseConfig::new(name, format!("/project/{}", name)).with_priority(priority)
    }

    #[core_async::test]
    async fn test_init_rejects_empty() {
        let manager = manager(MockEngine::new());
        assert!(matches!(
            manager.init(Vec::new()).await,
            Err(AssetDbError::EmptyConfiguration)
        ));
    }

    #[core_async::test]
    async fn test_init_rejects_duplicates_atomically() {
        let manager = manager(MockEngine::new());

        let result = manager
            .init(vec![db("assets", 1), db("internal", 2), db("assets", 3)])
            .await;
        assert!(matches!(
            result,
            Err(AssetDbError::DuplicateDatabase { ref name }) if name == "assets"
        ));
        assert!(manager.database_names().await.is_empty());
    }

    #[core_async::test]
    async fn test_init_rejects_invalid_config() {
        let manager = manager(MockEngine::new());
        let result = manager.init(vec![DatabaseConfig::new("assets", "")]).await;
        assert!(matches!(result, Err(AssetDbError::InvalidConfig { .. })));
    }

    #[core_async::test]
    async fn test_start_all_requires_init() {
        let manager = manager(MockEngine::new());
        assert!(matches!(
            manager.start_all().await,
            Err(AssetDbError::NotReady(_))
        ));
        assert!(!manager.is_ready());
    }

    #[core_async::test]
    async fn test_start_all_opens_queue() {
        let mut engine = MockEngine::new();
        engine.expect_pre_import().returning(|_, _| Ok(()));
        engine.expect_full_import().returning(|_| Ok(()));

        let manager = manager(engine);
        manager
            .init(vec![db("assets", 98), db("internal", 99)])
            .await
            .unwrap();
        assert_eq!(manager.database_names().await, vec!["internal", "assets"]);

        manager.start_all().await.unwrap();
        assert!(manager.is_ready());
        assert_eq!(
            manager.database_state("assets").await,
            Some(DatabaseState::Started)
        );
    }

    #[core_async::test]
    async fn test_remove_unknown_database() {
        let manager = manager(MockEngine::new());
        assert!(matches!(
            manager.remove_database("ghost").await,
            Err(AssetDbError::DatabaseNotFound { .. })
        ));
    }

    #[core_async::test]
    async fn test_add_duplicate_database_rejected_before_queueing() {
        let manager = manager(MockEngine::new());
        manager.init(vec![db("assets", 0)]).await.unwrap();

        assert!(matches!(
            manager.add_database(db("assets", 5)).await,
            Err(AssetDbError::DuplicateDatabase { .. })
        ));
        assert_eq!(manager.pending_tasks(), 0);
    }

    #[core_async::test]
    async fn test_resume_when_active_is_noop() {
        let manager = manager(MockEngine::new());
        assert!(!manager.resume());
        assert!(!manager.is_paused());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = CoreConfig::builder()
            .import_engine(Arc::new(MockEngine::new()))
            .build()
            .unwrap();
        config.event_buffer_size = 0;

        assert!(matches!(
            AssetDbManager::new(config),
            Err(AssetDbError::Runtime(core_runtime::Error::Config(_)))
        ));
    }
}
