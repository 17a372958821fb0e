//! Import Engine Abstractions
//!
//! The orchestrator never touches asset files. Everything that scans,
//! imports or restores content lives behind [`ImportEngine`], supplied by the
//! host. Registry-wide work that must run once all databases are up (shader
//! compilation, background script builds) plugs in through [`StartupHook`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Static description of one asset database (a content root).
///
/// Immutable once registered. The runtime lifecycle of a database is tracked
/// separately by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    /// Unique database name (e.g. `"internal"`, `"assets"`)
    pub name: String,
    /// Directory holding the source assets
    pub target_root: PathBuf,
    /// Directory holding imported artifacts; doubles as the restore cache
    pub library_root: PathBuf,
    /// Scratch directory for in-flight imports
    pub temp_root: PathBuf,
    /// Whether the database rejects asset mutations
    #[serde(default)]
    pub readonly: bool,
    /// Start order; higher starts first
    #[serde(default)]
    pub priority: i32,
    /// Extra extensions imported during the pre-import phase
    #[serde(default)]
    pub pre_import_extensions: Vec<String>,
}

impl DatabaseConfig {
    /// Create a config with empty library/temp roots and default priority.
    pub fn new(name: impl Into<String>, target_root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            target_root: target_root.into(),
            library_root: PathBuf::new(),
            temp_root: PathBuf::new(),
            readonly: false,
            priority: 0,
            pre_import_extensions: Vec::new(),
        }
    }

    pub fn with_library_root(mut self, library_root: impl Into<PathBuf>) -> Self {
        self.library_root = library_root.into();
        self
    }

    pub fn with_temp_root(mut self, temp_root: impl Into<PathBuf>) -> Self {
        self.temp_root = temp_root.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    pub fn with_pre_import_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pre_import_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Whether `path` lives under this database's target root.
    pub fn contains(&self, path: &Path) -> bool {
        !self.target_root.as_os_str().is_empty() && path.starts_with(&self.target_root)
    }
}

/// Per-file import logic supplied by the host.
///
/// Every future must resolve only once the engine's own internal work for
/// that call has drained. In particular `pre_import` must not return while
/// files from its allow-list are still queued, because dependent script and
/// shader compilation starts as soon as it does.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::import::{DatabaseConfig, ImportEngine};
///
/// async fn warm(engine: &dyn ImportEngine, db: &DatabaseConfig) -> bridge_traits::error::Result<()> {
///     engine.pre_import(db, &[".ts".to_string()]).await?;
///     engine.full_import(db).await
/// }
/// ```
#[async_trait]
pub trait ImportEngine: Send + Sync {
    /// Import only files whose extension is in `extensions` (leading dot,
    /// lower-case).
    async fn pre_import(&self, db: &DatabaseConfig, extensions: &[String]) -> Result<()>;

    /// Import everything the pre-import phase left behind.
    async fn full_import(&self, db: &DatabaseConfig) -> Result<()>;

    /// Whether a cache from a previous run is available for `db`.
    ///
    /// Defaults to checking that the library root is an existing directory.
    async fn has_cache(&self, db: &DatabaseConfig) -> bool {
        !db.library_root.as_os_str().is_empty() && core_async::fs::is_dir(&db.library_root).await
    }

    /// Resume `db` directly from its cache in one step.
    async fn restore_from_cache(&self, db: &DatabaseConfig) -> Result<()>;

    /// Re-scan a whole started database.
    async fn refresh_database(&self, db: &DatabaseConfig) -> Result<()>;

    /// Re-scan a single path; the engine resolves which database owns it.
    async fn refresh_path(&self, path: &str) -> Result<()>;

    /// Stop watching and importing for `db`.
    async fn stop(&self, db: &DatabaseConfig) -> Result<()>;
}

/// Registry-wide hook run once every database has been started.
#[async_trait]
pub trait StartupHook: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Called with the configs of every database that reached the started
    /// state, in start order.
    async fn after_start(&self, databases: &[DatabaseConfig]) -> Result<()>;
}
