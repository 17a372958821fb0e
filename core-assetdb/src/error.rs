use thiserror::Error;

/// Which step of the two-phase start failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPhase {
    PreImport,
    FullImport,
}

impl StartPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            StartPhase::PreImport => "pre_import",
            StartPhase::FullImport => "full_import",
        }
    }
}

impl std::fmt::Display for StartPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One database that could not be started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupFailure {
    pub database: String,
    pub phase: StartPhase,
    pub message: String,
}

impl std::fmt::Display for StartupFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}: {})", self.database, self.phase, self.message)
    }
}

/// Outcome delivered to every waiter of a queued task.
///
/// Cloneable so that merged callers all observe the same settled error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task {operation} failed: {message}")]
    Failed { operation: String, message: String },

    #[error("Task {operation} abandoned: orchestrator shut down")]
    Abandoned { operation: String },
}

#[derive(Error, Debug)]
pub enum AssetDbError {
    #[error("No asset databases configured")]
    EmptyConfiguration,

    #[error("Database {name} is already registered")]
    DuplicateDatabase { name: String },

    #[error("Database {name} not found")]
    DatabaseNotFound { name: String },

    #[error("Invalid configuration for database {name:?}: {reason}")]
    InvalidConfig { name: String, reason: String },

    #[error("Database {} failed to start during {}: {}", .0.database, .0.phase, .0.message)]
    StartupFailed(StartupFailure),

    #[error("{} databases failed to start: {}", .0.len(), join_failures(.0))]
    PartialStartup(Vec<StartupFailure>),

    #[error("Cache restore failed for {name}: {message}")]
    CacheRestore { name: String, message: String },

    #[error("Invalid state transition for {name} from {from} to {to}")]
    InvalidStateTransition {
        name: String,
        from: String,
        to: String,
    },

    #[error("Import engine failed for {database}: {message}")]
    Engine { database: String, message: String },

    #[error("Asset databases not ready: {0}")]
    NotReady(String),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Runtime(#[from] core_runtime::Error),
}

fn join_failures(failures: &[StartupFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl AssetDbError {
    /// Startup error for a list of failed databases, `None` when empty.
    pub fn from_failures(mut failures: Vec<StartupFailure>) -> Option<Self> {
        match failures.len() {
            0 => None,
            1 => failures.pop().map(AssetDbError::StartupFailed),
            _ => Some(AssetDbError::PartialStartup(failures)),
        }
    }

    /// Whether this error belongs to the configuration class (fatal to `init`).
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            AssetDbError::EmptyConfiguration
                | AssetDbError::DuplicateDatabase { .. }
                | AssetDbError::DatabaseNotFound { .. }
                | AssetDbError::InvalidConfig { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AssetDbError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(database: &str, phase: StartPhase) -> StartupFailure {
        StartupFailure {
            database: database.to_string(),
            phase,
            message: "importer crashed".to_string(),
        }
    }

    #[test]
    fn test_from_failures() {
        assert!(AssetDbError::from_failures(Vec::new()).is_none());

        let single = AssetDbError::from_failures(vec![failure("assets", StartPhase::PreImport)]);
        assert!(matches!(single, Some(AssetDbError::StartupFailed(ref f)) if f.database == "assets"));

        let several = AssetDbError::from_failures(vec![
            failure("internal", StartPhase::PreImport),
            failure("assets", StartPhase::FullImport),
        ])
        .unwrap();
        let message = several.to_string();
        assert!(message.starts_with("2 databases failed to start"));
        assert!(message.contains("internal (pre_import: importer crashed)"));
        assert!(message.contains("assets (full_import: importer crashed)"));
    }

    #[test]
    fn test_error_classes() {
        assert!(AssetDbError::EmptyConfiguration.is_config_error());
        assert!(AssetDbError::DuplicateDatabase {
            name: "assets".to_string()
        }
        .is_config_error());
        assert!(!AssetDbError::NotReady("init first".to_string()).is_config_error());
    }

    #[test]
    fn test_task_error_is_transparent() {
        let err: AssetDbError = TaskError::Abandoned {
            operation: "refresh".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Task refresh abandoned: orchestrator shut down"
        );
    }
}
