//! # Database Registry
//!
//! Holds every registered [`DatabaseConfig`] together with its runtime state.
//!
//! ## Ordering
//!
//! [`DatabaseRegistry::list`] yields names by descending priority; databases
//! with equal priority keep their registration order. Replacing a
//! registration keeps its original position.
//!
//! ## State Machine
//!
//! ```text
//! None ──> PreImporting ──> PreImported ──> FullImporting ──> Started
//!  ^  │         │                ^  │              │            │
//!  │  │         └──(failure)──> None └──────(failure)┘            │
//!  │  └──> Restoring ──> Started                                 │
//!  │           └──(failure)──> None                              │
//!  └───────────────────────────(stop)────────────────────────────┘
//! ```
//!
//! The registry performs no I/O.

use bridge_traits::DatabaseConfig;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;

use crate::error::{AssetDbError, Result};

/// Lifecycle of a single database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseState {
    /// Registered, not started
    None,
    /// Resuming from a previous run's cache
    Restoring,
    /// Phase 1 running
    PreImporting,
    /// Phase 1 done; scripts and effects are importable
    PreImported,
    /// Phase 2 running
    FullImporting,
    /// Fully started
    Started,
}

impl DatabaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseState::None => "none",
            DatabaseState::Restoring => "restoring",
            DatabaseState::PreImporting => "pre_importing",
            DatabaseState::PreImported => "pre_imported",
            DatabaseState::FullImporting => "full_importing",
            DatabaseState::Started => "started",
        }
    }

    /// Whether a start is in progress.
    pub fn is_starting(&self) -> bool {
        matches!(
            self,
            DatabaseState::Restoring
                | DatabaseState::PreImporting
                | DatabaseState::PreImported
                | DatabaseState::FullImporting
        )
    }

    /// Whether the pre-imported content of the database can be used.
    pub fn is_reachable(&self) -> bool {
        matches!(
            self,
            DatabaseState::PreImported | DatabaseState::FullImporting | DatabaseState::Started
        )
    }

    pub fn is_started(&self) -> bool {
        matches!(self, DatabaseState::Started)
    }

    fn can_transition_to(&self, to: DatabaseState) -> bool {
        matches!(
            (self, to),
            // Two-phase start
            (DatabaseState::None, DatabaseState::PreImporting)
                | (DatabaseState::PreImporting, DatabaseState::PreImported)
                | (DatabaseState::PreImporting, DatabaseState::None)
                | (DatabaseState::PreImported, DatabaseState::FullImporting)
                | (DatabaseState::FullImporting, DatabaseState::Started)
                | (DatabaseState::FullImporting, DatabaseState::PreImported)
                // Cache restore
                | (DatabaseState::None, DatabaseState::Restoring)
                | (DatabaseState::Restoring, DatabaseState::Started)
                | (DatabaseState::Restoring, DatabaseState::None)
                // Stop
                | (DatabaseState::PreImported, DatabaseState::None)
                | (DatabaseState::Started, DatabaseState::None)
        )
    }
}

impl std::fmt::Display for DatabaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable per-database runtime information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseRuntime {
    pub name: String,
    pub state: DatabaseState,
    /// Cleared once a cache restore was attempted and failed
    pub cache_eligible: bool,
}

impl DatabaseRuntime {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: DatabaseState::None,
            cache_eligible: true,
        }
    }
}

#[derive(Debug)]
struct Entry {
    config: DatabaseConfig,
    runtime: DatabaseRuntime,
    seq: u64,
}

/// Registered databases keyed by name.
#[derive(Debug, Default)]
pub struct DatabaseRegistry {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

impl DatabaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a config before it is registered.
    pub fn validate(config: &DatabaseConfig) -> Result<()> {
        if config.name.trim().is_empty() {
            return Err(AssetDbError::InvalidConfig {
                name: config.name.clone(),
                reason: "name must not be empty".to_string(),
            });
        }

        if config.target_root.as_os_str().is_empty() {
            return Err(AssetDbError::InvalidConfig {
                name: config.name.clone(),
                reason: "target root must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Register `config`.
    ///
    /// With `replace` an existing registration of the same name is
    /// overwritten in place and its runtime state reset.
    pub fn register(&mut self, config: DatabaseConfig, replace: bool) -> Result<()> {
        Self::validate(&config)?;

        let runtime = DatabaseRuntime::new(&config.name);
        if let Some(entry) = self.entries.get_mut(&config.name) {
            if !replace {
                return Err(AssetDbError::DuplicateDatabase { name: config.name });
            }
            entry.config = config;
            entry.runtime = runtime;
            return Ok(());
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries
            .insert(config.name.clone(), Entry { config, runtime, seq });
        Ok(())
    }

    /// Remove a registration and return its config.
    pub fn unregister(&mut self, name: &str) -> Result<DatabaseConfig> {
        self.entries
            .remove(name)
            .map(|entry| entry.config)
            .ok_or_else(|| not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&DatabaseConfig> {
        self.entries.get(name).map(|entry| &entry.config)
    }

    pub fn runtime(&self, name: &str) -> Option<&DatabaseRuntime> {
        self.entries.get(name).map(|entry| &entry.runtime)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ordered(&self) -> Vec<&Entry> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|entry| (Reverse(entry.config.priority), entry.seq));
        entries
    }

    /// Names in start order.
    pub fn list(&self) -> Vec<String> {
        self.ordered()
            .into_iter()
            .map(|entry| entry.config.name.clone())
            .collect()
    }

    /// Configs in start order.
    pub fn configs(&self) -> Vec<DatabaseConfig> {
        self.ordered()
            .into_iter()
            .map(|entry| entry.config.clone())
            .collect()
    }

    /// Configs of started databases, in start order.
    pub fn started_configs(&self) -> Vec<DatabaseConfig> {
        self.ordered()
            .into_iter()
            .filter(|entry| entry.runtime.state.is_started())
            .map(|entry| entry.config.clone())
            .collect()
    }

    /// Move a database to `state`, returning the previous state.
    pub fn set_state(&mut self, name: &str, state: DatabaseState) -> Result<DatabaseState> {
        let entry = self.entries.get_mut(name).ok_or_else(|| not_found(name))?;
        let from = entry.runtime.state;

        if !from.can_transition_to(state) {
            return Err(AssetDbError::InvalidStateTransition {
                name: name.to_string(),
                from: from.to_string(),
                to: state.to_string(),
            });
        }

        entry.runtime.state = state;
        Ok(from)
    }

    pub fn set_cache_eligible(&mut self, name: &str, eligible: bool) -> Result<()> {
        let entry = self.entries.get_mut(name).ok_or_else(|| not_found(name))?;
        entry.runtime.cache_eligible = eligible;
        Ok(())
    }
}

fn not_found(name: &str) -> AssetDbError {
    AssetDbError::DatabaseNotFound {
        name: name.to_string(),
    }
}
