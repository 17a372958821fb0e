//! Operation identity for queued tasks.
//!
//! Two queued tasks are "the same request" when their [`Operation`]s compare
//! equal: same [`OperationKind`] and equal arguments. The kind also decides
//! how the scheduler treats a task: asset mutations mark the system busy and
//! refresh-class tasks wait until it is not.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Asset CRUD operations supplied by collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetOperation {
    Create,
    Save,
    Move,
    Copy,
    Delete,
    Reimport,
}

impl AssetOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetOperation::Create => "create",
            AssetOperation::Save => "save",
            AssetOperation::Move => "move",
            AssetOperation::Copy => "copy",
            AssetOperation::Delete => "delete",
            AssetOperation::Reimport => "reimport",
        }
    }
}

/// Stable identity of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Whole-registry refresh
    Refresh,
    /// Register and start a database
    AddDatabase,
    /// Stop and unregister a database
    RemoveDatabase,
    /// Per-asset mutation; tracked by the busy tracker
    Asset(AssetOperation),
    /// Host-defined operation
    Custom(&'static str),
}

impl OperationKind {
    /// Whether running this operation marks the system busy.
    pub fn is_asset_mutating(&self) -> bool {
        matches!(self, OperationKind::Asset(_))
    }

    /// Whether this operation must wait while the system is busy.
    pub fn is_refresh_like(&self) -> bool {
        matches!(self, OperationKind::Refresh)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Refresh => f.write_str("refresh"),
            OperationKind::AddDatabase => f.write_str("add_database"),
            OperationKind::RemoveDatabase => f.write_str("remove_database"),
            OperationKind::Asset(op) => write!(f, "asset_{}", op.as_str()),
            OperationKind::Custom(name) => f.write_str(name),
        }
    }
}

/// A kind plus the arguments it was requested with.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub args: Vec<Value>,
}

impl Operation {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            args: Vec::new(),
        }
    }

    pub fn with_args(kind: OperationKind, args: Vec<Value>) -> Self {
        Self { kind, args }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Label used in logs, events and task errors.
    pub fn label(&self) -> String {
        self.kind.to_string()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            return write!(f, "{}", self.kind);
        }

        let args = self
            .args
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}({})", self.kind, args)
    }
}
