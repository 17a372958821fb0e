//! Workspace placeholder crate.
//!
//! Hosts that only need the asset database orchestrator can depend on
//! `assetdb-workspace` and get the facade, its configuration and the bridge
//! contracts re-exported from one place.

#[cfg(feature = "orchestrator")]
pub use bridge_traits::{ImportEngine, StartupHook};
#[cfg(feature = "orchestrator")]
pub use core_assetdb::{AssetDbError, AssetDbManager, DatabaseConfig, OperationKind};
#[cfg(feature = "orchestrator")]
pub use core_runtime::config::{CoreConfig, StartupMode};
