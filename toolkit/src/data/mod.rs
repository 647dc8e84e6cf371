//! Data layer
//!
//! - `artifacts` - on-disk phase outputs
//! - `plugins` - adapter subprocesses and their RPC clients
//! - `rules` - hot-reloadable type mapping rules

pub mod artifacts;
pub mod plugins;
pub mod rules;

pub use artifacts::ArtifactLayout;
pub use plugins::{PluginClient, PluginError, PluginRegistry, QueryExecutor};
pub use rules::{RuleStore, RuleStoreError};
