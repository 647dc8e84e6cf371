//! Hot-reloadable type mapping rules
//!
//! - `types` - YAML document model
//! - `defaults` - built-in tables for every supported dialect pair
//! - `store` - compiled snapshot behind an RW lock, reload broadcast
//! - `watcher` - file change polling with debounce

pub mod defaults;
pub mod store;
pub mod types;
pub mod watcher;

pub use store::{ContextMatch, ReloadedEvent, RuleStore, RuleStoreError};
pub use types::{
    Condition, ConditionField, ConditionOperator, ConditionValue, ContextRule, MappingRules,
    RuleTable,
};
pub use watcher::spawn_watcher;
