//! Mapping rules document
//!
//! ```yaml
//! version: "1.0"
//! updated_at: "2024-06-01T00:00:00Z"
//! default_rules:
//!   mysql:clickhouse:
//!     INT: Int32
//! custom_rules:
//!   mysql:clickhouse:
//!     VARCHAR: LowCardinality(String)
//! context_rules:
//!   - name: short_codes
//!     conditions:
//!       - { field: base_type, operator: equals, value: CHAR }
//!       - { field: length, operator: range, value: { min: 1, max: 8 } }
//!     target_type: "FixedString({length})"
//!     priority: 20
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::defaults;

/// `<source>:<target>` -> upper-case source type -> target type
pub type RuleTable = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRules {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Absent section means the built-in table
    #[serde(default = "defaults::default_rules")]
    pub default_rules: RuleTable,
    #[serde(default)]
    pub custom_rules: RuleTable,
    /// Absent section means the built-in context rules
    #[serde(default = "defaults::context_rules")]
    pub context_rules: Vec<ContextRule>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for MappingRules {
    fn default() -> Self {
        Self {
            version: default_version(),
            updated_at: None,
            default_rules: defaults::default_rules(),
            custom_rules: RuleTable::new(),
            context_rules: defaults::context_rules(),
        }
    }
}

/// A rule that applies when every condition holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRule {
    pub name: String,
    pub conditions: Vec<Condition>,
    /// May contain `{length}`, `{precision}` or `{scale}`
    pub target_type: String,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: ConditionField,
    pub operator: ConditionOperator,
    pub value: ConditionValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionField {
    SourceType,
    BaseType,
    SourceDb,
    TargetDb,
    ColumnName,
    IsPrimaryKey,
    IsIndex,
    IsNullable,
    DefaultValue,
    TableName,
    Length,
    Precision,
    Scale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    /// Case-insensitive substring
    Contains,
    /// Regular expression
    Matches,
    /// Integer membership in `[min, max]`
    Range,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Bool(bool),
    Int(i64),
    Range { min: i64, max: i64 },
    Text(String),
}

impl ConditionValue {
    /// Comparable text form for `equals` / `contains`
    pub fn as_text(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Range { min, max } => format!("{}..{}", min, max),
            Self::Text(s) => s.clone(),
        }
    }
}
