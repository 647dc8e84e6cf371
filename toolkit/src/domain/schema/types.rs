//! Schema and type-mapping data types

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{SourceDialect, TargetDialect};

// =============================================================================
// Parsed schema
// =============================================================================

/// One column as emitted by the DDL parser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    /// Source type text as written, e.g. `DECIMAL(10,2) UNSIGNED`
    pub data_type: String,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default)]
    pub is_primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub indexes: Vec<IndexSchema>,
    /// Trailing table options (`ENGINE=InnoDB DEFAULT CHARSET=utf8mb4`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<String>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Whether `column` takes part in any secondary index
    pub fn is_indexed(&self, column: &str) -> bool {
        self.indexes
            .iter()
            .any(|i| i.columns.iter().any(|c| c.eq_ignore_ascii_case(column)))
    }

    /// Mark primary-key columns from both inline and table-level constraints
    pub fn normalize_primary_key(&mut self) {
        if self.primary_key.is_empty() {
            self.primary_key = self
                .columns
                .iter()
                .filter(|c| c.is_primary_key)
                .map(|c| c.name.clone())
                .collect();
        }
        for column in &mut self.columns {
            if self
                .primary_key
                .iter()
                .any(|pk| pk.eq_ignore_ascii_case(&column.name))
            {
                column.is_primary_key = true;
                column.nullable = false;
            }
        }
    }
}

// =============================================================================
// Mapping context and result
// =============================================================================

/// Everything the mapper knows about one column. Transient per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMappingContext {
    pub source_type: String,
    pub source_db: SourceDialect,
    pub target_db: TargetDialect,
    pub column_name: String,
    pub is_primary_key: bool,
    pub is_index: bool,
    pub is_nullable: bool,
    pub default_value: Option<String>,
    pub table_name: Option<String>,
}

impl TypeMappingContext {
    pub fn new(
        source_type: impl Into<String>,
        source_db: SourceDialect,
        target_db: TargetDialect,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            source_db,
            target_db,
            column_name: String::new(),
            is_primary_key: false,
            is_index: false,
            is_nullable: true,
            default_value: None,
            table_name: None,
        }
    }

    /// Context for `column` of `table`
    pub fn for_column(
        table: &TableSchema,
        column: &ColumnSchema,
        source_db: SourceDialect,
        target_db: TargetDialect,
    ) -> Self {
        Self {
            source_type: column.data_type.clone(),
            source_db,
            target_db,
            column_name: column.name.clone(),
            is_primary_key: column.is_primary_key,
            is_index: table.is_indexed(&column.name),
            is_nullable: column.nullable,
            default_value: column.default.clone(),
            table_name: Some(table.name.clone()),
        }
    }

    pub fn with_column(mut self, name: impl Into<String>) -> Self {
        self.column_name = name.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WarningLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCategory {
    Overflow,
    DataLoss,
    PrecisionLoss,
    Timezone,
    Compatibility,
    Unmapped,
}

impl WarningCategory {
    /// Risk implied by a known issue of this category
    pub fn risk(&self) -> RiskLevel {
        match self {
            Self::Overflow | Self::DataLoss => RiskLevel::High,
            Self::PrecisionLoss => RiskLevel::Medium,
            Self::Timezone | Self::Compatibility => RiskLevel::Low,
            Self::Unmapped => RiskLevel::High,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingWarning {
    pub level: WarningLevel,
    pub category: WarningCategory,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl MappingWarning {
    pub fn new(level: WarningLevel, category: WarningCategory, message: impl Into<String>) -> Self {
        Self {
            level,
            category,
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn info(category: WarningCategory, message: impl Into<String>) -> Self {
        Self::new(WarningLevel::Info, category, message)
    }

    pub fn warning(category: WarningCategory, message: impl Into<String>) -> Self {
        Self::new(WarningLevel::Warning, category, message)
    }

    pub fn error(category: WarningCategory, message: impl Into<String>) -> Self {
        Self::new(WarningLevel::Error, category, message)
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for MappingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.level, self.message)
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

/// Outcome of mapping one column type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeMappingResult {
    pub target_type: String,
    pub warnings: Vec<MappingWarning>,
    pub suggestions: Vec<String>,
    pub precision_loss: bool,
    pub requires_manual: bool,
    pub risk: RiskLevel,
    pub compatible: bool,
    /// Original parameters and the rule that resolved the type
    pub metadata: BTreeMap<String, String>,
}

impl TypeMappingResult {
    pub fn new(target_type: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            warnings: Vec::new(),
            suggestions: Vec::new(),
            precision_loss: false,
            requires_manual: false,
            risk: RiskLevel::Low,
            compatible: true,
            metadata: BTreeMap::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        self.warnings.iter().any(|w| w.level == WarningLevel::Error)
    }

    pub fn push_warning(&mut self, warning: MappingWarning) {
        if let Some(s) = &warning.suggestion
            && !self.suggestions.contains(s)
        {
            self.suggestions.push(s.clone());
        }
        self.warnings.push(warning);
    }
}
