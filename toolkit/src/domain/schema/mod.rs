//! Cross-dialect schema translation
//!
//! - `type_params` - the single parser for `BASE(p1, p2) UNSIGNED` type text
//! - `precision` - numeric and temporal precision policy
//! - `compat` - known-issue, overflow, precision and timezone analysis
//! - `mapper` - per-column resolution: custom, context, base, precision, analysis
//! - `converter` - DDL parse, per-column mapping and target DDL emission

pub mod compat;
pub mod converter;
pub mod mapper;
pub mod precision;
pub mod type_params;
pub mod types;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::BenchError;

pub use compat::{CompatibilityAnalyzer, CompatibilityReport};
pub use converter::{ConversionResult, SchemaConverter, TableConversion, list_tables};
pub use mapper::TypeMapper;
pub use precision::{OverflowStrategy, PrecisionHandler, PrecisionPolicy};
pub use type_params::{TypeSpec, parse_type_with_params};
pub use types::{
    ColumnSchema, IndexSchema, MappingWarning, RiskLevel, TableSchema, TypeMappingContext,
    TypeMappingResult, WarningCategory, WarningLevel,
};

const COMPONENT: &str = "schema";

/// Database flavor a schema or trace comes from
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceDialect {
    #[serde(rename = "mysql")]
    MySql,
    Postgres,
    #[serde(rename = "tidb")]
    TiDb,
}

impl SourceDialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
            Self::TiDb => "tidb",
        }
    }

    /// Dialect whose rules apply when this one has none of its own
    pub fn fallback(&self) -> Option<Self> {
        match self {
            Self::TiDb => Some(Self::MySql),
            _ => None,
        }
    }

    pub fn is_mysql_family(&self) -> bool {
        matches!(self, Self::MySql | Self::TiDb)
    }
}

impl fmt::Display for SourceDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SourceDialect {
    type Err = BenchError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Self::MySql),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "tidb" => Ok(Self::TiDb),
            _ => Err(BenchError::unsupported_dialect(COMPONENT, s)),
        }
    }
}

/// Analytical database a schema is translated into
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetDialect {
    #[serde(rename = "clickhouse")]
    ClickHouse,
    #[serde(rename = "starrocks")]
    StarRocks,
}

impl TargetDialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClickHouse => "clickhouse",
            Self::StarRocks => "starrocks",
        }
    }

    /// Catch-all text type used when no rule maps a column
    pub fn fallback_type(&self) -> &'static str {
        match self {
            Self::ClickHouse => "String",
            Self::StarRocks => "STRING",
        }
    }
}

impl fmt::Display for TargetDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TargetDialect {
    type Err = BenchError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clickhouse" | "ch" => Ok(Self::ClickHouse),
            "starrocks" | "sr" => Ok(Self::StarRocks),
            _ => Err(BenchError::unsupported_dialect(COMPONENT, s)),
        }
    }
}

/// Rule table key, e.g. `mysql:clickhouse`
pub fn rule_key(source: SourceDialect, target: TargetDialect) -> String {
    format!("{}:{}", source.as_str(), target.as_str())
}
