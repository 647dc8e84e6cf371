//! Numeric and temporal precision policy

use serde::{Deserialize, Serialize};

use super::type_params::TypeSpec;
use super::types::{MappingWarning, WarningCategory};
use super::{SourceDialect, TargetDialect};

/// ClickHouse Decimal256 ceiling
const CLICKHOUSE_MAX_DECIMAL_PRECISION: u32 = 76;
const STARROCKS_MAX_DECIMAL_PRECISION: u32 = 38;
const MAX_DATETIME64_PRECISION: u32 = 9;
/// MySQL `FLOAT(p)` above this is stored as DOUBLE
const MYSQL_FLOAT_SINGLE_MAX_BITS: u32 = 24;

/// What to do with decimals wider than the target supports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowStrategy {
    #[default]
    Warn,
    Truncate,
    Error,
}

impl std::str::FromStr for OverflowStrategy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(Self::Warn),
            "truncate" => Ok(Self::Truncate),
            "error" => Ok(Self::Error),
            _ => Err(format!("unknown overflow strategy: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecisionPolicy {
    #[serde(default)]
    pub prefer_float64: bool,
    #[serde(default)]
    pub overflow_strategy: OverflowStrategy,
}

/// Type chosen by the precision handler and what it cost
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecisionOutcome {
    pub target_type: String,
    pub warnings: Vec<MappingWarning>,
    pub precision_loss: bool,
    pub requires_manual: bool,
}

impl PrecisionOutcome {
    fn plain(target_type: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            warnings: Vec::new(),
            precision_loss: false,
            requires_manual: false,
        }
    }

    fn warn(mut self, warning: MappingWarning) -> Self {
        self.warnings.push(warning);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrecisionKind {
    Decimal,
    Temporal,
    Float,
}

fn kind_of(base: &str) -> Option<PrecisionKind> {
    match base {
        "DECIMAL" | "NUMERIC" | "DEC" | "FIXED" => Some(PrecisionKind::Decimal),
        "DATETIME"
        | "TIMESTAMP"
        | "TIMESTAMPTZ"
        | "TIMESTAMP WITH TIME ZONE"
        | "TIMESTAMP WITHOUT TIME ZONE" => Some(PrecisionKind::Temporal),
        "FLOAT" | "FLOAT4" | "FLOAT8" | "REAL" | "DOUBLE" | "DOUBLE PRECISION" => {
            Some(PrecisionKind::Float)
        }
        _ => None,
    }
}

/// Resolved (precision, scale) of a source decimal, with the warning raised
/// while defaulting it
pub(crate) fn source_decimal(spec: &TypeSpec, source: SourceDialect) -> (u32, u32, Option<MappingWarning>) {
    match (spec.precision(), spec.scale()) {
        (Some(p), Some(s)) if s > p => (
            p,
            p,
            Some(MappingWarning::warning(
                WarningCategory::PrecisionLoss,
                format!("scale {} exceeds precision {}, clamped to {}", s, p, p),
            )),
        ),
        (Some(p), Some(s)) => (p, s, None),
        (Some(p), None) => (p, 0, None),
        (None, _) if source == SourceDialect::Postgres => (
            38,
            10,
            Some(
                MappingWarning::info(
                    WarningCategory::PrecisionLoss,
                    "unconstrained NUMERIC mapped as precision 38, scale 10",
                )
                .with_suggestion("declare NUMERIC(p,s) explicitly if values exceed 28 integer digits"),
            ),
        ),
        (None, _) => (10, 0, None),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PrecisionHandler {
    policy: PrecisionPolicy,
}

impl PrecisionHandler {
    pub fn new(policy: PrecisionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> PrecisionPolicy {
        self.policy
    }

    /// Whether `base` is resolved here rather than by plain name lookup
    pub fn handles(base: &str) -> bool {
        kind_of(base).is_some()
    }

    /// Pick the target type for a precision-sensitive source type.
    ///
    /// Returns `None` when the base type is not precision-sensitive.
    pub fn map(
        &self,
        spec: &TypeSpec,
        source: SourceDialect,
        target: TargetDialect,
    ) -> Option<PrecisionOutcome> {
        let outcome = match kind_of(&spec.base)? {
            PrecisionKind::Decimal => self.map_decimal(spec, source, target),
            PrecisionKind::Temporal => map_temporal(spec, source, target),
            PrecisionKind::Float => self.map_float(spec, source, target),
        };
        Some(outcome)
    }

    fn map_decimal(&self, spec: &TypeSpec, source: SourceDialect, target: TargetDialect) -> PrecisionOutcome {
        let (p, s, note) = source_decimal(spec, source);
        let max = match target {
            TargetDialect::ClickHouse => CLICKHOUSE_MAX_DECIMAL_PRECISION,
            TargetDialect::StarRocks => STARROCKS_MAX_DECIMAL_PRECISION,
        };

        let render = |p: u32, s: u32| match target {
            TargetDialect::ClickHouse => match p {
                0..=9 => format!("Decimal32({})", s),
                10..=18 => format!("Decimal64({})", s),
                19..=38 => format!("Decimal128({})", s),
                _ => format!("Decimal256({})", s),
            },
            TargetDialect::StarRocks => format!("DECIMAL({},{})", p, s),
        };

        let mut outcome = if p <= max {
            PrecisionOutcome::plain(render(p, s))
        } else {
            let message = format!(
                "DECIMAL({},{}) exceeds the maximum precision {} of {}",
                p, s, max, target
            );
            match self.policy.overflow_strategy {
                OverflowStrategy::Warn => {
                    let mut o = PrecisionOutcome::plain(render(max, s.min(max))).warn(
                        MappingWarning::warning(WarningCategory::DataLoss, message)
                            .with_suggestion("store as String if exact digits must be preserved"),
                    );
                    o.precision_loss = true;
                    o
                }
                OverflowStrategy::Truncate => {
                    let mut o = PrecisionOutcome::plain(render(max, s.min(max))).warn(
                        MappingWarning::info(
                            WarningCategory::PrecisionLoss,
                            format!("{}, truncated", message),
                        ),
                    );
                    o.precision_loss = true;
                    o
                }
                OverflowStrategy::Error => {
                    let mut o = PrecisionOutcome::plain(render(max, s.min(max))).warn(
                        MappingWarning::error(WarningCategory::DataLoss, message)
                            .with_suggestion("choose a target type manually"),
                    );
                    o.precision_loss = true;
                    o.requires_manual = true;
                    o
                }
            }
        };

        if let Some(note) = note {
            outcome.warnings.insert(0, note);
        }
        outcome
    }

    fn map_float(&self, spec: &TypeSpec, source: SourceDialect, target: TargetDialect) -> PrecisionOutcome {
        let double = match spec.base.as_str() {
            "DOUBLE" | "DOUBLE PRECISION" | "FLOAT8" => true,
            "REAL" => source.is_mysql_family(),
            "FLOAT" => match spec.precision() {
                Some(bits) => bits > MYSQL_FLOAT_SINGLE_MAX_BITS,
                // Postgres FLOAT without precision is double precision
                None => source == SourceDialect::Postgres,
            },
            _ => false,
        };

        let wide = double || self.policy.prefer_float64;
        let name = match (target, wide) {
            (TargetDialect::ClickHouse, true) => "Float64",
            (TargetDialect::ClickHouse, false) => "Float32",
            (TargetDialect::StarRocks, true) => "DOUBLE",
            (TargetDialect::StarRocks, false) => "FLOAT",
        };

        let mut outcome = PrecisionOutcome::plain(name);
        if spec.base == "FLOAT" && spec.scale().is_some() {
            // MySQL FLOAT(M,D) rounds on insert; the target does not
            outcome.warnings.push(MappingWarning::info(
                WarningCategory::PrecisionLoss,
                format!("{} display scale is not preserved", spec.display()),
            ));
        }
        outcome
    }
}

fn map_temporal(spec: &TypeSpec, source: SourceDialect, target: TargetDialect) -> PrecisionOutcome {
    let default_fsp = match source {
        SourceDialect::MySql | SourceDialect::TiDb => 0,
        SourceDialect::Postgres => 6,
    };
    let fsp = spec.precision().unwrap_or(default_fsp);

    match target {
        TargetDialect::ClickHouse => match fsp {
            0 => PrecisionOutcome::plain("DateTime"),
            1..=6 => PrecisionOutcome::plain(format!("DateTime64({})", fsp)),
            7..=9 => PrecisionOutcome::plain(format!("DateTime64({})", fsp)).warn(
                MappingWarning::info(
                    WarningCategory::PrecisionLoss,
                    format!("sub-microsecond precision {} kept as DateTime64({})", fsp, fsp),
                ),
            ),
            _ => {
                let mut o = PrecisionOutcome::plain(format!("DateTime64({})", MAX_DATETIME64_PRECISION))
                    .warn(MappingWarning::warning(
                        WarningCategory::PrecisionLoss,
                        format!(
                            "fractional precision {} exceeds {}, truncated",
                            fsp, MAX_DATETIME64_PRECISION
                        ),
                    ));
                o.precision_loss = true;
                o
            }
        },
        TargetDialect::StarRocks => {
            if fsp > 6 {
                let mut o = PrecisionOutcome::plain("DATETIME").warn(MappingWarning::warning(
                    WarningCategory::PrecisionLoss,
                    format!("fractional precision {} exceeds DATETIME microseconds", fsp),
                ));
                o.precision_loss = true;
                o
            } else {
                PrecisionOutcome::plain("DATETIME")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::parse_type_with_params;
    use crate::domain::schema::types::WarningLevel;

    fn map(text: &str, source: SourceDialect, target: TargetDialect, policy: PrecisionPolicy) -> PrecisionOutcome {
        PrecisionHandler::new(policy)
            .map(&parse_type_with_params(text), source, target)
            .unwrap()
    }

    fn ch(text: &str) -> PrecisionOutcome {
        map(text, SourceDialect::MySql, TargetDialect::ClickHouse, PrecisionPolicy::default())
    }

    #[test]
    fn test_decimal_buckets() {
        assert_eq!(ch("DECIMAL(9,2)").target_type, "Decimal32(2)");
        let o = ch("DECIMAL(10,2)");
        assert_eq!(o.target_type, "Decimal64(2)");
        assert!(o.warnings.is_empty());
        assert_eq!(ch("DECIMAL(18,4)").target_type, "Decimal64(4)");
        assert_eq!(ch("DECIMAL(38,10)").target_type, "Decimal128(10)");
        assert_eq!(ch("NUMERIC(76,0)").target_type, "Decimal256(0)");
        assert_eq!(ch("DECIMAL").target_type, "Decimal64(0)");
        assert_eq!(ch("DECIMAL(5)").target_type, "Decimal32(0)");
    }

    #[test]
    fn test_decimal_overflow_strategies() {
        let o = ch("DECIMAL(80,2)");
        assert_eq!(o.target_type, "Decimal256(2)");
        assert!(o.precision_loss);
        assert_eq!(o.warnings[0].level, WarningLevel::Warning);
        assert_eq!(o.warnings[0].category, WarningCategory::DataLoss);

        let truncate = PrecisionPolicy {
            overflow_strategy: OverflowStrategy::Truncate,
            ..Default::default()
        };
        let o = map("DECIMAL(80,78)", SourceDialect::MySql, TargetDialect::ClickHouse, truncate);
        assert_eq!(o.target_type, "Decimal256(76)");
        assert_eq!(o.warnings[0].level, WarningLevel::Info);

        let error = PrecisionPolicy {
            overflow_strategy: OverflowStrategy::Error,
            ..Default::default()
        };
        let o = map("DECIMAL(80,2)", SourceDialect::MySql, TargetDialect::ClickHouse, error);
        assert!(o.requires_manual);
        assert_eq!(o.warnings[0].level, WarningLevel::Error);
    }

    #[test]
    fn test_postgres_unconstrained_numeric() {
        let o = map("numeric", SourceDialect::Postgres, TargetDialect::ClickHouse, PrecisionPolicy::default());
        assert_eq!(o.target_type, "Decimal128(10)");
        assert_eq!(o.warnings.len(), 1);
        assert_eq!(o.warnings[0].level, WarningLevel::Info);
    }

    #[test]
    fn test_starrocks_decimal_cap() {
        let sr = |t| map(t, SourceDialect::MySql, TargetDialect::StarRocks, PrecisionPolicy::default());
        assert_eq!(sr("DECIMAL(10,2)").target_type, "DECIMAL(10,2)");
        let o = sr("DECIMAL(50,4)");
        assert_eq!(o.target_type, "DECIMAL(38,4)");
        assert!(o.precision_loss);
    }

    #[test]
    fn test_temporal() {
        assert_eq!(ch("DATETIME").target_type, "DateTime");
        assert_eq!(ch("DATETIME(3)").target_type, "DateTime64(3)");
        assert_eq!(ch("TIMESTAMP(6)").target_type, "DateTime64(6)");

        let o = ch("TIMESTAMP(9)");
        assert_eq!(o.target_type, "DateTime64(9)");
        assert_eq!(o.warnings[0].level, WarningLevel::Info);
        assert!(!o.precision_loss);

        let o = ch("TIMESTAMP(12)");
        assert_eq!(o.target_type, "DateTime64(9)");
        assert!(o.precision_loss);

        let pg = map("timestamp", SourceDialect::Postgres, TargetDialect::ClickHouse, PrecisionPolicy::default());
        assert_eq!(pg.target_type, "DateTime64(6)");

        let sr = map("DATETIME(3)", SourceDialect::MySql, TargetDialect::StarRocks, PrecisionPolicy::default());
        assert_eq!(sr.target_type, "DATETIME");
        assert!(sr.warnings.is_empty());
    }

    #[test]
    fn test_float_policy() {
        assert_eq!(ch("FLOAT").target_type, "Float32");
        assert_eq!(ch("DOUBLE").target_type, "Float64");
        assert_eq!(ch("FLOAT(53)").target_type, "Float64");
        assert_eq!(ch("REAL").target_type, "Float64");

        let pg = |t| map(t, SourceDialect::Postgres, TargetDialect::ClickHouse, PrecisionPolicy::default());
        assert_eq!(pg("real").target_type, "Float32");
        assert_eq!(pg("double precision").target_type, "Float64");

        let wide = PrecisionPolicy {
            prefer_float64: true,
            ..Default::default()
        };
        assert_eq!(
            map("FLOAT", SourceDialect::MySql, TargetDialect::ClickHouse, wide).target_type,
            "Float64"
        );
        assert_eq!(
            map("FLOAT", SourceDialect::MySql, TargetDialect::StarRocks, PrecisionPolicy::default()).target_type,
            "FLOAT"
        );
    }

    #[test]
    fn test_non_precision_types_ignored() {
        let handler = PrecisionHandler::default();
        assert!(
            handler
                .map(&parse_type_with_params("VARCHAR(10)"), SourceDialect::MySql, TargetDialect::ClickHouse)
                .is_none()
        );
        assert!(PrecisionHandler::handles("TIMESTAMPTZ"));
        assert!(!PrecisionHandler::handles("DATE"));
    }

    #[test]
    fn test_overflow_strategy_from_str() {
        assert_eq!("TRUNCATE".parse::<OverflowStrategy>().unwrap(), OverflowStrategy::Truncate);
        assert!("drop".parse::<OverflowStrategy>().is_err());
    }
}
