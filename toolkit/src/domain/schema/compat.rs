//! Compatibility analysis of a mapped column
//!
//! Four passes over `(source type, target type)`: known issues per dialect
//! pair, integer overflow, decimal precision/scale, and timezone loss.

use super::precision::source_decimal;
use super::type_params::{TypeSpec, parse_type_with_params};
use super::types::{MappingWarning, RiskLevel, TypeMappingContext, WarningCategory};
use super::{SourceDialect, TargetDialect};

/// One documented incompatibility
#[derive(Debug, Clone, Copy)]
struct KnownIssue {
    /// Upper-case substring of the source base type
    source_pattern: &'static str,
    /// Target base name (case-insensitive, parameters ignored)
    target_type: &'static str,
    category: WarningCategory,
    message: &'static str,
    mitigation: &'static str,
}

const fn issue(
    source_pattern: &'static str,
    target_type: &'static str,
    category: WarningCategory,
    message: &'static str,
    mitigation: &'static str,
) -> KnownIssue {
    KnownIssue {
        source_pattern,
        target_type,
        category,
        message,
        mitigation,
    }
}

const MYSQL_CLICKHOUSE_ISSUES: &[KnownIssue] = &[
    issue("ENUM", "String", WarningCategory::Compatibility, "ENUM value constraint is not enforced", "use Enum8/Enum16 or LowCardinality(String)"),
    issue("SET", "String", WarningCategory::Compatibility, "SET members are stored as a comma-separated string", "use Array(LowCardinality(String))"),
    issue("YEAR", "UInt16", WarningCategory::Compatibility, "YEAR is stored as a plain integer", "convert to Date32 if date arithmetic is needed"),
    issue("TIME", "String", WarningCategory::Compatibility, "TIME values are stored as text", "store seconds as Int32 for arithmetic"),
    issue("BIT", "UInt64", WarningCategory::Compatibility, "BIT literals (b'..') must be converted to integers on load", "convert bit strings during ingestion"),
    issue("DATE", "Date", WarningCategory::DataLoss, "Date covers 1970-01-01 to 2149-06-06 only", "use Date32"),
    issue("JSON", "String", WarningCategory::Compatibility, "JSON is stored as text", "use the JSON type or JSONExtract functions"),
];

const POSTGRES_CLICKHOUSE_ISSUES: &[KnownIssue] = &[
    issue("SERIAL", "Int16", WarningCategory::Compatibility, "sequence default is dropped", "generate keys upstream"),
    issue("SERIAL", "Int32", WarningCategory::Compatibility, "sequence default is dropped", "generate keys upstream"),
    issue("SERIAL", "Int64", WarningCategory::Compatibility, "sequence default is dropped", "generate keys upstream"),
    issue("INTERVAL", "Int64", WarningCategory::PrecisionLoss, "INTERVAL is flattened to a single unit", "store seconds and months separately"),
    issue("JSONB", "String", WarningCategory::Compatibility, "JSONB is stored as text", "use the JSON type or JSONExtract functions"),
    issue("TIME", "String", WarningCategory::Compatibility, "TIME values are stored as text", "store seconds as Int32 for arithmetic"),
    issue("DATE", "Date", WarningCategory::DataLoss, "Date covers 1970-01-01 to 2149-06-06 only", "use Date32"),
    issue("INET", "String", WarningCategory::Compatibility, "INET is stored as text", "use IPv4/IPv6"),
];

const MYSQL_STARROCKS_ISSUES: &[KnownIssue] = &[
    issue("ENUM", "STRING", WarningCategory::Compatibility, "ENUM value constraint is not enforced", "validate values upstream"),
    issue("SET", "STRING", WarningCategory::Compatibility, "SET members are stored as a comma-separated string", "use ARRAY<VARCHAR>"),
    issue("TIME", "STRING", WarningCategory::Compatibility, "TIME values are stored as text", "store seconds as INT for arithmetic"),
    issue("YEAR", "SMALLINT", WarningCategory::Compatibility, "YEAR is stored as a plain integer", "convert to DATE if date arithmetic is needed"),
    issue("BIT", "BIGINT", WarningCategory::Compatibility, "BIT literals (b'..') must be converted to integers on load", "convert bit strings during ingestion"),
];

const POSTGRES_STARROCKS_ISSUES: &[KnownIssue] = &[
    issue("SERIAL", "INT", WarningCategory::Compatibility, "sequence default is dropped", "use AUTO_INCREMENT or generate keys upstream"),
    issue("SERIAL", "BIGINT", WarningCategory::Compatibility, "sequence default is dropped", "use AUTO_INCREMENT or generate keys upstream"),
    issue("INTERVAL", "BIGINT", WarningCategory::PrecisionLoss, "INTERVAL is flattened to a single unit", "store seconds and months separately"),
    issue("UUID", "VARCHAR", WarningCategory::Compatibility, "UUID is stored as text", "compare as lower-case strings"),
    issue("TIME", "STRING", WarningCategory::Compatibility, "TIME values are stored as text", "store seconds as INT for arithmetic"),
];

fn known_issues(source: SourceDialect, target: TargetDialect) -> &'static [KnownIssue] {
    match (source, target) {
        (SourceDialect::MySql | SourceDialect::TiDb, TargetDialect::ClickHouse) => MYSQL_CLICKHOUSE_ISSUES,
        (SourceDialect::Postgres, TargetDialect::ClickHouse) => POSTGRES_CLICKHOUSE_ISSUES,
        (SourceDialect::MySql | SourceDialect::TiDb, TargetDialect::StarRocks) => MYSQL_STARROCKS_ISSUES,
        (SourceDialect::Postgres, TargetDialect::StarRocks) => POSTGRES_STARROCKS_ISSUES,
    }
}

/// Merged outcome of all passes
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompatibilityReport {
    pub compatible: bool,
    pub warnings: Vec<MappingWarning>,
    pub risk: RiskLevel,
}

impl CompatibilityReport {
    fn raise(&mut self, warning: MappingWarning, risk: RiskLevel) {
        self.risk = self.risk.max(risk);
        self.warnings.push(warning);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompatibilityAnalyzer;

impl CompatibilityAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(
        &self,
        source: &TypeSpec,
        target_type: &str,
        ctx: &TypeMappingContext,
    ) -> CompatibilityReport {
        let mut report = CompatibilityReport {
            compatible: true,
            ..Default::default()
        };
        let target = parse_type_with_params(target_type);

        let target_type = target_type.trim();

        self.check_known_issues(source, &target, target_type, ctx, &mut report);
        check_overflow(source, &target, target_type, ctx, &mut report);
        check_decimal(source, &target, target_type, ctx, &mut report);
        check_timezone(source, &target, target_type, ctx, &mut report);

        report.compatible = report.risk < RiskLevel::High;
        report
    }

    fn check_known_issues(
        &self,
        source: &TypeSpec,
        target: &TypeSpec,
        target_type: &str,
        ctx: &TypeMappingContext,
        report: &mut CompatibilityReport,
    ) {
        for known in known_issues(ctx.source_db, ctx.target_db) {
            if source.base.contains(known.source_pattern)
                && target.base.eq_ignore_ascii_case(known.target_type)
            {
                report.raise(
                    MappingWarning::warning(
                        known.category,
                        format!("{} -> {}: {}", source.display(), target_type, known.message),
                    )
                    .with_suggestion(known.mitigation),
                    known.category.risk(),
                );
            }
        }
    }
}

/// (bits, signed) of an integer type name, source or target
fn integer_width(base: &str) -> Option<(u32, bool)> {
    let upper = base.to_ascii_uppercase();
    let width = match upper.as_str() {
        "TINYINT" => (8, true),
        "SMALLINT" | "INT2" | "SMALLSERIAL" => (16, true),
        "MEDIUMINT" => (24, true),
        "INT" | "INTEGER" | "INT4" | "SERIAL" => (32, true),
        "BIGINT" | "BIGSERIAL" => (64, true),
        "LARGEINT" => (128, true),
        _ => {
            // ClickHouse IntN / UIntN
            let (signed, digits) = if let Some(d) = upper.strip_prefix("UINT") {
                (false, d)
            } else if let Some(d) = upper.strip_prefix("INT") {
                (true, d)
            } else {
                return None;
            };
            let bits: u32 = digits.parse().ok()?;
            (bits, signed)
        }
    };
    Some(width)
}

fn check_overflow(
    source: &TypeSpec,
    target: &TypeSpec,
    target_type: &str,
    ctx: &TypeMappingContext,
    report: &mut CompatibilityReport,
) {
    // Postgres INT8 is 64-bit; the ClickHouse-style parse would read it as 8
    let source_width = match (ctx.source_db, source.base.as_str()) {
        (SourceDialect::Postgres, "INT8") => Some((64, true)),
        _ => integer_width(&source.base),
    };
    let (Some((source_bits, source_signed)), Some((target_bits, target_signed))) =
        (source_width, integer_width(&target.base))
    else {
        return;
    };
    let source_signed = source_signed && !source.unsigned;

    let overflow = if source_signed == target_signed {
        target_bits < source_bits
    } else if target_signed {
        // unsigned -> signed needs one extra bit
        target_bits <= source_bits
    } else {
        // signed -> unsigned loses negatives
        true
    };

    if overflow {
        report.raise(
            MappingWarning::warning(
                WarningCategory::Overflow,
                format!("{} -> {} may overflow", source.display(), target_type),
            )
            .with_suggestion("use a wider or unsigned target type"),
            RiskLevel::High,
        );
    }
}

/// (precision, scale) of a target decimal type
fn target_decimal(target: &TypeSpec) -> Option<(u32, u32)> {
    let implicit = match target.base.to_ascii_uppercase().as_str() {
        "DECIMAL32" => Some(9),
        "DECIMAL64" => Some(18),
        "DECIMAL128" => Some(38),
        "DECIMAL256" => Some(76),
        "DECIMAL" | "NUMERIC" => None,
        _ => return None,
    };
    match implicit {
        Some(p) => Some((p, target.param(0).unwrap_or(0))),
        None => Some((target.param(0)?, target.param(1).unwrap_or(0))),
    }
}

fn check_decimal(
    source: &TypeSpec,
    target: &TypeSpec,
    target_type: &str,
    ctx: &TypeMappingContext,
    report: &mut CompatibilityReport,
) {
    if !matches!(source.base.as_str(), "DECIMAL" | "NUMERIC" | "DEC" | "FIXED") {
        return;
    }
    // Unconstrained Postgres NUMERIC has no declared digits to compare
    if source.params.is_empty() && ctx.source_db == SourceDialect::Postgres {
        return;
    }
    let Some((tp, ts)) = target_decimal(target) else {
        return;
    };
    let (sp, ss, _) = source_decimal(source, ctx.source_db);

    if sp > tp || ss > ts {
        report.raise(
            MappingWarning::warning(
                WarningCategory::PrecisionLoss,
                format!(
                    "DECIMAL({},{}) does not fit {} (precision {}, scale {})",
                    sp,
                    ss,
                    target_type,
                    tp,
                    ts
                ),
            )
            .with_suggestion("store as String if exact digits must be preserved"),
            RiskLevel::High,
        );
    }
}

fn is_tz_aware(source: &TypeSpec, dialect: SourceDialect) -> bool {
    let base = source.base.as_str();
    base == "TIMESTAMPTZ"
        || base.ends_with("WITH TIME ZONE")
        || (dialect.is_mysql_family() && base == "TIMESTAMP")
}

fn check_timezone(
    source: &TypeSpec,
    target: &TypeSpec,
    target_type: &str,
    ctx: &TypeMappingContext,
    report: &mut CompatibilityReport,
) {
    if !is_tz_aware(source, ctx.source_db) {
        return;
    }
    let keeps_tz = target.base.eq_ignore_ascii_case("DateTime64")
        || target.params.iter().any(|p| p.starts_with('\''));
    if !keeps_tz {
        report.raise(
            MappingWarning::info(
                WarningCategory::Timezone,
                format!(
                    "{} is timezone-aware, {} stores wall-clock values",
                    source.display(),
                    target_type
                ),
            )
            .with_suggestion("normalize to UTC on load"),
            RiskLevel::Low,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::types::WarningLevel;

    fn analyze(source: &str, target: &str, s: SourceDialect, t: TargetDialect) -> CompatibilityReport {
        let ctx = TypeMappingContext::new(source, s, t);
        CompatibilityAnalyzer::new().analyze(&parse_type_with_params(source), target, &ctx)
    }

    fn ch(source: &str, target: &str) -> CompatibilityReport {
        analyze(source, target, SourceDialect::MySql, TargetDialect::ClickHouse)
    }

    #[test]
    fn test_clean_mappings() {
        for (s, t) in [
            ("INT", "Int32"),
            ("BIGINT UNSIGNED", "UInt64"),
            ("INT UNSIGNED", "UInt32"),
            ("DECIMAL(10,2)", "Decimal64(2)"),
            ("VARCHAR(100)", "String"),
            ("DATETIME(3)", "DateTime64(3)"),
        ] {
            let r = ch(s, t);
            assert!(r.warnings.is_empty(), "{} -> {}: {:?}", s, t, r.warnings);
            assert_eq!(r.risk, RiskLevel::Low);
            assert!(r.compatible);
        }
    }

    #[test]
    fn test_unsigned_overflow() {
        let r = ch("BIGINT UNSIGNED", "Int64");
        assert_eq!(r.risk, RiskLevel::High);
        assert!(!r.compatible);
        assert_eq!(r.warnings[0].category, WarningCategory::Overflow);

        assert_eq!(ch("INT UNSIGNED", "Int64").risk, RiskLevel::Low);
        assert_eq!(ch("BIGINT", "Int32").risk, RiskLevel::High);
        assert_eq!(ch("INT", "UInt32").risk, RiskLevel::High);

        let sr = analyze("BIGINT UNSIGNED", "BIGINT", SourceDialect::MySql, TargetDialect::StarRocks);
        assert_eq!(sr.risk, RiskLevel::High);
        let sr = analyze("BIGINT UNSIGNED", "LARGEINT", SourceDialect::MySql, TargetDialect::StarRocks);
        assert_eq!(sr.risk, RiskLevel::Low);
    }

    #[test]
    fn test_decimal_precision_comparison() {
        assert_eq!(ch("DECIMAL(20,2)", "Decimal64(2)").risk, RiskLevel::High);
        assert_eq!(ch("DECIMAL(10,4)", "Decimal64(2)").risk, RiskLevel::High);
        assert_eq!(ch("DECIMAL(38,4)", "Decimal128(4)").risk, RiskLevel::Low);
        let sr = analyze("DECIMAL(50,2)", "DECIMAL(38,2)", SourceDialect::MySql, TargetDialect::StarRocks);
        assert_eq!(sr.risk, RiskLevel::High);
    }

    #[test]
    fn test_known_issues() {
        let r = ch("ENUM('a','b')", "String");
        assert_eq!(r.risk, RiskLevel::Low);
        assert_eq!(r.warnings.len(), 1);
        assert!(r.warnings[0].suggestion.is_some());

        let r = ch("DATE", "Date");
        assert_eq!(r.risk, RiskLevel::High);
        assert_eq!(r.warnings[0].category, WarningCategory::DataLoss);

        // DATE -> Date32 is not the known issue
        assert!(ch("DATE", "Date32").warnings.is_empty());

        let pg = analyze("interval", "Int64", SourceDialect::Postgres, TargetDialect::ClickHouse);
        assert_eq!(pg.risk, RiskLevel::Medium);
    }

    #[test]
    fn test_timezone_info() {
        let r = analyze(
            "timestamp with time zone",
            "DateTime",
            SourceDialect::Postgres,
            TargetDialect::ClickHouse,
        );
        assert_eq!(r.warnings.len(), 1);
        assert_eq!(r.warnings[0].level, WarningLevel::Info);
        assert_eq!(r.warnings[0].category, WarningCategory::Timezone);

        let r = analyze("timestamptz", "DateTime64(6)", SourceDialect::Postgres, TargetDialect::ClickHouse);
        assert!(r.warnings.is_empty());

        let r = ch("TIMESTAMP", "DateTime");
        assert_eq!(r.warnings.len(), 1);
        assert!(ch("DATETIME", "DateTime").warnings.is_empty());

        let r = ch("TIMESTAMP", "DateTime('UTC')");
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn test_never_emits_error_level() {
        for (s, t) in [("BIGINT UNSIGNED", "Int8"), ("DECIMAL(80,2)", "Decimal32(0)"), ("DATE", "Date")] {
            assert!(ch(s, t).warnings.iter().all(|w| w.level != WarningLevel::Error));
        }
    }
}
