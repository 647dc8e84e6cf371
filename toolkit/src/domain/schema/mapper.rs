//! Per-column type resolution
//!
//! Order: custom override, context rule, base default (with precision
//! policy), catch-all fallback. Compatibility analysis runs on whatever type
//! was chosen.

use std::sync::Arc;

use super::compat::CompatibilityAnalyzer;
use super::precision::{PrecisionHandler, PrecisionPolicy};
use super::type_params::{TypeSpec, parse_type_with_params};
use super::types::{
    MappingWarning, RiskLevel, TypeMappingContext, TypeMappingResult, WarningCategory,
};
use super::TargetDialect;
use crate::data::rules::RuleStore;

/// StarRocks VARCHAR length used when the source declares none
const STARROCKS_MAX_VARCHAR: u32 = 65533;

#[derive(Debug, Clone)]
pub struct TypeMapper {
    rules: Arc<RuleStore>,
    precision: PrecisionHandler,
    compat: CompatibilityAnalyzer,
}

impl TypeMapper {
    pub fn new(rules: Arc<RuleStore>, policy: PrecisionPolicy) -> Self {
        Self {
            rules,
            precision: PrecisionHandler::new(policy),
            compat: CompatibilityAnalyzer::new(),
        }
    }

    pub fn rules(&self) -> &Arc<RuleStore> {
        &self.rules
    }

    /// Map one column type
    pub fn map(&self, ctx: &TypeMappingContext) -> TypeMappingResult {
        let spec = parse_type_with_params(&ctx.source_type);
        let target = ctx.target_db;

        let mut result = TypeMappingResult::new(String::new());
        result
            .metadata
            .insert("source_type".into(), ctx.source_type.trim().to_string());
        result.metadata.insert("base_type".into(), spec.base.clone());
        if !spec.params.is_empty() {
            result
                .metadata
                .insert("params".into(), spec.params.join(","));
        }

        let element = if let Some(custom) = self.rules.custom_rule(ctx.source_db, target, &spec) {
            result.metadata.insert("rule".into(), "custom".into());
            pass_through(&custom, &spec, target)
        } else if let Some(matched) = self.rules.match_context_rules(ctx) {
            result
                .metadata
                .insert("rule".into(), format!("context:{}", matched.rule));
            matched.target_type
        } else if let Some(base) = self.rules.default_rule(ctx.source_db, target, &spec) {
            result.metadata.insert("rule".into(), "default".into());
            match self.precision.map(&spec, ctx.source_db, target) {
                Some(outcome) => {
                    result.precision_loss |= outcome.precision_loss;
                    result.requires_manual |= outcome.requires_manual;
                    for warning in outcome.warnings {
                        result.push_warning(warning);
                    }
                    outcome.target_type
                }
                None => apply_params(&base, &spec, target),
            }
        } else {
            result.metadata.insert("rule".into(), "fallback".into());
            result.requires_manual = true;
            result.push_warning(
                MappingWarning::error(
                    WarningCategory::Unmapped,
                    format!(
                        "no {} rule for {} type {}, using {}",
                        target,
                        ctx.source_db,
                        spec.display(),
                        target.fallback_type()
                    ),
                )
                .with_suggestion("add a custom or context rule for this type"),
            );
            target.fallback_type().to_string()
        };

        let report = self.compat.analyze(&spec, &element, ctx);
        for warning in report.warnings {
            result.push_warning(warning);
        }

        result.risk = report.risk;
        if result.precision_loss {
            result.risk = result.risk.max(RiskLevel::Medium);
        }
        if result.requires_manual {
            result.risk = RiskLevel::High;
        }
        result.compatible = report.compatible && !result.requires_manual;
        result.target_type = if spec.array {
            wrap_array(&element, target)
        } else {
            element
        };

        if !result.warnings.is_empty() {
            tracing::debug!(
                column = %ctx.column_name,
                source = %ctx.source_type,
                target = %result.target_type,
                risk = ?result.risk,
                warnings = result.warnings.len(),
                "Column mapped with warnings"
            );
        }
        result
    }
}

/// Carry source parameters onto target types that take them
fn apply_params(name: &str, spec: &TypeSpec, target: TargetDialect) -> String {
    if name.contains('(') {
        return name.to_string();
    }
    let takes_length = match target {
        TargetDialect::ClickHouse => name == "FixedString",
        TargetDialect::StarRocks => name == "VARCHAR" || name == "CHAR",
    };
    if !takes_length {
        return name.to_string();
    }
    match spec.length() {
        Some(length) => format!("{}({})", name, length),
        None if target == TargetDialect::StarRocks && name == "VARCHAR" => {
            format!("VARCHAR({})", STARROCKS_MAX_VARCHAR)
        }
        None => name.to_string(),
    }
}

/// Custom overrides keep the source parameters: a bare parameterized
/// target name receives them, anything else goes through [`apply_params`]
fn pass_through(name: &str, spec: &TypeSpec, target: TargetDialect) -> String {
    if name.contains('(') || spec.params.is_empty() {
        return apply_params(name, spec, target);
    }
    let all = spec.params.join(",");
    match (target, name) {
        (TargetDialect::ClickHouse, "Decimal" | "DateTime64") => format!("{}({})", name, all),
        (TargetDialect::ClickHouse, "Decimal32" | "Decimal64" | "Decimal128" | "Decimal256") => {
            format!("{}({})", name, spec.scale().unwrap_or(0))
        }
        (TargetDialect::StarRocks, _)
            if ["DECIMAL", "DECIMALV3", "DATETIME"]
                .iter()
                .any(|t| name.eq_ignore_ascii_case(t)) =>
        {
            format!("{}({})", name, all)
        }
        _ => apply_params(name, spec, target),
    }
}

fn wrap_array(element: &str, target: TargetDialect) -> String {
    match target {
        TargetDialect::ClickHouse => format!("Array({})", element),
        TargetDialect::StarRocks => format!("ARRAY<{}>", element),
    }
}
