//! In-memory rule store with atomic snapshot swap
//!
//! Readers clone an `Arc` of the current compiled snapshot under a read lock
//! and evaluate without holding it. A reload compiles the new document first
//! and only then swaps the pointer, so a broken file never replaces working
//! rules.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use regex::Regex;
use thiserror::Error;
use tokio::sync::broadcast;

use super::types::{Condition, ConditionField, ConditionOperator, ConditionValue, MappingRules};
use crate::core::constants::RULES_CHANNEL_CAPACITY;
use crate::core::error::BenchError;
use crate::domain::schema::{
    SourceDialect, TargetDialect, TypeMappingContext, TypeSpec, parse_type_with_params, rule_key,
};

#[derive(Error, Debug)]
pub enum RuleStoreError {
    #[error("failed to read rules file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid rules YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid context rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("no rules file configured")]
    NoPath,
}

impl From<RuleStoreError> for BenchError {
    fn from(err: RuleStoreError) -> Self {
        BenchError::invalid_input("rules", err.to_string()).with_source(err)
    }
}

/// Published after every successful reload
#[derive(Debug, Clone)]
pub struct ReloadedEvent {
    pub generation: u64,
    pub rules: Arc<MappingRules>,
}

/// Matched context rule with its target template already substituted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextMatch {
    pub rule: String,
    pub target_type: String,
}

#[derive(Debug)]
struct CompiledCondition {
    condition: Condition,
    regex: Option<Regex>,
}

#[derive(Debug)]
struct CompiledRule {
    name: String,
    target_type: String,
    conditions: Vec<CompiledCondition>,
}

/// Immutable snapshot: the document plus pre-compiled context rules sorted
/// by descending priority (file order breaks ties)
#[derive(Debug)]
struct Snapshot {
    rules: Arc<MappingRules>,
    context: Vec<CompiledRule>,
}

impl Snapshot {
    fn compile(rules: MappingRules) -> Result<Self, RuleStoreError> {
        let mut ordered: Vec<_> = rules.context_rules.iter().enumerate().collect();
        ordered.sort_by(|(ia, a), (ib, b)| b.priority.cmp(&a.priority).then(ia.cmp(ib)));

        let mut context = Vec::with_capacity(ordered.len());
        for (_, rule) in ordered {
            let mut conditions = Vec::with_capacity(rule.conditions.len());
            for condition in &rule.conditions {
                let regex = match (condition.operator, &condition.value) {
                    (ConditionOperator::Matches, value) => {
                        Some(Regex::new(&value.as_text()).map_err(|e| {
                            RuleStoreError::InvalidRule {
                                rule: rule.name.clone(),
                                reason: e.to_string(),
                            }
                        })?)
                    }
                    (ConditionOperator::Range, ConditionValue::Range { min, max }) => {
                        if min > max {
                            return Err(RuleStoreError::InvalidRule {
                                rule: rule.name.clone(),
                                reason: format!("range min {} exceeds max {}", min, max),
                            });
                        }
                        None
                    }
                    (ConditionOperator::Range, _) => {
                        return Err(RuleStoreError::InvalidRule {
                            rule: rule.name.clone(),
                            reason: "range operator needs a {min, max} value".to_string(),
                        });
                    }
                    _ => None,
                };
                conditions.push(CompiledCondition {
                    condition: condition.clone(),
                    regex,
                });
            }
            context.push(CompiledRule {
                name: rule.name.clone(),
                target_type: rule.target_type.clone(),
                conditions,
            });
        }

        Ok(Self {
            rules: Arc::new(rules),
            context,
        })
    }
}

/// Process-wide mapping rules
#[derive(Debug)]
pub struct RuleStore {
    snapshot: RwLock<Arc<Snapshot>>,
    path: Option<PathBuf>,
    generation: AtomicU64,
    events: broadcast::Sender<ReloadedEvent>,
}

impl RuleStore {
    /// Store holding the built-in rules
    pub fn with_defaults() -> Self {
        Self::build(default_snapshot(), None)
    }

    /// Store holding `rules`, without a backing file
    pub fn from_rules(rules: MappingRules) -> Result<Self, RuleStoreError> {
        Ok(Self::build(Snapshot::compile(rules)?, None))
    }

    /// Load rules from a YAML file, falling back to the built-in rules.
    ///
    /// The path is remembered either way so a later fix to the file is
    /// picked up by [`reload`](Self::reload) or the watcher.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match read_rules(&path).and_then(Snapshot::compile) {
            Ok(snapshot) => {
                tracing::info!(
                    path = %path.display(),
                    version = %snapshot.rules.version,
                    context_rules = snapshot.context.len(),
                    "Mapping rules loaded"
                );
                Self::build(snapshot, Some(path))
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to load mapping rules, using built-in defaults"
                );
                Self::build(default_snapshot(), Some(path))
            }
        }
    }

    fn build(snapshot: Snapshot, path: Option<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(RULES_CHANNEL_CAPACITY);
        Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            path,
            generation: AtomicU64::new(1),
            events,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current rules document
    pub fn rules(&self) -> Arc<MappingRules> {
        Arc::clone(&self.snapshot.read().rules)
    }

    /// Incremented on every successful swap
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadedEvent> {
        self.events.subscribe()
    }

    /// Re-read the backing file. On failure the current rules stay in place.
    pub fn reload(&self) -> Result<u64, RuleStoreError> {
        let path = self.path.as_ref().ok_or(RuleStoreError::NoPath)?;
        let rules = read_rules(path)?;
        self.replace(rules)
    }

    /// Swap in a new document
    pub fn replace(&self, rules: MappingRules) -> Result<u64, RuleStoreError> {
        let snapshot = Arc::new(Snapshot::compile(rules)?);
        let published = Arc::clone(&snapshot.rules);
        let generation = {
            let mut guard = self.snapshot.write();
            *guard = snapshot;
            self.generation.fetch_add(1, Ordering::AcqRel) + 1
        };

        tracing::info!(generation, version = %published.version, "Mapping rules reloaded");
        // No subscribers is fine
        let _ = self.events.send(ReloadedEvent {
            generation,
            rules: published,
        });
        Ok(generation)
    }

    /// Custom override for `base` (first matching lookup key wins), with
    /// `{length}`, `{precision}` and `{scale}` substituted. An override whose
    /// template needs a parameter the source type lacks does not apply.
    pub fn custom_rule(
        &self,
        source: SourceDialect,
        target: TargetDialect,
        spec: &TypeSpec,
    ) -> Option<String> {
        let snapshot = Arc::clone(&self.snapshot.read());
        let template = lookup(&snapshot.rules.custom_rules, source, target, spec)?;
        let resolved = substitute(&template, spec);
        if resolved.is_none() {
            tracing::debug!(
                template = %template,
                source_type = %spec.display(),
                "Custom rule skipped, source type lacks a template parameter"
            );
        }
        resolved
    }

    /// Base default rule for `base`
    pub fn default_rule(
        &self,
        source: SourceDialect,
        target: TargetDialect,
        spec: &TypeSpec,
    ) -> Option<String> {
        let snapshot = Arc::clone(&self.snapshot.read());
        lookup(&snapshot.rules.default_rules, source, target, spec)
    }

    /// Highest-priority context rule whose conditions all hold, with
    /// `{length}`, `{precision}` and `{scale}` substituted. Rules whose
    /// template needs a parameter the source type lacks are skipped.
    pub fn match_context_rules(&self, ctx: &TypeMappingContext) -> Option<ContextMatch> {
        let snapshot = Arc::clone(&self.snapshot.read());
        let spec = parse_type_with_params(&ctx.source_type);

        for rule in &snapshot.context {
            if !rule.conditions.iter().all(|c| evaluate(c, ctx, &spec)) {
                continue;
            }
            match substitute(&rule.target_type, &spec) {
                Some(target_type) => {
                    tracing::trace!(rule = %rule.name, target = %target_type, "Context rule matched");
                    return Some(ContextMatch {
                        rule: rule.name.clone(),
                        target_type,
                    });
                }
                None => {
                    tracing::debug!(
                        rule = %rule.name,
                        source_type = %ctx.source_type,
                        "Context rule skipped, source type lacks a template parameter"
                    );
                }
            }
        }
        None
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn default_snapshot() -> Snapshot {
    let rules = MappingRules::default();
    let context = rules.context_rules.len();
    match Snapshot::compile(rules) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            // Built-in rules are static; keep base tables if they ever fail
            tracing::error!(error = %e, context, "Built-in context rules failed to compile");
            Snapshot {
                rules: Arc::new(MappingRules {
                    context_rules: Vec::new(),
                    ..MappingRules::default()
                }),
                context: Vec::new(),
            }
        }
    }
}

fn read_rules(path: &Path) -> Result<MappingRules, RuleStoreError> {
    let content = std::fs::read_to_string(path).map_err(|source| RuleStoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_yaml::from_str(&content)?)
}

fn lookup(
    table: &super::types::RuleTable,
    source: SourceDialect,
    target: TargetDialect,
    spec: &TypeSpec,
) -> Option<String> {
    let sources = std::iter::once(source).chain(source.fallback());
    for source in sources {
        if let Some(types) = table.get(&rule_key(source, target)) {
            for key in spec.lookup_keys() {
                if let Some(t) = types.get(&key) {
                    return Some(t.clone());
                }
            }
        }
    }
    None
}

fn field_value(field: ConditionField, ctx: &TypeMappingContext, spec: &TypeSpec) -> Option<String> {
    match field {
        ConditionField::SourceType => Some(ctx.source_type.trim().to_ascii_uppercase()),
        ConditionField::BaseType => Some(spec.base.clone()),
        ConditionField::SourceDb => Some(ctx.source_db.as_str().to_string()),
        ConditionField::TargetDb => Some(ctx.target_db.as_str().to_string()),
        ConditionField::ColumnName => Some(ctx.column_name.clone()),
        ConditionField::IsPrimaryKey => Some(ctx.is_primary_key.to_string()),
        ConditionField::IsIndex => Some(ctx.is_index.to_string()),
        ConditionField::IsNullable => Some(ctx.is_nullable.to_string()),
        ConditionField::DefaultValue => ctx.default_value.clone(),
        ConditionField::TableName => ctx.table_name.clone(),
        ConditionField::Length | ConditionField::Precision => spec.params.first().cloned(),
        ConditionField::Scale => spec.params.get(1).cloned(),
    }
}

fn evaluate(compiled: &CompiledCondition, ctx: &TypeMappingContext, spec: &TypeSpec) -> bool {
    let condition = &compiled.condition;
    let Some(actual) = field_value(condition.field, ctx, spec) else {
        return false;
    };

    match condition.operator {
        ConditionOperator::Equals => match &condition.value {
            ConditionValue::Int(expected) => actual.trim().parse::<i64>() == Ok(*expected),
            other => actual.eq_ignore_ascii_case(&other.as_text()),
        },
        ConditionOperator::Contains => actual
            .to_lowercase()
            .contains(&condition.value.as_text().to_lowercase()),
        ConditionOperator::Matches => compiled
            .regex
            .as_ref()
            .is_some_and(|re| re.is_match(&actual)),
        ConditionOperator::Range => match (&condition.value, actual.trim().parse::<i64>()) {
            (ConditionValue::Range { min, max }, Ok(n)) => *min <= n && n <= *max,
            _ => false,
        },
    }
}

fn substitute(template: &str, spec: &TypeSpec) -> Option<String> {
    let mut out = template.to_string();
    for (token, index) in [("{length}", 0), ("{precision}", 0), ("{scale}", 1)] {
        if out.contains(token) {
            let value = spec.params.get(index)?;
            out = out.replace(token, value);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::rules::types::ContextRule;

    fn ctx(source_type: &str, column: &str) -> TypeMappingContext {
        TypeMappingContext::new(source_type, SourceDialect::MySql, TargetDialect::ClickHouse)
            .with_column(column)
    }

    fn rule(name: &str, priority: i32, conditions: Vec<Condition>, target: &str) -> ContextRule {
        ContextRule {
            name: name.into(),
            conditions,
            target_type: target.into(),
            priority,
        }
    }

    fn cond(field: ConditionField, operator: ConditionOperator, value: ConditionValue) -> Condition {
        Condition {
            field,
            operator,
            value,
        }
    }

    #[test]
    fn test_builtin_context_rules() {
        let store = RuleStore::with_defaults();

        let m = store.match_context_rules(&ctx("CHAR(36)", "order_uuid")).unwrap();
        assert_eq!(m.target_type, "UUID");

        let m = store.match_context_rules(&ctx("tinyint(1)", "active")).unwrap();
        assert_eq!(m.target_type, "Bool");

        let m = store.match_context_rules(&ctx("char(2)", "country")).unwrap();
        assert_eq!(m.target_type, "FixedString(2)");

        assert!(store.match_context_rules(&ctx("CHAR(36)", "name")).is_none());
        assert!(store.match_context_rules(&ctx("INT", "id")).is_none());
    }

    #[test]
    fn test_priority_order_and_ties() {
        let rules = MappingRules {
            context_rules: vec![
                rule("low", 1, vec![cond(ConditionField::BaseType, ConditionOperator::Equals, ConditionValue::Text("INT".into()))], "Int64"),
                rule("first_high", 10, vec![cond(ConditionField::ColumnName, ConditionOperator::Contains, ConditionValue::Text("ID".into()))], "UInt64"),
                rule("second_high", 10, vec![cond(ConditionField::BaseType, ConditionOperator::Equals, ConditionValue::Text("int".into()))], "Int128"),
            ],
            ..MappingRules::default()
        };
        let store = RuleStore::from_rules(rules).unwrap();
        let m = store.match_context_rules(&ctx("int", "user_id")).unwrap();
        assert_eq!(m.rule, "first_high");
        assert_eq!(m.target_type, "UInt64");

        let m = store.match_context_rules(&ctx("int", "total")).unwrap();
        assert_eq!(m.rule, "second_high");
    }

    #[test]
    fn test_range_with_unparseable_length_does_not_match() {
        let rules = MappingRules {
            context_rules: vec![rule(
                "short",
                1,
                vec![cond(
                    ConditionField::Length,
                    ConditionOperator::Range,
                    ConditionValue::Range { min: 1, max: 10 },
                )],
                "FixedString({length})",
            )],
            ..MappingRules::default()
        };
        let store = RuleStore::from_rules(rules).unwrap();
        assert!(store.match_context_rules(&ctx("CHAR(max)", "c")).is_none());
        assert!(store.match_context_rules(&ctx("CHAR", "c")).is_none());
        assert_eq!(
            store.match_context_rules(&ctx("CHAR(4)", "c")).unwrap().target_type,
            "FixedString(4)"
        );
    }

    #[test]
    fn test_missing_template_parameter_skips_rule() {
        let rules = MappingRules {
            context_rules: vec![
                rule("needs_length", 10, vec![cond(ConditionField::BaseType, ConditionOperator::Equals, ConditionValue::Text("VARCHAR".into()))], "FixedString({length})"),
                rule("plain", 1, vec![cond(ConditionField::BaseType, ConditionOperator::Equals, ConditionValue::Text("VARCHAR".into()))], "String"),
            ],
            ..MappingRules::default()
        };
        let store = RuleStore::from_rules(rules).unwrap();
        assert_eq!(
            store.match_context_rules(&ctx("VARCHAR", "c")).unwrap().rule,
            "plain"
        );
    }

    #[test]
    fn test_invalid_rules_rejected() {
        let bad_regex = MappingRules {
            context_rules: vec![rule("bad", 1, vec![cond(ConditionField::ColumnName, ConditionOperator::Matches, ConditionValue::Text("(".into()))], "String")],
            ..MappingRules::default()
        };
        assert!(matches!(
            RuleStore::from_rules(bad_regex),
            Err(RuleStoreError::InvalidRule { .. })
        ));

        let bad_range = MappingRules {
            context_rules: vec![rule("bad", 1, vec![cond(ConditionField::Length, ConditionOperator::Range, ConditionValue::Int(3))], "String")],
            ..MappingRules::default()
        };
        assert!(RuleStore::from_rules(bad_range).is_err());
    }

    #[test]
    fn test_lookup_with_unsigned_and_tidb_fallback() {
        let store = RuleStore::with_defaults();
        let spec = parse_type_with_params("bigint(20) unsigned");
        assert_eq!(
            store.default_rule(SourceDialect::MySql, TargetDialect::ClickHouse, &spec),
            Some("UInt64".into())
        );
        assert_eq!(
            store.default_rule(SourceDialect::TiDb, TargetDialect::ClickHouse, &spec),
            Some("UInt64".into())
        );
        let spec = parse_type_with_params("geometry");
        assert_eq!(
            store.default_rule(SourceDialect::MySql, TargetDialect::ClickHouse, &spec),
            None
        );
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::load(dir.path().join("missing.yaml"));
        assert_eq!(*store.rules(), MappingRules::default());
        assert!(store.reload().is_err());
        assert_eq!(store.generation(), 1);
    }

    #[tokio::test]
    async fn test_reload_publishes_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(&path, "version: \"1.0\"\n").unwrap();

        let store = RuleStore::load(&path);
        let mut rx = store.subscribe();

        std::fs::write(
            &path,
            "version: \"2.0\"\ncustom_rules:\n  mysql:clickhouse:\n    VARCHAR: LowCardinality(String)\n",
        )
        .unwrap();
        let generation = store.reload().unwrap();
        assert_eq!(generation, 2);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.generation, 2);
        assert_eq!(event.rules.version, "2.0");

        let spec = parse_type_with_params("varchar(10)");
        assert_eq!(
            store.custom_rule(SourceDialect::MySql, TargetDialect::ClickHouse, &spec),
            Some("LowCardinality(String)".into())
        );
    }

    #[test]
    fn test_noop_reload_keeps_equal_rules() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(&path, serde_yaml::to_string(&MappingRules::default()).unwrap()).unwrap();
        let store = RuleStore::load(&path);
        let before = store.rules();
        store.reload().unwrap();
        assert_eq!(*store.rules(), *before);
    }

    #[test]
    fn test_broken_reload_keeps_previous_rules() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(&path, "version: \"3.0\"\n").unwrap();
        let store = RuleStore::load(&path);
        std::fs::write(&path, "context_rules: [ {").unwrap();
        assert!(matches!(store.reload(), Err(RuleStoreError::Yaml(_))));
        assert_eq!(store.rules().version, "3.0");
    }
}
