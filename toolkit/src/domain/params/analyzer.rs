//! Parameter analysis over extracted templates

use std::collections::BTreeMap;

use super::distribution::ParameterValueDistribution;
use crate::core::constants::{DEFAULT_MAX_CARDINALITY, DEFAULT_TOP_K};
use crate::domain::traces::{Observation, SqlTemplate, SqlTrace, Slot, redact};
use crate::utils::crypto::sha256_hex;

/// (template fingerprint, placeholder position)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParamKey {
    pub template: String,
    pub position: usize,
}

impl ParamKey {
    pub fn new(template: impl Into<String>, position: usize) -> Self {
        Self {
            template: template.into(),
            position,
        }
    }

    /// Short label for logs and metric labels: `<fingerprint prefix>:<name>`
    pub fn label(&self, name: &str) -> String {
        let prefix: String = self.template.chars().take(12).collect();
        format!("{}:{}", prefix, name)
    }
}

/// All fitted parameter models of one trace set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterModels {
    models: BTreeMap<ParamKey, ParameterValueDistribution>,
}

impl From<BTreeMap<ParamKey, ParameterValueDistribution>> for ParameterModels {
    fn from(models: BTreeMap<ParamKey, ParameterValueDistribution>) -> Self {
        Self { models }
    }
}

impl ParameterModels {
    pub fn get(&self, template: &str, position: usize) -> Option<&ParameterValueDistribution> {
        self.models.get(&ParamKey::new(template, position))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParamKey, &ParameterValueDistribution)> {
        self.models.iter()
    }

    /// Models in key order, as persisted next to the converted traces
    pub fn distributions(&self) -> Vec<&ParameterValueDistribution> {
        self.models.values().collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AnalyzerOptions {
    pub max_cardinality: usize,
    pub top_k: usize,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            max_cardinality: DEFAULT_MAX_CARDINALITY,
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// Incremental parameter analyzer.
///
/// Feed it observations (or whole traces) and call [`finish`](Self::finish)
/// once ingest is complete to fit distributions.
#[derive(Debug, Default)]
pub struct ParameterAnalyzer {
    options: AnalyzerOptions,
    models: BTreeMap<ParamKey, ParameterValueDistribution>,
    missing_values: u64,
}

impl ParameterAnalyzer {
    pub fn new(options: AnalyzerOptions) -> Self {
        Self {
            options,
            models: BTreeMap::new(),
            missing_values: 0,
        }
    }

    /// Record the values of one trace that was already redacted
    pub fn observe(&mut self, trace: &SqlTrace, observation: &Observation) {
        let redacted = &observation.redacted;
        for (position, (name, slot)) in redacted
            .placeholders
            .iter()
            .zip(&redacted.slots)
            .enumerate()
        {
            let value = match slot {
                Slot::Literal(v) => Some(v.clone()),
                Slot::Bound => trace.binding(name).and_then(binding_to_string),
            };
            let Some(value) = value else {
                self.missing_values += 1;
                continue;
            };

            let max_cardinality = self.options.max_cardinality;
            let model = self
                .models
                .entry(ParamKey::new(&observation.fingerprint, position))
                .or_insert_with(|| {
                    ParameterValueDistribution::new(
                        &observation.fingerprint,
                        name.clone(),
                        max_cardinality,
                    )
                });
            model.record(&value);
        }
    }

    /// Record a trace, redacting it first
    pub fn observe_trace(&mut self, trace: &SqlTrace) {
        let redacted = redact(&trace.query);
        let observation = Observation {
            fingerprint: sha256_hex(&redacted.text),
            redacted,
        };
        self.observe(trace, &observation);
    }

    /// Fit every model and return the result
    pub fn finish(self) -> ParameterModels {
        let top_k = self.options.top_k;
        let mut models = self.models;
        for model in models.values_mut() {
            model.fit(top_k);
            if model.dropped > 0 {
                tracing::debug!(
                    parameter = %model.name,
                    dropped = model.dropped,
                    max_cardinality = model.max_cardinality,
                    "Cardinality bound reached, new values dropped"
                );
            }
        }
        if self.missing_values > 0 {
            tracing::debug!(
                count = self.missing_values,
                "Bound placeholders without a recorded value"
            );
        }
        ParameterModels { models }
    }
}

/// Analyze a trace set against its extracted templates
pub fn analyze(
    traces: &[SqlTrace],
    templates: &[SqlTemplate],
    options: AnalyzerOptions,
) -> ParameterModels {
    let known: std::collections::HashSet<&str> =
        templates.iter().map(|t| t.fingerprint.as_str()).collect();
    let mut analyzer = ParameterAnalyzer::new(options);
    for trace in traces {
        let redacted = redact(&trace.query);
        let fingerprint = sha256_hex(&redacted.text);
        if !known.contains(fingerprint.as_str()) {
            continue;
        }
        analyzer.observe(
            trace,
            &Observation {
                fingerprint,
                redacted,
            },
        );
    }
    analyzer.finish()
}

fn binding_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}
