//! Workload synthesis
//!
//! Turns templates and their parameter models into a concrete query stream.
//! Sampled values travel as positional args next to the `?`-form SQL and are
//! never spliced into the query text.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::core::constants::{
    DEFAULT_CONCURRENCY, DEFAULT_HOTSPOT_MIN_SHARE, DEFAULT_HOTSPOT_PROBABILITY, DEFAULT_QPS,
    DEFAULT_QUERIES_PER_TEMPLATE, DEFAULT_SEED,
};
use crate::core::error::BenchResult;
use crate::domain::params::{
    DistributionKind, ParamKey, ParamType, ParameterModels, ParameterValueDistribution,
};
use crate::domain::sampling::Sampler;
use crate::domain::traces::SqlTemplate;

// =============================================================================
// Types
// =============================================================================

/// One workload line: `{"query": "...", "args": [...]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadQuery {
    pub query: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

/// Pacing attached to a workload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionConfig {
    pub qps: u32,
    pub concurrency: usize,
    /// When set, the workload is cycled until the duration elapses
    pub duration: Option<Duration>,
    /// Leading period whose queries are executed but not recorded
    pub warmup: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            qps: DEFAULT_QPS,
            concurrency: DEFAULT_CONCURRENCY,
            duration: None,
            warmup: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BenchmarkWorkload {
    pub queries: Vec<WorkloadQuery>,
    pub config: ExecutionConfig,
}

impl BenchmarkWorkload {
    pub fn new(queries: Vec<WorkloadQuery>, config: ExecutionConfig) -> Self {
        Self { queries, config }
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GenerationOptions {
    pub queries_per_template: usize,
    /// Overrides `queries_per_template`: split this many queries across
    /// templates by observed frequency
    pub total_queries: Option<usize>,
    pub seed: u64,
    pub hotspot_probability: f64,
    pub inject_hotspots: bool,
    pub hotspot_min_share: f64,
    pub shuffle: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            queries_per_template: DEFAULT_QUERIES_PER_TEMPLATE,
            total_queries: None,
            seed: DEFAULT_SEED,
            hotspot_probability: DEFAULT_HOTSPOT_PROBABILITY,
            inject_hotspots: false,
            hotspot_min_share: DEFAULT_HOTSPOT_MIN_SHARE,
            shuffle: true,
        }
    }
}

/// Generated workload plus the raw values drawn per parameter
#[derive(Debug, Clone)]
pub struct GeneratedWorkload {
    pub workload: BenchmarkWorkload,
    pub samples: BTreeMap<ParamKey, Vec<String>>,
}

// =============================================================================
// Generation
// =============================================================================

/// Generate a workload from templates and their fitted models
pub fn generate_workload(
    templates: &[SqlTemplate],
    models: &ParameterModels,
    options: &GenerationOptions,
    config: ExecutionConfig,
) -> BenchResult<GeneratedWorkload> {
    let counts = allocate(templates, options);
    let mut queries = Vec::with_capacity(counts.iter().sum());
    let mut samples: BTreeMap<ParamKey, Vec<String>> = BTreeMap::new();
    let mut stream = 0u64;

    for (template, &n) in templates.iter().zip(&counts) {
        if n == 0 {
            continue;
        }

        // One sampler per placeholder, each on its own RNG stream
        let mut slots: Vec<Option<(&ParameterValueDistribution, Sampler)>> = Vec::new();
        for (position, name) in template.placeholders.iter().enumerate() {
            stream += 1;
            match models.get(&template.fingerprint, position) {
                Some(dist) if !dist.is_empty() => {
                    let seed = options.seed.wrapping_add(stream);
                    slots.push(Some((dist, select_sampler(dist, options, seed))));
                }
                _ => {
                    tracing::warn!(
                        template = %template.text,
                        parameter = %name,
                        "No values observed for parameter, emitting NULL"
                    );
                    slots.push(None);
                }
            }
        }

        for _ in 0..n {
            let mut args = Vec::with_capacity(slots.len());
            for (position, slot) in slots.iter_mut().enumerate() {
                match slot {
                    Some((dist, sampler)) => {
                        let value = sampler.sample(*dist)?;
                        args.push(typed_arg(value, dist.param_type));
                        samples
                            .entry(ParamKey::new(&template.fingerprint, position))
                            .or_default()
                            .push(value.to_string());
                    }
                    None => args.push(serde_json::Value::Null),
                }
            }
            queries.push(WorkloadQuery {
                query: template.sql.clone(),
                args,
            });
        }
    }

    if options.shuffle {
        let mut rng = StdRng::seed_from_u64(options.seed);
        queries.shuffle(&mut rng);
    }

    tracing::info!(
        templates = templates.len(),
        queries = queries.len(),
        "Workload generated"
    );

    Ok(GeneratedWorkload {
        workload: BenchmarkWorkload::new(queries, config),
        samples,
    })
}

fn select_sampler(dist: &ParameterValueDistribution, options: &GenerationOptions, seed: u64) -> Sampler {
    match dist.distribution {
        DistributionKind::Zipfian if options.inject_hotspots => Sampler::hotspot(
            dist.hotspots(options.hotspot_min_share),
            options.hotspot_probability,
            seed,
        ),
        DistributionKind::Zipfian => Sampler::zipf(seed),
        DistributionKind::Uniform | DistributionKind::Empirical => Sampler::weighted(seed),
    }
}

/// Instances per template, in template order
fn allocate(templates: &[SqlTemplate], options: &GenerationOptions) -> Vec<usize> {
    let Some(total) = options.total_queries else {
        return vec![options.queries_per_template; templates.len()];
    };

    let weight: u64 = templates.iter().map(|t| t.frequency).sum();
    if weight == 0 {
        return vec![0; templates.len()];
    }

    // Largest remainder; ties go to the earlier template
    let mut counts = Vec::with_capacity(templates.len());
    let mut remainders = Vec::with_capacity(templates.len());
    for (i, t) in templates.iter().enumerate() {
        let exact = total as f64 * t.frequency as f64 / weight as f64;
        counts.push(exact.floor() as usize);
        remainders.push((exact - exact.floor(), i));
    }
    let assigned: usize = counts.iter().sum();
    remainders.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
    for (_, i) in remainders.into_iter().take(total.saturating_sub(assigned)) {
        counts[i] += 1;
    }
    counts
}

fn typed_arg(value: &str, param_type: ParamType) -> serde_json::Value {
    let trimmed = value.trim();
    let typed = match param_type {
        ParamType::Int => trimmed.parse::<i64>().ok().map(serde_json::Value::from),
        ParamType::Float => trimmed
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number),
        ParamType::Bool => match trimmed.to_ascii_lowercase().as_str() {
            "true" => Some(serde_json::Value::Bool(true)),
            "false" => Some(serde_json::Value::Bool(false)),
            _ => None,
        },
        ParamType::String | ParamType::Datetime => None,
    };
    typed.unwrap_or_else(|| serde_json::Value::String(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::params::{AnalyzerOptions, analyze};
    use crate::domain::schema::SourceDialect;
    use crate::domain::traces::{SqlTrace, extract_templates};
    use chrono::Utc;

    fn traces(queries: &[&str]) -> Vec<SqlTrace> {
        queries.iter().map(|q| SqlTrace::new(*q, Utc::now())).collect()
    }

    fn build(traces: &[SqlTrace], options: GenerationOptions) -> GeneratedWorkload {
        let templates = extract_templates(traces, SourceDialect::MySql);
        let models = analyze(traces, &templates, AnalyzerOptions::default());
        generate_workload(&templates, &models, &options, ExecutionConfig::default()).unwrap()
    }

    #[test]
    fn test_values_become_positional_args() {
        let t = traces(&[
            "SELECT * FROM users WHERE id = 7 AND name = 'bob'",
            "SELECT * FROM users WHERE id = 7 AND name = 'bob'",
        ]);
        let generated = build(
            &t,
            GenerationOptions {
                queries_per_template: 5,
                ..Default::default()
            },
        );
        let queries = &generated.workload.queries;
        assert_eq!(queries.len(), 5);
        for q in queries {
            assert_eq!(q.query, "SELECT * FROM users WHERE id = ? AND name = ?");
            assert_eq!(q.args, vec![serde_json::json!(7), serde_json::json!("bob")]);
        }
    }

    #[test]
    fn test_templates_without_parameters_repeat() {
        let t = traces(&["select * from orders"]);
        let generated = build(
            &t,
            GenerationOptions {
                queries_per_template: 3,
                ..Default::default()
            },
        );
        assert_eq!(generated.workload.len(), 3);
        assert!(generated.workload.queries.iter().all(|q| q.args.is_empty()));
        assert!(generated.samples.is_empty());
    }

    #[test]
    fn test_missing_model_emits_null() {
        let t = traces(&["select * from t where u = :uid"]);
        let generated = build(
            &t,
            GenerationOptions {
                queries_per_template: 2,
                ..Default::default()
            },
        );
        assert_eq!(generated.workload.queries[0].args, vec![serde_json::Value::Null]);
    }

    #[test]
    fn test_total_queries_follow_frequency() {
        let mut qs = vec!["select a from x where id = 1"; 3];
        qs.push("select b from y where id = 2");
        let t = traces(&qs);
        let templates = extract_templates(&t, SourceDialect::MySql);
        let counts = allocate(
            &templates,
            &GenerationOptions {
                total_queries: Some(10),
                ..Default::default()
            },
        );
        // 7.5 / 2.5: the earlier template wins the tie on remainder
        assert_eq!(counts, vec![8, 2]);
        assert_eq!(counts.iter().sum::<usize>(), 10);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let qs: Vec<String> = (0..40)
            .map(|i| format!("select * from t where k = {}", (i * i) % 9))
            .collect();
        let refs: Vec<&str> = qs.iter().map(String::as_str).collect();
        let t = traces(&refs);
        let a = build(&t, GenerationOptions::default());
        let b = build(&t, GenerationOptions::default());
        assert_eq!(a.workload.queries, b.workload.queries);
    }

    #[test]
    fn test_samples_recorded_per_parameter() {
        let t = traces(&["select * from t where k = 1", "select * from t where k = 2"]);
        let generated = build(
            &t,
            GenerationOptions {
                queries_per_template: 50,
                ..Default::default()
            },
        );
        assert_eq!(generated.samples.len(), 1);
        let (_, values) = generated.samples.iter().next().unwrap();
        assert_eq!(values.len(), 50);
        assert!(values.iter().all(|v| v == "1" || v == "2"));
    }

    #[test]
    fn test_typed_arg() {
        assert_eq!(typed_arg("42", ParamType::Int), serde_json::json!(42));
        assert_eq!(typed_arg("1.5", ParamType::Float), serde_json::json!(1.5));
        assert_eq!(typed_arg("TRUE", ParamType::Bool), serde_json::json!(true));
        assert_eq!(
            typed_arg("2024-01-01", ParamType::Datetime),
            serde_json::json!("2024-01-01")
        );
        // Widened parameters keep their text form
        assert_eq!(typed_arg("abc", ParamType::Int), serde_json::json!("abc"));
    }
}
