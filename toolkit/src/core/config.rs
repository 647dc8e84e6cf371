use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::params::AnalyzerOptions;
use crate::domain::schema::{OverflowStrategy, PrecisionPolicy, SourceDialect, TargetDialect};
use crate::domain::validation::ValidationOptions;
use crate::domain::workload::{ExecutionConfig, GenerationOptions};
use crate::utils::file::expand_path;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_CONCURRENCY, DEFAULT_HOTSPOT_MIN_SHARE,
    DEFAULT_HOTSPOT_PROBABILITY, DEFAULT_MAX_CARDINALITY, DEFAULT_METRICS_HOST,
    DEFAULT_METRICS_PORT, DEFAULT_MIN_PASS_RATE, DEFAULT_OUTPUT_DIR, DEFAULT_P_VALUE_THRESHOLD,
    DEFAULT_QPS, DEFAULT_QUERIES_PER_TEMPLATE, DEFAULT_SEED, DEFAULT_SLOW_QUERY_THRESHOLD_MS,
    DEFAULT_TOLERANCE, DEFAULT_TOP_K, DEFAULT_TRACE_BUFFER_SIZE,
};

// =============================================================================
// File Config Structs (JSON deserialization)
// =============================================================================

#[derive(Debug, Default, Clone, Deserialize)]
pub struct TraceFileConfig {
    pub buffer_size: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct AnalysisFileConfig {
    pub max_cardinality: Option<usize>,
    pub top_k: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct GenerationFileConfig {
    pub queries_per_template: Option<usize>,
    pub total_queries: Option<usize>,
    pub seed: Option<u64>,
    pub hotspot_probability: Option<f64>,
    pub inject_hotspots: Option<bool>,
    pub hotspot_min_share: Option<f64>,
    pub shuffle: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct BenchmarkFileConfig {
    pub qps: Option<u32>,
    pub concurrency: Option<usize>,
    pub duration_secs: Option<u64>,
    pub warmup_secs: Option<u64>,
    pub slow_query_threshold_ms: Option<u64>,
    pub plugin: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct SchemaFileConfig {
    pub source: Option<SourceDialect>,
    pub target: Option<TargetDialect>,
    pub rules_path: Option<String>,
    pub watch_rules: Option<bool>,
    pub prefer_float64: Option<bool>,
    pub overflow_strategy: Option<OverflowStrategy>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ValidationFileConfig {
    pub threshold: Option<f64>,
    pub tolerance: Option<f64>,
    pub min_pass_rate: Option<f64>,
    pub baseline: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct OutputFileConfig {
    pub dir: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct MetricsFileConfig {
    pub enabled: Option<bool>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// One adapter plugin: argv plus extra environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginConfig {
    pub command: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub trace: Option<TraceFileConfig>,
    pub analysis: Option<AnalysisFileConfig>,
    pub generation: Option<GenerationFileConfig>,
    pub benchmark: Option<BenchmarkFileConfig>,
    pub schema: Option<SchemaFileConfig>,
    pub validation: Option<ValidationFileConfig>,
    pub plugins: Option<BTreeMap<String, PluginConfig>>,
    pub output: Option<OutputFileConfig>,
    pub metrics: Option<MetricsFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

/// Overwrite `$dst.$field` when `$src.$field` is set
macro_rules! merge_fields {
    ($section:literal, $dst:expr, $src:expr, [$($field:ident),+ $(,)?]) => {
        $(
            if $src.$field.is_some() {
                tracing::trace!(
                    value = ?$src.$field,
                    "Merging {}.{}", $section, stringify!($field)
                );
                $dst.$field = $src.$field;
            }
        )+
    };
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(trace) = other.trace {
            let current = self.trace.get_or_insert_with(TraceFileConfig::default);
            merge_fields!("trace", current, trace, [buffer_size]);
        }

        if let Some(analysis) = other.analysis {
            let current = self.analysis.get_or_insert_with(AnalysisFileConfig::default);
            merge_fields!("analysis", current, analysis, [max_cardinality, top_k]);
        }

        if let Some(generation) = other.generation {
            let current = self
                .generation
                .get_or_insert_with(GenerationFileConfig::default);
            merge_fields!(
                "generation",
                current,
                generation,
                [
                    queries_per_template,
                    total_queries,
                    seed,
                    hotspot_probability,
                    inject_hotspots,
                    hotspot_min_share,
                    shuffle,
                ]
            );
        }

        if let Some(benchmark) = other.benchmark {
            let current = self
                .benchmark
                .get_or_insert_with(BenchmarkFileConfig::default);
            merge_fields!(
                "benchmark",
                current,
                benchmark,
                [
                    qps,
                    concurrency,
                    duration_secs,
                    warmup_secs,
                    slow_query_threshold_ms,
                    plugin,
                ]
            );
        }

        if let Some(schema) = other.schema {
            let current = self.schema.get_or_insert_with(SchemaFileConfig::default);
            merge_fields!(
                "schema",
                current,
                schema,
                [
                    source,
                    target,
                    rules_path,
                    watch_rules,
                    prefer_float64,
                    overflow_strategy,
                ]
            );
        }

        if let Some(validation) = other.validation {
            let current = self
                .validation
                .get_or_insert_with(ValidationFileConfig::default);
            merge_fields!(
                "validation",
                current,
                validation,
                [threshold, tolerance, min_pass_rate, baseline]
            );
        }

        // Plugins merge per name; a later file replaces a whole entry
        if let Some(plugins) = other.plugins {
            let current = self.plugins.get_or_insert_with(BTreeMap::new);
            for (name, plugin) in plugins {
                tracing::trace!(plugin = %name, "Merging plugins entry");
                current.insert(name, plugin);
            }
        }

        if let Some(output) = other.output {
            let current = self.output.get_or_insert_with(OutputFileConfig::default);
            merge_fields!("output", current, output, [dir]);
        }

        if let Some(metrics) = other.metrics {
            let current = self.metrics.get_or_insert_with(MetricsFileConfig::default);
            merge_fields!("metrics", current, metrics, [enabled, host, port]);
        }
    }
}

// =============================================================================
// Resolved Config Structs
// =============================================================================

#[derive(Debug, Clone)]
pub struct TraceConfig {
    pub buffer_size: usize,
}

#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    pub qps: u32,
    pub concurrency: usize,
    pub duration: Option<Duration>,
    pub warmup: Duration,
    pub slow_query_threshold: Duration,
    pub plugin: Option<String>,
}

impl BenchmarkConfig {
    /// Pacing attached to generated workloads
    pub fn execution(&self) -> ExecutionConfig {
        ExecutionConfig {
            qps: self.qps,
            concurrency: self.concurrency,
            duration: self.duration,
            warmup: self.warmup,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchemaConfig {
    pub source: SourceDialect,
    pub target: TargetDialect,
    pub rules_path: Option<PathBuf>,
    pub watch_rules: bool,
    pub precision: PrecisionPolicy,
}

#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub options: ValidationOptions,
    pub baseline: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub trace: TraceConfig,
    pub analysis: AnalyzerOptions,
    pub generation: GenerationOptions,
    pub benchmark: BenchmarkConfig,
    pub schema: SchemaConfig,
    pub validation: ValidationConfig,
    pub plugins: BTreeMap<String, PluginConfig>,
    pub output_dir: PathBuf,
    pub metrics: MetricsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::resolve(FileConfig::default(), &CliConfig::default())
    }
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.sqltracebench/sqltracebench.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include `SQLTRACEBENCH_*` env fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        let config = Self::resolve(file_config, cli);
        config.validate()?;
        Ok(config)
    }

    /// Layer defaults, file values and CLI/env overrides
    fn resolve(file_config: FileConfig, cli: &CliConfig) -> Self {
        let file_trace = file_config.trace.unwrap_or_default();
        let file_analysis = file_config.analysis.unwrap_or_default();
        let file_generation = file_config.generation.unwrap_or_default();
        let file_benchmark = file_config.benchmark.unwrap_or_default();
        let file_schema = file_config.schema.unwrap_or_default();
        let file_validation = file_config.validation.unwrap_or_default();
        let file_output = file_config.output.unwrap_or_default();
        let file_metrics = file_config.metrics.unwrap_or_default();

        let trace = TraceConfig {
            buffer_size: file_trace.buffer_size.unwrap_or(DEFAULT_TRACE_BUFFER_SIZE),
        };

        let analysis = AnalyzerOptions {
            max_cardinality: cli
                .max_cardinality
                .or(file_analysis.max_cardinality)
                .unwrap_or(DEFAULT_MAX_CARDINALITY),
            top_k: file_analysis.top_k.unwrap_or(DEFAULT_TOP_K),
        };

        // inject_hotspots: the CLI flag can only switch it on
        let generation = GenerationOptions {
            queries_per_template: cli
                .queries_per_template
                .or(file_generation.queries_per_template)
                .unwrap_or(DEFAULT_QUERIES_PER_TEMPLATE),
            total_queries: cli.total_queries.or(file_generation.total_queries),
            seed: cli.seed.or(file_generation.seed).unwrap_or(DEFAULT_SEED),
            hotspot_probability: file_generation
                .hotspot_probability
                .unwrap_or(DEFAULT_HOTSPOT_PROBABILITY),
            inject_hotspots: cli.inject_hotspots
                || file_generation.inject_hotspots.unwrap_or(false),
            hotspot_min_share: file_generation
                .hotspot_min_share
                .unwrap_or(DEFAULT_HOTSPOT_MIN_SHARE),
            shuffle: file_generation.shuffle.unwrap_or(true),
        };

        let benchmark = BenchmarkConfig {
            qps: cli.qps.or(file_benchmark.qps).unwrap_or(DEFAULT_QPS),
            concurrency: cli
                .concurrency
                .or(file_benchmark.concurrency)
                .unwrap_or(DEFAULT_CONCURRENCY),
            duration: cli
                .duration_secs
                .or(file_benchmark.duration_secs)
                .map(Duration::from_secs),
            warmup: Duration::from_secs(
                cli.warmup_secs.or(file_benchmark.warmup_secs).unwrap_or(0),
            ),
            slow_query_threshold: Duration::from_millis(
                cli.slow_query_threshold_ms
                    .or(file_benchmark.slow_query_threshold_ms)
                    .unwrap_or(DEFAULT_SLOW_QUERY_THRESHOLD_MS),
            ),
            plugin: cli.plugin.clone().or(file_benchmark.plugin),
        };

        let schema = SchemaConfig {
            source: cli
                .source
                .or(file_schema.source)
                .unwrap_or(SourceDialect::MySql),
            target: cli
                .target
                .or(file_schema.target)
                .unwrap_or(TargetDialect::ClickHouse),
            rules_path: cli
                .rules
                .clone()
                .or_else(|| file_schema.rules_path.map(|p| expand_path(&p))),
            watch_rules: file_schema.watch_rules.unwrap_or(true),
            precision: PrecisionPolicy {
                prefer_float64: file_schema.prefer_float64.unwrap_or(false),
                overflow_strategy: file_schema.overflow_strategy.unwrap_or_default(),
            },
        };

        let validation = ValidationConfig {
            options: ValidationOptions {
                threshold: cli
                    .threshold
                    .or(file_validation.threshold)
                    .unwrap_or(DEFAULT_P_VALUE_THRESHOLD),
                tolerance: cli
                    .tolerance
                    .or(file_validation.tolerance)
                    .unwrap_or(DEFAULT_TOLERANCE),
                min_pass_rate: file_validation
                    .min_pass_rate
                    .unwrap_or(DEFAULT_MIN_PASS_RATE),
            },
            baseline: cli
                .baseline
                .clone()
                .or_else(|| file_validation.baseline.map(|p| expand_path(&p))),
        };

        let output_dir = cli.output.clone().unwrap_or_else(|| {
            expand_path(file_output.dir.as_deref().unwrap_or(DEFAULT_OUTPUT_DIR))
        });

        let metrics = MetricsConfig {
            enabled: cli.metrics.or(file_metrics.enabled).unwrap_or(false),
            host: file_metrics
                .host
                .unwrap_or_else(|| DEFAULT_METRICS_HOST.to_string()),
            port: cli
                .metrics_port
                .or(file_metrics.port)
                .unwrap_or(DEFAULT_METRICS_PORT),
        };

        Self {
            trace,
            analysis,
            generation,
            benchmark,
            schema,
            validation,
            plugins: file_config.plugins.unwrap_or_default(),
            output_dir,
            metrics,
        }
    }

    /// Reject values no phase can run with
    pub fn validate(&self) -> Result<()> {
        if self.benchmark.qps == 0 {
            anyhow::bail!("Configuration error: benchmark.qps must be greater than 0");
        }
        if self.benchmark.concurrency == 0 {
            anyhow::bail!("Configuration error: benchmark.concurrency must be greater than 0");
        }
        if self.analysis.max_cardinality == 0 {
            anyhow::bail!("Configuration error: analysis.max_cardinality must be greater than 0");
        }
        if self.trace.buffer_size == 0 {
            anyhow::bail!("Configuration error: trace.buffer_size must be greater than 0");
        }

        let threshold = self.validation.options.threshold;
        if !(threshold > 0.0 && threshold < 1.0) {
            anyhow::bail!(
                "Configuration error: validation.threshold must be between 0 and 1 (got {})",
                threshold
            );
        }
        if self.validation.options.tolerance < 0.0 {
            anyhow::bail!("Configuration error: validation.tolerance must not be negative");
        }
        if !(0.0..=1.0).contains(&self.validation.options.min_pass_rate) {
            anyhow::bail!("Configuration error: validation.min_pass_rate must be within [0, 1]");
        }

        for (name, value) in [
            ("hotspot_probability", self.generation.hotspot_probability),
            ("hotspot_min_share", self.generation.hotspot_min_share),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!(
                    "Configuration error: generation.{} must be within [0, 1] (got {})",
                    name,
                    value
                );
            }
        }

        for (name, plugin) in &self.plugins {
            if plugin.command.first().is_none_or(|p| p.trim().is_empty()) {
                anyhow::bail!(
                    "Configuration error: plugins.{}.command must not be empty",
                    name
                );
            }
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            anyhow::bail!("Configuration error: metrics.port must be greater than 0");
        }

        Ok(())
    }
}

/// Get the profile config path (~/.sqltracebench/sqltracebench.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}
