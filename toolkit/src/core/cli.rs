use clap::{Parser, Subcommand, ValueEnum};

use std::path::PathBuf;

use super::constants::{
    ENV_ANALYSIS_MAX_CARDINALITY, ENV_BENCHMARK_CONCURRENCY, ENV_BENCHMARK_DURATION_SECS,
    ENV_BENCHMARK_PLUGIN, ENV_BENCHMARK_QPS, ENV_BENCHMARK_SLOW_QUERY_THRESHOLD_MS,
    ENV_BENCHMARK_WARMUP_SECS, ENV_CONFIG, ENV_GENERATION_QUERIES_PER_TEMPLATE,
    ENV_GENERATION_SEED, ENV_GENERATION_TOTAL_QUERIES, ENV_METRICS_ENABLED, ENV_METRICS_PORT,
    ENV_OUTPUT_DIR, ENV_SCHEMA_RULES_PATH, ENV_SCHEMA_SOURCE, ENV_SCHEMA_TARGET,
    ENV_VALIDATION_BASELINE, ENV_VALIDATION_THRESHOLD, ENV_VALIDATION_TOLERANCE,
};
use crate::domain::schema::{SourceDialect, TargetDialect};

#[derive(Parser)]
#[command(name = "sqltracebench")]
#[command(version, about = "Trace-driven SQL workload benchmarking", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Output directory for phase artifacts
    #[arg(long, short = 'o', global = true, env = ENV_OUTPUT_DIR)]
    pub output: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    /// Source database dialect (mysql, postgres, tidb)
    #[arg(long, global = true, env = ENV_SCHEMA_SOURCE, value_parser = parse_source)]
    pub source: Option<SourceDialect>,

    /// Target database dialect (clickhouse, starrocks)
    #[arg(long, global = true, env = ENV_SCHEMA_TARGET, value_parser = parse_target)]
    pub target: Option<TargetDialect>,

    /// YAML mapping rules file
    #[arg(long, global = true, env = ENV_SCHEMA_RULES_PATH)]
    pub rules: Option<PathBuf>,

    /// Distinct values tracked per parameter
    #[arg(long, global = true, env = ENV_ANALYSIS_MAX_CARDINALITY)]
    pub max_cardinality: Option<usize>,

    /// Queries generated per template
    #[arg(long, global = true, env = ENV_GENERATION_QUERIES_PER_TEMPLATE)]
    pub queries_per_template: Option<usize>,

    /// Total queries, split across templates by observed frequency
    #[arg(long, global = true, env = ENV_GENERATION_TOTAL_QUERIES)]
    pub total_queries: Option<usize>,

    /// Seed for every sampler
    #[arg(long, global = true, env = ENV_GENERATION_SEED)]
    pub seed: Option<u64>,

    /// Inject hotspot values into Zipfian parameters
    #[arg(long, global = true)]
    pub inject_hotspots: bool,

    /// Target queries per second
    #[arg(long, global = true, env = ENV_BENCHMARK_QPS)]
    pub qps: Option<u32>,

    /// Maximum in-flight queries
    #[arg(long, global = true, env = ENV_BENCHMARK_CONCURRENCY)]
    pub concurrency: Option<usize>,

    /// Cycle the workload for this many seconds
    #[arg(long, global = true, env = ENV_BENCHMARK_DURATION_SECS)]
    pub duration_secs: Option<u64>,

    /// Leading seconds excluded from the metrics
    #[arg(long, global = true, env = ENV_BENCHMARK_WARMUP_SECS)]
    pub warmup_secs: Option<u64>,

    /// Latency above which a query counts as slow
    #[arg(long, global = true, env = ENV_BENCHMARK_SLOW_QUERY_THRESHOLD_MS)]
    pub slow_query_threshold_ms: Option<u64>,

    /// Adapter plugin to execute against
    #[arg(long, short = 'p', global = true, env = ENV_BENCHMARK_PLUGIN)]
    pub plugin: Option<String>,

    /// Significance threshold for statistical tests
    #[arg(long, global = true, env = ENV_VALIDATION_THRESHOLD)]
    pub threshold: Option<f64>,

    /// Allowed relative regression against the baseline
    #[arg(long, global = true, env = ENV_VALIDATION_TOLERANCE)]
    pub tolerance: Option<f64>,

    /// Baseline metrics file
    #[arg(long, global = true, env = ENV_VALIDATION_BASELINE)]
    pub baseline: Option<PathBuf>,

    /// Serve Prometheus metrics while running
    #[arg(long, global = true, env = ENV_METRICS_ENABLED)]
    pub metrics: Option<bool>,

    /// Prometheus endpoint port
    #[arg(long, global = true, env = ENV_METRICS_PORT)]
    pub metrics_port: Option<u16>,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Parse source dialect from CLI/env string
fn parse_source(s: &str) -> Result<SourceDialect, String> {
    s.parse().map_err(|_| {
        format!(
            "Invalid source dialect '{}'. Valid options: mysql, postgres, tidb",
            s
        )
    })
}

/// Parse target dialect from CLI/env string
fn parse_target(s: &str) -> Result<TargetDialect, String> {
    s.parse().map_err(|_| {
        format!(
            "Invalid target dialect '{}'. Valid options: clickhouse, starrocks",
            s
        )
    })
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Ingest traces and translate the source schema
    Convert {
        /// Trace file (JSONL)
        #[arg(long, short = 't')]
        traces: PathBuf,
        /// Source DDL file
        #[arg(long, short = 's')]
        schema: Option<PathBuf>,
    },
    /// Build a workload from traces
    Generate {
        /// Trace file; defaults to the converted traces in the output directory
        #[arg(long, short = 't')]
        traces: Option<PathBuf>,
    },
    /// Replay a workload through an adapter
    Run(RunArgs),
    /// Compare candidate metrics against a baseline
    Validate {
        /// Candidate metrics; defaults to the last run's metrics
        #[arg(long)]
        candidate: Option<PathBuf>,
    },
    /// Run convert, generate, run and validate in sequence
    RunPipeline {
        #[arg(long, short = 't')]
        traces: PathBuf,
        #[arg(long, short = 's')]
        schema: Option<PathBuf>,
    },
    /// Schema translation without a trace set
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },
    /// Benchmark commands
    Benchmark {
        #[command(subcommand)]
        command: BenchmarkCommands,
    },
}

#[derive(clap::Args, Clone, Debug, Default)]
pub struct RunArgs {
    /// Workload file; defaults to the generated workload in the output directory
    #[arg(long, short = 'w')]
    pub workload: Option<PathBuf>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum SchemaCommands {
    /// Translate a DDL file and print the target DDL
    Dump {
        /// Source DDL file
        schema: PathBuf,
        /// Write here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Send a DDL file's tables to an adapter's schema conversion
    Load {
        /// Source DDL file
        schema: PathBuf,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum BenchmarkCommands {
    /// Same as `run`
    Run(RunArgs),
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub config: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub log_format: LogFormat,
    pub source: Option<SourceDialect>,
    pub target: Option<TargetDialect>,
    pub rules: Option<PathBuf>,
    pub max_cardinality: Option<usize>,
    pub queries_per_template: Option<usize>,
    pub total_queries: Option<usize>,
    pub seed: Option<u64>,
    pub inject_hotspots: bool,
    pub qps: Option<u32>,
    pub concurrency: Option<usize>,
    pub duration_secs: Option<u64>,
    pub warmup_secs: Option<u64>,
    pub slow_query_threshold_ms: Option<u64>,
    pub plugin: Option<String>,
    pub threshold: Option<f64>,
    pub tolerance: Option<f64>,
    pub baseline: Option<PathBuf>,
    pub metrics: Option<bool>,
    pub metrics_port: Option<u16>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Commands) {
    let cli = Cli::parse();
    let config = CliConfig {
        config: cli.config,
        output: cli.output,
        log_format: cli.log_format,
        source: cli.source,
        target: cli.target,
        rules: cli.rules,
        max_cardinality: cli.max_cardinality,
        queries_per_template: cli.queries_per_template,
        total_queries: cli.total_queries,
        seed: cli.seed,
        inject_hotspots: cli.inject_hotspots,
        qps: cli.qps,
        concurrency: cli.concurrency,
        duration_secs: cli.duration_secs,
        warmup_secs: cli.warmup_secs,
        slow_query_threshold_ms: cli.slow_query_threshold_ms,
        plugin: cli.plugin,
        threshold: cli.threshold,
        tolerance: cli.tolerance,
        baseline: cli.baseline,
        metrics: cli.metrics,
        metrics_port: cli.metrics_port,
    };
    (config, cli.command)
}
