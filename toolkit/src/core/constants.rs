// =============================================================================
// Application Identity
// =============================================================================

/// Application name in lowercase (for paths, identifiers and metric prefixes)
pub const APP_NAME_LOWER: &str = "sqltracebench";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".sqltracebench";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "sqltracebench.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "SQLTRACEBENCH_CONFIG";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "SQLTRACEBENCH_LOG";

/// Prefix for `SQLTRACEBENCH_<SECTION>_<KEY>` overrides
pub const ENV_PREFIX: &str = "SQLTRACEBENCH_";

/// Environment variable for the output directory
pub const ENV_OUTPUT_DIR: &str = "SQLTRACEBENCH_OUTPUT_DIR";

// `SQLTRACEBENCH_<SECTION>_<KEY>` overrides, read by clap
pub const ENV_BENCHMARK_QPS: &str = "SQLTRACEBENCH_BENCHMARK_QPS";
pub const ENV_BENCHMARK_CONCURRENCY: &str = "SQLTRACEBENCH_BENCHMARK_CONCURRENCY";
pub const ENV_BENCHMARK_DURATION_SECS: &str = "SQLTRACEBENCH_BENCHMARK_DURATION_SECS";
pub const ENV_BENCHMARK_WARMUP_SECS: &str = "SQLTRACEBENCH_BENCHMARK_WARMUP_SECS";
pub const ENV_BENCHMARK_SLOW_QUERY_THRESHOLD_MS: &str =
    "SQLTRACEBENCH_BENCHMARK_SLOW_QUERY_THRESHOLD_MS";
pub const ENV_BENCHMARK_PLUGIN: &str = "SQLTRACEBENCH_BENCHMARK_PLUGIN";
pub const ENV_SCHEMA_SOURCE: &str = "SQLTRACEBENCH_SCHEMA_SOURCE";
pub const ENV_SCHEMA_TARGET: &str = "SQLTRACEBENCH_SCHEMA_TARGET";
pub const ENV_SCHEMA_RULES_PATH: &str = "SQLTRACEBENCH_SCHEMA_RULES_PATH";
pub const ENV_GENERATION_SEED: &str = "SQLTRACEBENCH_GENERATION_SEED";
pub const ENV_GENERATION_QUERIES_PER_TEMPLATE: &str =
    "SQLTRACEBENCH_GENERATION_QUERIES_PER_TEMPLATE";
pub const ENV_GENERATION_TOTAL_QUERIES: &str = "SQLTRACEBENCH_GENERATION_TOTAL_QUERIES";
pub const ENV_ANALYSIS_MAX_CARDINALITY: &str = "SQLTRACEBENCH_ANALYSIS_MAX_CARDINALITY";
pub const ENV_VALIDATION_THRESHOLD: &str = "SQLTRACEBENCH_VALIDATION_THRESHOLD";
pub const ENV_VALIDATION_TOLERANCE: &str = "SQLTRACEBENCH_VALIDATION_TOLERANCE";
pub const ENV_VALIDATION_BASELINE: &str = "SQLTRACEBENCH_VALIDATION_BASELINE";
pub const ENV_METRICS_ENABLED: &str = "SQLTRACEBENCH_METRICS_ENABLED";
pub const ENV_METRICS_PORT: &str = "SQLTRACEBENCH_METRICS_PORT";

// =============================================================================
// Trace Ingestion
// =============================================================================

/// Default line buffer for the trace scanner (1 MiB)
pub const DEFAULT_TRACE_BUFFER_SIZE: usize = 1024 * 1024;

// =============================================================================
// Parameter Analysis
// =============================================================================

/// Default bound on distinct values tracked per parameter
pub const DEFAULT_MAX_CARDINALITY: usize = 10_000;

/// Default number of ranked values kept for Zipf fitting and sampling
pub const DEFAULT_TOP_K: usize = 100;

/// Hotspot ratio below which a distribution may be tagged uniform
pub const UNIFORM_MAX_HOTSPOT_RATIO: f64 = 0.3;

/// Zipf exponent below which a distribution may be tagged uniform
pub const UNIFORM_MAX_ZIPF_S: f64 = 0.5;

/// Hotspot ratio above which a distribution is tagged Zipfian
pub const ZIPFIAN_MIN_HOTSPOT_RATIO: f64 = 0.4;

/// Zipf exponent above which a distribution is tagged Zipfian
pub const ZIPFIAN_MIN_ZIPF_S: f64 = 0.8;

// =============================================================================
// Workload Generation
// =============================================================================

pub const DEFAULT_QUERIES_PER_TEMPLATE: usize = 100;

pub const DEFAULT_SEED: u64 = 42;

/// Probability that the hotspot sampler returns a hotspot value
pub const DEFAULT_HOTSPOT_PROBABILITY: f64 = 0.3;

/// Minimum share of observations for a value to count as a hotspot
pub const DEFAULT_HOTSPOT_MIN_SHARE: f64 = 0.1;

// =============================================================================
// Benchmark Execution
// =============================================================================

pub const DEFAULT_QPS: u32 = 100;

pub const DEFAULT_CONCURRENCY: usize = 10;

pub const DEFAULT_SLOW_QUERY_THRESHOLD_MS: u64 = 1_000;

/// Finest refill tick used by the rate controller at high QPS
pub const MIN_REFILL_TICK_MICROS: u64 = 1_000;

// =============================================================================
// Schema Translation
// =============================================================================

/// Debounce window for rule file change bursts
pub const RULES_DEBOUNCE_MS: u64 = 100;

/// Poll interval of the rule file watcher
pub const RULES_POLL_INTERVAL_MS: u64 = 250;

/// Broadcast capacity of rule reload notifications
pub const RULES_CHANNEL_CAPACITY: usize = 16;

/// StarRocks bucket count for `DISTRIBUTED BY HASH`
pub const STARROCKS_BUCKETS: u32 = 10;

// =============================================================================
// Validation
// =============================================================================

pub const DEFAULT_P_VALUE_THRESHOLD: f64 = 0.05;

/// Allowed relative regression between baseline and candidate
pub const DEFAULT_TOLERANCE: f64 = 0.05;

pub const DEFAULT_MIN_PASS_RATE: f64 = 1.0;

// =============================================================================
// Output Layout
// =============================================================================

pub const DEFAULT_OUTPUT_DIR: &str = "./sqltracebench-out";

pub const CONVERTED_DIR: &str = "converted";
pub const WORKLOAD_DIR: &str = "workload";
pub const RESULTS_DIR: &str = "results";

pub const TRACES_FILE: &str = "traces.jsonl";
pub const SCHEMA_FILE: &str = "schema.sql";
pub const WORKLOAD_FILE: &str = "benchmark.jsonl";
pub const METRICS_FILE: &str = "metrics.json";
pub const REPORT_FILE: &str = "report.json";
pub const TEMPLATES_FILE: &str = "templates.json";
pub const FIDELITY_FILE: &str = "fidelity.json";

// =============================================================================
// Metrics Endpoint
// =============================================================================

pub const DEFAULT_METRICS_HOST: &str = "127.0.0.1";

pub const DEFAULT_METRICS_PORT: u16 = 9464;

// =============================================================================
// Plugins
// =============================================================================

/// Time allowed for an adapter to print its handshake line
pub const PLUGIN_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// Shutdown
// =============================================================================

/// Maximum time to wait for background tasks during shutdown
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 10;
