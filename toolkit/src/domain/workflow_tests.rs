use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use sqltracebench_plugin::{Adapter, AdapterError, ArgValue, Capabilities, ExecuteOutcome, serve};
use tokio::io::duplex;

use super::*;
use crate::core::error::ErrorKind;
use crate::domain::schema::TargetDialect;

struct RecordingAdapter;

#[async_trait]
impl Adapter for RecordingAdapter {
    fn name(&self) -> &str {
        "clickhouse"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    async fn convert_schema(&self, schema_json: &str) -> Result<String, AdapterError> {
        let tables: serde_json::Value = serde_json::from_str(schema_json)
            .map_err(|e| AdapterError::InvalidRequest(e.to_string()))?;
        let count = tables.as_array().map(Vec::len).unwrap_or(0);
        Ok(format!("-- {} tables", count))
    }

    async fn execute_query(
        &self,
        _sql: &str,
        _args: &[ArgValue],
    ) -> Result<ExecuteOutcome, AdapterError> {
        Ok(ExecuteOutcome {
            duration_ns: 1_000,
            rows: Some(1),
        })
    }
}

async fn registry_with_adapter() -> Arc<PluginRegistry> {
    Arc::new(connected_registry().await)
}

async fn connected_registry() -> PluginRegistry {
    let (host, child) = duplex(64 * 1024);
    let (child_read, child_write) = tokio::io::split(child);
    tokio::spawn(async move {
        let _ = serve(Arc::new(RecordingAdapter), child_read, child_write).await;
    });
    let (host_read, host_write) = tokio::io::split(host);
    let client = PluginClient::connect("test", host_read, host_write, Duration::from_secs(5))
        .await
        .unwrap();
    let mut registry = PluginRegistry::new();
    registry.register(client, None).await.unwrap();
    registry
}

fn config(out: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.output_dir = out.to_path_buf();
    config.benchmark.qps = 10_000;
    config.benchmark.concurrency = 4;
    config.generation.queries_per_template = 20;
    config
}

fn workflow(config: AppConfig, plugins: Arc<PluginRegistry>) -> Workflow {
    Workflow::new(
        config,
        Arc::new(RuleStore::with_defaults()),
        plugins,
        CancellationToken::new(),
    )
}

const TRACES: &str = r#"{"query": "select * from users where id = 1", "timestamp": "2024-05-01T00:00:00Z"}
{"query": "SELECT * FROM users WHERE id = 2 ", "timestamp": "2024-05-01T00:00:01Z"}
not json
{"query": "select * from users where id = 1", "timestamp": "2024-05-01T00:00:02Z"}
{"query": "select * from orders", "timestamp": "2024-05-01T00:00:03Z"}
"#;

const SCHEMA: &str = "CREATE TABLE users (id INT PRIMARY KEY, name VARCHAR(100));";

fn write_inputs(dir: &Path) -> (PathBuf, PathBuf) {
    let traces = dir.join("traces.jsonl");
    let schema = dir.join("schema.sql");
    std::fs::write(&traces, TRACES).unwrap();
    std::fs::write(&schema, SCHEMA).unwrap();
    (traces, schema)
}

#[tokio::test]
async fn test_convert_persists_traces_templates_and_schema() {
    let dir = tempfile::tempdir().unwrap();
    let (traces, schema) = write_inputs(dir.path());
    let wf = workflow(config(&dir.path().join("out")), Arc::new(PluginRegistry::new()));

    let outcome = wf.convert(&traces, Some(&schema)).await.unwrap();
    assert_eq!(outcome.stats.parsed, 4);
    assert_eq!(outcome.stats.malformed, 1);
    assert_eq!(outcome.templates.len(), 2);

    let layout = wf.layout();
    let saved = std::fs::read_to_string(layout.traces()).unwrap();
    assert_eq!(saved.lines().count(), 4);
    assert!(layout.templates().exists());
    let ddl = std::fs::read_to_string(layout.schema()).unwrap();
    assert!(ddl.contains("ENGINE = MergeTree()"));
    assert_eq!(outcome.schema.unwrap().tables.len(), 1);
}

#[tokio::test]
async fn test_generate_reads_saved_traces() {
    let dir = tempfile::tempdir().unwrap();
    let (traces, _) = write_inputs(dir.path());
    let wf = workflow(config(&dir.path().join("out")), Arc::new(PluginRegistry::new()));
    wf.convert(&traces, None).await.unwrap();

    let outcome = wf.generate_from_disk(None).await.unwrap();
    assert_eq!(outcome.templates, 2);
    assert_eq!(outcome.workload.len(), 40);
    assert_eq!(outcome.parameters, 1);
    assert_eq!(outcome.fidelity.len(), 1);

    let queries = artifacts::read_workload(&wf.layout().workload()).await.unwrap();
    assert_eq!(queries, outcome.workload.queries);
    assert!(wf.layout().fidelity().exists());
}

#[tokio::test]
async fn test_run_writes_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let (traces, _) = write_inputs(dir.path());
    let wf = workflow(config(&dir.path().join("out")), registry_with_adapter().await);
    wf.convert(&traces, None).await.unwrap();
    wf.generate_from_disk(None).await.unwrap();

    let metrics = wf.run_file(None).await.unwrap();
    assert_eq!(metrics.queries_executed, 40);
    assert_eq!(metrics.errors, 0);
    let saved: PerformanceMetrics = artifacts::read_json(&wf.layout().metrics()).await.unwrap();
    assert_eq!(saved, metrics);
}

#[tokio::test]
async fn test_validate_skipped_without_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let wf = workflow(config(dir.path()), Arc::new(PluginRegistry::new()));
    assert!(wf.validate(None).await.unwrap().is_none());
    assert!(!wf.layout().report().exists());
}

#[tokio::test]
async fn test_validate_against_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let baseline_path = dir.path().join("baseline.json");
    let baseline = PerformanceMetrics {
        queries_executed: 1000,
        duration_ns: 10_000_000_000,
        ..PerformanceMetrics::default()
    };
    artifacts::write_json(&baseline_path, &baseline).await.unwrap();

    let mut cfg = config(&dir.path().join("out"));
    cfg.validation.baseline = Some(baseline_path);
    let wf = workflow(cfg, Arc::new(PluginRegistry::new()));

    let candidate = PerformanceMetrics {
        queries_executed: 900,
        ..baseline.clone()
    };
    artifacts::write_json(&wf.layout().metrics(), &candidate).await.unwrap();

    let report = wf.validate(None).await.unwrap().unwrap();
    assert!(!report.passed);
    assert!(report.summary.contains("10.0% below"));
    let saved: ValidationReport = artifacts::read_json(&wf.layout().report()).await.unwrap();
    assert_eq!(saved.passed, report.passed);
}

#[tokio::test]
async fn test_pipeline_failure_keeps_earlier_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let (traces, schema) = write_inputs(dir.path());
    let wf = workflow(config(&dir.path().join("out")), Arc::new(PluginRegistry::new()));

    let err = wf.run_pipeline(&traces, Some(&schema)).await.unwrap_err();
    assert_eq!(err.phase, Phase::Run);
    assert_eq!(err.source.kind, ErrorKind::PluginNotFound);
    assert!(err.to_string().starts_with("run phase failed"));

    assert!(wf.layout().traces().exists());
    assert!(wf.layout().schema().exists());
    assert!(wf.layout().workload().exists());
    assert!(!wf.layout().metrics().exists());
}

#[tokio::test]
async fn test_pipeline_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let (traces, _) = write_inputs(dir.path());
    let wf = workflow(config(&dir.path().join("out")), registry_with_adapter().await);

    let outcome = wf.run_pipeline(&traces, None).await.unwrap();
    assert_eq!(outcome.convert.templates.len(), 2);
    assert_eq!(outcome.metrics.queries_executed, 40);
    assert!(outcome.report.is_none());
    assert!(wf.layout().metrics().exists());
}

#[tokio::test]
async fn test_missing_trace_file_fails_convert() {
    let dir = tempfile::tempdir().unwrap();
    let wf = workflow(config(dir.path()), Arc::new(PluginRegistry::new()));
    let err = wf
        .run_pipeline(&dir.path().join("missing.jsonl"), None)
        .await
        .unwrap_err();
    assert_eq!(err.phase, Phase::Convert);
    assert_eq!(err.source.kind, ErrorKind::Io);
}

#[tokio::test]
async fn test_schema_commands() {
    let dir = tempfile::tempdir().unwrap();
    let (_, schema) = write_inputs(dir.path());
    let wf = workflow(config(dir.path()), registry_with_adapter().await);

    let dumped = wf.schema_dump(&schema).await.unwrap();
    assert!(dumped.ddl.contains("`id` Int32") || dumped.ddl.contains("id Int32"));

    assert_eq!(wf.schema_load(&schema).await.unwrap(), "-- 1 tables");
}

#[tokio::test]
async fn test_single_aliased_plugin_is_default_executor() {
    let dir = tempfile::tempdir().unwrap();
    let (traces, _) = write_inputs(dir.path());
    let mut registry = connected_registry().await;
    registry.alias("my_adapter", "clickhouse");

    let mut cfg = config(&dir.path().join("out"));
    cfg.schema.target = TargetDialect::StarRocks;
    let wf = workflow(cfg, Arc::new(registry));
    wf.convert(&traces, None).await.unwrap();
    wf.generate_from_disk(None).await.unwrap();

    let metrics = wf.run_file(None).await.unwrap();
    assert_eq!(metrics.queries_executed, 40);
}
