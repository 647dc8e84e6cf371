//! Persisted phase artifacts
//!
//! ## Layout
//!
//! ```text
//! {output_dir}/
//! ├── converted/
//! │   ├── traces.jsonl
//! │   ├── templates.json
//! │   └── schema.sql
//! ├── workload/
//! │   └── benchmark.jsonl
//! ├── results/
//! │   └── metrics.json
//! ├── fidelity.json
//! └── report.json
//! ```
//!
//! Every write goes through a temp file and a rename, so a failed phase
//! never leaves a torn artifact next to the intact ones before it.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::core::constants::{
    CONVERTED_DIR, FIDELITY_FILE, METRICS_FILE, REPORT_FILE, RESULTS_DIR, SCHEMA_FILE,
    TEMPLATES_FILE, TRACES_FILE, WORKLOAD_DIR, WORKLOAD_FILE,
};
use crate::core::error::{BenchError, BenchResult};
use crate::domain::traces::{SqlTrace, TraceParser};
use crate::domain::workload::WorkloadQuery;
use crate::utils::file::write_atomic;

const COMPONENT: &str = "artifacts";

/// Artifact subdirectories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactDir {
    Converted,
    Workload,
    Results,
}

impl ArtifactDir {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ArtifactDir::Converted => CONVERTED_DIR,
            ArtifactDir::Workload => WORKLOAD_DIR,
            ArtifactDir::Results => RESULTS_DIR,
        }
    }
}

/// Deterministic artifact paths under one output directory
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, dir: ArtifactDir) -> PathBuf {
        self.root.join(dir.as_str())
    }

    pub fn traces(&self) -> PathBuf {
        self.dir(ArtifactDir::Converted).join(TRACES_FILE)
    }

    pub fn templates(&self) -> PathBuf {
        self.dir(ArtifactDir::Converted).join(TEMPLATES_FILE)
    }

    pub fn schema(&self) -> PathBuf {
        self.dir(ArtifactDir::Converted).join(SCHEMA_FILE)
    }

    pub fn workload(&self) -> PathBuf {
        self.dir(ArtifactDir::Workload).join(WORKLOAD_FILE)
    }

    pub fn metrics(&self) -> PathBuf {
        self.dir(ArtifactDir::Results).join(METRICS_FILE)
    }

    pub fn fidelity(&self) -> PathBuf {
        self.root.join(FIDELITY_FILE)
    }

    pub fn report(&self) -> PathBuf {
        self.root.join(REPORT_FILE)
    }
}

// =============================================================================
// JSONL
// =============================================================================

/// Write one JSON document per line
pub async fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> BenchResult<()> {
    let mut out = Vec::with_capacity(items.len() * 128);
    for item in items {
        serde_json::to_writer(&mut out, item).map_err(|e| {
            BenchError::report_generation(COMPONENT, format!("failed to encode {}", path.display()))
                .with_source(e)
        })?;
        out.push(b'\n');
    }
    write_bytes(path, &out).await
}

/// Canonical trace lines, readable again by [`read_traces`]
pub async fn write_traces(path: &Path, traces: &[SqlTrace]) -> BenchResult<()> {
    write_jsonl(path, traces).await?;
    tracing::debug!(path = %path.display(), count = traces.len(), "Traces written");
    Ok(())
}

pub async fn read_traces(path: &Path, parser: &TraceParser) -> BenchResult<Vec<SqlTrace>> {
    let mut traces = Vec::new();
    parser.parse_file(path, |t| traces.push(t)).await?;
    Ok(traces)
}

pub async fn write_workload(path: &Path, queries: &[WorkloadQuery]) -> BenchResult<()> {
    write_jsonl(path, queries).await?;
    tracing::debug!(path = %path.display(), count = queries.len(), "Workload written");
    Ok(())
}

/// Read a workload file. Unlike traces, a malformed line is fatal: the file
/// is produced by this tool and a bad line means it was corrupted.
pub async fn read_workload(path: &Path) -> BenchResult<Vec<WorkloadQuery>> {
    let file = tokio::fs::File::open(path).await.map_err(|e| {
        BenchError::io(COMPONENT, format!("failed to open workload {}", path.display()), e)
    })?;
    let mut lines = BufReader::new(file).lines();
    let mut queries = Vec::new();
    let mut line_no = 0u64;
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| BenchError::io(COMPONENT, format!("failed to read {}", path.display()), e))?
    {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let query: WorkloadQuery = serde_json::from_str(line).map_err(|e| {
            BenchError::invalid_input(
                COMPONENT,
                format!("{}:{}: invalid workload line", path.display(), line_no),
            )
            .with_source(e)
        })?;
        queries.push(query);
    }
    Ok(queries)
}

// =============================================================================
// JSON / text
// =============================================================================

/// Pretty-printed JSON document
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> BenchResult<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| {
        BenchError::report_generation(COMPONENT, format!("failed to encode {}", path.display()))
            .with_source(e)
    })?;
    write_bytes(path, &bytes).await
}

pub async fn read_json<T: DeserializeOwned>(path: &Path) -> BenchResult<T> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| BenchError::io(COMPONENT, format!("failed to read {}", path.display()), e))?;
    serde_json::from_slice(&bytes).map_err(|e| {
        BenchError::invalid_input(COMPONENT, format!("invalid JSON in {}", path.display()))
            .with_source(e)
    })
}

pub async fn write_text(path: &Path, text: &str) -> BenchResult<()> {
    write_bytes(path, text.as_bytes()).await
}

async fn write_bytes(path: &Path, bytes: &[u8]) -> BenchResult<()> {
    write_atomic(path, bytes)
        .await
        .map_err(|e| BenchError::io(COMPONENT, format!("failed to write {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::PerformanceMetrics;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_layout_paths() {
        let layout = ArtifactLayout::new("/out");
        assert_eq!(layout.traces(), PathBuf::from("/out/converted/traces.jsonl"));
        assert_eq!(layout.schema(), PathBuf::from("/out/converted/schema.sql"));
        assert_eq!(layout.workload(), PathBuf::from("/out/workload/benchmark.jsonl"));
        assert_eq!(layout.metrics(), PathBuf::from("/out/results/metrics.json"));
        assert_eq!(layout.report(), PathBuf::from("/out/report.json"));
    }

    #[tokio::test]
    async fn test_workload_round_trip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = ArtifactLayout::new(dir.path()).workload();
        let queries = vec![
            WorkloadQuery {
                query: "select * from t where id = ?".to_string(),
                args: vec![json!(2), json!(null)],
            },
            WorkloadQuery {
                query: "select 1".to_string(),
                args: vec![],
            },
            WorkloadQuery {
                query: "select * from t where s = ?".to_string(),
                args: vec![json!("a\nb")],
            },
        ];
        write_workload(&path, &queries).await.unwrap();
        assert_eq!(read_workload(&path).await.unwrap(), queries);
    }

    #[tokio::test]
    async fn test_bad_workload_line_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.jsonl");
        std::fs::write(&path, "{\"query\":\"select 1\"}\n\nnot json\n").unwrap();
        let err = read_workload(&path).await.unwrap_err();
        assert_eq!(err.kind, crate::core::error::ErrorKind::InvalidInput);
        assert!(err.message.contains(":3:"));
    }

    #[tokio::test]
    async fn test_traces_round_trip_through_parser() {
        let dir = tempfile::tempdir().unwrap();
        let path = ArtifactLayout::new(dir.path()).traces();
        let mut params = std::collections::BTreeMap::new();
        params.insert("uid".to_string(), json!(7));
        let mut trace = SqlTrace::new(
            "select * from users where id = :uid",
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        )
        .with_parameters(params);
        trace.latency = Some(1.5);
        trace.db = Some("shop".to_string());
        let traces = vec![trace, SqlTrace::new("select 1", Utc.timestamp_opt(0, 0).unwrap())];

        write_traces(&path, &traces).await.unwrap();
        let back = read_traces(&path, &TraceParser::default()).await.unwrap();
        assert_eq!(back, traces);
    }

    #[tokio::test]
    async fn test_metrics_json_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = ArtifactLayout::new(dir.path()).metrics();
        let metrics = PerformanceMetrics {
            queries_executed: 2,
            latencies: vec![10, 20],
            p50: 10,
            p90: 20,
            p99: 20,
            duration_ns: 1_000,
            ..PerformanceMetrics::default()
        };
        write_json(&path, &metrics).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        for key in [
            "queries_executed",
            "errors",
            "slow_queries",
            "duration_ns",
            "latencies",
            "p50",
            "p90",
            "p99",
        ] {
            assert!(raw.get(key).is_some(), "missing {}", key);
        }
        let back: PerformanceMetrics = read_json(&path).await.unwrap();
        assert_eq!(back, metrics);
    }

    #[tokio::test]
    async fn test_read_json_missing_file() {
        let err = read_json::<PerformanceMetrics>(Path::new("/nonexistent/metrics.json"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::core::error::ErrorKind::Io);
    }
}
