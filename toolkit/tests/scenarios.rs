//! End-to-end behaviour through the public library API

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Zipf};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use sqltracebench::data::RuleStore;
use sqltracebench::domain::execution::{MetricsRecorder, PerformanceMetrics, RateController};
use sqltracebench::domain::params::{AnalyzerOptions, analyze};
use sqltracebench::domain::schema::{
    PrecisionPolicy, SchemaConverter, SourceDialect, TargetDialect, TypeMapper, TypeMappingContext,
};
use sqltracebench::domain::traces::{SqlTrace, extract_templates};
use sqltracebench::domain::validation::{
    ValidationOptions, ValidationReport, compare_runs, ks_two_sample,
};
use sqltracebench::domain::workload::{ExecutionConfig, GenerationOptions, generate_workload};

fn mapper() -> TypeMapper {
    TypeMapper::new(Arc::new(RuleStore::with_defaults()), PrecisionPolicy::default())
}

fn trace(query: &str, second: u32) -> SqlTrace {
    SqlTrace::new(query, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, second).unwrap())
}

/// `queries` over 100 s with latencies spread over 1-11 ms, scaled by `slowdown`
fn run(queries: u64, slowdown: f64) -> PerformanceMetrics {
    let recorder = MetricsRecorder::new(Duration::from_secs(1));
    for i in 0..queries {
        let micros = (1_000.0 + (i % 1_000) as f64 * 10.0) * slowdown;
        recorder.record(Duration::from_micros(micros as u64), false);
    }
    recorder.finalize(Duration::from_secs(100))
}

#[test]
fn test_literal_variants_share_one_template() {
    let traces = vec![
        trace("select * from users where id = 1", 0),
        trace("SELECT * FROM users WHERE id = 2 ", 1),
        trace("select * from users where id = 1", 2),
        trace("select * from orders", 3),
    ];

    let templates = extract_templates(&traces, SourceDialect::MySql);
    assert_eq!(templates.len(), 2);
    let frequency = |text: &str| {
        templates
            .iter()
            .find(|t| t.text == text)
            .map(|t| t.frequency)
    };
    assert_eq!(frequency("select * from users where id = ?"), Some(3));
    assert_eq!(frequency("select * from orders"), Some(1));
}

#[test]
fn test_mysql_table_converts_to_clickhouse() {
    let ddl = SchemaConverter::new(SourceDialect::MySql, mapper())
        .convert_ddl(
            "CREATE TABLE users (id INT PRIMARY KEY, name VARCHAR(100));",
            "clickhouse",
        )
        .unwrap();

    let squashed = ddl.split_whitespace().collect::<Vec<_>>().join(" ");
    assert_eq!(
        squashed,
        "CREATE TABLE users ( id Int32, name String ) ENGINE = MergeTree() ORDER BY (id);"
    );
}

#[test]
fn test_decimal_keeps_precision_without_warning() {
    let ctx = TypeMappingContext::new("DECIMAL(10,2)", SourceDialect::MySql, TargetDialect::ClickHouse);
    let result = mapper().map(&ctx);
    assert_eq!(result.target_type, "Decimal64(2)");
    assert!(result.warnings.is_empty());
}

#[test]
fn test_generated_zipf_parameter_matches_observed() {
    let zipf = Zipf::new(99, 1.5).unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    let observed: Vec<f64> = (0..2000).map(|_| zipf.sample(&mut rng)).collect();
    let traces: Vec<SqlTrace> = observed
        .iter()
        .enumerate()
        .map(|(i, id)| {
            trace(
                &format!("SELECT * FROM orders WHERE customer_id = {}", *id as u64),
                (i % 60) as u32,
            )
        })
        .collect();

    let templates = extract_templates(&traces, SourceDialect::MySql);
    assert_eq!(templates.len(), 1);
    let models = analyze(&traces, &templates, AnalyzerOptions::default());

    let options = GenerationOptions {
        queries_per_template: 2000,
        ..GenerationOptions::default()
    };
    let generated =
        generate_workload(&templates, &models, &options, ExecutionConfig::default()).unwrap();
    assert_eq!(generated.workload.len(), 2000);

    let samples: Vec<f64> = generated
        .samples
        .values()
        .flatten()
        .map(|v| v.parse::<f64>().unwrap())
        .collect();
    assert_eq!(samples.len(), 2000);

    let ks = ks_two_sample(&observed, &samples).unwrap();
    assert!(ks.statistic < 0.40, "D = {}", ks.statistic);
}

#[tokio::test(start_paused = true)]
async fn test_rate_controller_paces_after_burst() {
    let rate = RateController::new(100, 10).unwrap();
    let cancel = CancellationToken::new();
    let start = Instant::now();

    for _ in 0..10 {
        rate.acquire(&cancel).await.unwrap();
    }
    assert!(start.elapsed() < Duration::from_millis(150));

    let burst_done = Instant::now();
    for _ in 0..10 {
        rate.acquire(&cancel).await.unwrap();
    }
    let paced = burst_done.elapsed();
    assert!(paced >= Duration::from_millis(50), "{:?}", paced);
    assert!(paced <= Duration::from_millis(150), "{:?}", paced);
}

#[test]
fn test_throughput_regression_fails_validation() {
    let options = ValidationOptions::default();
    let baseline = run(10_000, 1.0);
    assert!((baseline.throughput() - 100.0).abs() < 1e-9);

    let report = ValidationReport::from_tests(
        compare_runs(&baseline, &run(9_000, 1.10), &options),
        &options,
    );
    assert!(!report.passed);
    assert!(report.summary.contains("10.0% below"), "{}", report.summary);

    // a 3% slowdown moves latencies by 3% as well
    let report = ValidationReport::from_tests(
        compare_runs(&baseline, &run(9_700, 1.03), &options),
        &options,
    );
    assert!(report.passed, "{}", report.summary);
}
