//! Baseline vs candidate run comparison

use super::stats::ks_two_sample;
use super::{TestCategory, TestMethod, TestResult, ValidationOptions};
use crate::domain::execution::PerformanceMetrics;

/// Throughput, latency and error-rate checks, plus a KS test on the
/// latency distributions when both runs carry latencies.
///
/// The KS test is informational: at benchmark sample sizes it rejects
/// latency shifts far inside the percentile tolerances.
pub fn compare_runs(
    baseline: &PerformanceMetrics,
    candidate: &PerformanceMetrics,
    options: &ValidationOptions,
) -> Vec<TestResult> {
    let tolerance = options.tolerance;
    let mut tests = Vec::with_capacity(5);

    let base_qps = baseline.throughput();
    let cand_qps = candidate.throughput();
    let shortfall = relative_drop(base_qps, cand_qps);
    tests.push(tolerance_test(
        "throughput",
        shortfall,
        tolerance,
        if shortfall > 0.0 {
            format!(
                "candidate {:.1} qps is {:.1}% below baseline {:.1} qps",
                cand_qps,
                shortfall * 100.0,
                base_qps
            )
        } else {
            format!(
                "candidate {:.1} qps vs baseline {:.1} qps",
                cand_qps, base_qps
            )
        },
    ));

    for (name, base, cand) in [
        ("latency_p50", baseline.p50, candidate.p50),
        ("latency_p99", baseline.p99, candidate.p99),
    ] {
        let regression = relative_rise(base as f64, cand as f64);
        tests.push(tolerance_test(
            name,
            regression,
            tolerance,
            format!(
                "candidate {:.3} ms vs baseline {:.3} ms ({:+.1}%)",
                cand as f64 / 1e6,
                base as f64 / 1e6,
                regression * 100.0
            ),
        ));
    }

    let error_increase = candidate.error_rate() - baseline.error_rate();
    tests.push(tolerance_test(
        "error_rate",
        error_increase,
        tolerance,
        format!(
            "candidate {:.2}% vs baseline {:.2}% errors",
            candidate.error_rate() * 100.0,
            baseline.error_rate() * 100.0
        ),
    ));

    let as_f64 = |v: &[u64]| v.iter().map(|&x| x as f64).collect::<Vec<_>>();
    if let Some(ks) = ks_two_sample(&as_f64(&baseline.latencies), &as_f64(&candidate.latencies)) {
        let passed = ks.p_value >= options.threshold;
        tests.push(TestResult {
            name: "latency_distribution".to_string(),
            category: TestCategory::Performance,
            method: TestMethod::KolmogorovSmirnov,
            statistic: ks.statistic,
            p_value: Some(ks.p_value),
            threshold: options.threshold,
            passed,
            informational: true,
            message: format!("KS D={:.4}, p={:.4}", ks.statistic, ks.p_value),
        });
    }

    tests
}

fn tolerance_test(name: &str, value: f64, tolerance: f64, message: String) -> TestResult {
    // Rounded so that e.g. a 5.0000001% drop is not failed by float noise
    let passed = value <= tolerance + 1e-9;
    TestResult {
        name: name.to_string(),
        category: TestCategory::Performance,
        method: TestMethod::Tolerance,
        statistic: value,
        p_value: None,
        threshold: tolerance,
        passed,
        informational: false,
        message,
    }
}

/// `(base - cand) / base`; 0 when the baseline is 0
fn relative_drop(base: f64, cand: f64) -> f64 {
    if base <= 0.0 {
        return 0.0;
    }
    (base - cand) / base
}

/// `(cand - base) / base`; a rise from 0 counts as 100%
fn relative_rise(base: f64, cand: f64) -> f64 {
    if base <= 0.0 {
        return if cand > 0.0 { 1.0 } else { 0.0 };
    }
    (cand - base) / base
}
