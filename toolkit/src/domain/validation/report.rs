//! Validation report aggregation

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TestCategory, TestResult, ValidationOptions};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub passed: usize,
    pub total: usize,
}

/// Aggregated verdict over every test of one validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub generated_at: DateTime<Utc>,
    pub tests: Vec<TestResult>,
    pub categories: BTreeMap<TestCategory, CategorySummary>,
    /// Passing tests over all tests, in [0, 1]
    pub pass_rate: f64,
    /// `pass_rate` scaled to [0, 100]
    pub score: f64,
    pub min_pass_rate: f64,
    pub passed: bool,
    pub summary: String,
}

impl ValidationReport {
    /// Informational tests are reported but not scored. An empty scored
    /// set passes vacuously.
    pub fn from_tests(tests: Vec<TestResult>, options: &ValidationOptions) -> Self {
        let mut categories: BTreeMap<TestCategory, CategorySummary> = BTreeMap::new();
        for test in tests.iter().filter(|t| !t.informational) {
            let entry = categories.entry(test.category).or_default();
            entry.total += 1;
            if test.passed {
                entry.passed += 1;
            }
        }

        let scored = categories.values().map(|c| c.total).sum::<usize>();
        let passes = categories.values().map(|c| c.passed).sum::<usize>();
        let pass_rate = if scored == 0 {
            1.0
        } else {
            passes as f64 / scored as f64
        };
        let passed = pass_rate >= options.min_pass_rate;
        let summary = summarize(&tests, passes, scored, pass_rate, passed);

        Self {
            generated_at: Utc::now(),
            tests,
            categories,
            pass_rate,
            score: pass_rate * 100.0,
            min_pass_rate: options.min_pass_rate,
            passed,
            summary,
        }
    }

    /// Failed scored tests
    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.tests.iter().filter(|t| !t.passed && !t.informational)
    }
}

fn summarize(
    tests: &[TestResult],
    passes: usize,
    scored: usize,
    pass_rate: f64,
    passed: bool,
) -> String {
    let verdict = if passed { "PASS" } else { "FAIL" };
    let mut summary = format!(
        "{}: {}/{} tests passed ({:.1}%)",
        verdict,
        passes,
        scored,
        pass_rate * 100.0
    );
    let describe = |informational: bool| -> Vec<String> {
        tests
            .iter()
            .filter(|t| !t.passed && t.informational == informational)
            .map(|t| format!("{} {} ({})", t.category, t.name, t.message))
            .collect()
    };
    let failed = describe(false);
    if !failed.is_empty() {
        summary.push_str("; failed: ");
        summary.push_str(&failed.join("; "));
    }
    let notes = describe(true);
    if !notes.is_empty() {
        summary.push_str("; informational: ");
        summary.push_str(&notes.join("; "));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::validation::TestMethod;

    fn test(name: &str, category: TestCategory, passed: bool) -> TestResult {
        TestResult {
            name: name.to_string(),
            category,
            method: TestMethod::Tolerance,
            statistic: 0.0,
            p_value: None,
            threshold: 0.05,
            passed,
            informational: false,
            message: format!("{} message", name),
        }
    }

    #[test]
    fn test_aggregation() {
        let tests = vec![
            test("a", TestCategory::Fidelity, true),
            test("b", TestCategory::Fidelity, false),
            test("throughput", TestCategory::Performance, true),
            test("p99", TestCategory::Performance, true),
        ];
        let report = ValidationReport::from_tests(tests, &ValidationOptions::default());
        assert_eq!(report.pass_rate, 0.75);
        assert_eq!(report.score, 75.0);
        assert!(!report.passed);
        assert_eq!(
            report.categories[&TestCategory::Fidelity],
            CategorySummary { passed: 1, total: 2 }
        );
        assert!(report.summary.starts_with("FAIL: 3/4"));
        assert!(report.summary.contains("fidelity b (b message)"));
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn test_informational_tests_not_scored() {
        let mut shift = test("latency_distribution", TestCategory::Performance, false);
        shift.informational = true;
        let tests = vec![test("throughput", TestCategory::Performance, true), shift];
        let report = ValidationReport::from_tests(tests, &ValidationOptions::default());
        assert!(report.passed);
        assert_eq!(report.pass_rate, 1.0);
        assert_eq!(
            report.categories[&TestCategory::Performance],
            CategorySummary { passed: 1, total: 1 }
        );
        assert_eq!(report.failures().count(), 0);
        assert!(report.summary.starts_with("PASS: 1/1"));
        assert!(report.summary.contains("informational: performance latency_distribution"));
    }

    #[test]
    fn test_min_pass_rate() {
        let tests = vec![
            test("a", TestCategory::Fidelity, true),
            test("b", TestCategory::Fidelity, false),
        ];
        let options = ValidationOptions {
            min_pass_rate: 0.5,
            ..ValidationOptions::default()
        };
        assert!(ValidationReport::from_tests(tests, &options).passed);
    }

    #[test]
    fn test_empty_passes() {
        let report = ValidationReport::from_tests(Vec::new(), &ValidationOptions::default());
        assert!(report.passed);
        assert_eq!(report.score, 100.0);
    }

    #[test]
    fn test_serializes_categories_by_name() {
        let report = ValidationReport::from_tests(
            vec![test("a", TestCategory::Performance, true)],
            &ValidationOptions::default(),
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["categories"]["performance"]["total"], 1);
        assert_eq!(json["tests"][0]["method"], "tolerance");
    }
}
