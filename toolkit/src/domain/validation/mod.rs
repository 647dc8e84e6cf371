//! Statistical validation
//!
//! - `stats` - KS, chi-square and Jensen-Shannon primitives
//! - `fidelity` - observed vs generated parameter values
//! - `performance` - baseline vs candidate run metrics
//! - `report` - aggregation into a pass rate, score and summary

pub mod fidelity;
pub mod performance;
pub mod report;
pub mod stats;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::constants::{DEFAULT_MIN_PASS_RATE, DEFAULT_P_VALUE_THRESHOLD, DEFAULT_TOLERANCE};

pub use fidelity::{ParameterFidelity, compare_parameters, fidelity_tests};
pub use performance::compare_runs;
pub use report::ValidationReport;
pub use stats::{ChiSquareResult, KsResult, chi_square, js_divergence, ks_two_sample};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationOptions {
    /// Minimum p-value for a statistical test to pass
    pub threshold: f64,
    /// Allowed relative regression between baseline and candidate
    pub tolerance: f64,
    /// Fraction of tests that must pass for the report to pass
    pub min_pass_rate: f64,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_P_VALUE_THRESHOLD,
            tolerance: DEFAULT_TOLERANCE,
            min_pass_rate: DEFAULT_MIN_PASS_RATE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestCategory {
    Fidelity,
    Performance,
}

impl fmt::Display for TestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fidelity => f.write_str("fidelity"),
            Self::Performance => f.write_str("performance"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMethod {
    KolmogorovSmirnov,
    ChiSquare,
    /// Relative difference against a tolerance
    Tolerance,
}

/// One test verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub category: TestCategory,
    pub method: TestMethod,
    pub statistic: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_value: Option<f64>,
    /// p-value floor or tolerance the statistic was held to
    pub threshold: f64,
    pub passed: bool,
    /// Reported but left out of the pass rate
    #[serde(default)]
    pub informational: bool,
    pub message: String,
}
