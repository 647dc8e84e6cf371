//! Observed vs generated parameter values

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::stats::{ChiSquareResult, KsResult, chi_square, js_divergence, ks_two_sample};
use super::{TestCategory, TestMethod, TestResult, ValidationOptions};
use crate::domain::params::{ParamKey, ParamType, ParameterModels, ParameterValueDistribution};

/// Comparison of one parameter's observed model against its generated values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterFidelity {
    pub template: String,
    pub parameter: String,
    /// `<fingerprint prefix>:<name>`, also the metric label
    pub label: String,
    pub param_type: ParamType,
    pub observed: u64,
    pub generated: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ks: Option<KsResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chi_square: Option<ChiSquareResult>,
    /// Over the ranked values plus an "other" bin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub js_divergence: Option<f64>,
}

impl ParameterFidelity {
    /// Verdict: KS for numeric parameters, chi-square otherwise
    pub fn to_test(&self, threshold: f64) -> Option<TestResult> {
        let numeric = self.param_type.is_numeric();
        let (method, statistic, p_value) = match (numeric, &self.ks, &self.chi_square) {
            (true, Some(ks), _) => (TestMethod::KolmogorovSmirnov, ks.statistic, ks.p_value),
            (_, _, Some(chi)) => (TestMethod::ChiSquare, chi.statistic, chi.p_value),
            _ => return None,
        };
        let passed = p_value >= threshold;
        let mut message = format!(
            "{} observed vs {} generated, p={:.4}",
            self.observed, self.generated, p_value
        );
        if let Some(js) = self.js_divergence {
            message.push_str(&format!(", JS={:.4}", js));
        }
        Some(TestResult {
            name: self.label.clone(),
            category: TestCategory::Fidelity,
            method,
            statistic,
            p_value: Some(p_value),
            threshold,
            passed,
            informational: false,
            message,
        })
    }
}

/// Compare every modeled parameter that has generated samples
pub fn compare_parameters(
    models: &ParameterModels,
    samples: &BTreeMap<ParamKey, Vec<String>>,
) -> Vec<ParameterFidelity> {
    let mut out = Vec::new();
    for (key, model) in models.iter() {
        let Some(generated) = samples.get(key).filter(|s| !s.is_empty()) else {
            tracing::debug!(parameter = %key.label(&model.name), "No generated values, skipping");
            continue;
        };
        if model.is_empty() {
            continue;
        }
        out.push(compare_one(key, model, generated));
    }
    out
}

/// Fidelity results turned into report tests
pub fn fidelity_tests(results: &[ParameterFidelity], options: &ValidationOptions) -> Vec<TestResult> {
    results
        .iter()
        .filter_map(|r| r.to_test(options.threshold))
        .collect()
}

fn compare_one(
    key: &ParamKey,
    model: &ParameterValueDistribution,
    generated: &[String],
) -> ParameterFidelity {
    let ks = if model.param_type.is_numeric() {
        let parsed: Vec<f64> = generated
            .iter()
            .filter_map(|v| v.trim().parse::<f64>().ok())
            .collect();
        ks_two_sample(&model.numeric_sample(), &parsed)
    } else {
        None
    };

    let (observed_bins, generated_bins) = binned_counts(model, generated);
    let generated_total: f64 = generated_bins.iter().sum();
    let observed_total: f64 = observed_bins.iter().sum();
    let expected: Vec<f64> = observed_bins
        .iter()
        .map(|c| c / observed_total * generated_total)
        .collect();

    ParameterFidelity {
        template: key.template.clone(),
        parameter: model.name.clone(),
        label: key.label(&model.name),
        param_type: model.param_type,
        observed: model.total,
        generated: generated.len(),
        ks,
        chi_square: chi_square(&generated_bins, &expected),
        js_divergence: js_divergence(&observed_bins, &generated_bins),
    }
}

/// Counts over the model's ranked values, with everything else in a final bin
fn binned_counts(model: &ParameterValueDistribution, generated: &[String]) -> (Vec<f64>, Vec<f64>) {
    let index: HashMap<&str, usize> = model
        .top_values
        .iter()
        .enumerate()
        .map(|(i, v)| (v.as_str(), i))
        .collect();
    let other = model.top_values.len();

    let mut observed: Vec<f64> = model.top_frequencies.iter().map(|&c| c as f64).collect();
    let ranked: u64 = model.top_frequencies.iter().sum();
    observed.push(model.total.saturating_sub(ranked) as f64);

    let mut produced = vec![0.0; other + 1];
    for value in generated {
        let bin = index.get(value.as_str()).copied().unwrap_or(other);
        produced[bin] += 1.0;
    }
    (observed, produced)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(template: &str, values: &[(&str, u64)]) -> ParameterValueDistribution {
        let mut d = ParameterValueDistribution::new(template, "p1", 1000);
        for (v, n) in values {
            for _ in 0..*n {
                d.record(v);
            }
        }
        d.fit(100);
        d
    }

    fn models_with(d: ParameterValueDistribution) -> (ParameterModels, ParamKey) {
        let key = ParamKey::new(d.template.clone(), 0);
        let mut map = BTreeMap::new();
        map.insert(key.clone(), d);
        (ParameterModels::from(map), key)
    }

    fn repeat(values: &[(&str, usize)]) -> Vec<String> {
        values
            .iter()
            .flat_map(|(v, n)| std::iter::repeat_n(v.to_string(), *n))
            .collect()
    }

    #[test]
    fn test_categorical_match_passes() {
        let (models, key) = models_with(model("abc", &[("a", 60), ("b", 30), ("c", 10)]));
        let mut samples = BTreeMap::new();
        samples.insert(key, repeat(&[("a", 120), ("b", 60), ("c", 20)]));

        let results = compare_parameters(&models, &samples);
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert!(r.ks.is_none());
        assert!(r.chi_square.unwrap().statistic < 1e-9);
        assert_eq!(r.js_divergence, Some(0.0));
        let test = r.to_test(0.05).unwrap();
        assert_eq!(test.method, TestMethod::ChiSquare);
        assert!(test.passed);
    }

    #[test]
    fn test_categorical_mismatch_fails() {
        let (models, key) = models_with(model("abc", &[("a", 60), ("b", 30), ("c", 10)]));
        let mut samples = BTreeMap::new();
        samples.insert(key, repeat(&[("a", 20), ("b", 20), ("z", 160)]));

        let results = compare_parameters(&models, &samples);
        let test = results[0].to_test(0.05).unwrap();
        assert!(!test.passed);
        assert!(results[0].js_divergence.unwrap() > 0.1);
    }

    #[test]
    fn test_numeric_uses_ks() {
        let values: Vec<(String, u64)> = (1..=20).map(|i| (i.to_string(), 5)).collect();
        let refs: Vec<(&str, u64)> = values.iter().map(|(v, n)| (v.as_str(), *n)).collect();
        let (models, key) = models_with(model("num", &refs));
        let generated: Vec<String> = (0..200).map(|i| (i % 20 + 1).to_string()).collect();
        let mut samples = BTreeMap::new();
        samples.insert(key, generated);

        let results = compare_parameters(&models, &samples);
        let r = &results[0];
        assert_eq!(r.ks.unwrap().statistic, 0.0);
        let test = r.to_test(0.05).unwrap();
        assert_eq!(test.method, TestMethod::KolmogorovSmirnov);
        assert!(test.passed);
    }

    #[test]
    fn test_missing_samples_skipped() {
        let (models, _) = models_with(model("abc", &[("a", 1)]));
        assert!(compare_parameters(&models, &BTreeMap::new()).is_empty());
    }
}
