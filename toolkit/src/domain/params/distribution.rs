//! Parameter value distributions

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::constants::{
    UNIFORM_MAX_HOTSPOT_RATIO, UNIFORM_MAX_ZIPF_S, ZIPFIAN_MIN_HOTSPOT_RATIO, ZIPFIAN_MIN_ZIPF_S,
};
use crate::utils::time::is_temporal;

/// Semantic type inferred from observed values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParamType {
    Int,
    Float,
    String,
    Datetime,
    Bool,
}

impl ParamType {
    /// Tried in order: int, float, bool, datetime, string
    pub fn infer(value: &str) -> Self {
        let v = value.trim();
        if v.parse::<i64>().is_ok() {
            Self::Int
        } else if v.parse::<f64>().is_ok_and(|f| f.is_finite()) {
            Self::Float
        } else if v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("false") {
            Self::Bool
        } else if is_temporal(v) {
            Self::Datetime
        } else {
            Self::String
        }
    }

    /// Combine with the type of a later value. INT and FLOAT meet at FLOAT,
    /// every other conflict widens to STRING.
    pub fn widen(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (Self::Int, Self::Float) | (Self::Float, Self::Int) => Self::Float,
            _ => Self::String,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Int => "INT",
            Self::Float => "FLOAT",
            Self::String => "STRING",
            Self::Datetime => "DATETIME",
            Self::Bool => "BOOL",
        };
        f.write_str(s)
    }
}

/// Detected distribution shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DistributionKind {
    Uniform,
    Zipfian,
    Empirical,
}

impl DistributionKind {
    pub fn classify(hotspot_ratio: f64, zipf_s: f64) -> Self {
        if hotspot_ratio < UNIFORM_MAX_HOTSPOT_RATIO && zipf_s < UNIFORM_MAX_ZIPF_S {
            Self::Uniform
        } else if hotspot_ratio > ZIPFIAN_MIN_HOTSPOT_RATIO || zipf_s > ZIPFIAN_MIN_ZIPF_S {
            Self::Zipfian
        } else {
            Self::Empirical
        }
    }
}

/// Per-template, per-placeholder value model.
///
/// `value_counts` never holds more than `max_cardinality` keys and its counts
/// always sum to `total`; observations of new values past the bound are
/// counted in `dropped` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterValueDistribution {
    pub template: String,
    pub name: String,
    pub param_type: ParamType,
    pub value_counts: BTreeMap<String, u64>,
    pub total: u64,
    #[serde(default)]
    pub dropped: u64,
    pub max_cardinality: usize,
    pub distribution: DistributionKind,
    pub zipf_s: f64,
    pub hotspot_ratio: f64,
    /// Values sorted by descending count (ties by value)
    pub top_values: Vec<String>,
    pub top_frequencies: Vec<u64>,
}

impl ParameterValueDistribution {
    pub fn new(template: impl Into<String>, name: impl Into<String>, max_cardinality: usize) -> Self {
        Self {
            template: template.into(),
            name: name.into(),
            param_type: ParamType::String,
            value_counts: BTreeMap::new(),
            total: 0,
            dropped: 0,
            max_cardinality,
            distribution: DistributionKind::Empirical,
            zipf_s: 0.0,
            hotspot_ratio: 0.0,
            top_values: Vec::new(),
            top_frequencies: Vec::new(),
        }
    }

    /// Count one observed value. Returns false when the value was dropped.
    pub fn record(&mut self, value: &str) -> bool {
        let observed = ParamType::infer(value);
        self.param_type = if self.total == 0 && self.dropped == 0 {
            observed
        } else {
            self.param_type.widen(observed)
        };

        if let Some(count) = self.value_counts.get_mut(value) {
            *count += 1;
        } else if self.value_counts.len() < self.max_cardinality {
            self.value_counts.insert(value.to_string(), 1);
        } else {
            self.dropped += 1;
            return false;
        }
        self.total += 1;
        true
    }

    /// Fit distribution parameters from the counted values
    pub fn fit(&mut self, top_k: usize) {
        let mut ranked: Vec<(&String, &u64)> = self.value_counts.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(top_k.max(1));

        self.top_values = ranked.iter().map(|(v, _)| (*v).clone()).collect();
        self.top_frequencies = ranked.iter().map(|(_, c)| **c).collect();

        self.hotspot_ratio = match (self.top_frequencies.first(), self.total) {
            (Some(&top), total) if total > 0 => top as f64 / total as f64,
            _ => 0.0,
        };
        self.zipf_s = fit_zipf_exponent(&self.top_frequencies);
        self.distribution = DistributionKind::classify(self.hotspot_ratio, self.zipf_s);
    }

    pub fn is_empty(&self) -> bool {
        self.value_counts.is_empty()
    }

    pub fn frequency(&self, value: &str) -> u64 {
        self.value_counts.get(value).copied().unwrap_or(0)
    }

    /// Values whose share of observations is at least `min_share`
    pub fn hotspots(&self, min_share: f64) -> Vec<String> {
        if self.total == 0 {
            return Vec::new();
        }
        self.top_values
            .iter()
            .zip(&self.top_frequencies)
            .filter(|(_, c)| **c as f64 / self.total as f64 >= min_share)
            .map(|(v, _)| v.clone())
            .collect()
    }

    /// Expand counts into a numeric sample (numeric parameters only)
    pub fn numeric_sample(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.total as usize);
        for (value, count) in &self.value_counts {
            if let Ok(v) = value.trim().parse::<f64>() {
                out.extend(std::iter::repeat_n(v, *count as usize));
            }
        }
        out
    }
}

/// Negative slope of ln(frequency) against ln(rank), least squares.
///
/// `frequencies` must be sorted descending. Fewer than two ranks fit to 0.
pub fn fit_zipf_exponent(frequencies: &[u64]) -> f64 {
    let points: Vec<(f64, f64)> = frequencies
        .iter()
        .enumerate()
        .filter(|(_, f)| **f > 0)
        .map(|(i, f)| (((i + 1) as f64).ln(), (*f as f64).ln()))
        .collect();
    if points.len() < 2 {
        return 0.0;
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let (num, den) = points.iter().fold((0.0, 0.0), |(num, den), (x, y)| {
        (num + (x - mean_x) * (y - mean_y), den + (x - mean_x).powi(2))
    });
    if den == 0.0 {
        return 0.0;
    }
    (-num / den).max(0.0)
}
