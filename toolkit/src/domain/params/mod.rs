//! Parameter statistical modeling

pub mod analyzer;
pub mod distribution;

pub use analyzer::{AnalyzerOptions, ParamKey, ParameterAnalyzer, ParameterModels, analyze};
pub use distribution::{DistributionKind, ParamType, ParameterValueDistribution, fit_zipf_exponent};
