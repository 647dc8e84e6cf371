//! Benchmarking pipeline
//!
//! - `traces` - ingestion and template extraction
//! - `params` - parameter value modeling
//! - `sampling` / `workload` - query synthesis
//! - `schema` - cross-dialect DDL translation
//! - `execution` - paced replay and metrics
//! - `validation` - statistical tests and reports
//! - `workflow` - phase sequencing and artifacts

pub mod execution;
pub mod params;
pub mod sampling;
pub mod schema;
pub mod traces;
pub mod validation;
pub mod workflow;
pub mod workload;

pub use workflow::{Phase, PhaseFailure, Workflow};
