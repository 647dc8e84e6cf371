//! Benchmark execution
//!
//! - `rate` - token-bucket pacing
//! - `recorder` - latency/error tally and percentile finalization
//! - `engine` - worker pool dispatching a workload to a query executor

pub mod engine;
pub mod rate;
pub mod recorder;

pub use engine::ExecutionEngine;
pub use rate::RateController;
pub use recorder::{MetricsRecorder, PerformanceMetrics, nearest_rank};
