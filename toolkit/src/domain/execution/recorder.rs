//! Latency and error tally shared by execution workers

use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Finished run metrics, as written to `results/metrics.json`.
///
/// Only [`MetricsRecorder::finalize`] produces one, so percentiles are always
/// computed over a sorted latency vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub queries_executed: u64,
    pub errors: u64,
    pub slow_queries: u64,
    pub duration_ns: u64,
    /// Sorted ascending, nanoseconds
    pub latencies: Vec<u64>,
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
}

impl PerformanceMetrics {
    /// Queries per second over the whole run
    pub fn throughput(&self) -> f64 {
        if self.duration_ns == 0 {
            return 0.0;
        }
        self.queries_executed as f64 / (self.duration_ns as f64 / 1e9)
    }

    pub fn error_rate(&self) -> f64 {
        if self.queries_executed == 0 {
            return 0.0;
        }
        self.errors as f64 / self.queries_executed as f64
    }

    pub fn duration(&self) -> Duration {
        Duration::from_nanos(self.duration_ns)
    }
}

#[derive(Debug, Default)]
struct Tally {
    queries_executed: u64,
    errors: u64,
    slow_queries: u64,
    latencies: Vec<u64>,
    finalized: bool,
}

#[derive(Debug)]
pub struct MetricsRecorder {
    slow_threshold: Duration,
    tally: Mutex<Tally>,
}

impl MetricsRecorder {
    pub fn new(slow_threshold: Duration) -> Self {
        Self {
            slow_threshold,
            tally: Mutex::new(Tally::default()),
        }
    }

    pub fn with_capacity(slow_threshold: Duration, expected: usize) -> Self {
        Self {
            slow_threshold,
            tally: Mutex::new(Tally {
                latencies: Vec::with_capacity(expected),
                ..Tally::default()
            }),
        }
    }

    /// Count one executed query
    pub fn record(&self, latency: Duration, failed: bool) {
        let mut tally = self.tally.lock();
        if tally.finalized {
            tracing::warn!("Metric recorded after finalize, ignoring");
            return;
        }
        tally.queries_executed += 1;
        tally
            .latencies
            .push(u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX));
        if failed {
            tally.errors += 1;
        }
        if latency > self.slow_threshold {
            tally.slow_queries += 1;
        }
    }

    pub fn queries_executed(&self) -> u64 {
        self.tally.lock().queries_executed
    }

    /// Close the tally and compute nearest-rank percentiles.
    ///
    /// The latency vector moves into the returned metrics.
    pub fn finalize(&self, total: Duration) -> PerformanceMetrics {
        let mut tally = self.tally.lock();
        tally.finalized = true;
        let mut latencies = std::mem::take(&mut tally.latencies);
        latencies.sort_unstable();

        PerformanceMetrics {
            queries_executed: tally.queries_executed,
            errors: tally.errors,
            slow_queries: tally.slow_queries,
            duration_ns: u64::try_from(total.as_nanos()).unwrap_or(u64::MAX),
            p50: nearest_rank(&latencies, 50.0),
            p90: nearest_rank(&latencies, 90.0),
            p99: nearest_rank(&latencies, 99.0),
            latencies,
        }
    }
}

/// Nearest-rank percentile of a sorted slice; 0 when empty
pub fn nearest_rank(sorted: &[u64], percentile: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((percentile / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
