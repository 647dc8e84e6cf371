//! Prometheus collectors
//!
//! Created once by the entry point and handed to the phases that report
//! into it. Nothing registers itself implicitly.

use std::time::Duration;

use prometheus::{
    Encoder, GaugeVec, Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
    TextEncoder,
};

pub struct Telemetry {
    registry: Registry,
    queries_executed: IntCounterVec,
    query_errors: IntCounterVec,
    query_latency: HistogramVec,
    generation_throughput: GaugeVec,
    validation_score: GaugeVec,
    ks_pvalue: GaugeVec,
    pass_rate: prometheus::Gauge,
    generation_duration: Histogram,
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry").finish_non_exhaustive()
    }
}

impl Telemetry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let queries_executed = IntCounterVec::new(
            Opts::new(
                "sqltracebench_queries_executed_total",
                "Queries dispatched to an adapter",
            ),
            &["executor", "target"],
        )?;
        registry.register(Box::new(queries_executed.clone()))?;

        let query_errors = IntCounterVec::new(
            Opts::new(
                "sqltracebench_query_errors_total",
                "Queries that returned an error",
            ),
            &["executor", "target"],
        )?;
        registry.register(Box::new(query_errors.clone()))?;

        let query_latency = HistogramVec::new(
            HistogramOpts::new(
                "sqltracebench_query_latency_seconds",
                "Wall-clock query latency including the adapter round trip",
            )
            .buckets(prometheus::exponential_buckets(0.0005, 2.0, 16)?),
            &["executor", "target"],
        )?;
        registry.register(Box::new(query_latency.clone()))?;

        let generation_throughput = GaugeVec::new(
            Opts::new(
                "benchmark_generation_throughput",
                "Queries generated per second",
            ),
            &["model"],
        )?;
        registry.register(Box::new(generation_throughput.clone()))?;

        let validation_score = GaugeVec::new(
            Opts::new(
                "benchmark_validation_score",
                "Overall validation score (0-100)",
            ),
            &["model"],
        )?;
        registry.register(Box::new(validation_score.clone()))?;

        let ks_pvalue = GaugeVec::new(
            Opts::new(
                "validation_ks_pvalue",
                "KS p-value between observed and generated parameter values",
            ),
            &["parameter"],
        )?;
        registry.register(Box::new(ks_pvalue.clone()))?;

        let pass_rate = prometheus::Gauge::with_opts(Opts::new(
            "validation_pass_rate",
            "Fraction of validation tests that passed",
        ))?;
        registry.register(Box::new(pass_rate.clone()))?;

        let generation_duration = Histogram::with_opts(HistogramOpts::new(
            "sqltracebench_generation_duration_seconds",
            "Time spent generating a workload",
        ))?;
        registry.register(Box::new(generation_duration.clone()))?;

        Ok(Self {
            registry,
            queries_executed,
            query_errors,
            query_latency,
            generation_throughput,
            validation_score,
            ks_pvalue,
            pass_rate,
            generation_duration,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn observe_query(&self, executor: &str, target: &str, latency: Duration, failed: bool) {
        let labels = [executor, target];
        self.queries_executed.with_label_values(&labels).inc();
        self.query_latency
            .with_label_values(&labels)
            .observe(latency.as_secs_f64());
        if failed {
            self.query_errors.with_label_values(&labels).inc();
        }
    }

    pub fn observe_generation(&self, model: &str, queries: usize, elapsed: Duration) {
        self.generation_duration.observe(elapsed.as_secs_f64());
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            self.generation_throughput
                .with_label_values(&[model])
                .set(queries as f64 / secs);
        }
    }

    pub fn set_validation_score(&self, model: &str, score: f64) {
        self.validation_score.with_label_values(&[model]).set(score);
    }

    pub fn set_ks_pvalue(&self, parameter: &str, p_value: f64) {
        self.ks_pvalue.with_label_values(&[parameter]).set(p_value);
    }

    pub fn set_pass_rate(&self, rate: f64) {
        self.pass_rate.set(rate);
    }

    /// Text exposition format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_in_exposition() {
        let telemetry = Telemetry::new().unwrap();
        telemetry.observe_query("worker", "clickhouse", Duration::from_millis(3), true);
        telemetry.observe_generation("zipf", 1000, Duration::from_millis(500));
        telemetry.set_validation_score("zipf", 87.5);
        telemetry.set_ks_pvalue("orders.customer_id", 0.42);
        telemetry.set_pass_rate(0.75);

        let text = telemetry.encode().unwrap();
        assert!(text.contains(
            r#"sqltracebench_queries_executed_total{executor="worker",target="clickhouse"} 1"#
        ));
        assert!(text.contains("sqltracebench_query_latency_seconds_bucket"));
        assert!(text.contains("sqltracebench_query_errors_total"));
        assert!(text.contains(r#"benchmark_generation_throughput{model="zipf"} 2000"#));
        assert!(text.contains(r#"benchmark_validation_score{model="zipf"} 87.5"#));
        assert!(text.contains(r#"validation_ks_pvalue{parameter="orders.customer_id"} 0.42"#));
        assert!(text.contains("validation_pass_rate 0.75"));
    }

    #[test]
    fn test_instances_are_isolated() {
        let a = Telemetry::new().unwrap();
        let b = Telemetry::new().unwrap();
        a.set_pass_rate(1.0);
        assert!(!b.encode().unwrap().contains("validation_pass_rate 1"));
    }
}
