//! Paced workload replay
//!
//! `concurrency` workers pull from one queue fed in workload order. Each
//! worker takes a rate token, dispatches the query and records the result.
//! A query error is counted and the run continues; a broken plugin pipe
//! stops the whole run.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use sqltracebench_plugin::ArgValue;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::rate::RateController;
use super::recorder::{MetricsRecorder, PerformanceMetrics};
use crate::core::constants::DEFAULT_SLOW_QUERY_THRESHOLD_MS;
use crate::core::error::{BenchError, BenchResult};
use crate::core::telemetry::Telemetry;
use crate::data::plugins::{PluginError, QueryExecutor};
use crate::domain::workload::BenchmarkWorkload;

const COMPONENT: &str = "engine";

type Prepared = Arc<Vec<(String, Vec<ArgValue>)>>;

pub struct ExecutionEngine {
    executor: Arc<dyn QueryExecutor>,
    target: String,
    slow_threshold: Duration,
    telemetry: Option<Arc<Telemetry>>,
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("executor", &self.executor.name())
            .field("target", &self.target)
            .field("slow_threshold", &self.slow_threshold)
            .finish()
    }
}

/// Everything one worker needs
struct Worker {
    id: usize,
    executor: Arc<dyn QueryExecutor>,
    target: String,
    queries: Prepared,
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<usize>>>,
    rate: Arc<RateController>,
    recorder: Arc<MetricsRecorder>,
    telemetry: Option<Arc<Telemetry>>,
    measure_from: Instant,
    run: CancellationToken,
    transport: Arc<Mutex<Option<PluginError>>>,
}

impl ExecutionEngine {
    pub fn new(executor: Arc<dyn QueryExecutor>, target: impl Into<String>) -> Self {
        Self {
            executor,
            target: target.into(),
            slow_threshold: Duration::from_millis(DEFAULT_SLOW_QUERY_THRESHOLD_MS),
            telemetry: None,
        }
    }

    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Replay `workload` and return finalized metrics.
    ///
    /// Fails with `Cancelled` when `cancel` fires and with
    /// `DatabaseConnection` when the plugin pipe breaks.
    pub async fn run(
        &self,
        workload: &BenchmarkWorkload,
        cancel: &CancellationToken,
    ) -> BenchResult<PerformanceMetrics> {
        let config = workload.config;
        let recorder = Arc::new(MetricsRecorder::with_capacity(
            self.slow_threshold,
            workload.len(),
        ));
        if workload.is_empty() {
            tracing::warn!("Workload is empty, nothing to execute");
            return Ok(recorder.finalize(Duration::ZERO));
        }

        let rate = Arc::new(RateController::new(config.qps, config.concurrency)?);
        let queries: Prepared = Arc::new(
            workload
                .queries
                .iter()
                .map(|q| (q.query.clone(), q.args.iter().map(ArgValue::from).collect()))
                .collect(),
        );

        let run = cancel.child_token();
        let transport = Arc::new(Mutex::new(None));
        let start = Instant::now();
        let measure_from = start + config.warmup;
        let deadline = config.duration.map(|d| start + config.warmup + d);

        tracing::info!(
            executor = %self.executor.name(),
            target = %self.target,
            queries = workload.len(),
            qps = config.qps,
            concurrency = config.concurrency,
            duration = ?config.duration,
            warmup = ?config.warmup,
            "Benchmark started"
        );

        let (tx, rx) = mpsc::channel(config.concurrency * 2);
        let producer = tokio::spawn(feed(tx, queries.len(), deadline, run.clone()));

        let queue = Arc::new(tokio::sync::Mutex::new(rx));
        let workers: Vec<_> = (0..config.concurrency)
            .map(|id| {
                tokio::spawn(
                    Worker {
                        id,
                        executor: Arc::clone(&self.executor),
                        target: self.target.clone(),
                        queries: Arc::clone(&queries),
                        queue: Arc::clone(&queue),
                        rate: Arc::clone(&rate),
                        recorder: Arc::clone(&recorder),
                        telemetry: self.telemetry.clone(),
                        measure_from,
                        run: run.clone(),
                        transport: Arc::clone(&transport),
                    }
                    .run(),
                )
            })
            .collect();

        for result in join_all(workers).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }
        rate.stop();
        run.cancel();
        let _ = producer.await;

        let measured = Instant::now().saturating_duration_since(measure_from);
        let metrics = recorder.finalize(measured);

        if let Some(err) = transport.lock().take() {
            tracing::error!(
                executor = %self.executor.name(),
                executed = metrics.queries_executed,
                error = %err,
                "Benchmark aborted"
            );
            return Err(err.into());
        }
        if cancel.is_cancelled() {
            tracing::warn!(executed = metrics.queries_executed, "Benchmark cancelled");
            return Err(BenchError::cancelled(COMPONENT));
        }

        tracing::info!(
            executed = metrics.queries_executed,
            errors = metrics.errors,
            slow = metrics.slow_queries,
            p50_ms = metrics.p50 as f64 / 1e6,
            p99_ms = metrics.p99 as f64 / 1e6,
            throughput = metrics.throughput(),
            "Benchmark finished"
        );
        Ok(metrics)
    }
}

/// Push query indexes in order; cycle until `deadline` when one is set
async fn feed(
    tx: mpsc::Sender<usize>,
    len: usize,
    deadline: Option<Instant>,
    run: CancellationToken,
) {
    let mut index = 0usize;
    loop {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                break;
            }
        } else if index >= len {
            break;
        }
        tokio::select! {
            _ = run.cancelled() => break,
            sent = tx.send(index % len) => {
                if sent.is_err() {
                    break;
                }
            }
        }
        index += 1;
    }
}

impl Worker {
    async fn run(self) {
        let mut executed = 0u64;
        loop {
            let next = {
                let mut queue = self.queue.lock().await;
                tokio::select! {
                    _ = self.run.cancelled() => None,
                    next = queue.recv() => next,
                }
            };
            let Some(index) = next else { break };

            if self.rate.acquire(&self.run).await.is_err() {
                break;
            }

            let (sql, args) = &self.queries[index];
            let started = Instant::now();
            let result = tokio::select! {
                _ = self.run.cancelled() => break,
                result = self.executor.execute(sql, args) => result,
            };
            let latency = started.elapsed();
            executed += 1;

            let failed = match result {
                Ok(_) => false,
                Err(e) if e.is_transport() => {
                    tracing::warn!(worker = self.id, error = %e, "Plugin transport failed, stopping run");
                    self.transport.lock().get_or_insert(e);
                    self.run.cancel();
                    break;
                }
                Err(e) => {
                    tracing::debug!(worker = self.id, error = %e, "Query failed");
                    true
                }
            };

            if started >= self.measure_from {
                self.recorder.record(latency, failed);
                if let Some(telemetry) = &self.telemetry {
                    telemetry.observe_query(self.executor.name(), &self.target, latency, failed);
                }
            }
            tracing::trace!(worker = self.id, index, latency = ?latency, failed, "Query done");
        }
        tracing::debug!(worker = self.id, executed, "Worker exited");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::domain::workload::{ExecutionConfig, WorkloadQuery};
    use async_trait::async_trait;
    use sqltracebench_plugin::{ErrorCode, ExecuteOutcome};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sleeps for the configured time and tracks the in-flight high-water mark
    struct FakeExecutor {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
        fail_on: Option<&'static str>,
        break_after: Option<usize>,
    }

    impl FakeExecutor {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                fail_on: None,
                break_after: None,
            }
        }
    }

    #[async_trait]
    impl QueryExecutor for FakeExecutor {
        fn name(&self) -> &str {
            "fake"
        }

        async fn execute(
            &self,
            sql: &str,
            _args: &[ArgValue],
        ) -> Result<ExecuteOutcome, PluginError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.break_after.is_some_and(|n| call >= n) {
                return Err(PluginError::Transport("pipe closed".into()));
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail_on.is_some_and(|needle| sql.contains(needle)) {
                return Err(PluginError::Remote {
                    code: ErrorCode::QueryFailed,
                    message: "boom".into(),
                });
            }
            Ok(ExecuteOutcome {
                duration_ns: self.delay.as_nanos() as u64,
                rows: None,
            })
        }
    }

    fn workload(n: usize, qps: u32, concurrency: usize) -> BenchmarkWorkload {
        let queries = (0..n)
            .map(|i| WorkloadQuery {
                query: if i % 5 == 0 { "select bad".into() } else { "select ?".into() },
                args: vec![serde_json::json!(i)],
            })
            .collect();
        BenchmarkWorkload::new(
            queries,
            ExecutionConfig {
                qps,
                concurrency,
                ..ExecutionConfig::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_and_concurrency_bound() {
        let fake = Arc::new(FakeExecutor::new(Duration::from_millis(20)));
        let engine = ExecutionEngine::new(fake.clone(), "clickhouse");
        let cancel = CancellationToken::new();

        let start = Instant::now();
        let metrics = engine.run(&workload(50, 100, 4), &cancel).await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(metrics.queries_executed, 50);
        assert_eq!(metrics.latencies.len(), 50);
        assert!(fake.peak.load(Ordering::SeqCst) <= 4);
        // 4 prefilled tokens, then one per 10ms
        assert!(elapsed >= Duration::from_millis(450), "{:?}", elapsed);
        assert!(metrics.p50 <= metrics.p90 && metrics.p90 <= metrics.p99);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_errors_do_not_abort() {
        let mut fake = FakeExecutor::new(Duration::from_millis(1));
        fake.fail_on = Some("bad");
        let engine = ExecutionEngine::new(Arc::new(fake), "starrocks");
        let metrics = engine
            .run(&workload(20, 1000, 2), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(metrics.queries_executed, 20);
        assert_eq!(metrics.errors, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_aborts_run() {
        let mut fake = FakeExecutor::new(Duration::from_millis(1));
        fake.break_after = Some(5);
        let fake = Arc::new(fake);
        let engine = ExecutionEngine::new(fake.clone(), "clickhouse");
        let err = engine
            .run(&workload(100, 1000, 2), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DatabaseConnection);
        assert!(fake.calls.load(Ordering::SeqCst) < 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation() {
        let fake = Arc::new(FakeExecutor::new(Duration::from_millis(5)));
        let engine = ExecutionEngine::new(fake, "clickhouse");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let err = engine.run(&workload(1000, 50, 2), &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_cycles_workload_and_warmup_is_excluded() {
        let fake = Arc::new(FakeExecutor::new(Duration::from_millis(1)));
        let engine = ExecutionEngine::new(fake.clone(), "clickhouse")
            .with_telemetry(Arc::new(Telemetry::new().unwrap()));
        let mut w = workload(3, 100, 1);
        w.config.duration = Some(Duration::from_millis(500));
        w.config.warmup = Duration::from_millis(200);

        let metrics = engine.run(&w, &CancellationToken::new()).await.unwrap();
        let calls = fake.calls.load(Ordering::SeqCst) as u64;
        assert!(calls > 3, "workload should cycle, got {}", calls);
        assert!(metrics.queries_executed < calls);
        assert!(metrics.queries_executed > 0);
    }

    #[tokio::test]
    async fn test_empty_workload() {
        let engine = ExecutionEngine::new(Arc::new(FakeExecutor::new(Duration::ZERO)), "x");
        let metrics = engine
            .run(&BenchmarkWorkload::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(metrics.queries_executed, 0);
        assert_eq!(metrics.p99, 0);
    }
}
