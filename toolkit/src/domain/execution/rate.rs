//! Token-bucket pacing
//!
//! The bucket holds at most `concurrency` tokens and starts full, so the
//! first burst is bounded by concurrency only. A background task adds one
//! token every `1s / qps`; tokens that do not fit are dropped. Above
//! 1000 QPS the task ticks every millisecond and carries fractional credit.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::core::constants::MIN_REFILL_TICK_MICROS;
use crate::core::error::{BenchError, BenchResult};

const COMPONENT: &str = "rate";

#[derive(Debug)]
pub struct RateController {
    qps: u32,
    capacity: usize,
    tokens: Arc<Semaphore>,
    stop: CancellationToken,
    refill: JoinHandle<()>,
}

impl RateController {
    /// Start pacing. Must be called inside a runtime.
    pub fn new(qps: u32, concurrency: usize) -> BenchResult<Self> {
        if qps == 0 {
            return Err(BenchError::invalid_input(
                COMPONENT,
                "qps must be greater than 0",
            ));
        }
        if concurrency == 0 {
            return Err(BenchError::invalid_input(
                COMPONENT,
                "concurrency must be greater than 0",
            ));
        }

        let tokens = Arc::new(Semaphore::new(concurrency));
        let stop = CancellationToken::new();
        let refill = tokio::spawn(refill_loop(
            Arc::clone(&tokens),
            qps,
            concurrency,
            stop.clone(),
        ));

        tracing::debug!(qps, capacity = concurrency, "Rate controller started");
        Ok(Self {
            qps,
            capacity: concurrency,
            tokens,
            stop,
            refill,
        })
    }

    pub fn qps(&self) -> u32 {
        self.qps
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tokens currently in the bucket
    pub fn available(&self) -> usize {
        self.tokens.available_permits()
    }

    /// Take one token, waiting for a refill if the bucket is empty.
    ///
    /// Fails with `Cancelled` when `cancel` fires or the controller stops.
    pub async fn acquire(&self, cancel: &CancellationToken) -> BenchResult<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BenchError::cancelled(COMPONENT)),
            permit = self.tokens.acquire() => match permit {
                Ok(permit) => {
                    permit.forget();
                    Ok(())
                }
                Err(_) => Err(BenchError::cancelled(COMPONENT)),
            },
        }
    }

    /// [`acquire`](Self::acquire) with a deadline
    pub async fn acquire_until(
        &self,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> BenchResult<()> {
        match tokio::time::timeout_at(deadline, self.acquire(cancel)).await {
            Ok(result) => result,
            Err(_) => Err(BenchError::cancelled(COMPONENT)),
        }
    }

    /// Stop refilling and wake every waiter. Idempotent.
    pub fn stop(&self) {
        if self.stop.is_cancelled() {
            return;
        }
        self.stop.cancel();
        self.tokens.close();
        tracing::debug!(qps = self.qps, "Rate controller stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}

impl Drop for RateController {
    fn drop(&mut self) {
        self.stop();
        self.refill.abort();
    }
}

/// Tick period and tokens credited per tick
fn refill_schedule(qps: u32) -> (Duration, f64) {
    let interval = Duration::from_secs_f64(1.0 / f64::from(qps));
    let floor = Duration::from_micros(MIN_REFILL_TICK_MICROS);
    if interval >= floor {
        (interval, 1.0)
    } else {
        (floor, floor.as_secs_f64() * f64::from(qps))
    }
}

async fn refill_loop(tokens: Arc<Semaphore>, qps: u32, capacity: usize, stop: CancellationToken) {
    let (period, per_tick) = refill_schedule(qps);
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
    let mut credit = 0.0f64;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                credit += per_tick;
                let whole = credit.floor();
                credit -= whole;
                let room = capacity.saturating_sub(tokens.available_permits());
                let add = (whole as usize).min(room);
                if add > 0 {
                    tokens.add_permits(add);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[tokio::test]
    async fn test_zero_qps_rejected() {
        let err = RateController::new(0, 10).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
        assert!(RateController::new(10, 0).is_err());
    }

    #[test]
    fn test_refill_schedule() {
        assert_eq!(refill_schedule(100), (Duration::from_millis(10), 1.0));
        let (period, per_tick) = refill_schedule(5_000);
        assert_eq!(period, Duration::from_millis(1));
        assert!((per_tick - 5.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefill_then_paced() {
        let rate = RateController::new(100, 10).unwrap();
        let cancel = CancellationToken::new();
        let start = Instant::now();

        for _ in 0..10 {
            rate.acquire(&cancel).await.unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(150));

        let burst_done = Instant::now();
        for _ in 0..10 {
            rate.acquire(&cancel).await.unwrap();
        }
        let paced = burst_done.elapsed();
        assert!(paced >= Duration::from_millis(50), "{:?}", paced);
        assert!(paced <= Duration::from_millis(150), "{:?}", paced);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_never_exceeds_capacity() {
        let rate = RateController::new(1_000, 3).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(rate.available(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_deadline_and_cancel() {
        let rate = RateController::new(1, 1).unwrap();
        let cancel = CancellationToken::new();
        rate.acquire(&cancel).await.unwrap();

        let deadline = Instant::now() + Duration::from_millis(100);
        let err = rate.acquire_until(&cancel, deadline).await.unwrap_err();
        assert!(err.is_cancelled());

        cancel.cancel();
        let err = rate.acquire(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_wakes_waiters() {
        let rate = Arc::new(RateController::new(1, 1).unwrap());
        let cancel = CancellationToken::new();
        rate.acquire(&cancel).await.unwrap();

        let waiter = {
            let rate = Arc::clone(&rate);
            let cancel = cancel.clone();
            tokio::spawn(async move { rate.acquire(&cancel).await })
        };
        tokio::task::yield_now().await;
        rate.stop();
        rate.stop();
        assert!(rate.is_stopped());
        assert!(waiter.await.unwrap().unwrap_err().is_cancelled());
    }
}
