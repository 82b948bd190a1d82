//! Inference Client (component A): a bounded worker pool that drains the
//! Batch Collector's queue, calls the remote detector with retry/backoff and
//! a circuit breaker, and integrates results into Lane 3.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use veilstream_config::{InferenceConfig, ModerationConfig};
use veilstream_contracts::{
    BatchRequest, BreakerState, FrameOutcome, InferenceService, InferenceTransportError, Observability,
};
use veilstream_model::Detection;

use crate::batch_collector::BatchCollector;
use crate::state::ModerationState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    phase: Phase,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Tracks permanent-error streaks against the remote detector. Transient
/// errors and timeouts never touch this; only `Permanent` transport errors
/// count toward the window.
struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    window: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    fn new(window: u32, cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                phase: Phase::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
            window: window.max(1),
            cooldown,
        }
    }

    /// Returns `true` if a call should be attempted. Grants exactly one
    /// half-open probe per cooldown window.
    async fn admit(&self) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.phase {
            Phase::Closed => true,
            Phase::HalfOpen => false,
            Phase::Open => {
                let elapsed_enough = inner
                    .opened_at
                    .is_some_and(|opened| opened.elapsed() >= self.cooldown);
                if elapsed_enough {
                    inner.phase = Phase::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    async fn record_success(&self) -> Option<BreakerState> {
        let mut inner = self.inner.lock().await;
        let was_open = !matches!(inner.phase, Phase::Closed);
        inner.phase = Phase::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        was_open.then_some(BreakerState::Closed)
    }

    async fn record_permanent_failure(&self) -> Option<BreakerState> {
        let mut inner = self.inner.lock().await;
        match inner.phase {
            Phase::HalfOpen => {
                inner.phase = Phase::Open;
                inner.opened_at = Some(Instant::now());
                inner.consecutive_failures = self.window;
                Some(BreakerState::Open)
            }
            Phase::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.window {
                    inner.phase = Phase::Open;
                    inner.opened_at = Some(Instant::now());
                    Some(BreakerState::Open)
                } else {
                    None
                }
            }
            Phase::Open => None,
        }
    }

    async fn snapshot(&self) -> BreakerState {
        match self.inner.lock().await.phase {
            Phase::Closed => BreakerState::Closed,
            Phase::Open => BreakerState::Open,
            Phase::HalfOpen => BreakerState::HalfOpen,
        }
    }
}

/// Owns the worker pool that consumes [`BatchRequest`]s. Dropping this (or
/// calling [`InferenceClient::shutdown`]) cancels every worker.
pub struct InferenceClient {
    cancel: CancellationToken,
    handles: Vec<tokio::task::JoinHandle<()>>,
    breaker: Arc<CircuitBreaker>,
}

impl InferenceClient {
    /// Spawns `worker_count` workers pulling from `batch_rx`.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        config: Arc<ModerationConfig>,
        worker_count: usize,
        service: Arc<dyn InferenceService>,
        batch_rx: mpsc::UnboundedReceiver<BatchRequest>,
        collector: Arc<BatchCollector>,
        state: Arc<Mutex<ModerationState>>,
        observability: Arc<dyn Observability>,
        now_ms: Arc<dyn Fn() -> u64 + Send + Sync>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let breaker = Arc::new(CircuitBreaker::new(
            config.inference.circuit_breaker_window,
            Duration::from_millis(config.inference.circuit_breaker_cooldown_ms),
        ));
        let batch_rx = Arc::new(Mutex::new(batch_rx));

        let mut handles = Vec::with_capacity(worker_count.max(1));
        for worker_id in 0..worker_count.max(1) {
            let handle = tokio::spawn(worker_loop(
                worker_id,
                config.clone(),
                service.clone(),
                batch_rx.clone(),
                collector.clone(),
                state.clone(),
                breaker.clone(),
                observability.clone(),
                now_ms.clone(),
                cancel.clone(),
            ));
            handles.push(handle);
        }

        Self { cancel, handles, breaker }
    }

    pub async fn breaker_state(&self) -> BreakerState {
        self.breaker.snapshot().await
    }

    /// Cancels every worker and waits up to `grace` for them to exit.
    pub async fn shutdown(self, grace: Duration) {
        self.cancel.cancel();
        let join_all = futures::future::join_all(self.handles);
        if tokio::time::timeout(grace, join_all).await.is_err() {
            warn!("inference client: workers did not exit within the grace window");
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    worker_id: usize,
    config: Arc<ModerationConfig>,
    service: Arc<dyn InferenceService>,
    batch_rx: Arc<Mutex<mpsc::UnboundedReceiver<BatchRequest>>>,
    collector: Arc<BatchCollector>,
    state: Arc<Mutex<ModerationState>>,
    breaker: Arc<CircuitBreaker>,
    observability: Arc<dyn Observability>,
    now_ms: Arc<dyn Fn() -> u64 + Send + Sync>,
    cancel: CancellationToken,
) {
    loop {
        let batch = {
            let mut rx = batch_rx.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => return,
                batch = rx.recv() => match batch {
                    Some(batch) => batch,
                    None => return,
                },
            }
        };

        if !breaker.admit().await {
            debug!(worker_id, "inference client: circuit open, skipping batch");
            observability.verification_skipped();
            collector.release_batch().await;
            continue;
        }

        let started = Instant::now();
        let outcome = call_with_retry(&service, &batch, &config.inference, &cancel).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        observability.lane2_latency_ms(elapsed_ms);
        match outcome {
            Ok(frame_results) => {
                if let Some(new_state) = breaker.record_success().await {
                    observability.circuit_breaker_state(new_state);
                }
                let detections: Vec<Detection> = frame_results
                    .into_iter()
                    .filter_map(|result| match result.outcome {
                        FrameOutcome::Detections(ds) => Some(ds),
                        FrameOutcome::Error(_) => None,
                    })
                    .flatten()
                    .collect();

                let mut guard = state.lock().await;
                guard.integrate_batch(&detections, now_ms(), &config, observability.as_ref());
            }
            Err(InferenceTransportError::Permanent(msg)) => {
                warn!(worker_id, error = %msg, "inference client: permanent error");
                if let Some(new_state) = breaker.record_permanent_failure().await {
                    observability.circuit_breaker_state(new_state);
                }
            }
            Err(other) => {
                debug!(worker_id, error = %other, "inference client: batch abandoned after retries");
            }
        }

        collector.release_batch().await;
    }
}

/// Calls `service.detect` with the configured timeout, retrying
/// `Timeout`/`Transient` failures with exponential backoff up to
/// `max_retries` attempts. `Permanent` errors are never retried.
async fn call_with_retry(
    service: &Arc<dyn InferenceService>,
    batch: &BatchRequest,
    config: &InferenceConfig,
    cancel: &CancellationToken,
) -> Result<Vec<veilstream_contracts::FrameResult>, InferenceTransportError> {
    let mut attempt: u32 = 0;
    loop {
        let call = tokio::time::timeout(Duration::from_millis(config.detect_timeout_ms), service.detect(batch.clone()));

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(InferenceTransportError::Transient("cancelled".into())),
            result = call => result,
        };

        let transport_result = match result {
            Ok(inner) => inner,
            Err(_) => Err(InferenceTransportError::Timeout),
        };

        match transport_result {
            Ok(frame_results) => return Ok(frame_results),
            Err(InferenceTransportError::Permanent(msg)) => return Err(InferenceTransportError::Permanent(msg)),
            Err(retryable) => {
                attempt += 1;
                if attempt > config.max_retries {
                    return Err(retryable);
                }
                let backoff = backoff_duration(attempt, config);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(InferenceTransportError::Transient("cancelled".into())),
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }
}

fn backoff_duration(attempt: u32, config: &InferenceConfig) -> Duration {
    let base = config.backoff_base_ms.saturating_mul(1u64 << attempt.min(20));
    let capped = base.min(config.backoff_max_ms);
    let jittered = rand::thread_rng().gen_range(capped / 2..=capped.max(1));
    Duration::from_millis(jittered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32 as TestCounter, Ordering};
    use veilstream_contracts::{FrameRequest, FrameResult};
    use veilstream_model::{BBox, ClassId, Resolution, Sequence};

    struct AlwaysPermanent;

    #[async_trait]
    impl InferenceService for AlwaysPermanent {
        async fn detect(&self, _batch: BatchRequest) -> Result<Vec<FrameResult>, InferenceTransportError> {
            Err(InferenceTransportError::Permanent("boom".into()))
        }
    }

    struct CountingSuccess {
        calls: Arc<TestCounter>,
    }

    #[async_trait]
    impl InferenceService for CountingSuccess {
        async fn detect(&self, batch: BatchRequest) -> Result<Vec<FrameResult>, InferenceTransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(batch
                .frames
                .into_iter()
                .map(|f| FrameResult {
                    source_sequence: f.source_sequence,
                    outcome: FrameOutcome::Detections(vec![Detection::new(
                        BBox::new(10.0, 10.0, 5.0, 5.0),
                        ClassId(1),
                        0.9,
                        f.source_sequence,
                        f.resolution,
                    )]),
                })
                .collect())
        }
    }

    fn sample_batch() -> BatchRequest {
        BatchRequest {
            frames: vec![FrameRequest {
                source_sequence: Sequence(1),
                resolution: Resolution::new(640, 480),
                payload: vec![],
            }],
        }
    }

    #[tokio::test]
    async fn breaker_opens_after_permanent_failures_and_halts_calls() {
        let breaker = CircuitBreaker::new(2, Duration::from_millis(60_000));
        assert!(breaker.admit().await);
        assert!(breaker.record_permanent_failure().await.is_none());
        assert!(breaker.admit().await);
        assert_eq!(breaker.record_permanent_failure().await, Some(BreakerState::Open));
        assert!(!breaker.admit().await, "breaker should reject calls while open");
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_half_opens_after_cooldown_and_closes_on_success() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(1_000));
        breaker.admit().await;
        breaker.record_permanent_failure().await;
        assert!(!breaker.admit().await);

        tokio::time::advance(Duration::from_millis(1_100)).await;
        assert!(breaker.admit().await, "cooldown elapsed, should grant a probe");
        assert_eq!(breaker.record_success().await, Some(BreakerState::Closed));
        assert_eq!(breaker.snapshot().await, BreakerState::Closed);
    }

    #[tokio::test]
    async fn retry_gives_up_on_permanent_error_without_retrying() {
        let service: Arc<dyn InferenceService> = Arc::new(AlwaysPermanent);
        let config = InferenceConfig::default();
        let cancel = CancellationToken::new();
        let result = call_with_retry(&service, &sample_batch(), &config, &cancel).await;
        assert!(matches!(result, Err(InferenceTransportError::Permanent(_))));
    }

    #[tokio::test]
    async fn successful_call_returns_detections() {
        let calls = Arc::new(TestCounter::new(0));
        let service: Arc<dyn InferenceService> = Arc::new(CountingSuccess { calls: calls.clone() });
        let config = InferenceConfig::default();
        let cancel = CancellationToken::new();
        let result = call_with_retry(&service, &sample_batch(), &config, &cancel).await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
