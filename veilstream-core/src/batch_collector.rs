//! Batch Collector (component B): time- and size-triggered accumulator that
//! turns individually offered frames into detector-sized batches, with
//! admission control against a configurable number of in-flight batches.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, trace};

use veilstream_config::BatchConfig;
use veilstream_contracts::{BatchRequest, FlushTrigger, FrameRequest, Observability};

/// Outcome of [`BatchCollector::offer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOutcome {
    Accepted,
    Dropped(DropKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropKind {
    QueueFull,
    Shutdown,
}

struct Inner {
    current: VecDeque<FrameRequest>,
    oldest_deadline: Option<Instant>,
    pending_batches: usize,
    shutting_down: bool,
}

impl Inner {
    fn flush(&mut self) -> Option<BatchRequest> {
        if self.current.is_empty() {
            return None;
        }
        let frames: Vec<FrameRequest> = self.current.drain(..).collect();
        self.oldest_deadline = None;
        self.pending_batches += 1;
        Some(BatchRequest { frames })
    }
}

/// Accumulates frames into [`BatchRequest`]s and hands completed batches to
/// the Inference Client over an internal channel. Owns a single background
/// task that enforces `max_wait_ms` staleness — the one timer context this
/// collector runs.
pub struct BatchCollector {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
    config: BatchConfig,
    batch_tx: mpsc::UnboundedSender<BatchRequest>,
    observability: Arc<dyn Observability>,
    timer_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl BatchCollector {
    pub fn new(
        config: BatchConfig,
        batch_tx: mpsc::UnboundedSender<BatchRequest>,
        observability: Arc<dyn Observability>,
    ) -> Arc<Self> {
        let inner = Arc::new(Mutex::new(Inner {
            current: VecDeque::new(),
            oldest_deadline: None,
            pending_batches: 0,
            shutting_down: false,
        }));
        let notify = Arc::new(Notify::new());

        let collector = Arc::new(Self {
            inner: inner.clone(),
            notify: notify.clone(),
            config,
            batch_tx: batch_tx.clone(),
            observability: observability.clone(),
            timer_task: Mutex::new(None),
        });

        let handle = tokio::spawn(run_flush_timer(inner, notify, batch_tx, observability));

        // `try_lock` is safe here: nothing else can have touched this mutex
        // yet, the Arc was just created above.
        *collector
            .timer_task
            .try_lock()
            .expect("freshly constructed collector's timer_task mutex is uncontended") = Some(handle);

        collector
    }

    /// Offers one frame to the current batch. Returns immediately; never
    /// blocks on the Inference Client.
    ///
    /// While the Inference Client's admission limit is saturated
    /// (`pending_batches >= max_pending_batches`), flushing would only grow
    /// the backlog further, so the window keeps accumulating without
    /// flushing instead: once it reaches `max_batch_size`, the oldest
    /// offered frame is evicted to make room for the one just offered,
    /// preferring to drop stale frames over fresh ones. Only once the
    /// window itself has no frame to evict (`max_batch_size` configured as
    /// 0) does the newest frame get dropped instead.
    pub async fn offer(&self, frame: FrameRequest) -> OfferOutcome {
        let mut inner = self.inner.lock().await;

        if inner.shutting_down {
            return OfferOutcome::Dropped(DropKind::Shutdown);
        }

        let at_capacity = inner.pending_batches >= self.config.max_pending_batches;

        if at_capacity && inner.current.len() >= self.config.max_batch_size {
            match inner.current.pop_front() {
                Some(evicted) => trace!(
                    evicted_sequence = evicted.source_sequence.0,
                    sequence = frame.source_sequence.0,
                    "batch collector: queue full, evicting oldest offered frame to keep newest"
                ),
                None => {
                    trace!(
                        sequence = frame.source_sequence.0,
                        "batch collector: queue full, dropping newest frame"
                    );
                    return OfferOutcome::Dropped(DropKind::QueueFull);
                }
            }
        }

        if inner.current.is_empty() {
            inner.oldest_deadline = Some(Instant::now() + Duration::from_millis(self.config.max_wait_ms));
            self.notify.notify_one();
        }
        inner.current.push_back(frame);

        if !at_capacity && inner.current.len() >= self.config.max_batch_size {
            if let Some(batch) = inner.flush() {
                debug!(frames = batch.frames.len(), trigger = %FlushTrigger::Size, "batch collector: flushing");
                self.observability.batch_flushed(FlushTrigger::Size);
                let _ = self.batch_tx.send(batch);
            }
        }

        OfferOutcome::Accepted
    }

    /// Releases one pending-batch admission slot. Called by the Inference
    /// Client once a batch's result (success, exhausted retries, or a
    /// dropped-on-circuit-open rejection) has been handled.
    pub async fn release_batch(&self) {
        let mut inner = self.inner.lock().await;
        inner.pending_batches = inner.pending_batches.saturating_sub(1);
    }

    /// Cooperative shutdown: stops admitting new frames and releases the
    /// background timer task. Safe to call more than once.
    pub async fn shutdown(&self) {
        {
            let mut inner = self.inner.lock().await;
            if inner.shutting_down {
                return;
            }
            inner.shutting_down = true;
        }
        self.notify.notify_one();
        if let Some(handle) = self.timer_task.lock().await.take() {
            handle.abort();
        }
    }
}

async fn run_flush_timer(
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
    batch_tx: mpsc::UnboundedSender<BatchRequest>,
    observability: Arc<dyn Observability>,
) {
    loop {
        let wait = {
            let guard = inner.lock().await;
            if guard.shutting_down {
                return;
            }
            match guard.oldest_deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => Duration::from_secs(3600),
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = notify.notified() => { continue; }
        }

        let flushed = {
            let mut guard = inner.lock().await;
            if guard.shutting_down {
                return;
            }
            let due = guard
                .oldest_deadline
                .is_some_and(|deadline| Instant::now() >= deadline);
            if due {
                guard.flush()
            } else {
                None
            }
        };

        if let Some(batch) = flushed {
            debug!(frames = batch.frames.len(), trigger = %FlushTrigger::Time, "batch collector: flushing");
            observability.batch_flushed(FlushTrigger::Time);
            if batch_tx.send(batch).is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veilstream_contracts::NoopObservability;
    use veilstream_model::{Resolution, Sequence};

    fn frame(seq: u64) -> FrameRequest {
        FrameRequest {
            source_sequence: Sequence(seq),
            resolution: Resolution::new(640, 480),
            payload: vec![0u8; 4],
        }
    }

    #[tokio::test]
    async fn size_trigger_flushes_immediately() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut config = BatchConfig::default();
        config.max_batch_size = 2;
        let collector = BatchCollector::new(config, tx, Arc::new(NoopObservability));

        assert_eq!(collector.offer(frame(0)).await, OfferOutcome::Accepted);
        assert_eq!(collector.offer(frame(1)).await, OfferOutcome::Accepted);

        let batch = rx.recv().await.expect("batch should have been flushed on size");
        assert_eq!(batch.frames.len(), 2);
        collector.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn time_trigger_flushes_after_max_wait() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut config = BatchConfig::default();
        config.max_wait_ms = 30;
        config.max_batch_size = 8;
        let collector = BatchCollector::new(config, tx, Arc::new(NoopObservability));

        collector.offer(frame(0)).await;
        tokio::time::advance(Duration::from_millis(40)).await;

        let batch = rx.recv().await.expect("batch should have been flushed on the timer");
        assert_eq!(batch.frames.len(), 1);
        collector.shutdown().await;
    }

    #[tokio::test]
    async fn queue_full_with_zero_batch_size_drops_newest_frame() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut config = BatchConfig::default();
        config.max_batch_size = 0;
        config.max_pending_batches = 0;
        let collector = BatchCollector::new(config, tx, Arc::new(NoopObservability));

        // At capacity from the very first offer, and a zero-size window
        // leaves nothing to evict, so the newest frame is dropped.
        let outcome = collector.offer(frame(0)).await;
        assert_eq!(outcome, OfferOutcome::Dropped(DropKind::QueueFull));
        collector.shutdown().await;
    }

    #[tokio::test]
    async fn queue_full_evicts_oldest_accumulated_frame_to_keep_newest() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut config = BatchConfig::default();
        config.max_batch_size = 2;
        config.max_pending_batches = 1;
        let collector = BatchCollector::new(config, tx, Arc::new(NoopObservability));

        // Fills and flushes one batch, consuming the only pending-batch
        // admission slot.
        assert_eq!(collector.offer(frame(0)).await, OfferOutcome::Accepted);
        assert_eq!(collector.offer(frame(1)).await, OfferOutcome::Accepted);
        let first = rx.recv().await.expect("size-triggered flush");
        assert_eq!(first.frames.len(), 2);

        // Still over the pending-batch limit: the window keeps accepting
        // frames instead of flushing, evicting the oldest once it is full
        // rather than rejecting what just arrived.
        assert_eq!(collector.offer(frame(2)).await, OfferOutcome::Accepted);
        assert_eq!(collector.offer(frame(3)).await, OfferOutcome::Accepted);
        assert_eq!(collector.offer(frame(4)).await, OfferOutcome::Accepted);

        // Admission frees up and the window flushes: frame 2 was evicted
        // along the way, so only the frames that survived come through.
        collector.release_batch().await;
        assert_eq!(collector.offer(frame(5)).await, OfferOutcome::Accepted);
        let second = rx.recv().await.expect("flush once admission frees up");
        let sequences: Vec<u64> = second.frames.iter().map(|f| f.source_sequence.0).collect();
        assert_eq!(sequences, vec![3, 4, 5]);
        assert!(!sequences.contains(&2));

        collector.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_rejects_further_offers() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let collector = BatchCollector::new(BatchConfig::default(), tx, Arc::new(NoopObservability));
        collector.shutdown().await;
        assert_eq!(collector.offer(frame(0)).await, OfferOutcome::Dropped(DropKind::Shutdown));
    }
}
