use std::fmt;

/// Why a frame was dropped instead of published, for
/// `frames_dropped_total{reason}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The sanitized sink returned `Backpressure`.
    SinkBackpressure,
    /// The sink's `publish` call did not return within `publish_timeout_ms`.
    SinkTimeout,
    /// Blur application failed outright (not even the whole-frame fallback
    /// succeeded).
    BlurFailure,
    /// The broadcast source yielded nothing before the idle timeout
    /// elapsed; there was no frame to publish this tick.
    SourceIdle,
}

/// What triggered a Batch Collector flush, for
/// `batches_flushed_total{trigger}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Size,
    Time,
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushTrigger::Size => write!(f, "size"),
            FlushTrigger::Time => write!(f, "time"),
        }
    }
}

/// Circuit breaker state for `circuit_breaker_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// The egress observability surface. Non-contractual in the sense
/// that nothing in the core depends on what an implementation does with
/// these calls, but every counter and histogram the pipeline emits is
/// reachable through this trait.
pub trait Observability: Send + Sync {
    fn frame_published(&self);
    fn frame_dropped(&self, reason: DropReason);
    fn lane1_latency_ms(&self, millis: f64);
    fn lane2_latency_ms(&self, millis: f64);
    fn batch_flushed(&self, trigger: FlushTrigger);
    fn detections_observed(&self, count: usize);
    fn active_tracks(&self, count: usize);
    fn active_regions(&self, count: usize);
    fn circuit_breaker_state(&self, state: BreakerState);
    fn verification_skipped(&self);
}

/// Observability sink that discards everything. The safe default for a
/// `Session` that hasn't been wired to a real backend yet.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObservability;

impl Observability for NoopObservability {
    fn frame_published(&self) {}
    fn frame_dropped(&self, _reason: DropReason) {}
    fn lane1_latency_ms(&self, _millis: f64) {}
    fn lane2_latency_ms(&self, _millis: f64) {}
    fn batch_flushed(&self, _trigger: FlushTrigger) {}
    fn detections_observed(&self, _count: usize) {}
    fn active_tracks(&self, _count: usize) {}
    fn active_regions(&self, _count: usize) {}
    fn circuit_breaker_state(&self, _state: BreakerState) {}
    fn verification_skipped(&self) {}
}
