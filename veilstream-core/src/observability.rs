//! In-process [`Observability`] implementations that ship with the core
//! itself, on top of the trait seam defined in `veilstream-contracts`.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use veilstream_contracts::{BreakerState, DropReason, FlushTrigger, Observability};

/// Records every call for assertions in tests, mirroring the pattern
/// `InProcJobEventBus` uses for recording subscriber-visible events
/// in-process rather than over a wire format.
#[derive(Debug, Default)]
pub struct RecordingObservability {
    pub frames_published: AtomicU64,
    pub frames_dropped: Mutex<Vec<DropReason>>,
    pub lane1_latencies_ms: Mutex<Vec<f64>>,
    pub lane2_latencies_ms: Mutex<Vec<f64>>,
    pub batches_flushed: Mutex<Vec<FlushTrigger>>,
    pub detections_observed: AtomicU64,
    pub active_tracks: AtomicUsize,
    pub active_regions: AtomicUsize,
    pub breaker_states: Mutex<Vec<BreakerState>>,
    pub verification_skipped: AtomicU64,
}

impl RecordingObservability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_published(&self) -> u64 {
        self.frames_published.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> Vec<DropReason> {
        self.frames_dropped.lock().expect("not poisoned").clone()
    }
}

impl Observability for RecordingObservability {
    fn frame_published(&self) {
        self.frames_published.fetch_add(1, Ordering::Relaxed);
    }

    fn frame_dropped(&self, reason: DropReason) {
        self.frames_dropped.lock().expect("not poisoned").push(reason);
    }

    fn lane1_latency_ms(&self, millis: f64) {
        self.lane1_latencies_ms.lock().expect("not poisoned").push(millis);
    }

    fn lane2_latency_ms(&self, millis: f64) {
        self.lane2_latencies_ms.lock().expect("not poisoned").push(millis);
    }

    fn batch_flushed(&self, trigger: FlushTrigger) {
        self.batches_flushed.lock().expect("not poisoned").push(trigger);
    }

    fn detections_observed(&self, count: usize) {
        self.detections_observed.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn active_tracks(&self, count: usize) {
        self.active_tracks.store(count, Ordering::Relaxed);
    }

    fn active_regions(&self, count: usize) {
        self.active_regions.store(count, Ordering::Relaxed);
    }

    fn circuit_breaker_state(&self, state: BreakerState) {
        self.breaker_states.lock().expect("not poisoned").push(state);
    }

    fn verification_skipped(&self) {
        self.verification_skipped.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_every_call() {
        let obs = RecordingObservability::new();
        obs.frame_published();
        obs.frame_dropped(DropReason::SinkBackpressure);
        obs.batch_flushed(FlushTrigger::Size);
        obs.circuit_breaker_state(BreakerState::Open);

        assert_eq!(obs.frames_published(), 1);
        assert_eq!(obs.frames_dropped(), vec![DropReason::SinkBackpressure]);
        assert_eq!(obs.batches_flushed.lock().unwrap().len(), 1);
        assert_eq!(obs.breaker_states.lock().unwrap().last(), Some(&BreakerState::Open));
    }
}
