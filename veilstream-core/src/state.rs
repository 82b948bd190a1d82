//! Lane 3: the Tracker Set and Confidence Store bundled behind a single
//! exclusive lock. This is the only state shared between the Lane-1 and
//! Lane-2 contexts of a [`crate::session::Session`].

use veilstream_config::ModerationConfig;
use veilstream_contracts::{BreakerState, Observability};
use veilstream_model::{Detection, Region, Sequence, TrackId};

use crate::confidence::ConfidenceStore;
use crate::tracker::TrackerSet;

/// Combined Tracker Set + Confidence Store. Every public method here takes
/// the exclusive lock for its whole duration when reached through
/// [`crate::session::Session`] — `get_blur_regions` for predict+decay+
/// snapshot, `integrate_batch` for the Lane-2 update.
#[derive(Debug, Default)]
pub struct ModerationState {
    tracker: TrackerSet,
    confidence: ConfidenceStore,
    last_decayed_seq: Option<Sequence>,
}

impl ModerationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_tracks(&self) -> usize {
        self.tracker.len()
    }

    pub fn active_regions(&self) -> usize {
        self.confidence.len()
    }

    /// Lane 1's per-frame call: predicts every live
    /// track to `seq`, applies one decay step if `seq` is new, clamps
    /// bboxes to the frame, and returns the renderable set. Idempotent when
    /// called twice for the same `seq` with no intervening mutation, since
    /// both `predict_to` and the decay guard are no-ops on repeat.
    pub fn get_blur_regions(&mut self, seq: Sequence, frame_w: f32, frame_h: f32, config: &ModerationConfig) -> Vec<Region> {
        self.tracker.predict_to(seq);

        if self.last_decayed_seq != Some(seq) {
            self.confidence.decay_step(&config.confidence);
            self.confidence.evict_below_floor(&config.confidence);
            self.last_decayed_seq = Some(seq);
        }

        self.confidence.snapshot_clamped(frame_w, frame_h)
    }

    /// Lane 2's integration of one verified batch:
    /// associates detections, refreshes or creates Regions, evicts stale
    /// tracks, and demotes their Regions to coasting. Keyed by
    /// `source_sequence`, so out-of-order and duplicate batch arrivals are
    /// both safe.
    pub fn integrate_batch(
        &mut self,
        detections: &[Detection],
        now_ms: u64,
        config: &ModerationConfig,
        observability: &dyn Observability,
    ) {
        if detections.is_empty() {
            return;
        }
        let seq = detections
            .iter()
            .map(|d| d.source_sequence)
            .max_by_key(|s| s.0)
            .unwrap_or(Sequence::ZERO);

        let updates = self.tracker.integrate(detections, &config.tracker, now_ms);
        for update in &updates {
            self.confidence.refresh(update, seq, &config.blur);
        }

        let evicted: Vec<TrackId> = self.tracker.evict_stale(&config.tracker, now_ms);
        self.confidence.demote_evicted_tracks(&evicted);
        self.confidence.evict_below_floor(&config.confidence);

        observability.detections_observed(detections.len());
        observability.active_tracks(self.tracker.len());
        observability.active_regions(self.confidence.len());
    }

    pub fn report_breaker_state(&self, observability: &dyn Observability, state: BreakerState) {
        observability.circuit_breaker_state(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veilstream_contracts::NoopObservability;
    use veilstream_model::{BBox, ClassId, Resolution};

    fn detection_at(x: f32, y: f32, seq: u64, conf: f32) -> Detection {
        Detection::new(
            BBox::new(x, y, 50.0, 50.0),
            ClassId(7),
            conf,
            Sequence(seq),
            Resolution::new(640, 480),
        )
    }

    #[test]
    fn get_blur_regions_is_idempotent_for_the_same_sequence() {
        let mut state = ModerationState::new();
        let config = ModerationConfig::default();
        state.integrate_batch(&[detection_at(100.0, 100.0, 1, 0.9)], 0, &config, &NoopObservability);

        let first = state.get_blur_regions(Sequence(5), 640.0, 480.0, &config);
        let second = state.get_blur_regions(Sequence(5), 640.0, 480.0, &config);
        assert_eq!(first.len(), second.len());
        assert!((first[0].confidence - second[0].confidence).abs() < 1e-9);
    }

    #[test]
    fn static_region_stays_centered_across_many_frames() {
        let mut state = ModerationState::new();
        let config = ModerationConfig::default();
        for seq in 0..300u64 {
            if seq % 2 == 0 {
                state.integrate_batch(
                    &[detection_at(100.0, 100.0, seq, 0.9)],
                    seq * 33,
                    &config,
                    &NoopObservability,
                );
            }
            let regions = state.get_blur_regions(Sequence(seq), 1920.0, 1080.0, &config);
            assert_eq!(regions.len(), 1, "frame {seq} should carry exactly one region");
            let (cx, cy) = regions[0].bbox.center();
            assert!((cx - 125.0).abs() <= 2.0, "frame {seq}: cx={cx}");
            assert!((cy - 125.0).abs() <= 2.0, "frame {seq}: cy={cy}");
        }
    }

    #[test]
    fn out_of_order_batches_integrate_by_source_sequence() {
        // Scenario 4: B2 (frames 8-15, detection at 8) returns before B1
        // (frames 0-7, no detections). The region must be present from
        // frame 8 onward regardless of arrival order.
        let mut state = ModerationState::new();
        let config = ModerationConfig::default();

        for seq in 0..8u64 {
            let _ = state.get_blur_regions(Sequence(seq), 640.0, 480.0, &config);
        }
        state.integrate_batch(&[detection_at(100.0, 100.0, 8, 0.9)], 8 * 33, &config, &NoopObservability);
        state.integrate_batch(&[], 7 * 33, &config, &NoopObservability);

        let regions = state.get_blur_regions(Sequence(9), 640.0, 480.0, &config);
        assert_eq!(regions.len(), 1);
    }

    #[test]
    fn detector_outage_decays_region_to_the_floor_and_then_stops_rendering() {
        let mut state = ModerationState::new();
        let config = ModerationConfig::default();
        state.integrate_batch(&[detection_at(100.0, 100.0, 10, 0.9)], 330, &config, &NoopObservability);

        let decay = config.confidence.decay_rate as f64;
        let floor = config.confidence.min_confidence_floor as f64;
        let horizon = ((floor / 0.9).ln() / decay.ln()).floor() as u64;

        for step in 1..=horizon {
            let seq = Sequence(10 + step);
            let regions = state.get_blur_regions(seq, 640.0, 480.0, &config);
            assert_eq!(regions.len(), 1, "region should still be blurred at step {step}");
        }
        let regions = state.get_blur_regions(Sequence(10 + horizon + 1), 640.0, 480.0, &config);
        assert!(regions.is_empty(), "region should have expired past the decay horizon");
    }
}
