//! Tracker Set (component C): constant-velocity prediction of known unsafe
//! regions plus greedy-IoU association of new detections onto them.

use std::collections::HashMap;

use veilstream_config::TrackerConfig;
use veilstream_model::{BBox, ClassId, Detection, KalmanState8D, Sequence, Track, TrackId, TrackIdAllocator};

fn step_state(state: &KalmanState8D, dt: f32) -> KalmanState8D {
    KalmanState8D {
        cx: state.cx + state.vcx * dt,
        cy: state.cy + state.vcy * dt,
        aspect: state.aspect + state.vaspect * dt,
        height: state.height + state.vheight * dt,
        ..*state
    }
}

fn state_to_bbox(state: &KalmanState8D) -> BBox {
    BBox::from_center_aspect_height(state.cx, state.cy, state.aspect, state.height)
}

/// One track's predicted position, as of the sequence last asked for via
/// [`TrackerSet::predict_to`].
#[derive(Debug, Clone, Copy)]
pub struct PredictedTrack {
    pub track_id: TrackId,
    pub bbox: BBox,
    pub class_id: ClassId,
}

/// What happened to a track as a result of integrating one detection.
#[derive(Debug, Clone, Copy)]
pub struct TrackUpdate {
    pub track_id: TrackId,
    /// The track's bbox immediately after applying the correction; this is
    /// what the Confidence Store dilates and stores as the Region's bbox.
    pub bbox: BBox,
    pub class_id: ClassId,
    pub raw_confidence: f32,
    pub is_new: bool,
}

/// Live multi-object tracker for one room. Owns every [`Track`] and runs the
/// constant-velocity predict/update cycle plus greedy-IoU association. Not
/// thread-safe on its own; callers serialize access
/// (see [`crate::state::ModerationState`]).
#[derive(Debug, Default)]
pub struct TrackerSet {
    tracks: HashMap<TrackId, Track>,
    allocator: TrackIdAllocator,
}

impl TrackerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    /// Advances every live track's Kalman state to `seq` and returns the
    /// predicted bbox for each. Deterministic given the stored state; safe
    /// to call more than once for the same `seq` (idempotent, I3/I4).
    pub fn predict_to(&mut self, seq: Sequence) -> Vec<PredictedTrack> {
        let mut out = Vec::with_capacity(self.tracks.len());
        for track in self.tracks.values_mut() {
            let dt = seq.0 as i64 - track.last_predict_sequence.0 as i64;
            if dt != 0 {
                track.kalman_state = step_state(&track.kalman_state, dt as f32);
                track.last_predict_sequence = seq;
            }
            out.push(PredictedTrack {
                track_id: track.id,
                bbox: state_to_bbox(&track.kalman_state),
                class_id: track.class_id,
            });
        }
        out
    }

    /// Associates `detections` to existing tracks by greedy IoU (same class
    /// only, ties broken by highest IoU), creates new tracks for anything
    /// left unmatched, and applies the alpha-beta correction to matched
    /// tracks. Tracks that received no match this round have their
    /// `miss_count` incremented.
    ///
    /// `source_sequence` may be behind the tracker's current predict
    /// horizon (a late-arriving batch); the correction is still applied,
    /// but it corrects the track's *current* state rather than rewriting
    /// history.
    pub fn integrate(&mut self, detections: &[Detection], config: &TrackerConfig, now_ms: u64) -> Vec<TrackUpdate> {
        let matches = self.associate(detections, config.iou_assoc_threshold);
        let mut matched_track_ids = std::collections::HashSet::new();
        let mut updates = Vec::with_capacity(detections.len());

        for (det_idx, track_id) in &matches {
            let detection = &detections[*det_idx];
            matched_track_ids.insert(*track_id);
            let update = self.apply_observation(*track_id, detection, config, now_ms, false);
            updates.push(update);
        }

        let matched_det_indices: std::collections::HashSet<usize> =
            matches.iter().map(|(det_idx, _)| *det_idx).collect();
        for (det_idx, detection) in detections.iter().enumerate() {
            if matched_det_indices.contains(&det_idx) {
                continue;
            }
            let track_id = self.allocator.next();
            self.tracks.insert(
                track_id,
                Track {
                    id: track_id,
                    kalman_state: KalmanState8D::from_observation(
                        detection.bbox.center().0,
                        detection.bbox.center().1,
                        detection.bbox.aspect(),
                        detection.bbox.h,
                    ),
                    last_observed_sequence: detection.source_sequence,
                    last_predict_sequence: detection.source_sequence,
                    hit_count: 1,
                    miss_count: 0,
                    class_id: detection.class_id,
                    created_at_ms: now_ms,
                    last_observed_at_ms: now_ms,
                },
            );
            updates.push(self.apply_observation(track_id, detection, config, now_ms, true));
        }

        for (id, track) in self.tracks.iter_mut() {
            if !matched_track_ids.contains(id) {
                track.miss_count += 1;
            }
        }

        updates
    }

    /// Evicts tracks whose `miss_count` or staleness exceed the configured
    /// bounds. Returns the evicted ids so the Confidence Store can demote
    /// their linked Regions to coasting.
    pub fn evict_stale(&mut self, config: &TrackerConfig, now_ms: u64) -> Vec<TrackId> {
        let mut evicted = Vec::new();
        self.tracks.retain(|id, track| {
            let stale_by_misses = track.miss_count > config.max_missed_frames;
            let stale_by_age = now_ms.saturating_sub(track.last_observed_at_ms) > config.max_track_age_ms;
            let keep = !(stale_by_misses || stale_by_age);
            if !keep {
                evicted.push(*id);
            }
            keep
        });
        evicted
    }

    fn apply_observation(
        &mut self,
        track_id: TrackId,
        detection: &Detection,
        config: &TrackerConfig,
        now_ms: u64,
        is_new: bool,
    ) -> TrackUpdate {
        let track = self
            .tracks
            .get_mut(&track_id)
            .expect("track_id was just inserted or came from association against self.tracks");

        if !is_new {
            let dt = detection.source_sequence.0 as i64 - track.last_predict_sequence.0 as i64;
            let predicted_at_obs = step_state(&track.kalman_state, dt as f32);

            let (obs_cx, obs_cy) = detection.bbox.center();
            let obs_aspect = detection.bbox.aspect();
            let obs_height = detection.bbox.h;

            let res_cx = obs_cx - predicted_at_obs.cx;
            let res_cy = obs_cy - predicted_at_obs.cy;
            let res_aspect = obs_aspect - predicted_at_obs.aspect;
            let res_height = obs_height - predicted_at_obs.height;

            let elapsed = detection
                .source_sequence
                .steps_since(track.last_observed_sequence)
                .max(1) as f32;
            let vg = config.velocity_gain / elapsed;
            let pg = config.position_gain;

            track.kalman_state.cx += pg * res_cx;
            track.kalman_state.cy += pg * res_cy;
            track.kalman_state.aspect += pg * res_aspect;
            track.kalman_state.height += pg * res_height;
            track.kalman_state.vcx += vg * res_cx;
            track.kalman_state.vcy += vg * res_cy;
            track.kalman_state.vaspect += vg * res_aspect;
            track.kalman_state.vheight += vg * res_height;

            track.hit_count += 1;
            track.miss_count = 0;
            if detection.source_sequence.0 > track.last_observed_sequence.0 {
                track.last_observed_sequence = detection.source_sequence;
            }
            track.last_observed_at_ms = track.last_observed_at_ms.max(now_ms);
        }

        TrackUpdate {
            track_id,
            bbox: state_to_bbox(&track.kalman_state),
            class_id: track.class_id,
            raw_confidence: detection.raw_confidence,
            is_new,
        }
    }

    /// Greedy highest-IoU association, restricted to same-class pairs.
    /// Returns `(detection_index, track_id)` pairs; every detection and
    /// track appears at most once.
    fn associate(&self, detections: &[Detection], threshold: f32) -> Vec<(usize, TrackId)> {
        let mut candidates: Vec<(f32, usize, TrackId)> = Vec::new();
        for (det_idx, detection) in detections.iter().enumerate() {
            for track in self.tracks.values() {
                if track.class_id != detection.class_id {
                    continue;
                }
                let track_bbox = state_to_bbox(&track.kalman_state);
                let iou = detection.bbox.iou(&track_bbox);
                if iou >= threshold {
                    candidates.push((iou, det_idx, track.id));
                }
            }
        }
        candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut used_dets = std::collections::HashSet::new();
        let mut used_tracks = std::collections::HashSet::new();
        let mut matches = Vec::new();
        for (_, det_idx, track_id) in candidates {
            if used_dets.contains(&det_idx) || used_tracks.contains(&track_id) {
                continue;
            }
            used_dets.insert(det_idx);
            used_tracks.insert(track_id);
            matches.push((det_idx, track_id));
        }
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veilstream_model::{ClassId, Resolution};

    fn detection_at(x: f32, y: f32, seq: u64, conf: f32) -> Detection {
        Detection::new(
            BBox::new(x, y, 50.0, 50.0),
            ClassId(1),
            conf,
            Sequence(seq),
            Resolution::new(640, 480),
        )
    }

    #[test]
    fn unmatched_detection_creates_a_new_track() {
        let mut tracker = TrackerSet::new();
        let config = TrackerConfig::default();
        let updates = tracker.integrate(&[detection_at(100.0, 100.0, 1, 0.9)], &config, 0);
        assert_eq!(updates.len(), 1);
        assert!(updates[0].is_new);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn overlapping_detection_updates_the_same_track_without_duplicating() {
        let mut tracker = TrackerSet::new();
        let config = TrackerConfig::default();
        tracker.integrate(&[detection_at(100.0, 100.0, 1, 0.9)], &config, 0);
        let updates = tracker.integrate(&[detection_at(102.0, 101.0, 2, 0.8)], &config, 33);
        assert_eq!(tracker.len(), 1, "second detection should update the existing track");
        assert!(!updates[0].is_new);
    }

    #[test]
    fn two_overlapping_detections_of_same_class_resolve_to_one_track() {
        // Scenario 6: two detections with IoU > threshold, same class, in a
        // single batch — the associator must not create two tracks.
        let mut tracker = TrackerSet::new();
        let config = TrackerConfig::default();
        tracker.integrate(&[detection_at(100.0, 100.0, 1, 0.9)], &config, 0);
        let second_batch = vec![detection_at(103.0, 99.0, 2, 0.85)];
        tracker.integrate(&second_batch, &config, 33);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn miss_count_increments_without_a_matching_detection() {
        let mut tracker = TrackerSet::new();
        let config = TrackerConfig::default();
        tracker.integrate(&[detection_at(100.0, 100.0, 1, 0.9)], &config, 0);
        tracker.integrate(&[], &config, 33);
        let track = tracker.tracks.values().next().unwrap();
        assert_eq!(track.miss_count, 1);
    }

    #[test]
    fn track_is_evicted_after_max_missed_frames() {
        let mut tracker = TrackerSet::new();
        let mut config = TrackerConfig::default();
        config.max_missed_frames = 2;
        tracker.integrate(&[detection_at(100.0, 100.0, 1, 0.9)], &config, 0);
        for _ in 0..3 {
            tracker.integrate(&[], &config, 0);
        }
        let evicted = tracker.evict_stale(&config, 0);
        assert_eq!(evicted.len(), 1);
        assert!(tracker.is_empty());
    }

    #[test]
    fn predict_to_advances_position_by_velocity() {
        let mut tracker = TrackerSet::new();
        let config = TrackerConfig::default();
        // Two refreshes 10 sequences apart, moving +50px in x, teach it a
        // velocity of 5px/sequence.
        tracker.integrate(&[detection_at(0.0, 100.0, 0, 0.9)], &config, 0);
        tracker.integrate(&[detection_at(50.0, 100.0, 10, 0.9)], &config, 330);
        let predicted = tracker.predict_to(Sequence(20));
        assert_eq!(predicted.len(), 1);
        // Loose bound: alpha-beta converges toward but not exactly onto the
        // true velocity after a single correction.
        assert!(predicted[0].bbox.x > 50.0);
    }
}
