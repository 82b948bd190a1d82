//! Confidence Store (component D): owns Regions, applies the per-frame decay
//! step, and runs the Observed → Coasting → Evicted state machine.

use std::collections::HashMap;

use veilstream_config::{BlurConfig, ConfidenceConfig};
use veilstream_model::{Region, RegionState, Sequence, TrackId};

use crate::tracker::TrackUpdate;

/// Regions keyed by the `TrackId` they were created from. The key survives
/// the backing track's eviction (a Coasting region keeps its key) since
/// `TrackId`s are never reused within a room.
#[derive(Debug, Default)]
pub struct ConfidenceStore {
    regions: HashMap<TrackId, Region>,
}

impl ConfidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Multiplies every Region's confidence by `decay_rate`.
    pub fn decay_step(&mut self, config: &ConfidenceConfig) {
        for region in self.regions.values_mut() {
            region.confidence *= config.decay_rate;
        }
    }

    /// Applies a Lane-2 track update: creates a new Observed Region, or
    /// refreshes an existing one to `max(old, raw_confidence)` and re-bases
    /// its bbox on the track's corrected position, dilated for blur safety.
    pub fn refresh(&mut self, update: &TrackUpdate, seq: Sequence, blur: &BlurConfig) {
        let dilated = update.bbox.dilate(blur.dilation_px);
        self.regions
            .entry(update.track_id)
            .and_modify(|region| {
                region.confidence = region.confidence.max(update.raw_confidence);
                region.bbox = dilated;
                region.last_refresh_seq = seq;
                region.state = RegionState::Observed;
                region.linked_track_id = Some(update.track_id);
            })
            .or_insert(Region {
                bbox: dilated,
                confidence: update.raw_confidence,
                class_id: update.class_id,
                linked_track_id: Some(update.track_id),
                last_refresh_seq: seq,
                state: RegionState::Observed,
            });
    }

    /// Demotes Regions whose backing Track was just evicted to Coasting.
    /// They keep decaying; they're evicted outright only once confidence
    /// crosses the floor.
    pub fn demote_evicted_tracks(&mut self, evicted_track_ids: &[TrackId]) {
        for track_id in evicted_track_ids {
            if let Some(region) = self.regions.get_mut(track_id) {
                region.linked_track_id = None;
                if region.state == RegionState::Observed {
                    region.state = RegionState::Coasting;
                }
            }
        }
    }

    /// Drops Regions whose confidence has fallen below the floor. Returns
    /// how many were evicted, for observability.
    pub fn evict_below_floor(&mut self, config: &ConfidenceConfig) -> usize {
        let before = self.regions.len();
        self.regions
            .retain(|_, region| region.confidence >= config.min_confidence_floor);
        before - self.regions.len()
    }

    /// Snapshot of every still-renderable Region, bboxes clamped to the
    /// frame. Read-only; callers drive the decay/eviction cycle separately
    /// via [`ConfidenceStore::decay_step`] and
    /// [`ConfidenceStore::evict_below_floor`] so the decay-then-evict-then-
    /// snapshot ordering is explicit at the call site
    /// ([`crate::state::ModerationState::get_blur_regions`]).
    pub fn snapshot_clamped(&self, frame_w: f32, frame_h: f32) -> Vec<Region> {
        self.regions
            .values()
            .filter(|region| region.is_renderable())
            .map(|region| Region {
                bbox: region.bbox.clamp_to_frame(frame_w, frame_h),
                ..region.clone()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veilstream_model::{BBox, ClassId};

    fn update(track_id: TrackId, conf: f32) -> TrackUpdate {
        crate::tracker::TrackUpdate {
            track_id,
            bbox: BBox::new(100.0, 100.0, 50.0, 50.0),
            class_id: ClassId(1),
            raw_confidence: conf,
            is_new: true,
        }
    }

    #[test]
    fn refresh_creates_an_observed_region() {
        let mut store = ConfidenceStore::new();
        let blur = BlurConfig::default();
        store.refresh(&update(TrackId::from_raw(0), 0.9), Sequence(1), &blur);
        assert_eq!(store.len(), 1);
        let region = store.regions.values().next().unwrap();
        assert_eq!(region.state, RegionState::Observed);
        assert_eq!(region.confidence, 0.9);
    }

    #[test]
    fn refresh_never_lowers_confidence() {
        let mut store = ConfidenceStore::new();
        let blur = BlurConfig::default();
        let track_id = TrackId::from_raw(0);
        store.refresh(&update(track_id, 0.9), Sequence(1), &blur);
        store.refresh(&update(track_id, 0.2), Sequence(2), &blur);
        assert_eq!(store.regions[&track_id].confidence, 0.9);
    }

    #[test]
    fn decay_step_multiplies_confidence() {
        let mut store = ConfidenceStore::new();
        let blur = BlurConfig::default();
        let config = ConfidenceConfig {
            decay_rate: 0.5,
            min_confidence_floor: 0.1,
        };
        store.refresh(&update(TrackId::from_raw(0), 0.8), Sequence(1), &blur);
        store.decay_step(&config);
        let region = store.regions.values().next().unwrap();
        assert!((region.confidence - 0.4).abs() < 1e-6);
    }

    #[test]
    fn eviction_drops_regions_below_floor() {
        let mut store = ConfidenceStore::new();
        let blur = BlurConfig::default();
        let config = ConfidenceConfig {
            decay_rate: 0.1,
            min_confidence_floor: 0.3,
        };
        store.refresh(&update(TrackId::from_raw(0), 0.8), Sequence(1), &blur);
        store.decay_step(&config);
        let evicted = store.evict_below_floor(&config);
        assert_eq!(evicted, 1);
        assert!(store.len() == 0);
    }

    #[test]
    fn demoting_an_evicted_track_moves_region_to_coasting() {
        let mut store = ConfidenceStore::new();
        let blur = BlurConfig::default();
        let track_id = TrackId::from_raw(0);
        store.refresh(&update(track_id, 0.9), Sequence(1), &blur);
        store.demote_evicted_tracks(&[track_id]);
        assert_eq!(store.regions[&track_id].state, RegionState::Coasting);
        assert!(store.regions[&track_id].linked_track_id.is_none());
    }
}
