use crate::detection::ClassId;
use crate::ids::{Sequence, TrackId};

/// State vector of the constant-velocity 8-D Kalman filter: center position,
/// aspect ratio, height, and their time derivatives.
///
/// Stored as named fields rather than a bare `[f32; 8]` so call sites read
/// like the physical quantities they are; the tracker's predict/update math
/// treats this as a flat vector internally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KalmanState8D {
    pub cx: f32,
    pub cy: f32,
    pub aspect: f32,
    pub height: f32,
    pub vcx: f32,
    pub vcy: f32,
    pub vaspect: f32,
    pub vheight: f32,
}

impl KalmanState8D {
    pub fn from_observation(cx: f32, cy: f32, aspect: f32, height: f32) -> Self {
        Self {
            cx,
            cy,
            aspect,
            height,
            vcx: 0.0,
            vcy: 0.0,
            vaspect: 0.0,
            vheight: 0.0,
        }
    }
}

/// Stateful record of one moving unsafe region, tracked frame-to-frame by
/// the Tracker Set. Ids are never reused within a room.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: TrackId,
    pub kalman_state: KalmanState8D,
    pub last_observed_sequence: Sequence,
    pub last_predict_sequence: Sequence,
    pub hit_count: u32,
    pub miss_count: u32,
    pub class_id: ClassId,
    pub created_at_ms: u64,
    /// Wall-clock time of the most recent observation, used to evict tracks
    /// that have gone stale even if `miss_count` hasn't crossed its bound
    /// yet (a gap in the frame stream itself, not just missed detections).
    pub last_observed_at_ms: u64,
}
