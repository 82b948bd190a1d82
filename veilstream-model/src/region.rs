use crate::detection::ClassId;
use crate::geometry::BBox;
use crate::ids::{Sequence, TrackId};

/// Lifecycle state of a [`Region`]: `Observed` while its backing Track is
/// fresh, `Coasting` while confidence has not yet decayed below the floor,
/// `Evicted` once it has.
///
/// `Observed` and `Coasting` are both rendered by Lane 1; `Evicted` is
/// terminal and is never returned from `getBlurRegions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    /// Linked to a live Track that was refreshed by a recent detection.
    Observed,
    /// The backing Track was evicted (or hasn't refreshed recently), but
    /// confidence has not yet decayed below the floor.
    Coasting,
    /// Decayed confidence crossed the floor. Terminal.
    Evicted,
}

/// A renderable blur directive, owned by the Confidence Store.
///
/// `confidence` is always the already-decayed, "effective" value; `bbox`
/// already includes the safety dilation. This is exactly what Lane 1 needs
/// to know to blur a frame and nothing more.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub bbox: BBox,
    pub confidence: f32,
    pub class_id: ClassId,
    pub linked_track_id: Option<TrackId>,
    pub last_refresh_seq: Sequence,
    pub state: RegionState,
}

impl Region {
    pub fn is_renderable(&self) -> bool {
        !matches!(self.state, RegionState::Evicted)
    }
}
