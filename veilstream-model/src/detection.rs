use crate::frame::Resolution;
use crate::geometry::BBox;
use crate::ids::Sequence;

/// A content class a detector can flag. Left as an opaque small integer;
/// the mapping to human-readable labels belongs to the detector service,
/// not the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClassId(pub u32);

/// One unsafe-region observation returned by the Inference Client.
///
/// `source_sequence` ties the detection back to the exact broadcast frame it
/// was computed from, independent of when the batch containing it actually
/// returns.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BBox,
    pub class_id: ClassId,
    pub raw_confidence: f32,
    pub source_sequence: Sequence,
    /// Resolution the bbox coordinates are expressed in, i.e. the
    /// resolution the source frame was submitted to the detector at.
    pub submit_resolution: Resolution,
}

impl Detection {
    pub fn new(
        bbox: BBox,
        class_id: ClassId,
        raw_confidence: f32,
        source_sequence: Sequence,
        submit_resolution: Resolution,
    ) -> Self {
        Self {
            bbox,
            class_id,
            raw_confidence: raw_confidence.clamp(0.0, 1.0),
            source_sequence,
            submit_resolution,
        }
    }
}
