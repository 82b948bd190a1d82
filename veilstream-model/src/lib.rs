//! Shared data model for the veilstream moderation pipeline.
//!
//! Plain types only: no async, no I/O, no locking. `veilstream-core` builds
//! the Tracker Set, Confidence Store, Batch Collector, Inference Client, and
//! Lane Orchestrator algorithms on top of these.

pub mod detection;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod ids;
pub mod region;
pub mod track;

pub use detection::{ClassId, Detection};
pub use error::{ModelError, Result};
pub use frame::{FrameMeta, Resolution};
pub use geometry::BBox;
pub use ids::{ParticipantId, RoomId, Sequence, TrackId, TrackIdAllocator};
pub use region::{Region, RegionState};
pub use track::{KalmanState8D, Track};
