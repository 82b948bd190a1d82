//! Trait surfaces and wire contracts the moderation core depends on but does
//! not implement. Each trait here corresponds to one external collaborator:
//! the SFU transport, the signaling layer, the remote detector, and the
//! observability backend.

pub mod frame_buffer;
pub mod inference;
pub mod observability;
pub mod pipeline;
pub mod session_events;

pub use frame_buffer::FrameBuffer;
pub use inference::{
    BatchRequest, FrameErrorKind, FrameOutcome, FrameRequest, FrameResult, InferenceService,
    InferenceTransportError,
};
pub use observability::{BreakerState, DropReason, FlushTrigger, NoopObservability, Observability};
pub use pipeline::{BroadcastSource, PublishOutcome, SanitizedSink};
pub use session_events::{
    ParticipantRole, SessionLifecycleEvent, SignalEvent, SignalEventKind,
};
