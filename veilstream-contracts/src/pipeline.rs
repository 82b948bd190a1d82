use async_trait::async_trait;

use crate::frame_buffer::FrameBuffer;

/// A lazy, finite, non-restartable sequence of frames from the broadcaster's
/// video track. `next_frame` returning `None` means the broadcaster's
/// transport closed; the orchestrator treats that as a fatal session error
/// and begins draining.
///
/// Implementations must not block indefinitely without observing
/// cancellation; the Lane Orchestrator applies its own idle timeout
/// (`T_idle`) around calls to `next_frame`.
#[async_trait]
pub trait BroadcastSource: Send {
    type Frame: FrameBuffer;

    async fn next_frame(&mut self) -> Option<Self::Frame>;
}

/// Outcome of offering a published frame to the sanitized sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Ok,
    Backpressure,
}

/// The sink the Lane Orchestrator publishes sanitized frames to. Backpressure
/// is honored by dropping the frame, never by blocking Lane 1 past its
/// publish budget and never by regressing the Confidence Store's state.
#[async_trait]
pub trait SanitizedSink: Send {
    type Frame: FrameBuffer;

    async fn publish(&mut self, frame: Self::Frame) -> PublishOutcome;
}
