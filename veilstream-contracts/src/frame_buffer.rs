use veilstream_model::{BBox, FrameMeta};

/// The frame type itself is owned by the collaborator that sits between the
/// SFU transport and this core; the core only ever touches it through this
/// trait.
///
/// A `FrameBuffer` is held by the pipeline for the duration of one pass and
/// is never retained past that.
pub trait FrameBuffer: Send + 'static {
    fn meta(&self) -> FrameMeta;

    /// Produces an independent copy so Lane 1 can blur one copy per region
    /// while the original (pre-blur) frame is offered to the Batch
    /// Collector unmodified.
    fn try_clone(&self) -> Option<Self>
    where
        Self: Sized;

    /// Pixelates `region`, clamped to the frame bounds by the caller before
    /// this is invoked. `pixel_size` is the pixelation granularity.
    fn blur_pixelate(&mut self, region: BBox, pixel_size: u32);

    /// Gaussian-blurs `region`, clamped to the frame bounds by the caller.
    fn blur_gaussian(&mut self, region: BBox, sigma: f32);

    /// Whole-frame pixelation fallback used when a blur step fails for an
    /// individual region.
    fn fully_obscure(&mut self);

    /// Encodes the frame in whatever compact, lossy format the detector
    /// accepts. Called once per frame offered to the Batch Collector, never
    /// on the copy that gets blurred and published.
    fn encode_for_submission(&self) -> Vec<u8>;
}
