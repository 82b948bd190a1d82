//! Lane Orchestrator (component E): drives the per-frame loop, the sole
//! mutator of the output track for a session.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug_span, info, warn, Instrument};

use veilstream_config::{BlurConfig, BlurMethod, ModerationConfig};
use veilstream_contracts::{
    BroadcastSource, DropReason, FrameBuffer, Observability, PublishOutcome, SanitizedSink,
};
use veilstream_model::{Region, Resolution};

use crate::batch_collector::{BatchCollector, OfferOutcome};
use crate::overload::{OverloadPolicy, OverloadWindow};
use crate::state::ModerationState;

/// Shared dependencies for one Session's Lane-1 loop. Constructed once per
/// Session; [`LaneOrchestrator::attach`] starts the loop against a concrete
/// broadcaster and sink, and may be called again after `detach` (not
/// concurrently).
pub struct LaneOrchestrator {
    config: Arc<ModerationConfig>,
    collector: Arc<BatchCollector>,
    state: Arc<Mutex<ModerationState>>,
    overload_policy: Arc<dyn OverloadPolicy>,
    observability: Arc<dyn Observability>,
    now_ms: Arc<dyn Fn() -> u64 + Send + Sync>,
}

impl LaneOrchestrator {
    pub fn new(
        config: Arc<ModerationConfig>,
        collector: Arc<BatchCollector>,
        state: Arc<Mutex<ModerationState>>,
        overload_policy: Arc<dyn OverloadPolicy>,
        observability: Arc<dyn Observability>,
        now_ms: Arc<dyn Fn() -> u64 + Send + Sync>,
    ) -> Self {
        Self {
            config,
            collector,
            state,
            overload_policy,
            observability,
            now_ms,
        }
    }

    /// Begins the per-frame loop on a background task. Returns a handle
    /// whose `detach` cooperatively stops it.
    pub fn attach<Src, Sink>(&self, source: Src, sink: Sink) -> OrchestratorHandle
    where
        Src: BroadcastSource + 'static,
        Sink: SanitizedSink<Frame = Src::Frame> + 'static,
    {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let config = self.config.clone();
        let collector = self.collector.clone();
        let state = self.state.clone();
        let overload_policy = self.overload_policy.clone();
        let observability = self.observability.clone();
        let now_ms = self.now_ms.clone();

        let handle = tokio::spawn(async move {
            run_loop(source, sink, collector, state, config, overload_policy, observability, now_ms, task_cancel).await;
        });

        // Bounded by T_idle: the loop can be parked inside `next_frame` when
        // cancellation lands, so the grace window must be at least that long.
        OrchestratorHandle {
            cancel,
            task: Mutex::new(Some(handle)),
            grace: Duration::from_millis(self.config.publish.idle_timeout_ms + self.config.publish.publish_timeout_ms),
        }
    }
}

/// Handle returned by [`LaneOrchestrator::attach`]. `detach` is idempotent
/// and safe to call from any context.
pub struct OrchestratorHandle {
    cancel: CancellationToken,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    grace: Duration,
}

impl OrchestratorHandle {
    pub async fn detach(&self) {
        self.cancel.cancel();
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if tokio::time::timeout(self.grace, handle).await.is_err() {
                warn!("lane orchestrator: loop did not exit within the grace window");
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_loop<Src, Sink>(
    mut source: Src,
    mut sink: Sink,
    collector: Arc<BatchCollector>,
    state: Arc<Mutex<ModerationState>>,
    config: Arc<ModerationConfig>,
    overload_policy: Arc<dyn OverloadPolicy>,
    observability: Arc<dyn Observability>,
    now_ms: Arc<dyn Fn() -> u64 + Send + Sync>,
    cancel: CancellationToken,
) where
    Src: BroadcastSource,
    Sink: SanitizedSink<Frame = Src::Frame>,
{
    let mut current_blur = config.blur; // BlurConfig is Copy
    let mut overload_window = OverloadWindow::new(config.publish.overload_window_frames, config.publish.overload_trigger_ratio);
    let idle_timeout = Duration::from_millis(config.publish.idle_timeout_ms);

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            result = tokio::time::timeout(idle_timeout, source.next_frame()) => result,
        };

        let frame = match next {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("lane orchestrator: broadcast source closed, session draining");
                break;
            }
            Err(_) => {
                // Idle timeout elapsed: emit nothing, do not inject synthetic frames.
                observability.frame_dropped(DropReason::SourceIdle);
                continue;
            }
        };

        process_frame(
            frame,
            &mut sink,
            &collector,
            &state,
            &config,
            &mut current_blur,
            &mut overload_window,
            overload_policy.as_ref(),
            observability.as_ref(),
            now_ms.as_ref(),
        )
        .instrument(debug_span!("lane1_frame"))
        .await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_frame<F, Sink>(
    mut frame: F,
    sink: &mut Sink,
    collector: &Arc<BatchCollector>,
    state: &Arc<Mutex<ModerationState>>,
    config: &ModerationConfig,
    current_blur: &mut BlurConfig,
    overload_window: &mut OverloadWindow,
    overload_policy: &dyn OverloadPolicy,
    observability: &dyn Observability,
    now_ms: &(dyn Fn() -> u64 + Send + Sync),
) where
    F: FrameBuffer,
    Sink: SanitizedSink<Frame = F>,
{
    let started = Instant::now();
    let meta = frame.meta();
    let seq = meta.sequence;
    let (frame_w, frame_h) = (meta.width as f32, meta.height as f32);

    let regions = {
        let mut guard = state.lock().await;
        guard.get_blur_regions(seq, frame_w, frame_h, config)
    };

    // Captured before either copy is mutated by blur.
    let payload = frame.encode_for_submission();

    let blur_ok = match frame.try_clone() {
        Some(mut publish_frame) => {
            let ok = apply_blur(&mut publish_frame, &regions, current_blur);
            if !ok {
                publish_frame.fully_obscure();
            }
            publish(sink, publish_frame, config.publish.publish_timeout_ms, observability).await;
            ok
        }
        None => {
            warn!(sequence = %seq, "lane orchestrator: frame clone failed, obscuring and publishing the original");
            frame.fully_obscure();
            publish(sink, frame, config.publish.publish_timeout_ms, observability).await;
            false
        }
    };
    let _ = blur_ok;

    match collector.offer(veilstream_contracts::FrameRequest {
        source_sequence: seq,
        resolution: Resolution::new(meta.width, meta.height),
        payload,
    }).await {
        OfferOutcome::Accepted => {}
        OfferOutcome::Dropped(_) => observability.verification_skipped(),
    }

    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    observability.lane1_latency_ms(elapsed_ms);
    let exceeded = elapsed_ms > config.publish.lane1_budget_ms as f64;
    if let Some(now_overloaded) = overload_window.record(exceeded) {
        if now_overloaded {
            warn!(sequence = %seq, latency_ms = elapsed_ms, "lane orchestrator: overload signal raised");
            *current_blur = overload_policy.on_overload(current_blur);
        } else {
            *current_blur = overload_policy.on_recovered(current_blur);
        }
    }

    let _ = now_ms; // reserved for a future wall-clock-stamped publish event
}

async fn publish<Sink, F>(sink: &mut Sink, frame: F, timeout_ms: u64, observability: &dyn Observability)
where
    Sink: SanitizedSink<Frame = F>,
    F: FrameBuffer,
{
    let timeout = Duration::from_millis(timeout_ms);
    match tokio::time::timeout(timeout, sink.publish(frame)).await {
        Ok(PublishOutcome::Ok) => observability.frame_published(),
        Ok(PublishOutcome::Backpressure) => observability.frame_dropped(DropReason::SinkBackpressure),
        Err(_) => observability.frame_dropped(DropReason::SinkTimeout),
    }
}

/// Applies every region's blur to `frame`, each padded by the current
/// render-time dilation on top of whatever dilation the Confidence Store
/// already baked in. Guarded by `catch_unwind` since `FrameBuffer`
/// implementations are an out-of-scope collaborator and a panic here
/// must never surface as a published, unblurred frame.
fn apply_blur<F: FrameBuffer>(frame: &mut F, regions: &[Region], blur: &BlurConfig) -> bool {
    let meta = frame.meta();
    let (frame_w, frame_h) = (meta.width as f32, meta.height as f32);

    let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
        for region in regions {
            let padded = region.bbox.dilate(blur.dilation_px).clamp_to_frame(frame_w, frame_h);
            match blur.method {
                BlurMethod::Pixelation => frame.blur_pixelate(padded, blur.pixel_size),
                BlurMethod::Gaussian => frame.blur_gaussian(padded, blur.gaussian_sigma),
            }
        }
    }));

    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use veilstream_model::{BBox, ClassId, FrameMeta, Sequence};

    #[derive(Clone)]
    struct FakeFrame {
        meta: FrameMeta,
        blur_calls: Arc<AtomicUsize>,
        obscured: Arc<std::sync::atomic::AtomicBool>,
    }

    impl FrameBuffer for FakeFrame {
        fn meta(&self) -> FrameMeta {
            self.meta
        }

        fn try_clone(&self) -> Option<Self> {
            Some(self.clone())
        }

        fn blur_pixelate(&mut self, _region: BBox, _pixel_size: u32) {
            self.blur_calls.fetch_add(1, Ordering::SeqCst);
        }

        fn blur_gaussian(&mut self, _region: BBox, _sigma: f32) {
            self.blur_calls.fetch_add(1, Ordering::SeqCst);
        }

        fn fully_obscure(&mut self) {
            self.obscured.store(true, Ordering::SeqCst);
        }

        fn encode_for_submission(&self) -> Vec<u8> {
            vec![0u8; 16]
        }
    }

    fn region() -> Region {
        Region {
            bbox: BBox::new(10.0, 10.0, 20.0, 20.0),
            confidence: 0.9,
            class_id: ClassId(1),
            linked_track_id: None,
            last_refresh_seq: Sequence(0),
            state: veilstream_model::RegionState::Observed,
        }
    }

    #[test]
    fn apply_blur_touches_every_region() {
        let mut frame = FakeFrame {
            meta: FrameMeta::new(640, 480, Sequence(0), 0),
            blur_calls: Arc::new(AtomicUsize::new(0)),
            obscured: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        };
        let blur = BlurConfig::default();
        let ok = apply_blur(&mut frame, &[region(), region()], &blur);
        assert!(ok);
        assert_eq!(frame.blur_calls.load(Ordering::SeqCst), 2);
    }
}
