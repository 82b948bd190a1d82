//! Synthetic `BroadcastSource`/`SanitizedSink`/`InferenceService` triple
//! driven by a scripted detection schedule, used by `--demo` to exercise a
//! full `Session` without a real SFU or detector. Only compiled with the
//! `demo` feature, so production builds carry zero overhead for it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use veilstream_config::ModerationConfig;
use veilstream_contracts::{
    BatchRequest, BroadcastSource, FrameBuffer, FrameOutcome, FrameResult, InferenceService,
    InferenceTransportError, PublishOutcome, SanitizedSink,
};
use veilstream_core::{build_overload_policy, RecordingObservability, Session};
use veilstream_model::{BBox, ClassId, Detection, FrameMeta, RoomId, Sequence};

const FRAME_WIDTH: u32 = 1280;
const FRAME_HEIGHT: u32 = 720;
const FRAME_INTERVAL_MS: u64 = 33;
const FRAME_COUNT: u64 = 90;

/// An opaque in-memory frame. Counts blur calls instead of touching real
/// pixels so the demo can report what Lane 1 actually did.
#[derive(Debug, Clone)]
pub struct DemoFrame {
    meta: FrameMeta,
    blur_calls: usize,
    fully_obscured: bool,
}

impl FrameBuffer for DemoFrame {
    fn meta(&self) -> FrameMeta {
        self.meta
    }

    fn try_clone(&self) -> Option<Self> {
        Some(self.clone())
    }

    fn blur_pixelate(&mut self, _region: BBox, _pixel_size: u32) {
        self.blur_calls += 1;
    }

    fn blur_gaussian(&mut self, _region: BBox, _sigma: f32) {
        self.blur_calls += 1;
    }

    fn fully_obscure(&mut self) {
        self.fully_obscured = true;
    }

    fn encode_for_submission(&self) -> Vec<u8> {
        // Real payload bytes are opaque to the core; a fixed-size stand-in
        // is enough to exercise the Batch Collector/Inference Client path.
        vec![0u8; 64]
    }
}

/// Emits `frame_count` frames at a fixed interval, then closes (mirrors a
/// broadcaster's track ending).
pub struct DemoBroadcastSource {
    next_sequence: u64,
    frame_count: u64,
    frame_interval: Duration,
}

impl DemoBroadcastSource {
    pub fn new(frame_count: u64, frame_interval: Duration) -> Self {
        Self {
            next_sequence: 0,
            frame_count,
            frame_interval,
        }
    }
}

#[async_trait]
impl BroadcastSource for DemoBroadcastSource {
    type Frame = DemoFrame;

    async fn next_frame(&mut self) -> Option<DemoFrame> {
        if self.next_sequence >= self.frame_count {
            return None;
        }
        tokio::time::sleep(self.frame_interval).await;
        let seq = self.next_sequence;
        self.next_sequence += 1;
        Some(DemoFrame {
            meta: FrameMeta::new(FRAME_WIDTH, FRAME_HEIGHT, Sequence(seq), seq * self.frame_interval.as_millis() as u64),
            blur_calls: 0,
            fully_obscured: false,
        })
    }
}

/// Counts published frames; never applies real backpressure.
pub struct DemoSink {
    published: Arc<AtomicU64>,
}

impl DemoSink {
    pub fn new(published: Arc<AtomicU64>) -> Self {
        Self { published }
    }
}

#[async_trait]
impl SanitizedSink for DemoSink {
    type Frame = DemoFrame;

    async fn publish(&mut self, frame: DemoFrame) -> PublishOutcome {
        self.published.fetch_add(1, Ordering::Relaxed);
        let _ = frame;
        PublishOutcome::Ok
    }
}

/// Returns scripted detections keyed by `source_sequence`, simulating a
/// detector with a short fixed latency.
pub struct DemoInferenceService {
    schedule: HashMap<u64, Vec<(BBox, ClassId, f32)>>,
    latency: Duration,
}

impl DemoInferenceService {
    pub fn new(schedule: HashMap<u64, Vec<(BBox, ClassId, f32)>>, latency: Duration) -> Self {
        Self { schedule, latency }
    }
}

#[async_trait]
impl InferenceService for DemoInferenceService {
    async fn detect(&self, batch: BatchRequest) -> Result<Vec<FrameResult>, InferenceTransportError> {
        tokio::time::sleep(self.latency).await;
        Ok(batch
            .frames
            .into_iter()
            .map(|frame| {
                let detections = self
                    .schedule
                    .get(&frame.source_sequence.0)
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(bbox, class_id, confidence)| {
                        Detection::new(bbox, class_id, confidence, frame.source_sequence, frame.resolution)
                    })
                    .collect();
                FrameResult {
                    source_sequence: frame.source_sequence,
                    outcome: FrameOutcome::Detections(detections),
                }
            })
            .collect())
    }
}

/// A content region that drifts across the frame every 5th frame, enough to
/// exercise prediction, coasting, and eviction within a short run.
fn scripted_schedule(frame_count: u64) -> HashMap<u64, Vec<(BBox, ClassId, f32)>> {
    let mut schedule = HashMap::new();
    let mut seq = 0;
    while seq < frame_count.saturating_sub(frame_count / 3) {
        let drift = seq as f32 * 3.0;
        schedule.insert(seq, vec![(BBox::new(120.0 + drift, 200.0, 90.0, 130.0), ClassId(1), 0.93)]);
        seq += 5;
    }
    schedule
}

/// What the demo run observed, for a one-line summary at exit.
#[derive(Debug, Clone, Copy)]
pub struct DemoSummary {
    pub frames_published: u64,
    pub frames_dropped: usize,
    pub detections_observed: u64,
    pub peak_active_tracks: usize,
    pub peak_active_regions: usize,
}

/// Runs one scripted Session end to end and reports what happened.
pub async fn run_demo(config: Arc<ModerationConfig>) -> DemoSummary {
    let observability = Arc::new(RecordingObservability::new());
    let overload_policy = build_overload_policy(&config);
    let now_ms: Arc<dyn Fn() -> u64 + Send + Sync> = Arc::new(|| {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    });

    let service: Arc<dyn InferenceService> = Arc::new(DemoInferenceService::new(
        scripted_schedule(FRAME_COUNT),
        Duration::from_millis(15),
    ));

    let room_id = RoomId::new();
    info!(room_id = %room_id, frames = FRAME_COUNT, "demo: starting scripted session");

    let session = Session::new(room_id, config, service, observability.clone(), overload_policy, now_ms);

    let published = Arc::new(AtomicU64::new(0));
    let source = DemoBroadcastSource::new(FRAME_COUNT, Duration::from_millis(FRAME_INTERVAL_MS));
    let sink = DemoSink::new(published.clone());

    session.attach(source, sink).await.expect("demo session starts with nothing already attached");

    let drain_margin = Duration::from_millis(500);
    tokio::time::sleep(Duration::from_millis(FRAME_INTERVAL_MS * FRAME_COUNT) + drain_margin).await;

    session.shutdown().await;

    DemoSummary {
        frames_published: published.load(Ordering::Relaxed),
        frames_dropped: observability.frames_dropped().len(),
        detections_observed: observability.detections_observed.load(Ordering::Relaxed),
        peak_active_tracks: observability.active_tracks.load(Ordering::Relaxed),
        peak_active_regions: observability.active_regions.load(Ordering::Relaxed),
    }
}
