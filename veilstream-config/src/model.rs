use serde::{Deserialize, Serialize};

/// Blur kind applied to a region before publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlurMethod {
    Pixelation,
    Gaussian,
}

impl Default for BlurMethod {
    fn default() -> Self {
        Self::Pixelation
    }
}

/// Blur application tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurConfig {
    pub method: BlurMethod,
    /// Pixelation granularity, used when `method` is `Pixelation`.
    pub pixel_size: u32,
    /// Gaussian sigma, used when `method` is `Gaussian`.
    pub gaussian_sigma: f32,
    /// Bbox padding, in pixels, applied before blur.
    pub dilation_px: f32,
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            method: BlurMethod::Pixelation,
            pixel_size: 20,
            gaussian_sigma: 25.0,
            dilation_px: 8.0,
        }
    }
}

/// Batch Collector tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_wait_ms: u64,
    pub max_batch_size: usize,
    pub max_pending_batches: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_wait_ms: 30,
            max_batch_size: 8,
            max_pending_batches: 2,
        }
    }
}

/// Inference Client tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub detect_timeout_ms: u64,
    pub max_retries: u32,
    /// Consecutive permanent-error count that opens the circuit breaker.
    pub circuit_breaker_window: u32,
    pub circuit_breaker_cooldown_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Size of the worker pool draining the Batch Collector's queue.
    pub worker_count: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            detect_timeout_ms: 2_000,
            max_retries: 3,
            circuit_breaker_window: 5,
            circuit_breaker_cooldown_ms: 60_000,
            backoff_base_ms: 50,
            backoff_max_ms: 2_000,
            worker_count: 4,
        }
    }
}

/// Tracker Set tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub iou_assoc_threshold: f32,
    pub max_missed_frames: u32,
    pub max_track_age_ms: u64,
    /// Correction weight applied to the position residual on each observed
    /// update.
    pub position_gain: f32,
    /// Correction weight applied to the velocity residual on each observed
    /// update.
    pub velocity_gain: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_assoc_threshold: 0.3,
            max_missed_frames: 15,
            max_track_age_ms: 2_000,
            position_gain: 0.6,
            velocity_gain: 0.35,
        }
    }
}

/// Confidence Store tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub decay_rate: f32,
    pub min_confidence_floor: f32,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            decay_rate: 0.85,
            min_confidence_floor: 0.3,
        }
    }
}

/// Which [`crate`]-external `OverloadPolicy` implementation a `Session`
/// should be wired with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverloadPolicyKind {
    /// Doubles `blur.dilation_px` while overloaded, restores it on recovery.
    WidenBlur,
    /// No reaction; overload is only observable via logs/metrics.
    Noop,
}

impl Default for OverloadPolicyKind {
    fn default() -> Self {
        Self::WidenBlur
    }
}

/// Lane 1 publish tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub publish_timeout_ms: u64,
    /// How long Lane 1 waits for a frame before treating the source as idle.
    pub idle_timeout_ms: u64,
    /// Lane-1 wall-time budget; used only to raise the overload signal.
    pub lane1_budget_ms: u64,
    /// Fraction (0-1) of the trailing window that must exceed the budget
    /// before overload is raised.
    pub overload_trigger_ratio: f32,
    /// Size of the trailing window used to evaluate the overload ratio.
    pub overload_window_frames: usize,
    /// Which reaction a `Session` wires up when Lane 1 raises its overload
    /// signal.
    pub overload_policy: OverloadPolicyKind,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            publish_timeout_ms: 50,
            idle_timeout_ms: 1_000,
            lane1_budget_ms: 30,
            overload_trigger_ratio: 0.1,
            overload_window_frames: 100,
            overload_policy: OverloadPolicyKind::WidenBlur,
        }
    }
}

/// Every tunable the moderation pipeline exposes, grouped by the component
/// it governs.
///
/// Constructed once per `Session`; every knob is a plain field so there is a
/// single source of truth instead of environment reads scattered across
/// call sites.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    pub blur: BlurConfig,
    pub batch: BatchConfig,
    pub inference: InferenceConfig,
    pub tracker: TrackerConfig,
    pub confidence: ConfidenceConfig,
    pub publish: PublishConfig,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            blur: BlurConfig::default(),
            batch: BatchConfig::default(),
            inference: InferenceConfig::default(),
            tracker: TrackerConfig::default(),
            confidence: ConfidenceConfig::default(),
            publish: PublishConfig::default(),
        }
    }
}
