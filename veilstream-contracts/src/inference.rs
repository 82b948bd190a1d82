use async_trait::async_trait;
use std::fmt;

use veilstream_model::{Detection, Resolution, Sequence};

/// One frame submitted for verification, as carried in a batch request
///.
#[derive(Debug, Clone)]
pub struct FrameRequest {
    pub source_sequence: Sequence,
    pub resolution: Resolution,
    /// Frame pixels in whatever compact, lossy encoding the detector
    /// accepts. The core never inspects this payload; it only threads it
    /// through to the transport.
    pub payload: Vec<u8>,
}

/// A complete request batch as assembled by the Batch Collector.
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    pub frames: Vec<FrameRequest>,
}

/// Per-frame outcome inside a batch response.
#[derive(Debug, Clone)]
pub enum FrameOutcome {
    Detections(Vec<Detection>),
    Error(FrameErrorKind),
}

/// Per-frame error kinds, distinct from the whole-batch transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameErrorKind {
    DecodeFailed,
    Rejected,
}

/// One frame's result within a verified batch.
#[derive(Debug, Clone)]
pub struct FrameResult {
    pub source_sequence: Sequence,
    pub outcome: FrameOutcome,
}

/// Whole-batch transport error classification. Handling is keyed on
/// the variant, not on any string inside it: `Timeout` and `Transient` are
/// retried by the Inference Client's worker; `Permanent` opens the circuit
/// breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InferenceTransportError {
    Timeout,
    Transient(String),
    Permanent(String),
}

impl fmt::Display for InferenceTransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceTransportError::Timeout => write!(f, "inference call timed out"),
            InferenceTransportError::Transient(msg) => write!(f, "transient inference error: {msg}"),
            InferenceTransportError::Permanent(msg) => write!(f, "permanent inference error: {msg}"),
        }
    }
}

impl std::error::Error for InferenceTransportError {}

/// The remote detector RPC. Implementations are expected to be
/// stateless aside from a bounded connection pool; the Inference Client in
/// `veilstream-core` layers retries and the circuit breaker on top of this.
#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn detect(&self, batch: BatchRequest) -> Result<Vec<FrameResult>, InferenceTransportError>;
}
