//! The 3-lane hybrid moderation engine: predictive blur on Lane 1, batched
//! remote verification on Lane 2, and the Tracker Set + Confidence Store
//! state that bridges them on Lane 3, all behind one exclusive lock per
//! `Session`.

pub mod batch_collector;
pub mod confidence;
pub mod error;
pub mod inference_client;
pub mod observability;
pub mod orchestrator;
pub mod overload;
pub mod session;
pub mod state;
pub mod tracker;

pub use batch_collector::{BatchCollector, DropKind, OfferOutcome};
pub use confidence::ConfidenceStore;
pub use error::{ModerationError, Result};
pub use inference_client::InferenceClient;
pub use observability::RecordingObservability;
pub use orchestrator::{LaneOrchestrator, OrchestratorHandle};
pub use overload::{build_overload_policy, NoopOverloadPolicy, OverloadPolicy, OverloadWindow, WidenBlurPolicy};
pub use session::{Session, SessionRegistry};
pub use state::ModerationState;
pub use tracker::TrackerSet;
