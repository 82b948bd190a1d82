//! Configuration for the moderation pipeline: a single struct holding every
//! tunable, grouped by the component it governs, loaded from file/env with a
//! fixed precedence, and validated against its constructor-time invariants
//! before a `Session` is ever built from it.

pub mod loader;
pub mod model;
pub mod validation;

pub use loader::ConfigSource;
pub use model::{
    BatchConfig, BlurConfig, BlurMethod, ConfidenceConfig, InferenceConfig, ModerationConfig,
    OverloadPolicyKind, PublishConfig, TrackerConfig,
};
pub use validation::{validate, ConfigLoadError};
