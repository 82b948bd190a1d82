use thiserror::Error;

/// Errors raised by the moderation engine itself (as opposed to transport
/// errors from collaborators, which travel through
/// [`veilstream_contracts::InferenceTransportError`] instead).
#[derive(Error, Debug)]
pub enum ModerationError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("session for room {0} already attached")]
    AlreadyAttached(String),

    #[error("session for room {0} is draining")]
    Draining(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ModerationError>;
