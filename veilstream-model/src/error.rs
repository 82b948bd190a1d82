use thiserror::Error;

/// Errors produced by model constructors and validation routines.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("invalid bounding box: {0}")]
    InvalidBBox(String),

    #[error("confidence {0} outside [0, 1]")]
    InvalidConfidence(f32),
}

pub type Result<T> = std::result::Result<T, ModelError>;
