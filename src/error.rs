// src/error.rs

use thiserror::Error;

/// Failure taxonomy for the pipeline core.
///
/// No error is ever folded into a default result; the only deliberate
/// zero-defaults are the documented coverage-ratio divisions by an empty
/// denominator.
#[derive(Debug, Error)]
pub enum Error {
    /// Unreadable image or video input. Fatal for the request, no retry.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A model adapter failed on the current frame. Fatal for that frame;
    /// the caller decides between skipping the frame and aborting the
    /// request.
    #[error("model inference failed: {0}")]
    ModelInference(String),

    /// The encoded output artifact is empty or corrupt. Fatal for the
    /// whole video request.
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// The external artifact store rejected the upload. Propagated as-is.
    #[error("storage failed: {0}")]
    Storage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ort::Error> for Error {
    fn from(err: ort::Error) -> Self {
        Error::ModelInference(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
