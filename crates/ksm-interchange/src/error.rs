//! Interchange error types.

use ksm_codec::CodecError;
use thiserror::Error;

/// Errors raised while exporting or importing an interchange document.
#[derive(Debug, Error)]
pub enum InterchangeError {
    /// A reference failed to resolve, or another codec-level check failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The text is not a well-formed document.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The document is well-formed but describes something a script cannot
    /// hold.
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// Interchange result type alias.
pub type InterchangeResult<T> = Result<T, InterchangeError>;
