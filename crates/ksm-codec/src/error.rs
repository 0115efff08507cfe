//! Codec error types.

use thiserror::Error;

/// Errors raised while parsing or building a container.
///
/// Every error is fatal for the current call: a single bad offset or symbol
/// invalidates every relative computation after it.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The input does not start with the container magic.
    #[error("not a KSM container: magic mismatch")]
    NotAContainer,

    /// The bytes violate the container layout.
    #[error("malformed file at {offset:#x}: {reason}")]
    MalformedFile { offset: usize, reason: String },

    /// A numeric id or name did not resolve through the scope chain.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// An opcode word with no instruction decoder.
    #[error("unknown opcode {opcode:#x} at {offset:#x}")]
    UnknownOpcode { opcode: u32, offset: usize },

    /// A variable's value does not fit its declared type.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// A function or table was encoded or decoded twice.
    #[error("double visit: {0}")]
    DoubleVisit(String),

    /// Layout and emission disagree.
    #[error("internal codec error: {0}")]
    Internal(String),
}

impl CodecError {
    pub fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        CodecError::MalformedFile {
            offset,
            reason: reason.into(),
        }
    }
}

/// Codec result type alias.
pub type CodecResult<T> = Result<T, CodecError>;
