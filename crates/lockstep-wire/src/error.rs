//! Error types for the wire codec

use thiserror::Error;

/// Wire codec errors
#[derive(Error, Debug)]
pub enum WireError {
    #[error("reference to missing cell {0}")]
    DanglingRef(u32),

    #[error("buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("unknown tag: {0:#04x}")]
    UnknownTag(u8),

    #[error("invalid utf-8 in string cell")]
    InvalidUtf8,

    #[error("malformed wire form: {0}")]
    Malformed(&'static str),
}

/// Result type for wire operations
pub type WireResult<T> = Result<T, WireError>;
