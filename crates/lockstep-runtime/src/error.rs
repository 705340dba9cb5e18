//! Error types for the runtime loops
//!
//! These are contract errors: a malformed configuration, a loop started
//! twice, ticking before bootstrap. They are raised eagerly at the call site
//! rather than swallowed, since the loop cannot run correctly at all.

use thiserror::Error;

use lockstep_core::{CoreError, EventKind};

/// Runtime contract errors
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("loop already started")]
    AlreadyStarted,

    #[error("loop not started")]
    NotStarted,

    #[error("no state yet: bootstrap not received")]
    NotBootstrapped,

    #[error("unexpected frame kind {0:?}")]
    UnexpectedFrame(EventKind),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;
