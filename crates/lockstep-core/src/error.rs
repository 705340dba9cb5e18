//! Error types for the engine core
//!
//! Two classes exist. `ValidateError` covers expected, recoverable event
//! rejections: the offending event is logged and dropped, the pipeline keeps
//! going. `CoreError` covers data that cannot be rebuilt (bad snapshots,
//! unencodable frames) and is raised to the caller.

use thiserror::Error;

use lockstep_wire::WireError;

use crate::{EventKind, SessionId};

/// Event rejection reasons. Expected and recoverable: rejected events are
/// dropped without disturbing the rest of the advance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidateError {
    #[error("membership event sent from non-authority session {0}")]
    ForgedMembership(SessionId),

    #[error("membership event without a session target")]
    MissingSessionTarget,

    #[error("membership event targets the authority")]
    AuthorityTarget,

    #[error("event kind {0:?} is not valid inside the log")]
    IllegalKind(EventKind),

    #[error("rejected by extension: {0}")]
    Rejected(String),
}

/// Core data errors
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("snapshot missing field: {0}")]
    MissingField(&'static str),

    #[error("snapshot field has wrong type: {0}")]
    WrongType(&'static str),

    #[error("unknown event kind: {0}")]
    UnknownKind(i64),

    #[error("frame kind {0:?} has no value form")]
    UnencodableFrame(EventKind),

    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;
