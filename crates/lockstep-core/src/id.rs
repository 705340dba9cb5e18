//! Identity types
//!
//! Sessions are identified by a 64-bit integer. Id 0 is reserved for the
//! authority; every participant gets a non-zero id assigned at connect time.

use std::fmt;

/// Session identity. `SessionId::AUTHORITY` (0) is the authoritative process.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SessionId(pub u64);

impl SessionId {
    /// The authoritative process, always registered
    pub const AUTHORITY: SessionId = SessionId(0);

    #[inline]
    pub fn new(id: u64) -> Self {
        SessionId(id)
    }

    #[inline]
    pub fn is_authority(self) -> bool {
        self == SessionId::AUTHORITY
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
