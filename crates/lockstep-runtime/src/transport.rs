//! Transport contract
//!
//! The engine never touches sockets. Loops return `Directive`s describing
//! outbound frames; the driver flushes them through whatever implements
//! `Transport`. Connection lifecycle, framing, and latency measurement all
//! live behind this boundary.

use lockstep_core::{Event, SessionId};

use crate::{RuntimeError, RuntimeResult};

/// Outbound traffic produced by a loop step
#[derive(Clone, Debug)]
pub enum Directive {
    /// Deliver a frame to one session (participants address the authority)
    Send { session_id: SessionId, frame: Event },
    /// Deliver a frame to every connected session
    Broadcast { frame: Event },
}

/// The narrow seam to the outside world
pub trait Transport: Send {
    fn send(&mut self, session_id: SessionId, frame: &Event) -> RuntimeResult<()>;

    fn broadcast(&mut self, frame: &Event) -> RuntimeResult<()>;
}

/// Flush a batch of directives through a transport
pub fn flush<T: Transport>(transport: &mut T, directives: Vec<Directive>) -> RuntimeResult<()> {
    for directive in directives {
        match directive {
            Directive::Send { session_id, frame } => transport.send(session_id, &frame)?,
            Directive::Broadcast { frame } => transport.broadcast(&frame)?,
        }
    }
    Ok(())
}

/// Transport that drops everything; useful for offline replays and tests
#[derive(Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn send(&mut self, _session_id: SessionId, _frame: &Event) -> RuntimeResult<()> {
        Ok(())
    }

    fn broadcast(&mut self, _frame: &Event) -> RuntimeResult<()> {
        Ok(())
    }
}

impl RuntimeError {
    /// Wrap a transport-layer failure message
    pub fn transport(message: impl Into<String>) -> Self {
        RuntimeError::Transport(message.into())
    }
}
