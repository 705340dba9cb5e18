//! Extension contract
//!
//! A simulation plugs into the stepper as a set of three capabilities.
//! Extensions are stateless: everything they mutate lives in `state.data`,
//! so a replica rebuilt from a snapshot behaves identically.
//!
//! Registration order is part of the replicated protocol. It decides
//! mutation order, so it must match on the authority and every participant.

use lockstep_core::{Event, SimState, ValidateError};

/// A pluggable simulation capability, invoked in registration order
pub trait Extension<S>: Send {
    /// Continuous-time step, run once per virtual tick before that tick's
    /// events are handled
    fn update(&self, state: &mut SimState<S>);

    /// Veto an event before anything handles it. The first rejection wins
    /// and the event is dropped.
    fn validate(&self, state: &SimState<S>, event: &Event) -> Result<(), ValidateError> {
        let _ = (state, event);
        Ok(())
    }

    /// Apply an event that passed validation
    fn handle(&self, state: &mut SimState<S>, event: &Event);
}
