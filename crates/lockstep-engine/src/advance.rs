//! Safe-advance calculation
//!
//! A tick is provably final once every session that could still produce an
//! event below it has been heard from past it. The safe zone maps each live
//! session to its floor; the minimum across the map is the safe advance
//! point, and everything below it can be applied and discarded.

use lockstep_core::{EventKind, SafeZone, SimState, VirtualTime};

/// Compute the per-session floors for the current log.
///
/// Every registered session starts at `state.vt`. Scanning the (sorted) log:
/// a NewSession starts the new session's floor at its own connect tick, an
/// EndSession removes the session (it can never contribute again), and any
/// other event raises its sender's floor to that event's tick. The
/// authority's floor is always present, so the result is never unbounded.
pub fn calculate_safe_zone<S>(state: &SimState<S>) -> SafeZone {
    let mut zone = SafeZone::new();

    for &session_id in &state.session_ids {
        zone.insert(session_id, state.vt);
    }

    for event in &state.events {
        match event.kind {
            EventKind::NewSession => {
                if let Some(session_id) = event.session_target() {
                    zone.insert(session_id, event.vt);
                }
            }
            EventKind::EndSession => {
                if let Some(session_id) = event.session_target() {
                    zone.remove(&session_id);
                }
            }
            _ => {
                zone.insert(event.sender, event.vt);
            }
        }
    }

    zone
}

/// The highest vt no tracked session can still precede: the minimum floor,
/// or `None` when the zone is empty
pub fn calculate_safe_advance_point(zone: &SafeZone) -> Option<VirtualTime> {
    zone.values().copied().min()
}
