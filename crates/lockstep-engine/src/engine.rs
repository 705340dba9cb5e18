//! Deterministic stepper
//!
//! `Engine` walks a `SimState` through virtual time: per tick, every
//! extension's continuous update runs, then the tick's events are validated
//! and dispatched. Both loops run in registration order, which is what makes
//! independent replicas arrive at identical state.

use lockstep_core::{Event, EventKind, SimState, StatePayload, ValidateError, VirtualTime};

use crate::{calculate_safe_advance_point, calculate_safe_zone, Extension};

/// The deterministic stepper plus its ordered extensions.
///
/// Extensions are fixed at construction and never change afterwards; the
/// registered order must match on every replica.
pub struct Engine<S> {
    extensions: Vec<Box<dyn Extension<S>>>,
}

impl<S: StatePayload> Engine<S> {
    /// An engine with no extensions; membership bookkeeping still applies
    pub fn new() -> Self {
        Engine {
            extensions: Vec::new(),
        }
    }

    /// Append an extension; order of calls is the dispatch order
    pub fn with_extension(mut self, extension: impl Extension<S> + 'static) -> Self {
        self.extensions.push(Box::new(extension));
        self
    }

    pub fn extension_count(&self) -> usize {
        self.extensions.len()
    }

    /// Advance `state` tick by tick up to (not including) `target`.
    ///
    /// Each tick runs every extension's `update`, then pops and handles the
    /// log prefix stamped at that tick; sortedness makes the prefix scan
    /// sufficient. Afterwards `state.vt == target`.
    pub fn advance_to(&self, state: &mut SimState<S>, target: VirtualTime) {
        while state.vt < target {
            for extension in &self.extensions {
                extension.update(state);
            }

            while state
                .events
                .front()
                .is_some_and(|event| event.vt == state.vt)
            {
                if let Some(event) = state.events.pop_front() {
                    self.handle(state, &event);
                }
            }

            state.vt += 1;
        }
    }

    /// Validate and dispatch one event.
    ///
    /// A rejected event is logged and dropped; the caller's advance continues
    /// unaffected. On success the core applies membership changes itself and
    /// then offers the event to every extension in order.
    pub fn handle(&self, state: &mut SimState<S>, event: &Event) {
        if let Err(reason) = self.validate(state, event) {
            tracing::warn!(
                "dropping event {:?} from session {} at vt {}: {}",
                event.kind,
                event.sender,
                event.vt,
                reason
            );
            return;
        }

        match event.kind {
            EventKind::NewSession => {
                if let Some(session_id) = event.session_target() {
                    state.session_ids.insert(session_id);
                }
            }
            EventKind::EndSession => {
                if let Some(session_id) = event.session_target() {
                    state.session_ids.remove(&session_id);
                }
            }
            _ => {}
        }

        for extension in &self.extensions {
            extension.handle(state, event);
        }
    }

    /// Core structural checks, then each extension's veto in order; the
    /// first failure wins
    pub fn validate(&self, state: &SimState<S>, event: &Event) -> Result<(), ValidateError> {
        if !event.kind.is_log_kind() {
            return Err(ValidateError::IllegalKind(event.kind));
        }

        if matches!(event.kind, EventKind::NewSession | EventKind::EndSession) {
            // only the authority may mutate membership
            if !event.sender.is_authority() {
                return Err(ValidateError::ForgedMembership(event.sender));
            }
            let target = event
                .session_target()
                .ok_or(ValidateError::MissingSessionTarget)?;
            if target.is_authority() {
                return Err(ValidateError::AuthorityTarget);
            }
        }

        for extension in &self.extensions {
            extension.validate(state, event)?;
        }

        Ok(())
    }

    /// Compact history up to the safe advance point, if it moved.
    ///
    /// The only place history is irreversibly consumed. O(sessions + events),
    /// so drivers call it on a slow cadence rather than every tick.
    pub fn safely_advance(&self, state: &mut SimState<S>) {
        let zone = calculate_safe_zone(state);
        if let Some(point) = calculate_safe_advance_point(&zone) {
            // postdated events can hold floors past the clock; vt never
            // outruns the clock
            let target = point.min(state.clock);
            if target > state.vt {
                tracing::debug!("advancing from vt {} to {}", state.vt, target);
                self.advance_to(state, target);
            }
        }
    }
}

impl<S: StatePayload> Default for Engine<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use lockstep_core::{EventData, SessionId};
    use lockstep_wire::Value;

    use super::*;

    /// Counts calls through shared handles so tests can observe dispatch
    #[derive(Default)]
    struct Probe {
        updates: Arc<AtomicUsize>,
        validates: Arc<AtomicUsize>,
        handles: Arc<AtomicUsize>,
        reject: bool,
    }

    impl Extension<()> for Probe {
        fn update(&self, _state: &mut SimState<()>) {
            self.updates.fetch_add(1, Ordering::Relaxed);
        }

        fn validate(&self, _state: &SimState<()>, _event: &Event) -> Result<(), ValidateError> {
            self.validates.fetch_add(1, Ordering::Relaxed);
            if self.reject {
                Err(ValidateError::Rejected("probe says no".into()))
            } else {
                Ok(())
            }
        }

        fn handle(&self, _state: &mut SimState<()>, _event: &Event) {
            self.handles.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn custom(sender: u64, vt: u64) -> Event {
        Event::custom(SessionId::new(sender), VirtualTime::new(vt), Value::Null)
    }

    #[test]
    fn test_advance_runs_updates_once_per_tick() {
        let updates = Arc::new(AtomicUsize::new(0));
        let engine = Engine::new().with_extension(Probe {
            updates: updates.clone(),
            ..Probe::default()
        });

        let mut state = SimState::new(());
        state.vt = VirtualTime::new(1);
        state.clock = VirtualTime::new(4);

        engine.advance_to(&mut state, VirtualTime::new(4));

        // ticks 1, 2, 3
        assert_eq!(updates.load(Ordering::Relaxed), 3);
        assert_eq!(state.vt, VirtualTime::new(4));
    }

    #[test]
    fn test_advance_consumes_due_events_only() {
        let handles = Arc::new(AtomicUsize::new(0));
        let engine = Engine::new().with_extension(Probe {
            handles: handles.clone(),
            ..Probe::default()
        });

        let mut state = SimState::new(());
        state.clock = VirtualTime::new(10);
        state.enqueue(custom(1, 0));
        state.enqueue(custom(1, 1));
        state.enqueue(custom(1, 5));

        engine.advance_to(&mut state, VirtualTime::new(3));

        assert_eq!(handles.load(Ordering::Relaxed), 2);
        assert_eq!(state.events.len(), 1);
        assert_eq!(state.events[0].vt, VirtualTime::new(5));
    }

    #[test]
    fn test_invalid_event_reaches_no_extension_handle() {
        let handles = Arc::new(AtomicUsize::new(0));
        let engine = Engine::new().with_extension(Probe {
            handles: handles.clone(),
            ..Probe::default()
        });

        let mut state = SimState::new(());
        // membership event forged by a participant
        let mut forged = Event::new_session(VirtualTime::ZERO, SessionId::new(3));
        forged.sender = SessionId::new(7);

        engine.handle(&mut state, &forged);

        assert_eq!(handles.load(Ordering::Relaxed), 0);
        assert!(!state.session_ids.contains(&SessionId::new(3)));
    }

    #[test]
    fn test_membership_mutations_stay_sorted() {
        let engine: Engine<()> = Engine::new();
        let mut state = SimState::new(());
        state.session_ids.clear();
        for id in [1u64, 2, 5, 6] {
            state.session_ids.insert(SessionId::new(id));
        }

        engine.handle(
            &mut state,
            &Event::new_session(VirtualTime::ZERO, SessionId::new(3)),
        );
        let ids: Vec<u64> = state.session_ids.iter().map(|s| s.0).collect();
        assert_eq!(ids, vec![1, 2, 3, 5, 6]);

        engine.handle(
            &mut state,
            &Event::end_session(VirtualTime::ZERO, SessionId::new(5)),
        );
        let ids: Vec<u64> = state.session_ids.iter().map(|s| s.0).collect();
        assert_eq!(ids, vec![1, 2, 3, 6]);
    }

    #[test]
    fn test_validate_veto_chain_short_circuits() {
        let first_validates = Arc::new(AtomicUsize::new(0));
        let second_validates = Arc::new(AtomicUsize::new(0));
        let engine = Engine::new()
            .with_extension(Probe {
                validates: first_validates.clone(),
                reject: true,
                ..Probe::default()
            })
            .with_extension(Probe {
                validates: second_validates.clone(),
                ..Probe::default()
            });

        let state = SimState::new(());
        let result = engine.validate(&state, &custom(1, 0));

        assert!(result.is_err());
        assert_eq!(first_validates.load(Ordering::Relaxed), 1);
        assert_eq!(second_validates.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_frame_kinds_are_rejected_in_log() {
        let engine: Engine<()> = Engine::new();
        let state = SimState::new(());

        let ping = Event {
            kind: EventKind::Ping,
            data: EventData::Ping { start_ms: 0 },
            vt: VirtualTime::ZERO,
            sender: SessionId::AUTHORITY,
        };

        assert!(matches!(
            engine.validate(&state, &ping),
            Err(ValidateError::IllegalKind(EventKind::Ping))
        ));
    }

    #[test]
    fn test_safely_advance_consumes_final_history() {
        let engine: Engine<()> = Engine::new();
        let mut state = SimState::new(());
        state.clock = VirtualTime::new(30);
        state.session_ids.insert(SessionId::new(1));

        // authority heard up to 20, session 1 up to 12
        state.enqueue(Event::empty(SessionId::new(1), VirtualTime::new(12)));
        state.enqueue(Event::empty(SessionId::AUTHORITY, VirtualTime::new(20)));

        engine.safely_advance(&mut state);

        // min(12, 20) = 12: everything below is applied and gone
        assert_eq!(state.vt, VirtualTime::new(12));
        assert_eq!(state.events.len(), 2);

        // nothing newer is known; a second pass is a no-op
        engine.safely_advance(&mut state);
        assert_eq!(state.vt, VirtualTime::new(12));
    }

    #[test]
    fn test_safely_advance_without_sessions_is_noop() {
        let engine: Engine<()> = Engine::new();
        let mut state = SimState::new(());
        state.session_ids.clear();

        engine.safely_advance(&mut state);
        assert_eq!(state.vt, VirtualTime::ZERO);
    }
}
