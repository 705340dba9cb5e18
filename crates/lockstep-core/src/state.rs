//! Simulation state
//!
//! One `SimState` lives on the authority; every participant holds a canonical
//! mirror and, transiently, a speculative projection of it. The core owns the
//! replication fields; everything domain-specific lives in `data`, behind the
//! `StatePayload` contract so state can be snapshotted and deep-cloned.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use lockstep_wire::{deserialize, serialize, Value, Wire};

use crate::{CoreError, CoreResult, Event, SessionId, VirtualTime};

/// Per-session floor below which no further event from that session can
/// appear. Ephemeral; recomputed on demand.
pub type SafeZone = BTreeMap<SessionId, VirtualTime>;

/// Domain payload contract: deep-clonable and snapshot-able.
///
/// `Clone` must produce an independent copy (true for owned data); the value
/// conversions feed bootstraps and projection rebuilds.
pub trait StatePayload: Clone {
    fn to_value(&self) -> Value;
    fn from_value(value: &Value) -> CoreResult<Self>;
}

/// Trivial payload for simulations that keep no domain state
impl StatePayload for () {
    fn to_value(&self) -> Value {
        Value::Null
    }

    fn from_value(_value: &Value) -> CoreResult<Self> {
        Ok(())
    }
}

/// Replicated simulation state
#[derive(Clone, Debug)]
pub struct SimState<S> {
    /// Cursor of virtual time already applied; monotonic
    pub vt: VirtualTime,
    /// Furthest virtual time known to exist; vt <= clock
    pub clock: VirtualTime,
    /// Pending events, sorted ascending by vt, arrival order within a tick
    pub events: VecDeque<Event>,
    /// Registered sessions; always contains the authority
    pub session_ids: BTreeSet<SessionId>,
    /// Domain state, owned entirely by extensions
    pub data: S,
}

impl<S: StatePayload> SimState<S> {
    /// Fresh state at tick zero with only the authority registered
    pub fn new(data: S) -> Self {
        let mut session_ids = BTreeSet::new();
        session_ids.insert(SessionId::AUTHORITY);
        SimState {
            vt: VirtualTime::ZERO,
            clock: VirtualTime::ZERO,
            events: VecDeque::new(),
            session_ids,
            data,
        }
    }

    /// Insert an event keeping the log sorted by vt, after any events already
    /// queued for the same tick (arrival order breaks ties).
    ///
    /// The authority postdates membership events, so plain appends would
    /// violate the ordering invariant.
    pub fn enqueue(&mut self, event: Event) {
        let index = self.events.partition_point(|queued| queued.vt <= event.vt);
        self.events.insert(index, event);
    }

    /// Encode the whole state as a value graph
    pub fn to_value(&self) -> CoreResult<Value> {
        let value = Value::map();
        value.insert("vt", Value::from(self.vt.tick() as i64));
        value.insert("clock", Value::from(self.clock.tick() as i64));

        let sessions = Value::array();
        for session_id in &self.session_ids {
            sessions.push(Value::from(session_id.0 as i64));
        }
        value.insert("sessions", sessions);

        let events = Value::array();
        for event in &self.events {
            events.push(event.to_value()?);
        }
        value.insert("events", events);

        value.insert("data", self.data.to_value());
        Ok(value)
    }

    /// Decode a state from a value graph
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        let vt = value
            .get("vt")
            .and_then(|v| v.as_int())
            .ok_or(CoreError::MissingField("vt"))?;
        let clock = value
            .get("clock")
            .and_then(|v| v.as_int())
            .ok_or(CoreError::MissingField("clock"))?;
        if vt < 0 || clock < 0 {
            return Err(CoreError::WrongType("vt/clock"));
        }

        let sessions = value
            .get("sessions")
            .ok_or(CoreError::MissingField("sessions"))?;
        let mut session_ids = BTreeSet::new();
        for index in 0..sessions.len() {
            let id = sessions
                .item(index)
                .and_then(|v| v.as_int())
                .ok_or(CoreError::WrongType("sessions"))?;
            if id < 0 {
                return Err(CoreError::WrongType("sessions"));
            }
            session_ids.insert(SessionId::new(id as u64));
        }

        let queued = value
            .get("events")
            .ok_or(CoreError::MissingField("events"))?;
        let mut events = VecDeque::with_capacity(queued.len());
        for index in 0..queued.len() {
            let event = queued
                .item(index)
                .ok_or(CoreError::WrongType("events"))?;
            events.push_back(Event::from_value(&event)?);
        }

        let data = value.get("data").ok_or(CoreError::MissingField("data"))?;

        Ok(SimState {
            vt: VirtualTime::new(vt as u64),
            clock: VirtualTime::new(clock as u64),
            events,
            session_ids,
            data: S::from_value(&data)?,
        })
    }

    /// Normalize into wire form (bootstraps)
    pub fn snapshot(&self) -> CoreResult<Wire> {
        Ok(serialize(&self.to_value()?))
    }

    /// Rebuild from wire form
    pub fn from_snapshot(wire: &Wire) -> CoreResult<Self> {
        Self::from_value(&deserialize(wire)?)
    }

    /// Structurally independent deep copy via a snapshot round trip.
    ///
    /// This is how projections are (re)built from canonical state: anything
    /// that would not survive the wire does not silently leak into the
    /// speculative copy.
    pub fn replicate(&self) -> CoreResult<Self> {
        Self::from_snapshot(&self.snapshot()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventData;

    fn custom_at(sender: u64, vt: u64, marker: i64) -> Event {
        Event::custom(
            SessionId::new(sender),
            VirtualTime::new(vt),
            Value::from(marker),
        )
    }

    fn marker(event: &Event) -> i64 {
        match &event.data {
            EventData::Custom(value) => value.as_int().unwrap(),
            _ => panic!("not a custom event"),
        }
    }

    #[test]
    fn test_new_state_registers_authority() {
        let state = SimState::new(());
        assert!(state.session_ids.contains(&SessionId::AUTHORITY));
        assert_eq!(state.vt, VirtualTime::ZERO);
        assert_eq!(state.clock, VirtualTime::ZERO);
        assert!(state.events.is_empty());
    }

    #[test]
    fn test_enqueue_keeps_log_sorted() {
        let mut state = SimState::new(());
        state.enqueue(custom_at(1, 5, 0));
        state.enqueue(custom_at(1, 2, 1));
        state.enqueue(custom_at(1, 9, 2));
        state.enqueue(custom_at(1, 5, 3));

        let vts: Vec<u64> = state.events.iter().map(|e| e.vt.tick()).collect();
        assert_eq!(vts, vec![2, 5, 5, 9]);
    }

    #[test]
    fn test_enqueue_ties_keep_arrival_order() {
        let mut state = SimState::new(());
        state.enqueue(custom_at(1, 7, 10));
        state.enqueue(custom_at(2, 7, 11));
        state.enqueue(custom_at(3, 7, 12));

        let markers: Vec<i64> = state.events.iter().map(marker).collect();
        assert_eq!(markers, vec![10, 11, 12]);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut state = SimState::new(());
        state.vt = VirtualTime::new(4);
        state.clock = VirtualTime::new(6);
        state.session_ids.insert(SessionId::new(2));
        state.enqueue(custom_at(2, 5, 42));
        state.enqueue(Event::empty(SessionId::AUTHORITY, VirtualTime::new(6)));

        let back = SimState::<()>::from_snapshot(&state.snapshot().unwrap()).unwrap();
        assert_eq!(back.vt, state.vt);
        assert_eq!(back.clock, state.clock);
        assert_eq!(back.session_ids, state.session_ids);
        assert_eq!(back.events.len(), 2);
        assert_eq!(marker(&back.events[0]), 42);
    }

    #[test]
    fn test_replicate_is_independent() {
        let mut state = SimState::new(());
        state.enqueue(custom_at(1, 3, 1));

        let mut replica = state.replicate().unwrap();
        replica.enqueue(custom_at(1, 4, 2));
        replica.vt = VirtualTime::new(3);

        assert_eq!(state.events.len(), 1);
        assert_eq!(state.vt, VirtualTime::ZERO);
        assert_eq!(replica.events.len(), 2);
    }
}
