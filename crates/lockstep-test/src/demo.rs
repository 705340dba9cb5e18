//! Reference simulation used by the harness
//!
//! A tiny but complete extension: per-session counters mutated by Custom
//! events, membership bookkeeping, a validation rule, and a deterministic
//! RNG consumed every tick. If two replicas disagree on any of it, the
//! engine is not deterministic.

use std::collections::BTreeMap;

use lockstep_core::{
    Arc4, CoreError, CoreResult, Event, EventData, EventKind, RngState, SessionId, SimState,
    StatePayload, ValidateError,
};
use lockstep_engine::Extension;
use lockstep_wire::Value;

/// Domain payload: counters plus rng-derived noise
#[derive(Clone, Debug, PartialEq)]
pub struct CounterWorld {
    /// Sum of every applied Custom amount
    pub total: i64,
    /// Per-session counters, created and destroyed with membership
    pub per_session: BTreeMap<SessionId, i64>,
    /// Accumulated keystream bytes, one per tick
    pub noise: i64,
    /// Deterministic RNG state, replicated with everything else
    pub rng: RngState,
}

impl CounterWorld {
    pub fn new(seed: u64) -> Self {
        CounterWorld {
            total: 0,
            per_session: BTreeMap::new(),
            noise: 0,
            rng: RngState::from_u64(seed),
        }
    }
}

impl StatePayload for CounterWorld {
    fn to_value(&self) -> Value {
        let value = Value::map();
        value.insert("total", Value::from(self.total));
        value.insert("noise", Value::from(self.noise));

        let counters = Value::map();
        for (session_id, count) in &self.per_session {
            counters.insert(session_id.0.to_string(), Value::from(*count));
        }
        value.insert("counters", counters);
        value.insert("rng", self.rng.to_value());
        value
    }

    fn from_value(value: &Value) -> CoreResult<Self> {
        let total = value
            .get("total")
            .and_then(|v| v.as_int())
            .ok_or(CoreError::MissingField("total"))?;
        let noise = value
            .get("noise")
            .and_then(|v| v.as_int())
            .ok_or(CoreError::MissingField("noise"))?;

        let counters = value
            .get("counters")
            .ok_or(CoreError::MissingField("counters"))?;
        let mut per_session = BTreeMap::new();
        for (key, count) in counters.entries() {
            let session_id = key
                .parse::<u64>()
                .map_err(|_| CoreError::WrongType("counters"))?;
            let count = count.as_int().ok_or(CoreError::WrongType("counters"))?;
            per_session.insert(SessionId::new(session_id), count);
        }

        let rng = RngState::from_value(&value.get("rng").ok_or(CoreError::MissingField("rng"))?)?;

        Ok(CounterWorld {
            total,
            per_session,
            noise,
            rng,
        })
    }
}

/// The extension driving `CounterWorld`
pub struct CounterExtension;

impl Extension<CounterWorld> for CounterExtension {
    fn update(&self, state: &mut SimState<CounterWorld>) {
        // one keystream byte per tick; replicas must agree on every draw
        let byte = Arc4::new(&mut state.data.rng).next_byte();
        state.data.noise += byte as i64;
    }

    fn validate(
        &self,
        _state: &SimState<CounterWorld>,
        event: &Event,
    ) -> Result<(), ValidateError> {
        if event.kind == EventKind::Custom {
            let EventData::Custom(payload) = &event.data else {
                return Err(ValidateError::Rejected("custom without payload".into()));
            };
            if payload.get("amount").and_then(|v| v.as_int()).is_none() {
                return Err(ValidateError::Rejected(
                    "custom payload needs an integer amount".into(),
                ));
            }
        }
        Ok(())
    }

    fn handle(&self, state: &mut SimState<CounterWorld>, event: &Event) {
        match event.kind {
            EventKind::NewSession => {
                if let Some(session_id) = event.session_target() {
                    state.data.per_session.insert(session_id, 0);
                }
            }
            EventKind::EndSession => {
                if let Some(session_id) = event.session_target() {
                    state.data.per_session.remove(&session_id);
                }
            }
            EventKind::Custom => {
                let amount = match &event.data {
                    EventData::Custom(payload) => {
                        payload.get("amount").and_then(|v| v.as_int()).unwrap_or(0)
                    }
                    _ => 0,
                };
                state.data.total += amount;
                if let Some(count) = state.data.per_session.get_mut(&event.sender) {
                    *count += amount;
                }
            }
            _ => {}
        }
    }
}

/// A Custom payload the demo validates and applies
pub fn amount_payload(amount: i64) -> Value {
    let payload = Value::map();
    payload.insert("amount", Value::from(amount));
    payload
}

#[cfg(test)]
mod tests {
    use lockstep_core::VirtualTime;
    use lockstep_engine::Engine;

    use super::*;

    fn engine() -> Engine<CounterWorld> {
        Engine::new().with_extension(CounterExtension)
    }

    #[test]
    fn test_membership_creates_and_destroys_counters() {
        let engine = engine();
        let mut state = SimState::new(CounterWorld::new(1));

        engine.handle(
            &mut state,
            &Event::new_session(VirtualTime::ZERO, SessionId::new(4)),
        );
        assert_eq!(state.data.per_session.get(&SessionId::new(4)), Some(&0));

        engine.handle(
            &mut state,
            &Event::end_session(VirtualTime::ZERO, SessionId::new(4)),
        );
        assert!(state.data.per_session.is_empty());
    }

    #[test]
    fn test_custom_amounts_accumulate() {
        let engine = engine();
        let mut state = SimState::new(CounterWorld::new(1));
        engine.handle(
            &mut state,
            &Event::new_session(VirtualTime::ZERO, SessionId::new(2)),
        );

        let event = Event::custom(SessionId::new(2), VirtualTime::ZERO, amount_payload(5));
        engine.handle(&mut state, &event);
        engine.handle(&mut state, &event);

        assert_eq!(state.data.total, 10);
        assert_eq!(state.data.per_session.get(&SessionId::new(2)), Some(&10));
    }

    #[test]
    fn test_malformed_custom_is_vetoed() {
        let engine = engine();
        let mut state = SimState::new(CounterWorld::new(1));

        let bad = Event::custom(SessionId::new(2), VirtualTime::ZERO, Value::Null);
        engine.handle(&mut state, &bad);

        assert_eq!(state.data.total, 0);
    }

    #[test]
    fn test_two_replicas_draw_identical_noise() {
        let engine_a = engine();
        let engine_b = engine();

        let mut a = SimState::new(CounterWorld::new(9));
        a.clock = VirtualTime::new(50);
        let mut b = a.replicate().unwrap();

        engine_a.advance_to(&mut a, VirtualTime::new(50));
        engine_b.advance_to(&mut b, VirtualTime::new(50));

        assert_eq!(a.data.noise, b.data.noise);
        assert_eq!(a.data.rng, b.data.rng);
    }

    #[test]
    fn test_payload_survives_snapshot() {
        let engine = engine();
        let mut state = SimState::new(CounterWorld::new(3));
        state.clock = VirtualTime::new(20);
        engine.advance_to(&mut state, VirtualTime::new(7));

        let copy = state.replicate().unwrap();
        assert_eq!(copy.data, state.data);
    }
}
