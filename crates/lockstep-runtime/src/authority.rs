//! Authority loop
//!
//! The authority owns the canonical state. It stamps every event with its
//! own clock, broadcasts the result, hands connecting participants a full
//! snapshot, and periodically compacts history up to the safe advance point.
//!
//! Membership and heartbeat events are postdated: stamped a fixed number of
//! ticks into the future so they rarely land in a participant's projected
//! past. Participant events are relayed at the current clock to keep their
//! latency down.

use std::time::Instant;

use lockstep_core::{Event, EventData, EventKind, SessionId, SimState, StatePayload, VirtualTime};
use lockstep_engine::Engine;
use lockstep_wire::Value;

use crate::{Directive, RuntimeConfig, RuntimeError, RuntimeResult};

/// Counters exposed for observation
#[derive(Clone, Debug, Default)]
pub struct AuthorityStats {
    pub ticks: u64,
    pub events_fired: u64,
    pub frames_rejected: u64,
    pub compactions: u64,
}

/// The authoritative side of a simulation
pub struct Authority<S> {
    engine: Engine<S>,
    state: SimState<S>,
    config: RuntimeConfig,
    next_deadline: Option<Instant>,
    session_counter: u64,
    stats: AuthorityStats,
}

impl<S: StatePayload> Authority<S> {
    /// Fresh authority at tick zero
    pub fn new(engine: Engine<S>, data: S, config: RuntimeConfig) -> RuntimeResult<Self> {
        config.validate()?;
        Ok(Authority {
            engine,
            state: SimState::new(data),
            config,
            next_deadline: None,
            session_counter: 0,
            stats: AuthorityStats::default(),
        })
    }

    /// Resume from a persisted state.
    ///
    /// Nobody is connected after a restart, so every non-authority session
    /// still registered gets an EndSession hotwired into the log.
    pub fn with_state(
        engine: Engine<S>,
        state: SimState<S>,
        config: RuntimeConfig,
    ) -> RuntimeResult<Self> {
        config.validate()?;
        let mut authority = Authority {
            engine,
            state,
            config,
            next_deadline: None,
            session_counter: 0,
            stats: AuthorityStats::default(),
        };

        let stale: Vec<SessionId> = authority
            .state
            .session_ids
            .iter()
            .copied()
            .filter(|session_id| !session_id.is_authority())
            .collect();
        for session_id in stale {
            let event = Event::end_session(authority.state.clock, session_id);
            authority.state.enqueue(event);
        }

        Ok(authority)
    }

    /// Arm the wall-clock loop. Starting twice is a programming error.
    pub fn start(&mut self, now: Instant) -> RuntimeResult<()> {
        if self.next_deadline.is_some() {
            return Err(RuntimeError::AlreadyStarted);
        }
        self.next_deadline = Some(now);
        Ok(())
    }

    /// Advance the clock once per tick period elapsed since the last fire.
    ///
    /// Tolerant of timer jitter: a late fire catches up, an early one does
    /// nothing. Returns the number of ticks advanced.
    pub fn tick(&mut self, now: Instant) -> RuntimeResult<u64> {
        let Some(deadline) = self.next_deadline.as_mut() else {
            return Err(RuntimeError::NotStarted);
        };

        let mut elapsed = 0;
        while now > *deadline {
            self.state.clock += 1;
            *deadline += self.config.tick_period;
            elapsed += 1;
        }
        self.stats.ticks += elapsed;
        Ok(elapsed)
    }

    /// A participant connected: bootstrap it, then announce it.
    ///
    /// The snapshot is taken before the NewSession event is fired, so the
    /// connecting participant learns of its own arrival the same way everyone
    /// else does: as a broadcast frame.
    pub fn on_connect(&mut self) -> RuntimeResult<(SessionId, Vec<Directive>)> {
        let session_id = self.allocate_session_id();

        let bootstrap = Event {
            kind: EventKind::Bootstrap,
            data: EventData::Bootstrap {
                snapshot: self.state.snapshot()?,
                session_id,
            },
            vt: self.state.clock,
            sender: SessionId::AUTHORITY,
        };

        let announce = self.fire(Event::new_session(self.postdated_vt(), session_id));
        Ok((
            session_id,
            vec![
                Directive::Send {
                    session_id,
                    frame: bootstrap,
                },
                announce,
            ],
        ))
    }

    /// A participant disconnected: end its session, postdated like connects
    pub fn on_disconnect(&mut self, session_id: SessionId) -> Vec<Directive> {
        vec![self.fire(Event::end_session(self.postdated_vt(), session_id))]
    }

    /// An inbound frame from a connected participant.
    ///
    /// The sender is whatever session the transport attributed the frame to,
    /// never a field of the frame itself, and the event is restamped with the
    /// authority's clock. Membership or bootstrap frames from participants
    /// are contract violations surfaced to the driver.
    pub fn on_frame(&mut self, sender: SessionId, frame: &Event) -> RuntimeResult<Vec<Directive>> {
        match frame.kind {
            EventKind::Custom => {
                let payload = match &frame.data {
                    EventData::Custom(value) => value.clone(),
                    _ => Value::Null,
                };
                let event = Event::custom(sender, self.state.clock, payload);
                Ok(vec![self.fire(event)])
            }
            EventKind::Empty => {
                let event = Event::empty(sender, self.state.clock);
                Ok(vec![self.fire(event)])
            }
            // latency samples are the transport's concern
            EventKind::Pong => Ok(Vec::new()),
            other => {
                self.stats.frames_rejected += 1;
                Err(RuntimeError::UnexpectedFrame(other))
            }
        }
    }

    /// Authority heartbeat: keeps the authority's own safe-zone floor moving
    /// even when the simulation is otherwise quiet
    pub fn heartbeat(&mut self) -> Vec<Directive> {
        vec![self.fire(Event::empty(SessionId::AUTHORITY, self.postdated_vt()))]
    }

    /// Compact history up to the safe advance point
    pub fn compact(&mut self) {
        self.engine.safely_advance(&mut self.state);
        self.stats.compactions += 1;
    }

    pub fn state(&self) -> &SimState<S> {
        &self.state
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn stats(&self) -> &AuthorityStats {
        &self.stats
    }

    fn allocate_session_id(&mut self) -> SessionId {
        self.session_counter += 1;
        SessionId::new(self.session_counter)
    }

    fn postdated_vt(&self) -> VirtualTime {
        self.state.clock + self.config.postdate_ticks()
    }

    /// Record an event in the canonical log and schedule its broadcast
    fn fire(&mut self, event: Event) -> Directive {
        self.state.enqueue(event.clone());
        self.stats.events_fired += 1;
        Directive::Broadcast { frame: event }
    }
}
