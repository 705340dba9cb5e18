//! Participant reconciliation loop
//!
//! A participant keeps two copies of the world. The canonical mirror
//! receives every event exactly as the authority recorded it and is
//! compacted on the slow cadence. The projection is a disposable deep copy
//! that runs ahead of confirmed history on the local clock, so input feels
//! instantaneous; the moment an event lands in its past, the projection is
//! thrown away and rebuilt from canonical.

use std::time::Instant;

use lockstep_core::time::span_of;
use lockstep_core::{Event, EventData, EventKind, SessionId, SimState, StatePayload};
use lockstep_engine::Engine;
use lockstep_wire::Value;

use crate::{Directive, RuntimeConfig, RuntimeError, RuntimeResult};

/// Counters exposed for observation
#[derive(Clone, Debug, Default)]
pub struct ParticipantStats {
    pub ticks: u64,
    pub frames_received: u64,
    pub invalidations: u64,
    pub resyncs: u64,
    pub rebuilds: u64,
    pub compactions: u64,
    pub heartbeats_sent: u64,
}

/// The remote side of a simulation: canonical mirror plus speculative
/// projection
pub struct Participant<S> {
    engine: Engine<S>,
    config: RuntimeConfig,
    session_id: Option<SessionId>,
    canonical: Option<SimState<S>>,
    projection: Option<SimState<S>>,
    next_deadline: Option<Instant>,
    idle: bool,
    stats: ParticipantStats,
}

impl<S: StatePayload> Participant<S> {
    /// A participant awaiting its bootstrap
    pub fn new(engine: Engine<S>, config: RuntimeConfig) -> RuntimeResult<Self> {
        config.validate()?;
        Ok(Participant {
            engine,
            config,
            session_id: None,
            canonical: None,
            projection: None,
            next_deadline: None,
            idle: false,
            stats: ParticipantStats::default(),
        })
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.canonical.is_some()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    /// An inbound frame from the authority
    pub fn on_frame(&mut self, frame: &Event, now: Instant) -> RuntimeResult<Vec<Directive>> {
        self.stats.frames_received += 1;
        match frame.kind {
            EventKind::Bootstrap => {
                if self.canonical.is_some() {
                    return Err(RuntimeError::AlreadyStarted);
                }
                let EventData::Bootstrap {
                    snapshot,
                    session_id,
                } = &frame.data
                else {
                    return Err(RuntimeError::UnexpectedFrame(frame.kind));
                };
                self.canonical = Some(SimState::from_snapshot(snapshot)?);
                self.session_id = Some(*session_id);
                self.next_deadline = Some(now);
                Ok(Vec::new())
            }
            EventKind::Ping => {
                let reply = Event {
                    kind: EventKind::Pong,
                    data: frame.data.clone(),
                    vt: frame.vt,
                    sender: self.session_id.unwrap_or_default(),
                };
                Ok(vec![Directive::Send {
                    session_id: SessionId::AUTHORITY,
                    frame: reply,
                }])
            }
            EventKind::NewSession
            | EventKind::EndSession
            | EventKind::Custom
            | EventKind::Empty => {
                self.add_event(frame.clone(), now)?;
                Ok(Vec::new())
            }
            other => Err(RuntimeError::UnexpectedFrame(other)),
        }
    }

    /// One reconciliation tick: rebuild the projection if it is gone, count
    /// elapsed virtual ticks on both clocks, then speculatively advance the
    /// projection to its clock
    pub fn tick(&mut self, now: Instant) -> RuntimeResult<()> {
        if self.canonical.is_none() {
            return Err(RuntimeError::NotBootstrapped);
        }

        if self.projection.is_none() {
            if let Some(canonical) = self.canonical.as_ref() {
                self.projection = Some(canonical.replicate()?);
                self.stats.rebuilds += 1;
            }
        }

        let Some(deadline) = self.next_deadline.as_mut() else {
            return Err(RuntimeError::NotStarted);
        };
        let (Some(canonical), Some(projection)) =
            (self.canonical.as_mut(), self.projection.as_mut())
        else {
            return Err(RuntimeError::NotBootstrapped);
        };

        while now > *deadline {
            canonical.clock += 1;
            projection.clock += 1;
            *deadline += self.config.tick_period;
            self.stats.ticks += 1;
        }

        // best effort every tick: the projection is what gets rendered
        let target = projection.clock;
        self.engine.advance_to(projection, target);
        Ok(())
    }

    /// Compact the canonical mirror. Slow cadence only: canonical must never
    /// run ahead of confirmed history.
    pub fn compact(&mut self) -> RuntimeResult<()> {
        let canonical = self
            .canonical
            .as_mut()
            .ok_or(RuntimeError::NotBootstrapped)?;
        self.engine.safely_advance(canonical);
        self.stats.compactions += 1;
        Ok(())
    }

    /// Queue a domain event for the authority. The authority restamps and
    /// echoes it, so it is not applied locally here.
    pub fn send_custom(&mut self, payload: Value) -> RuntimeResult<Vec<Directive>> {
        let session_id = self.session_id.ok_or(RuntimeError::NotBootstrapped)?;
        let clock = self
            .canonical
            .as_ref()
            .map(|canonical| canonical.clock)
            .ok_or(RuntimeError::NotBootstrapped)?;

        self.idle = false;
        Ok(vec![Directive::Send {
            session_id: SessionId::AUTHORITY,
            frame: Event::custom(session_id, clock, payload),
        }])
    }

    /// Idle heartbeat: if nothing was sent during the window, emit an Empty
    /// frame so the authority's safe zone keeps moving on our behalf
    pub fn heartbeat(&mut self) -> Vec<Directive> {
        let mut directives = Vec::new();
        if self.idle {
            if let (Some(session_id), Some(canonical)) = (self.session_id, self.canonical.as_ref())
            {
                directives.push(Directive::Send {
                    session_id: SessionId::AUTHORITY,
                    frame: Event::empty(session_id, canonical.clock),
                });
                self.stats.heartbeats_sent += 1;
            }
        }
        self.idle = true;
        directives
    }

    /// The speculative state, if one currently exists. This is what local
    /// decision-making and rendering should read.
    pub fn projection(&self) -> Option<&SimState<S>> {
        self.projection.as_ref()
    }

    /// The confirmed mirror, if bootstrapped
    pub fn canonical(&self) -> Option<&SimState<S>> {
        self.canonical.as_ref()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn stats(&self) -> &ParticipantStats {
        &self.stats
    }

    /// Append a confirmed event to canonical, and either carry the
    /// projection forward with it or invalidate the projection.
    ///
    /// An event at or ahead of the projection's cursor is still in its
    /// future: both copies take it, and both clocks snap to the event's tick
    /// since the authority just told us exactly where virtual time stands.
    /// An event behind the cursor proves the projection ran without it; the
    /// sole invalidation condition.
    fn add_event(&mut self, event: Event, now: Instant) -> RuntimeResult<()> {
        let canonical = self
            .canonical
            .as_mut()
            .ok_or(RuntimeError::NotBootstrapped)?;
        canonical.enqueue(event.clone());

        if let Some(projection) = self.projection.as_mut() {
            if event.vt >= projection.vt {
                projection.enqueue(event.clone());
                projection.clock = event.vt;
                canonical.clock = event.vt;
                self.next_deadline = Some(now + self.config.tick_period);
                self.stats.resyncs += 1;
            } else {
                let projected_vt = projection.vt;
                let gap = span_of(projected_vt.ticks_since(event.vt), self.config.tick_period);
                tracing::debug!(
                    "projection at vt {} missed event at vt {} by {:?}; discarding",
                    projected_vt,
                    event.vt,
                    gap
                );
                self.projection = None;
                self.stats.invalidations += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lockstep_core::VirtualTime;

    use super::*;

    const PERIOD: Duration = Duration::from_millis(20);

    fn config() -> RuntimeConfig {
        RuntimeConfig {
            tick_period: PERIOD,
            ..RuntimeConfig::default()
        }
    }

    fn bootstrap_frame(state: &SimState<()>, session_id: u64) -> Event {
        Event {
            kind: EventKind::Bootstrap,
            data: EventData::Bootstrap {
                snapshot: state.snapshot().unwrap(),
                session_id: SessionId::new(session_id),
            },
            vt: state.clock,
            sender: SessionId::AUTHORITY,
        }
    }

    fn bootstrapped(now: Instant) -> Participant<()> {
        let mut source: SimState<()> = SimState::new(());
        source.vt = VirtualTime::new(10);
        source.clock = VirtualTime::new(10);

        let mut participant = Participant::new(Engine::new(), config()).unwrap();
        participant
            .on_frame(&bootstrap_frame(&source, 2), now)
            .unwrap();
        participant
    }

    fn custom_at(vt: u64) -> Event {
        Event::custom(SessionId::new(3), VirtualTime::new(vt), Value::Null)
    }

    #[test]
    fn test_bootstrap_installs_state_and_id() {
        let now = Instant::now();
        let participant = bootstrapped(now);

        assert!(participant.is_bootstrapped());
        assert_eq!(participant.session_id(), Some(SessionId::new(2)));
        assert_eq!(
            participant.canonical().unwrap().vt,
            VirtualTime::new(10)
        );
        assert!(participant.projection().is_none());
    }

    #[test]
    fn test_double_bootstrap_is_refused() {
        let now = Instant::now();
        let mut participant = bootstrapped(now);

        let source: SimState<()> = SimState::new(());
        let result = participant.on_frame(&bootstrap_frame(&source, 9), now);
        assert!(matches!(result, Err(RuntimeError::AlreadyStarted)));
    }

    #[test]
    fn test_tick_before_bootstrap_is_refused() {
        let mut participant: Participant<()> =
            Participant::new(Engine::new(), config()).unwrap();
        assert!(matches!(
            participant.tick(Instant::now()),
            Err(RuntimeError::NotBootstrapped)
        ));
    }

    #[test]
    fn test_first_tick_builds_projection() {
        let now = Instant::now();
        let mut participant = bootstrapped(now);

        participant.tick(now).unwrap();

        let projection = participant.projection().unwrap();
        assert_eq!(projection.vt, VirtualTime::new(10));
        assert_eq!(participant.stats().rebuilds, 1);
    }

    #[test]
    fn test_tick_advances_projection_to_its_clock() {
        let now = Instant::now();
        let mut participant = bootstrapped(now);

        // 3 periods elapse
        participant.tick(now + PERIOD * 3).unwrap();

        let projection = participant.projection().unwrap();
        assert_eq!(projection.clock, VirtualTime::new(13));
        // the projection runs right up to its clock
        assert_eq!(projection.vt, VirtualTime::new(13));
        // canonical counts the same ticks but is never advanced here
        let canonical = participant.canonical().unwrap();
        assert_eq!(canonical.clock, VirtualTime::new(13));
        assert_eq!(canonical.vt, VirtualTime::new(10));
    }

    #[test]
    fn test_future_event_joins_projection_and_resyncs() {
        let now = Instant::now();
        let mut participant = bootstrapped(now);
        participant.tick(now).unwrap();

        participant
            .on_frame(&custom_at(12), now)
            .unwrap();

        let projection = participant.projection().unwrap();
        assert_eq!(projection.events.len(), 1);
        // both clocks snap to the confirmed tick
        assert_eq!(projection.clock, VirtualTime::new(12));
        assert_eq!(participant.canonical().unwrap().clock, VirtualTime::new(12));
        assert_eq!(participant.stats().resyncs, 1);
        assert_eq!(participant.stats().invalidations, 0);
    }

    #[test]
    fn test_past_event_invalidates_projection() {
        let now = Instant::now();
        let mut participant = bootstrapped(now);

        // run the projection ahead to vt 15
        participant.tick(now + PERIOD * 5).unwrap();
        assert_eq!(
            participant.projection().unwrap().vt,
            VirtualTime::new(15)
        );

        // an event at vt 11 is in the projection's past
        participant
            .on_frame(&custom_at(11), now + PERIOD * 5)
            .unwrap();

        assert!(participant.projection().is_none());
        assert_eq!(participant.stats().invalidations, 1);
        // canonical always keeps the event
        assert_eq!(participant.canonical().unwrap().events.len(), 1);

        // the next tick rebuilds from canonical and replays through the event
        participant.tick(now + PERIOD * 5).unwrap();
        let projection = participant.projection().unwrap();
        assert_eq!(projection.vt, VirtualTime::new(15));
        assert!(projection.events.is_empty());
    }

    #[test]
    fn test_ping_is_answered_with_pong() {
        let now = Instant::now();
        let mut participant = bootstrapped(now);

        let ping = Event {
            kind: EventKind::Ping,
            data: EventData::Ping { start_ms: 777 },
            vt: VirtualTime::new(10),
            sender: SessionId::AUTHORITY,
        };

        let directives = participant.on_frame(&ping, now).unwrap();
        match &directives[0] {
            Directive::Send { session_id, frame } => {
                assert_eq!(*session_id, SessionId::AUTHORITY);
                assert_eq!(frame.kind, EventKind::Pong);
                assert!(matches!(frame.data, EventData::Ping { start_ms: 777 }));
            }
            other => panic!("expected send, got {other:?}"),
        }
    }

    #[test]
    fn test_idle_heartbeat() {
        let now = Instant::now();
        let mut participant = bootstrapped(now);

        // first window: not yet idle
        assert!(participant.heartbeat().is_empty());
        // second window: idle, so an Empty goes out
        let directives = participant.heartbeat();
        assert_eq!(directives.len(), 1);
        match &directives[0] {
            Directive::Send { frame, .. } => {
                assert_eq!(frame.kind, EventKind::Empty);
                assert_eq!(frame.sender, SessionId::new(2));
            }
            other => panic!("expected send, got {other:?}"),
        }

        // sending a custom resets the idle flag
        participant.send_custom(Value::from(1i64)).unwrap();
        assert!(participant.heartbeat().is_empty());
    }

    #[test]
    fn test_compact_touches_canonical_only() {
        let now = Instant::now();
        let mut participant = bootstrapped(now);
        participant.tick(now + PERIOD * 5).unwrap();

        // authority heartbeat confirms history up to vt 14
        participant
            .on_frame(
                &Event::empty(SessionId::AUTHORITY, VirtualTime::new(14)),
                now + PERIOD * 5,
            )
            .unwrap();
        // only the authority is registered in this state, so its floor rules
        participant.compact().unwrap();

        assert_eq!(participant.canonical().unwrap().vt, VirtualTime::new(14));
    }
}
