//! Cluster fixture
//!
//! One authority plus any number of participants, wired through in-memory
//! links and driven by a scripted clock. Time only moves when `advance` is
//! called, so every run is reproducible down to the tick.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use lockstep_core::{SessionId, StatePayload};
use lockstep_engine::Engine;
use lockstep_runtime::{
    Authority, Directive, Participant, RuntimeConfig, RuntimeError, RuntimeResult,
};
use lockstep_wire::Value;

use crate::{Link, LinkConfig};

/// A scripted-clock cluster of one authority and its participants
pub struct Cluster<S, F>
where
    S: StatePayload,
    F: Fn() -> Engine<S>,
{
    pub authority: Authority<S>,
    participants: BTreeMap<SessionId, Participant<S>>,
    uplinks: BTreeMap<SessionId, Link>,
    downlinks: BTreeMap<SessionId, Link>,
    make_engine: F,
    config: RuntimeConfig,
    link_config: LinkConfig,
    now: Instant,
    link_seed: u64,
}

impl<S, F> Cluster<S, F>
where
    S: StatePayload,
    F: Fn() -> Engine<S>,
{
    /// Build and start an authority. `make_engine` is called once per node so
    /// every replica registers the same extensions in the same order.
    pub fn new(
        config: RuntimeConfig,
        link_config: LinkConfig,
        make_engine: F,
        data: S,
    ) -> RuntimeResult<Self> {
        let now = Instant::now();
        let mut authority = Authority::new(make_engine(), data, config.clone())?;
        authority.start(now)?;

        Ok(Cluster {
            authority,
            participants: BTreeMap::new(),
            uplinks: BTreeMap::new(),
            downlinks: BTreeMap::new(),
            make_engine,
            config,
            link_config,
            now,
            link_seed: 0,
        })
    }

    /// Connect a new participant; its bootstrap and announcement enter the
    /// links immediately
    pub fn connect(&mut self) -> RuntimeResult<SessionId> {
        let (session_id, directives) = self.authority.on_connect()?;

        let participant = Participant::new((self.make_engine)(), self.config.clone())?;
        let downlink = self.next_link();
        let uplink = self.next_link();
        self.participants.insert(session_id, participant);
        self.downlinks.insert(session_id, downlink);
        self.uplinks.insert(session_id, uplink);

        self.route_from_authority(directives);
        Ok(session_id)
    }

    /// Disconnect a participant; remaining participants hear about it
    pub fn disconnect(&mut self, session_id: SessionId) -> RuntimeResult<()> {
        if self.participants.remove(&session_id).is_none() {
            return Err(RuntimeError::transport("unknown session"));
        }
        self.downlinks.remove(&session_id);
        self.uplinks.remove(&session_id);

        let directives = self.authority.on_disconnect(session_id);
        self.route_from_authority(directives);
        Ok(())
    }

    /// Queue local input on one participant
    pub fn send_custom(&mut self, session_id: SessionId, payload: Value) -> RuntimeResult<()> {
        let participant = self
            .participants
            .get_mut(&session_id)
            .ok_or_else(|| RuntimeError::transport("unknown session"))?;
        let directives = participant.send_custom(payload)?;
        self.route_from_participant(session_id, directives);
        Ok(())
    }

    /// Move the scripted clock forward, deliver everything that becomes due,
    /// and run one loop iteration on every node
    pub fn advance(&mut self, dt: Duration) -> RuntimeResult<()> {
        self.now += dt;
        self.pump()?;

        self.authority.tick(self.now)?;
        for participant in self.participants.values_mut() {
            if participant.is_bootstrapped() {
                participant.tick(self.now)?;
            }
        }
        Ok(())
    }

    /// `advance` in millisecond terms
    pub fn advance_ms(&mut self, ms: u64) -> RuntimeResult<()> {
        self.advance(Duration::from_millis(ms))
    }

    /// Fire every node's heartbeat
    pub fn heartbeat(&mut self) {
        let directives = self.authority.heartbeat();
        self.route_from_authority(directives);

        let ids: Vec<SessionId> = self.participants.keys().copied().collect();
        for session_id in ids {
            if let Some(participant) = self.participants.get_mut(&session_id) {
                let directives = participant.heartbeat();
                self.route_from_participant(session_id, directives);
            }
        }
    }

    /// Compact history on every node
    pub fn compact(&mut self) -> RuntimeResult<()> {
        self.authority.compact();
        for participant in self.participants.values_mut() {
            if participant.is_bootstrapped() {
                participant.compact()?;
            }
        }
        Ok(())
    }

    pub fn participant(&self, session_id: SessionId) -> Option<&Participant<S>> {
        self.participants.get(&session_id)
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    /// Frames still in flight across all links
    pub fn in_flight(&self) -> usize {
        self.uplinks
            .values()
            .chain(self.downlinks.values())
            .map(Link::pending)
            .sum()
    }

    fn next_link(&mut self) -> Link {
        self.link_seed += 1;
        Link::new(self.link_config.clone(), self.link_seed)
    }

    fn route_from_authority(&mut self, directives: Vec<Directive>) {
        for directive in directives {
            match directive {
                Directive::Send { session_id, frame } => {
                    if let Some(link) = self.downlinks.get_mut(&session_id) {
                        link.offer(self.now, frame);
                    }
                }
                Directive::Broadcast { frame } => {
                    for link in self.downlinks.values_mut() {
                        link.offer(self.now, frame.clone());
                    }
                }
            }
        }
    }

    fn route_from_participant(&mut self, session_id: SessionId, directives: Vec<Directive>) {
        for directive in directives {
            // participants only ever address the authority
            if let Directive::Send { frame, .. } = directive {
                if let Some(link) = self.uplinks.get_mut(&session_id) {
                    link.offer(self.now, frame);
                }
            }
        }
    }

    /// Deliver due frames until nothing new becomes deliverable; deliveries
    /// can cascade (a relayed Custom, a Pong reply)
    fn pump(&mut self) -> RuntimeResult<()> {
        loop {
            let mut delivered = false;
            let ids: Vec<SessionId> = self.participants.keys().copied().collect();

            for session_id in &ids {
                let frames = self
                    .uplinks
                    .get_mut(session_id)
                    .map(|link| link.due(self.now))
                    .unwrap_or_default();
                for frame in frames {
                    delivered = true;
                    let directives = self.authority.on_frame(*session_id, &frame)?;
                    self.route_from_authority(directives);
                }
            }

            for session_id in &ids {
                let frames = self
                    .downlinks
                    .get_mut(session_id)
                    .map(|link| link.due(self.now))
                    .unwrap_or_default();
                for frame in frames {
                    delivered = true;
                    let directives = match self.participants.get_mut(session_id) {
                        Some(participant) => participant.on_frame(&frame, self.now)?,
                        None => Vec::new(),
                    };
                    self.route_from_participant(*session_id, directives);
                }
            }

            if !delivered {
                return Ok(());
            }
        }
    }
}
