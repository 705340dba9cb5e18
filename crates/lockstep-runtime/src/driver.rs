//! tokio drivers
//!
//! The sans-io loops are driven by interval timers plus a single inbound
//! queue per loop, which is what serializes every session's events before
//! `handle` ever runs. Timer fires may be arbitrarily late; the catch-up
//! logic inside `tick` counts elapsed periods, so lateness self-corrects.

use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use lockstep_core::{Event, SessionId, StatePayload};
use lockstep_wire::Value;

use crate::{flush, Authority, Participant, RuntimeResult, Transport};

/// Inputs fed to the authority loop by the transport layer
#[derive(Debug)]
pub enum AuthorityInput {
    /// A participant connected; the assigned session id is sent back
    Connect {
        reply: oneshot::Sender<SessionId>,
    },
    Disconnect(SessionId),
    Frame(SessionId, Event),
    Shutdown,
}

/// Inputs fed to a participant loop
#[derive(Debug)]
pub enum ParticipantInput {
    /// A frame arrived from the authority
    Frame(Event),
    /// Local input to forward as a Custom event
    Custom(Value),
    Shutdown,
}

fn interval_after(period: std::time::Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Drive an authority until shutdown; returns it for inspection
pub async fn run_authority<S, T>(
    mut authority: Authority<S>,
    mut transport: T,
    mut inbound: mpsc::Receiver<AuthorityInput>,
) -> RuntimeResult<Authority<S>>
where
    S: StatePayload + Send,
    T: Transport,
{
    authority.start(Instant::now())?;

    let mut tick = interval_after(authority.config().tick_period);
    let mut compact = interval_after(authority.config().compact_interval);
    let mut heartbeat = interval_after(authority.config().heartbeat_interval);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                authority.tick(Instant::now())?;
            }
            _ = compact.tick() => {
                authority.compact();
            }
            _ = heartbeat.tick() => {
                let directives = authority.heartbeat();
                flush(&mut transport, directives)?;
            }
            input = inbound.recv() => match input {
                Some(AuthorityInput::Connect { reply }) => {
                    let (session_id, directives) = authority.on_connect()?;
                    flush(&mut transport, directives)?;
                    let _ = reply.send(session_id);
                }
                Some(AuthorityInput::Disconnect(session_id)) => {
                    let directives = authority.on_disconnect(session_id);
                    flush(&mut transport, directives)?;
                }
                Some(AuthorityInput::Frame(sender, frame)) => {
                    match authority.on_frame(sender, &frame) {
                        Ok(directives) => flush(&mut transport, directives)?,
                        Err(error) => {
                            tracing::warn!("refusing frame from session {}: {}", sender, error);
                        }
                    }
                }
                Some(AuthorityInput::Shutdown) | None => break,
            }
        }
    }

    Ok(authority)
}

/// Drive a participant until shutdown; returns it for inspection
pub async fn run_participant<S, T>(
    mut participant: Participant<S>,
    mut transport: T,
    mut inbound: mpsc::Receiver<ParticipantInput>,
) -> RuntimeResult<Participant<S>>
where
    S: StatePayload + Send,
    T: Transport,
{
    let mut tick = interval_after(participant.config().tick_period);
    let mut compact = interval_after(participant.config().compact_interval);
    let mut heartbeat = interval_after(participant.config().heartbeat_interval);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                // nothing to reconcile until the bootstrap lands
                if participant.is_bootstrapped() {
                    participant.tick(Instant::now())?;
                }
            }
            _ = compact.tick() => {
                if participant.is_bootstrapped() {
                    participant.compact()?;
                }
            }
            _ = heartbeat.tick() => {
                let directives = participant.heartbeat();
                flush(&mut transport, directives)?;
            }
            input = inbound.recv() => match input {
                Some(ParticipantInput::Frame(frame)) => {
                    match participant.on_frame(&frame, Instant::now()) {
                        Ok(directives) => flush(&mut transport, directives)?,
                        Err(error) => {
                            tracing::warn!("refusing frame {:?}: {}", frame.kind, error);
                        }
                    }
                }
                Some(ParticipantInput::Custom(payload)) => {
                    match participant.send_custom(payload) {
                        Ok(directives) => flush(&mut transport, directives)?,
                        Err(error) => {
                            tracing::warn!("dropping local input: {}", error);
                        }
                    }
                }
                Some(ParticipantInput::Shutdown) | None => break,
            }
        }
    }

    Ok(participant)
}
