//! Event definitions
//!
//! Events are the only mutations of shared history. One shape serves both
//! the replicated log and the transport frames: Ping/Pong/Bootstrap only ever
//! exist as frames and are rejected if they show up inside the log.

use lockstep_wire::{Value, Wire};

use crate::{CoreError, CoreResult, SessionId, VirtualTime};

/// Event kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    /// A participant joined; authority-originated
    NewSession = 0x01,
    /// A participant left; authority-originated
    EndSession = 0x02,
    /// Domain event, payload interpreted by extensions
    Custom = 0x03,
    /// Heartbeat carrying no payload
    Empty = 0x04,
    /// Latency probe (frame only)
    Ping = 0x10,
    /// Latency probe reply (frame only)
    Pong = 0x11,
    /// Full state handoff to a connecting participant (frame only)
    Bootstrap = 0x12,
}

impl EventKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(EventKind::NewSession),
            0x02 => Some(EventKind::EndSession),
            0x03 => Some(EventKind::Custom),
            0x04 => Some(EventKind::Empty),
            0x10 => Some(EventKind::Ping),
            0x11 => Some(EventKind::Pong),
            0x12 => Some(EventKind::Bootstrap),
            _ => None,
        }
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// May this kind appear inside the replicated event log?
    pub fn is_log_kind(self) -> bool {
        matches!(
            self,
            EventKind::NewSession | EventKind::EndSession | EventKind::Custom | EventKind::Empty
        )
    }
}

/// Event payload
#[derive(Clone, Debug)]
pub enum EventData {
    /// No payload (Empty heartbeats)
    None,
    /// Membership change target
    Session { session_id: SessionId },
    /// Opaque domain payload, interpreted by extensions
    Custom(Value),
    /// Latency probe echo payload
    Ping { start_ms: i64 },
    /// Snapshot handoff: normalized state plus the assigned session id
    Bootstrap {
        snapshot: Wire,
        session_id: SessionId,
    },
}

/// An event: a kind, its payload, the virtual tick it occurs at, and the
/// session that produced it
#[derive(Clone, Debug)]
pub struct Event {
    pub kind: EventKind,
    pub data: EventData,
    pub vt: VirtualTime,
    pub sender: SessionId,
}

impl Event {
    /// Membership event announcing a new session; always authority-originated
    pub fn new_session(vt: VirtualTime, session_id: SessionId) -> Self {
        Event {
            kind: EventKind::NewSession,
            data: EventData::Session { session_id },
            vt,
            sender: SessionId::AUTHORITY,
        }
    }

    /// Membership event ending a session; always authority-originated
    pub fn end_session(vt: VirtualTime, session_id: SessionId) -> Self {
        Event {
            kind: EventKind::EndSession,
            data: EventData::Session { session_id },
            vt,
            sender: SessionId::AUTHORITY,
        }
    }

    /// Domain event with an opaque payload
    pub fn custom(sender: SessionId, vt: VirtualTime, payload: Value) -> Self {
        Event {
            kind: EventKind::Custom,
            data: EventData::Custom(payload),
            vt,
            sender,
        }
    }

    /// Heartbeat
    pub fn empty(sender: SessionId, vt: VirtualTime) -> Self {
        Event {
            kind: EventKind::Empty,
            data: EventData::None,
            vt,
            sender,
        }
    }

    /// The membership target for NewSession/EndSession events
    pub fn session_target(&self) -> Option<SessionId> {
        match self.data {
            EventData::Session { session_id } => Some(session_id),
            _ => None,
        }
    }

    /// Encode to a value graph.
    ///
    /// Bootstrap frames are transport-level and have no value form; they never
    /// enter the log, so snapshots never meet one.
    pub fn to_value(&self) -> CoreResult<Value> {
        let value = Value::map();
        value.insert("kind", Value::from(self.kind.to_byte() as i64));
        value.insert("vt", Value::from(self.vt.tick() as i64));
        value.insert("sender", Value::from(self.sender.0 as i64));
        match &self.data {
            EventData::None => {}
            EventData::Session { session_id } => {
                let data = Value::map();
                data.insert("session", Value::from(session_id.0 as i64));
                value.insert("data", data);
            }
            EventData::Custom(payload) => {
                value.insert("data", payload.clone());
            }
            EventData::Ping { start_ms } => {
                let data = Value::map();
                data.insert("start", Value::from(*start_ms));
                value.insert("data", data);
            }
            EventData::Bootstrap { .. } => {
                return Err(CoreError::UnencodableFrame(self.kind));
            }
        }
        Ok(value)
    }

    /// Decode from a value graph
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        let kind_tag = value
            .get("kind")
            .and_then(|v| v.as_int())
            .ok_or(CoreError::MissingField("kind"))?;
        let kind = u8::try_from(kind_tag)
            .ok()
            .and_then(EventKind::from_byte)
            .ok_or(CoreError::UnknownKind(kind_tag))?;

        let vt = value
            .get("vt")
            .and_then(|v| v.as_int())
            .ok_or(CoreError::MissingField("vt"))?;
        let sender = value
            .get("sender")
            .and_then(|v| v.as_int())
            .ok_or(CoreError::MissingField("sender"))?;
        if vt < 0 || sender < 0 {
            return Err(CoreError::WrongType("vt/sender"));
        }

        let data = match kind {
            EventKind::NewSession | EventKind::EndSession => {
                let session_id = value
                    .get("data")
                    .and_then(|d| d.get("session"))
                    .and_then(|v| v.as_int())
                    .ok_or(CoreError::MissingField("data.session"))?;
                if session_id < 0 {
                    return Err(CoreError::WrongType("data.session"));
                }
                EventData::Session {
                    session_id: SessionId::new(session_id as u64),
                }
            }
            EventKind::Custom => {
                EventData::Custom(value.get("data").unwrap_or(Value::Null))
            }
            EventKind::Empty => EventData::None,
            EventKind::Ping | EventKind::Pong => {
                let start_ms = value
                    .get("data")
                    .and_then(|d| d.get("start"))
                    .and_then(|v| v.as_int())
                    .ok_or(CoreError::MissingField("data.start"))?;
                EventData::Ping { start_ms }
            }
            EventKind::Bootstrap => {
                return Err(CoreError::UnencodableFrame(kind));
            }
        };

        Ok(Event {
            kind,
            data,
            vt: VirtualTime::new(vt as u64),
            sender: SessionId::new(sender as u64),
        })
    }
}
