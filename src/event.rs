//! Connection meta events.
//!
//! Meta events describe the lifecycle of the connection itself, as opposed
//! to application-level room broadcasts (which arrive on the
//! [`messages`](crate::RoomcastClient::messages) hub keyed by their own
//! event names).

use crate::client::ConnectionState;
use crate::value::Value;

/// The fixed set of meta-event keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Any inbound event frame, with its full payload.
    Message,
    /// A room was joined successfully.
    JoinRoom,
    /// The connection closed.
    Close,
    /// The connection state changed.
    State,
}

/// Payload of one connection meta event.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Full payload of an inbound event frame (everything after the
    /// discriminant), including the event name when one is present.
    Message(Vec<Value>),
    /// Identifier of the room that was just joined.
    JoinRoom(String),
    /// Close reason reported by the peer or supplied to `close`.
    Close(String),
    /// The state just entered.
    State(ConnectionState),
}

impl ClientEvent {
    /// The hub key this event is dispatched under.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Message(_) => EventKind::Message,
            Self::JoinRoom(_) => EventKind::JoinRoom,
            Self::Close(_) => EventKind::Close,
            Self::State(_) => EventKind::State,
        }
    }
}
