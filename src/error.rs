//! Error types for the Roomcast client.

use thiserror::Error;

use crate::client::ConnectionState;
use crate::value::Value;

/// Errors that can occur when using the Roomcast client.
#[derive(Debug, Error)]
pub enum RoomcastError {
    /// An operation was invoked in a connection state that forbids it.
    #[error("'{operation}' not available in state '{state}'")]
    InvalidState {
        /// Name of the attempted operation.
        operation: &'static str,
        /// Connection state at the time of the attempt.
        state: ConnectionState,
    },

    /// The connection closed while the operation was outstanding.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Close reason reported by the peer or supplied to `close`.
        reason: String,
    },

    /// The server rejected a correlated call. The payload of the failure
    /// response is carried verbatim, uninterpreted.
    #[error("remote call rejected: {0:?}")]
    Remote(Value),

    /// A response arrived but its payload had the wrong shape for the
    /// operation that was awaiting it.
    #[error("unexpected reply: expected {expected}, got {got:?}")]
    UnexpectedReply {
        /// What the operation expected.
        expected: &'static str,
        /// The value the server actually returned.
        got: Value,
    },

    /// Failed to encode an outbound frame.
    #[error("frame encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Failed to decode an inbound frame.
    #[error("frame decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for Roomcast client operations.
pub type Result<T> = std::result::Result<T, RoomcastError>;
