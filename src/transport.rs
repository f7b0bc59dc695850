//! Transport abstraction for the Roomcast protocol.
//!
//! The [`Transport`] trait defines a bidirectional binary message channel
//! between the client and server. The protocol mandates binary frames, so
//! every transport implementation must preserve message boundaries
//! (e.g., WebSocket binary frames, length-prefixed TCP, QUIC streams).
//!
//! # Connection Setup
//!
//! Connection setup is intentionally NOT part of this trait — different
//! transports have fundamentally different connection parameters (URLs for
//! WebSocket, host:port for TCP, QUIC endpoints, etc.). Construct a
//! connected transport externally, then pass it to
//! [`RoomcastClient::start`](crate::RoomcastClient::start).
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use roomcast_client::error::RoomcastError;
//! use roomcast_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, frame: Vec<u8>) -> Result<(), RoomcastError> {
//!         // Send one complete binary frame over your transport
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<Vec<u8>, RoomcastError>> {
//!         // Receive the next complete binary frame
//!         // Return None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self, code: u16, reason: String) -> Result<(), RoomcastError> {
//!         // Shut down the connection, forwarding the close code/reason
//!         // if the underlying protocol supports them
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::RoomcastError;

/// A bidirectional binary frame transport for the Roomcast protocol.
///
/// Implementors shuttle complete encoded frames between the client and
/// server. Each call to [`send`](Transport::send) transmits one frame;
/// each call to [`recv`](Transport::recv) returns one frame.
///
/// # Object Safety
///
/// This trait is object-safe, so `Box<dyn Transport>` works for dynamic
/// dispatch. However, `RoomcastClient::start` accepts `impl Transport`
/// (monomorphized) for the common case.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it
/// is used inside `tokio::select!`. If `recv` is cancelled before
/// completion, calling it again must not lose frames. Channel-based
/// implementations (e.g., wrapping `mpsc::Receiver`) are naturally
/// cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one binary frame to the server.
    ///
    /// # Errors
    ///
    /// Returns [`RoomcastError::TransportSend`] if the frame could not be
    /// sent (e.g., connection broken, write buffer full).
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), RoomcastError>;

    /// Receive the next binary frame from the server.
    ///
    /// Returns:
    /// - `Some(Ok(frame))` — a complete frame was received
    /// - `Some(Err(e))` — a transport error occurred
    /// - `None` — the connection was closed cleanly by the server
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe (see [trait documentation](Transport)).
    async fn recv(&mut self) -> Option<Result<Vec<u8>, RoomcastError>>;

    /// Close the transport connection, carrying an application close code
    /// and reason string where the underlying protocol supports them.
    ///
    /// After calling this method, subsequent calls to
    /// [`send`](Transport::send) and [`recv`](Transport::recv) may return
    /// errors or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations
    /// should still release resources even if the close handshake fails.
    async fn close(&mut self, code: u16, reason: String) -> Result<(), RoomcastError>;
}
