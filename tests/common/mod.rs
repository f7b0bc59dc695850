#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for Roomcast client integration tests.
//!
//! Provides two mock transports and helpers for building wire frames:
//!
//! - [`ScriptedTransport`] feeds a fixed sequence of inbound frames; good
//!   for push-style scenarios (broadcasts, server-initiated close).
//! - [`channel_transport`] gives a live duplex pair so a test can act as
//!   the server: await the client's request, inspect it, then reply.
//!   Required for correlated calls, where a reply must not arrive before
//!   the request that carries its call id.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use roomcast_client::protocol::{EVENT_FRAME_MARKER, STATUS_OK};
use roomcast_client::{BincodeCodec, FrameCodec, RoomcastError, Transport, Value};
use tokio::sync::mpsc;

// ── ScriptedTransport ───────────────────────────────────────────────

/// A mock transport that replays a fixed script of inbound frames.
///
/// Frames sent by the client are recorded in `sent`. Once the script is
/// exhausted, `recv` hangs so the connection loop stays alive until the
/// client closes.
pub struct ScriptedTransport {
    incoming: VecDeque<Option<Result<Vec<u8>, RoomcastError>>>,
    pub sent: Arc<StdMutex<Vec<Vec<u8>>>>,
    pub closed: Arc<StdMutex<Option<(u16, String)>>>,
}

impl ScriptedTransport {
    /// Create a scripted transport plus handles for inspecting the frames
    /// the client sent and the close call it made.
    pub fn new(
        incoming: Vec<Option<Result<Vec<u8>, RoomcastError>>>,
    ) -> (
        Self,
        Arc<StdMutex<Vec<Vec<u8>>>>,
        Arc<StdMutex<Option<(u16, String)>>>,
    ) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(StdMutex::new(None));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), RoomcastError> {
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Vec<u8>, RoomcastError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            // Script exhausted — hang so the connection loop stays alive
            // until the client closes.
            std::future::pending().await
        }
    }

    async fn close(&mut self, code: u16, reason: String) -> Result<(), RoomcastError> {
        *self.closed.lock().unwrap() = Some((code, reason));
        Ok(())
    }
}

// ── ChannelTransport ────────────────────────────────────────────────

/// A live duplex mock transport. The test drives the [`ServerEnd`].
pub struct ChannelTransport {
    incoming: mpsc::UnboundedReceiver<Result<Vec<u8>, RoomcastError>>,
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
    closed: Arc<StdMutex<Option<(u16, String)>>>,
}

/// The server side of a [`ChannelTransport`] pair.
pub struct ServerEnd {
    pub to_client: mpsc::UnboundedSender<Result<Vec<u8>, RoomcastError>>,
    pub from_client: mpsc::UnboundedReceiver<Vec<u8>>,
    pub closed: Arc<StdMutex<Option<(u16, String)>>>,
}

impl ServerEnd {
    /// Await and decode the next frame the client sent.
    pub async fn next_frame(&mut self) -> Vec<Value> {
        let bytes = self.from_client.recv().await.expect("client frame");
        decode_frame(&bytes)
    }

    /// Send a frame to the client.
    pub fn push(&self, frame: &[Value]) {
        self.to_client.send(Ok(encode_frame(frame))).expect("push");
    }
}

/// Create a connected [`ChannelTransport`] / [`ServerEnd`] pair.
pub fn channel_transport() -> (ChannelTransport, ServerEnd) {
    let (to_client, incoming) = mpsc::unbounded_channel();
    let (outgoing, from_client) = mpsc::unbounded_channel();
    let closed = Arc::new(StdMutex::new(None));
    (
        ChannelTransport {
            incoming,
            outgoing,
            closed: Arc::clone(&closed),
        },
        ServerEnd {
            to_client,
            from_client,
            closed,
        },
    )
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), RoomcastError> {
        self.outgoing
            .send(frame)
            .map_err(|_| RoomcastError::TransportSend("peer gone".into()))
    }

    async fn recv(&mut self) -> Option<Result<Vec<u8>, RoomcastError>> {
        self.incoming.recv().await
    }

    async fn close(&mut self, code: u16, reason: String) -> Result<(), RoomcastError> {
        *self.closed.lock().unwrap() = Some((code, reason));
        Ok(())
    }
}

// ── Frame helpers ───────────────────────────────────────────────────

/// Encode a frame with the default codec.
pub fn encode_frame(frame: &[Value]) -> Vec<u8> {
    BincodeCodec.encode(frame).expect("encode_frame")
}

/// Decode a frame with the default codec.
pub fn decode_frame(bytes: &[u8]) -> Vec<Value> {
    BincodeCodec.decode(bytes).expect("decode_frame")
}

/// Build a successful response frame for `call_id`.
pub fn response_ok(call_id: i64, result: Value) -> Vec<Value> {
    vec![Value::Int(STATUS_OK), Value::Int(call_id), result]
}

/// Build a failed response frame for `call_id`.
pub fn response_err(call_id: i64, error: Value) -> Vec<Value> {
    vec![Value::Int(1), Value::Int(call_id), error]
}

/// Build an event frame carrying `name` and `args`.
pub fn event_frame(name: &str, args: Vec<Value>) -> Vec<Value> {
    let mut frame = Vec::with_capacity(args.len() + 2);
    frame.push(Value::Int(EVENT_FRAME_MARKER));
    frame.push(Value::from(name));
    frame.extend(args);
    frame
}
