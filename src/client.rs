//! Async client for the Roomcast room protocol.
//!
//! [`RoomcastClient`] owns one connection. It spawns a background
//! connection loop that drives the [`Transport`], decodes inbound frames,
//! and settles correlated calls; the handle itself stays cheap to call
//! into from any task.
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = WebSocketTransport::connect("wss://example.com/ws").await?;
//! let client = RoomcastClient::start(transport, BincodeCodec);
//!
//! client.wait_for_init().await?;
//! client.join_room("r1", vec![Value::from("secret")]).await?;
//! let pong = client.call("ping", vec![]).await?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, warn};

use crate::codec::FrameCodec;
use crate::error::{Result, RoomcastError};
use crate::event::{ClientEvent, EventKind};
use crate::hub::EventHub;
use crate::protocol::{self, CallId, CallKind, InboundFrame, APP_CLOSE_CODE, STATUS_OK};
use crate::transport::Transport;
use crate::value::Value;

/// Close reason used when the connection ends without one.
const DEFAULT_CLOSE_REASON: &str = "socket closed";

// ── Connection state ────────────────────────────────────────────────

/// Lifecycle state of one client connection.
///
/// Transitions are monotone — `Init → Ready → Join → Room` — except for
/// the `Join → Init` rollback when a join fails. `Closed` is absorbing:
/// once entered, no further transition ever happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed; the socket has not reported readiness yet.
    Init,
    /// The socket is open; no room joined.
    Ready,
    /// A join request is in flight.
    Join,
    /// Inside a room; remote methods may be called.
    Room,
    /// The connection is gone. Terminal.
    Closed,
}

impl ConnectionState {
    /// Lowercase wire-style name, as used in error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Ready => "ready",
            Self::Join => "join",
            Self::Room => "room",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Shared state ────────────────────────────────────────────────────

type CallOutcome = Result<Value>;

/// State shared between the client handle and the connection loop.
struct Shared {
    /// Current connection state; watch so waiters see transitions.
    state: watch::Sender<ConnectionState>,
    /// Room id recorded on the first successful join; never cleared.
    room_id: StdMutex<Option<String>>,
    /// Reason the connection closed, once it has.
    close_reason: StdMutex<Option<String>>,
    /// Next correlated-call id. Strictly increasing, never reused.
    next_call_id: AtomicU64,
    /// In-flight correlated calls, keyed by call id.
    pending: StdMutex<HashMap<CallId, oneshot::Sender<CallOutcome>>>,
    /// Connection meta events (`message`, `joinRoom`, `close`, `state`).
    events: EventHub<EventKind, ClientEvent>,
    /// Room broadcasts keyed by application event name.
    messages: EventHub<String, [Value]>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: watch::channel(ConnectionState::Init).0,
            room_id: StdMutex::new(None),
            close_reason: StdMutex::new(None),
            next_call_id: AtomicU64::new(0),
            pending: StdMutex::new(HashMap::new()),
            events: EventHub::new(),
            messages: EventHub::new(),
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Apply a state transition, returning whether anything changed.
    ///
    /// Re-entering the current state is a no-op and `Closed` is absorbing,
    /// so a `state` meta event fires exactly when this returns `true`.
    fn set_state(&self, next: ConnectionState) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == next || *current == ConnectionState::Closed {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            debug!(state = %next, "connection state changed");
            self.events
                .emit(&EventKind::State, &ClientEvent::State(next));
        }
        changed
    }

    /// Tear down the connection-facing state exactly once: transition to
    /// `Closed`, emit the `close` meta event, and reject every pending
    /// call with a connection-closed error.
    fn shutdown(&self, reason: &str) {
        {
            let mut stored = lock(&self.close_reason);
            if stored.is_none() {
                *stored = Some(reason.to_string());
            }
        }
        if !self.set_state(ConnectionState::Closed) {
            return;
        }
        self.events
            .emit(&EventKind::Close, &ClientEvent::Close(reason.to_string()));

        let senders: Vec<_> = lock(&self.pending).drain().map(|(_, tx)| tx).collect();
        if !senders.is_empty() {
            debug!(count = senders.len(), "rejecting pending calls on close");
        }
        for tx in senders {
            let _ = tx.send(Err(RoomcastError::ConnectionClosed {
                reason: reason.to_string(),
            }));
        }
    }

    /// Connection-closed error carrying the recorded close reason.
    fn closed_error(&self) -> RoomcastError {
        let reason = lock(&self.close_reason)
            .clone()
            .unwrap_or_else(|| DEFAULT_CLOSE_REASON.to_string());
        RoomcastError::ConnectionClosed { reason }
    }

    /// Route one decoded inbound message.
    fn handle_frame(&self, codec: &dyn FrameCodec, bytes: &[u8]) {
        let frame = match codec.decode(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("failed to decode inbound frame: {e}");
                return;
            }
        };
        match protocol::classify(frame) {
            Some(InboundFrame::Event { payload }) => {
                self.events
                    .emit(&EventKind::Message, &ClientEvent::Message(payload.clone()));
                if let Some((Value::Str(name), args)) = payload.split_first() {
                    self.messages.emit(name, args);
                }
            }
            Some(InboundFrame::Response {
                call_id,
                status,
                result,
            }) => {
                let Some(tx) = lock(&self.pending).remove(&call_id) else {
                    debug!(call_id, "dropping response for unknown or settled call");
                    return;
                };
                let outcome = if status == STATUS_OK {
                    Ok(result)
                } else {
                    Err(RoomcastError::Remote(result))
                };
                // The caller may have stopped waiting; that's fine.
                let _ = tx.send(outcome);
            }
            None => {
                debug!("ignoring malformed inbound frame");
            }
        }
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to one Roomcast connection.
///
/// Created via [`RoomcastClient::start`], which spawns the background
/// connection loop. Dropping the handle aborts the loop; call
/// [`close`](RoomcastClient::close) first for a graceful close handshake.
pub struct RoomcastClient {
    shared: Arc<Shared>,
    codec: Arc<dyn FrameCodec>,
    /// Encoded outbound frames, consumed by the connection loop.
    frame_tx: mpsc::UnboundedSender<Vec<u8>>,
    /// Signals the loop to close the transport with a reason.
    shutdown_tx: StdMutex<Option<oneshot::Sender<String>>>,
    /// Handle to the connection loop task.
    task: StdMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl RoomcastClient {
    /// Start a client over an already-connected transport.
    ///
    /// The connection loop transitions the state from `init` to `ready`
    /// as its first action, so [`wait_for_init`](Self::wait_for_init)
    /// called on the fresh handle resolves once the loop is running.
    pub fn start(transport: impl Transport, codec: impl FrameCodec) -> Self {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<String>();

        let shared = Arc::new(Shared::new());
        let codec: Arc<dyn FrameCodec> = Arc::new(codec);

        let task = tokio::spawn(connection_loop(
            transport,
            frame_rx,
            shutdown_rx,
            Arc::clone(&shared),
            Arc::clone(&codec),
        ));

        Self {
            shared,
            codec,
            frame_tx,
            shutdown_tx: StdMutex::new(Some(shutdown_tx)),
            task: StdMutex::new(Some(task)),
        }
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Identifier of the joined room, once a join has succeeded.
    pub fn room_id(&self) -> Option<String> {
        lock(&self.shared.room_id).clone()
    }

    /// Subscriber for connection meta events.
    pub fn events(&self) -> &EventHub<EventKind, ClientEvent> {
        &self.shared.events
    }

    /// Subscriber for room broadcasts, keyed by application event name.
    /// Handlers receive the broadcast arguments (everything after the
    /// event name).
    pub fn messages(&self) -> &EventHub<String, [Value]> {
        &self.shared.messages
    }

    /// Wait until the connection has left the `init` state.
    ///
    /// Resolves with the client once any non-`closed` state is reached
    /// (immediately if that already happened).
    ///
    /// # Errors
    ///
    /// Returns [`RoomcastError::ConnectionClosed`] if the connection is
    /// already closed or closes while waiting.
    pub async fn wait_for_init(&self) -> Result<&Self> {
        let mut rx = self.shared.state.subscribe();
        loop {
            match *rx.borrow_and_update() {
                ConnectionState::Closed => return Err(self.shared.closed_error()),
                ConnectionState::Init => {}
                _ => return Ok(self),
            }
            if rx.changed().await.is_err() {
                return Err(self.shared.closed_error());
            }
        }
    }

    // ── Room lifecycle ──────────────────────────────────────────────

    /// Create a room from a descriptor and return its identifier.
    ///
    /// Legal in `ready`, `join`, and `room`; does not change the
    /// connection state.
    ///
    /// # Errors
    ///
    /// Fails synchronously with [`RoomcastError::InvalidState`] in `init`
    /// or `closed`, before any frame is sent. Otherwise propagates the
    /// correlated-call outcome; a non-string reply is
    /// [`RoomcastError::UnexpectedReply`].
    pub async fn create_room(&self, descriptor: impl Into<Value>) -> Result<String> {
        self.require_state(
            "createRoom",
            &[
                ConnectionState::Ready,
                ConnectionState::Join,
                ConnectionState::Room,
            ],
        )?;
        match self.send_call(CallKind::Room, vec![descriptor.into()]).await? {
            Value::Str(room_id) => Ok(room_id),
            got => Err(RoomcastError::UnexpectedReply {
                expected: "room id string",
                got,
            }),
        }
    }

    /// Join the room `room_id`, passing `data` through to the room.
    ///
    /// Transitions `ready → join` before sending. On a truthy reply the
    /// room id is recorded, the state becomes `room`, a `joinRoom` meta
    /// event fires, and `Ok(true)` is returned. A falsy reply returns
    /// `Ok(false)` and leaves the state in `join` — only the error path
    /// rolls back to `init`.
    ///
    /// # Errors
    ///
    /// [`RoomcastError::InvalidState`] unless the state is `ready`;
    /// otherwise the correlated-call failure, after the rollback.
    pub async fn join_room(&self, room_id: impl Into<String>, data: Vec<Value>) -> Result<bool> {
        self.require_state("joinRoom", &[ConnectionState::Ready])?;
        let room_id = room_id.into();
        self.shared.set_state(ConnectionState::Join);

        let mut args = Vec::with_capacity(data.len() + 1);
        args.push(Value::Str(room_id.clone()));
        args.extend(data);

        match self.send_call(CallKind::Join, args).await {
            Ok(result) => {
                if !result.is_truthy() {
                    return Ok(false);
                }
                *lock(&self.shared.room_id) = Some(room_id.clone());
                self.shared.set_state(ConnectionState::Room);
                self.shared
                    .events
                    .emit(&EventKind::JoinRoom, &ClientEvent::JoinRoom(room_id));
                Ok(true)
            }
            Err(err) => {
                // Rollback is refused by the absorbing guard if the
                // failure was the connection closing.
                self.shared.set_state(ConnectionState::Init);
                Err(err)
            }
        }
    }

    /// Invoke the remote method `method` inside the joined room.
    ///
    /// # Errors
    ///
    /// [`RoomcastError::InvalidState`] unless the state is `room`;
    /// [`RoomcastError::Remote`] with the server's error value if the
    /// call is rejected; [`RoomcastError::ConnectionClosed`] if the
    /// connection closes first.
    pub async fn call(&self, method: impl Into<String>, args: Vec<Value>) -> Result<Value> {
        self.require_state("call", &[ConnectionState::Room])?;
        let mut call_args = Vec::with_capacity(args.len() + 1);
        call_args.push(Value::Str(method.into()));
        call_args.extend(args);
        self.send_call(CallKind::Call, call_args).await
    }

    /// A bound handle for one remote method name.
    ///
    /// Purely an ergonomic wrapper over [`call`](Self::call):
    ///
    /// ```rust,ignore
    /// let ping = client.method("ping");
    /// let pong = ping.invoke(vec![]).await?;
    /// ```
    pub fn method(&self, name: impl Into<String>) -> RemoteMethod<'_> {
        RemoteMethod {
            client: self,
            name: name.into(),
        }
    }

    /// Close the connection.
    ///
    /// Forces the state to `closed` (rejecting every pending call and
    /// firing the `close` meta event), then asks the connection loop to
    /// close the transport with close code
    /// [`APP_CLOSE_CODE`](crate::protocol::APP_CLOSE_CODE) and `reason`.
    /// Terminal and idempotent.
    pub fn close(&self, reason: &str) {
        self.shared.shutdown(reason);
        if let Some(tx) = lock(&self.shutdown_tx).take() {
            let _ = tx.send(reason.to_string());
        }
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn require_state(&self, operation: &'static str, allowed: &[ConnectionState]) -> Result<()> {
        let state = self.shared.state();
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(RoomcastError::InvalidState { operation, state })
        }
    }

    /// Send one correlated request and await its response.
    async fn send_call(&self, kind: CallKind, args: Vec<Value>) -> Result<Value> {
        let call_id = self.shared.next_call_id.fetch_add(1, Ordering::Relaxed);
        let frame = protocol::request_frame(call_id, kind, args);
        let bytes = self.codec.encode(&frame)?;

        let (tx, rx) = oneshot::channel();
        lock(&self.shared.pending).insert(call_id, tx);

        debug!(call_id, kind = kind.as_str(), "sending correlated call");
        if self.frame_tx.send(bytes).is_err() {
            lock(&self.shared.pending).remove(&call_id);
            return Err(self.shared.closed_error());
        }

        // A close racing with the insert may already have drained the
        // pending map; a sender parked there after the drain would never
        // settle. Shutdown latches `Closed` before draining, so if the
        // drain missed this entry the state is visibly `Closed` here and
        // the entry must be reclaimed by hand.
        if self.shared.state() == ConnectionState::Closed {
            lock(&self.shared.pending).remove(&call_id);
            return Err(self.shared.closed_error());
        }

        match rx.await {
            Ok(outcome) => outcome,
            // Sender dropped without settling: the loop tore down.
            Err(_) => Err(self.shared.closed_error()),
        }
    }
}

impl fmt::Debug for RoomcastClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomcastClient")
            .field("state", &self.state())
            .field("room_id", &self.room_id())
            .field("pending", &lock(&self.shared.pending).len())
            .finish()
    }
}

impl Drop for RoomcastClient {
    fn drop(&mut self) {
        // `Drop` is synchronous, so a graceful close handshake cannot be
        // awaited here; aborting drops the transport and the loop with it.
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }
}

// ── Remote method handle ────────────────────────────────────────────

/// A remote method bound to its name, created by
/// [`RoomcastClient::method`].
#[derive(Debug)]
pub struct RemoteMethod<'a> {
    client: &'a RoomcastClient,
    name: String,
}

impl RemoteMethod<'_> {
    /// The bound method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the method with `args`.
    ///
    /// # Errors
    ///
    /// Same as [`RoomcastClient::call`].
    pub async fn invoke(&self, args: Vec<Value>) -> Result<Value> {
        self.client.call(self.name.clone(), args).await
    }
}

// ── Connection loop ─────────────────────────────────────────────────

/// Background loop that owns the transport.
///
/// Exits when:
/// - `close` is called on the handle (shutdown signal)
/// - the handle is dropped (frame channel closes)
/// - the transport returns `None` (server closed) or an error
async fn connection_loop(
    mut transport: impl Transport,
    mut frame_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    mut shutdown_rx: oneshot::Receiver<String>,
    shared: Arc<Shared>,
    codec: Arc<dyn FrameCodec>,
) {
    debug!("connection loop started");

    // The transport is handed over already connected; this is the
    // socket-open transition. Guarded: a no-op unless still `init`.
    shared.set_state(ConnectionState::Ready);

    loop {
        tokio::select! {
            // Branch 1: outbound frame from the handle
            frame = frame_rx.recv() => {
                match frame {
                    Some(bytes) => {
                        if let Err(e) = transport.send(bytes).await {
                            error!("transport send failed: {e}");
                            shared.shutdown(&e.to_string());
                            break;
                        }
                    }
                    // Frame channel closed — handle dropped.
                    None => {
                        debug!("client handle dropped, closing transport");
                        let reason = String::from("client dropped");
                        let _ = transport.close(APP_CLOSE_CODE, reason.clone()).await;
                        shared.shutdown(&reason);
                        break;
                    }
                }
            }

            // Branch 2: explicit close requested on the handle
            reason = &mut shutdown_rx => {
                // The handle already ran the closed transition; only the
                // transport handshake is left.
                let reason = reason.unwrap_or_else(|_| DEFAULT_CLOSE_REASON.to_string());
                debug!(reason = %reason, "closing transport on request");
                let _ = transport.close(APP_CLOSE_CODE, reason).await;
                break;
            }

            // Branch 3: inbound frame from the server
            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(bytes)) => shared.handle_frame(codec.as_ref(), &bytes),
                    Some(Err(e)) => {
                        error!("transport receive failed: {e}");
                        shared.shutdown(&e.to_string());
                        break;
                    }
                    // Transport closed cleanly by the server.
                    None => {
                        debug!("transport closed by server");
                        shared.shutdown(DEFAULT_CLOSE_REASON);
                        break;
                    }
                }
            }
        }
    }

    debug!("connection loop exited");
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;
    use crate::codec::BincodeCodec;

    // ── Duplex mock transport ───────────────────────────────────────

    struct ChannelTransport {
        incoming: mpsc::UnboundedReceiver<std::result::Result<Vec<u8>, RoomcastError>>,
        outgoing: mpsc::UnboundedSender<Vec<u8>>,
        closed: Arc<StdMutex<Option<(u16, String)>>>,
    }

    struct ServerEnd {
        to_client: mpsc::UnboundedSender<std::result::Result<Vec<u8>, RoomcastError>>,
        from_client: mpsc::UnboundedReceiver<Vec<u8>>,
        closed: Arc<StdMutex<Option<(u16, String)>>>,
    }

    fn channel_transport() -> (ChannelTransport, ServerEnd) {
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
        async fn send(&mut self, frame: Vec<u8>) -> std::result::Result<(), RoomcastError> {
            self.outgoing
                .send(frame)
                .map_err(|_| RoomcastError::TransportSend("peer gone".into()))
        }

        async fn recv(&mut self) -> Option<std::result::Result<Vec<u8>, RoomcastError>> {
            self.incoming.recv().await
        }

        async fn close(
            &mut self,
            code: u16,
            reason: String,
        ) -> std::result::Result<(), RoomcastError> {
            *self.closed.lock().unwrap() = Some((code, reason));
            Ok(())
        }
    }

    fn encode(frame: &[Value]) -> Vec<u8> {
        BincodeCodec.encode(frame).unwrap()
    }

    fn decode(bytes: &[u8]) -> Vec<Value> {
        BincodeCodec.decode(bytes).unwrap()
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn fresh_client_starts_in_init() {
        let (transport, _server) = channel_transport();
        let client = RoomcastClient::start(transport, BincodeCodec);
        // The loop task has not been polled yet on the current-thread
        // runtime, so the open transition cannot have happened.
        assert_eq!(client.state(), ConnectionState::Init);
    }

    #[tokio::test]
    async fn wait_for_init_resolves_once_loop_runs() {
        let (transport, _server) = channel_transport();
        let client = RoomcastClient::start(transport, BincodeCodec);
        client.wait_for_init().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Ready);
    }

    #[tokio::test]
    async fn wait_for_init_fails_after_close() {
        let (transport, _server) = channel_transport();
        let client = RoomcastClient::start(transport, BincodeCodec);
        client.close("done");
        let err = client.wait_for_init().await.unwrap_err();
        assert!(
            matches!(err, RoomcastError::ConnectionClosed { ref reason } if reason == "done"),
            "unexpected error: {err:?}"
        );
    }

    #[tokio::test]
    async fn state_reenters_are_not_reemitted() {
        let (transport, _server) = channel_transport();
        let client = RoomcastClient::start(transport, BincodeCodec);
        let count = Arc::new(StdMutex::new(0u32));
        {
            let count = Arc::clone(&count);
            client.events().on(EventKind::State, move |_| {
                *count.lock().unwrap() += 1;
            });
        }
        client.wait_for_init().await.unwrap();
        // Second open transition must be swallowed by the guard.
        assert!(!client.shared.set_state(ConnectionState::Ready));
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn closed_is_absorbing() {
        let (transport, _server) = channel_transport();
        let client = RoomcastClient::start(transport, BincodeCodec);
        client.close("bye");
        assert_eq!(client.state(), ConnectionState::Closed);
        assert!(!client.shared.set_state(ConnectionState::Ready));
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_keeps_first_reason() {
        let (transport, _server) = channel_transport();
        let client = RoomcastClient::start(transport, BincodeCodec);
        let reasons = Arc::new(StdMutex::new(Vec::new()));
        {
            let reasons = Arc::clone(&reasons);
            client.events().on(EventKind::Close, move |event| {
                if let ClientEvent::Close(reason) = event {
                    reasons.lock().unwrap().push(reason.clone());
                }
            });
        }
        client.close("first");
        client.close("second");
        assert_eq!(*reasons.lock().unwrap(), vec!["first"]);
        let err = client.wait_for_init().await.unwrap_err();
        assert!(matches!(err, RoomcastError::ConnectionClosed { ref reason } if reason == "first"));
    }

    #[tokio::test]
    async fn close_sends_app_close_code_to_transport() {
        let (transport, server) = channel_transport();
        let client = RoomcastClient::start(transport, BincodeCodec);
        client.wait_for_init().await.unwrap();
        client.close("bye");
        // Loop exit drops the outgoing sender once close is processed.
        let mut from_client = server.from_client;
        assert!(from_client.recv().await.is_none());
        assert_eq!(
            *server.closed.lock().unwrap(),
            Some((APP_CLOSE_CODE, "bye".to_string()))
        );
    }

    #[tokio::test]
    async fn server_close_rejects_pending_and_fires_close_event() {
        let (transport, server) = channel_transport();
        let client = RoomcastClient::start(transport, BincodeCodec);
        client.wait_for_init().await.unwrap();

        let closes = Arc::new(StdMutex::new(Vec::new()));
        {
            let closes = Arc::clone(&closes);
            client.events().on(EventKind::Close, move |event| {
                if let ClientEvent::Close(reason) = event {
                    closes.lock().unwrap().push(reason.clone());
                }
            });
        }

        let ServerEnd {
            to_client,
            mut from_client,
            ..
        } = server;

        let (first, second, ()) = tokio::join!(
            client.create_room(Value::Null),
            client.create_room(Value::Null),
            async {
                let _ = from_client.recv().await.unwrap();
                let _ = from_client.recv().await.unwrap();
                drop(to_client);
            }
        );

        for outcome in [first, second] {
            let err = outcome.unwrap_err();
            assert!(
                matches!(err, RoomcastError::ConnectionClosed { .. }),
                "unexpected error: {err:?}"
            );
        }
        assert_eq!(client.state(), ConnectionState::Closed);
        assert_eq!(*closes.lock().unwrap(), vec![DEFAULT_CLOSE_REASON]);
    }

    #[tokio::test]
    async fn create_room_in_init_fails_before_sending() {
        let (transport, mut server) = channel_transport();
        let client = RoomcastClient::start(transport, BincodeCodec);
        // Still `init`: the loop has not run.
        let err = client.create_room(Value::Null).await.unwrap_err();
        assert!(matches!(
            err,
            RoomcastError::InvalidState {
                operation: "createRoom",
                state: ConnectionState::Init,
            }
        ));
        assert!(server.from_client.try_recv().is_err());
    }

    #[tokio::test]
    async fn invalid_state_error_names_operation_and_state() {
        let (transport, _server) = channel_transport();
        let client = RoomcastClient::start(transport, BincodeCodec);
        client.wait_for_init().await.unwrap();
        let err = client.call("ping", vec![]).await.unwrap_err();
        assert_eq!(err.to_string(), "'call' not available in state 'ready'");
    }

    #[tokio::test]
    async fn call_ids_increase_across_failures() {
        let (transport, server) = channel_transport();
        let client = RoomcastClient::start(transport, BincodeCodec);
        client.wait_for_init().await.unwrap();

        let ServerEnd {
            to_client,
            mut from_client,
            ..
        } = server;

        let script = async {
            for (id, status) in [(0i64, 1i64), (1, 0), (2, 0)] {
                let frame = decode(&from_client.recv().await.unwrap());
                assert_eq!(frame.first(), Some(&Value::Int(id)));
                let reply = [Value::Int(status), Value::Int(id), Value::from("r")];
                to_client.send(Ok(encode(&reply))).unwrap();
            }
        };
        let calls = async {
            // First call fails remotely; ids must keep increasing anyway.
            let err = client.create_room(Value::Null).await.unwrap_err();
            assert!(matches!(err, RoomcastError::Remote(_)));
            assert_eq!(client.create_room(Value::Null).await.unwrap(), "r");
            assert_eq!(client.create_room(Value::Null).await.unwrap(), "r");
        };
        tokio::join!(calls, script);
    }

    #[tokio::test]
    async fn stale_response_is_dropped() {
        let (transport, server) = channel_transport();
        let client = RoomcastClient::start(transport, BincodeCodec);
        client.wait_for_init().await.unwrap();

        let ServerEnd {
            to_client,
            mut from_client,
            ..
        } = server;

        let script = async {
            let _ = from_client.recv().await.unwrap();
            // Settle call 0 twice; the duplicate must be ignored.
            to_client
                .send(Ok(encode(&[Value::Int(0), Value::Int(0), Value::from("a")])))
                .unwrap();
            to_client
                .send(Ok(encode(&[Value::Int(0), Value::Int(0), Value::from("b")])))
                .unwrap();
            // A response for a call never made is ignored too.
            to_client
                .send(Ok(encode(&[Value::Int(0), Value::Int(99), Value::Null])))
                .unwrap();

            let frame = decode(&from_client.recv().await.unwrap());
            assert_eq!(frame.first(), Some(&Value::Int(1)));
            to_client
                .send(Ok(encode(&[Value::Int(0), Value::Int(1), Value::from("c")])))
                .unwrap();
        };
        let calls = async {
            assert_eq!(client.create_room(Value::Null).await.unwrap(), "a");
            assert_eq!(client.create_room(Value::Null).await.unwrap(), "c");
        };
        tokio::join!(calls, script);
    }

    #[tokio::test]
    async fn create_room_rejects_non_string_reply() {
        let (transport, server) = channel_transport();
        let client = RoomcastClient::start(transport, BincodeCodec);
        client.wait_for_init().await.unwrap();

        let ServerEnd {
            to_client,
            mut from_client,
            ..
        } = server;

        let script = async {
            let _ = from_client.recv().await.unwrap();
            to_client
                .send(Ok(encode(&[Value::Int(0), Value::Int(0), Value::Int(7)])))
                .unwrap();
        };
        let (outcome, ()) = tokio::join!(client.create_room(Value::Null), script);
        assert!(matches!(
            outcome.unwrap_err(),
            RoomcastError::UnexpectedReply { .. }
        ));
    }

    #[tokio::test]
    async fn malformed_frames_do_not_disturb_later_traffic() {
        let (transport, server) = channel_transport();
        let client = RoomcastClient::start(transport, BincodeCodec);
        client.wait_for_init().await.unwrap();

        let ServerEnd {
            to_client,
            mut from_client,
            ..
        } = server;

        let script = async {
            let _ = from_client.recv().await.unwrap();
            // Undecodable bytes, then a frame with a string discriminant,
            // then the real response.
            to_client.send(Ok(vec![0xFF, 0xFF, 0xFF])).unwrap();
            to_client
                .send(Ok(encode(&[Value::from("bogus"), Value::Int(0)])))
                .unwrap();
            to_client
                .send(Ok(encode(&[Value::Int(0), Value::Int(0), Value::from("ok")])))
                .unwrap();
        };
        let (outcome, ()) = tokio::join!(client.create_room(Value::Null), script);
        assert_eq!(outcome.unwrap(), "ok");
    }

    #[tokio::test]
    async fn call_started_during_shutdown_rejects_instead_of_hanging() {
        let (transport, _server) = channel_transport();
        let client = RoomcastClient::start(transport, BincodeCodec);
        client.wait_for_init().await.unwrap();

        // Reproduce the interleaving where shutdown drains the pending
        // map between a caller's state check and its insert: the drain
        // has already run, the loop is still alive, and the sender goes
        // into the map afterwards. The post-insert state re-check must
        // reclaim it rather than leave the await parked forever.
        client.shared.shutdown("torn down");
        let err = client
            .send_call(CallKind::Room, vec![Value::Null])
            .await
            .unwrap_err();
        assert!(
            matches!(err, RoomcastError::ConnectionClosed { ref reason } if reason == "torn down"),
            "unexpected error: {err:?}"
        );
        assert!(lock(&client.shared.pending).is_empty());
    }

    #[tokio::test]
    async fn remote_method_handle_forwards_to_call() {
        let (transport, _server) = channel_transport();
        let client = RoomcastClient::start(transport, BincodeCodec);
        client.wait_for_init().await.unwrap();
        let ping = client.method("ping");
        assert_eq!(ping.name(), "ping");
        // Not in a room yet: the bound handle hits the same state check.
        let err = ping.invoke(vec![]).await.unwrap_err();
        assert!(matches!(err, RoomcastError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn debug_impl_shows_state() {
        let (transport, _server) = channel_transport();
        let client = RoomcastClient::start(transport, BincodeCodec);
        let debug = format!("{client:?}");
        assert!(debug.contains("RoomcastClient"));
        assert!(debug.contains("state"));
    }
}
