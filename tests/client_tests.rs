#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration tests for the client facade: room lifecycle, correlated
//! calls, broadcast fan-out, and close semantics.

mod common;

use std::sync::{Arc, Mutex as StdMutex};

use common::{
    channel_transport, event_frame, response_err, response_ok, ScriptedTransport, ServerEnd,
};
use roomcast_client::protocol::{ModuleDescriptor, RoomDescriptor, APP_CLOSE_CODE};
use roomcast_client::{
    BincodeCodec, ClientEvent, ConnectionState, EventKind, RoomcastClient, RoomcastError, Value,
};
use tokio::sync::mpsc;

// ── Room lifecycle ──────────────────────────────────────────────────

#[tokio::test]
async fn join_room_success_flow() {
    let (transport, server) = channel_transport();
    let client = RoomcastClient::start(transport, BincodeCodec);
    client.wait_for_init().await.unwrap();

    let joined = Arc::new(StdMutex::new(Vec::new()));
    {
        let joined = Arc::clone(&joined);
        client.events().on(EventKind::JoinRoom, move |event| {
            if let ClientEvent::JoinRoom(room_id) = event {
                joined.lock().unwrap().push(room_id.clone());
            }
        });
    }

    let mut server = server;
    let script = async {
        let frame = server.next_frame().await;
        assert_eq!(
            frame,
            vec![
                Value::Int(0),
                Value::from("join"),
                Value::from("r1"),
                Value::from("secret"),
            ]
        );
        server.push(&response_ok(0, Value::Bool(true)));
    };

    let (outcome, ()) = tokio::join!(client.join_room("r1", vec![Value::from("secret")]), script);
    assert_eq!(outcome.unwrap(), true);
    assert_eq!(client.state(), ConnectionState::Room);
    assert_eq!(client.room_id(), Some("r1".to_string()));
    assert_eq!(*joined.lock().unwrap(), vec!["r1"]);
}

#[tokio::test]
async fn join_room_falsy_reply_stays_in_join() {
    let (transport, server) = channel_transport();
    let client = RoomcastClient::start(transport, BincodeCodec);
    client.wait_for_init().await.unwrap();

    let mut server = server;
    let script = async {
        let _ = server.next_frame().await;
        server.push(&response_ok(0, Value::Bool(false)));
    };

    let (outcome, ()) = tokio::join!(client.join_room("r1", vec![]), script);
    assert_eq!(outcome.unwrap(), false);
    // A declined join does not roll back; only the error path does.
    assert_eq!(client.state(), ConnectionState::Join);
    assert_eq!(client.room_id(), None);
}

#[tokio::test]
async fn join_room_failure_rolls_back_to_init() {
    let (transport, server) = channel_transport();
    let client = RoomcastClient::start(transport, BincodeCodec);
    client.wait_for_init().await.unwrap();

    let mut server = server;
    let script = async {
        let _ = server.next_frame().await;
        server.push(&response_err(0, Value::from("room is full")));
    };

    let (outcome, ()) = tokio::join!(client.join_room("r1", vec![]), script);
    let err = outcome.unwrap_err();
    assert!(
        matches!(err, RoomcastError::Remote(ref value) if *value == Value::from("room is full")),
        "unexpected error: {err:?}"
    );
    assert_eq!(client.state(), ConnectionState::Init);
    assert_eq!(client.room_id(), None);
}

#[tokio::test]
async fn join_room_outside_ready_fails_synchronously() {
    let (transport, _server) = channel_transport();
    let client = RoomcastClient::start(transport, BincodeCodec);
    // Loop not yet polled: still `init`.
    let err = client.join_room("r1", vec![]).await.unwrap_err();
    assert!(matches!(
        err,
        RoomcastError::InvalidState {
            operation: "joinRoom",
            state: ConnectionState::Init,
        }
    ));
}

#[tokio::test]
async fn create_room_returns_room_id() {
    let (transport, server) = channel_transport();
    let client = RoomcastClient::start(transport, BincodeCodec);
    client.wait_for_init().await.unwrap();

    let descriptor = RoomDescriptor::new().with_module(
        "index",
        ModuleDescriptor::new()
            .with_source("export function ping() { return \"pong\"; }")
            .with_evaluate(true),
    );

    let mut server = server;
    let script = async {
        let frame = server.next_frame().await;
        assert_eq!(frame.first(), Some(&Value::Int(0)));
        assert_eq!(frame.get(1), Some(&Value::from("room")));
        let Some(Value::Map(root)) = frame.get(2) else {
            panic!("expected descriptor map, got {frame:?}");
        };
        assert!(root.contains_key("modules"));
        server.push(&response_ok(0, Value::from("room-7")));
    };

    let (outcome, ()) = tokio::join!(client.create_room(descriptor), script);
    assert_eq!(outcome.unwrap(), "room-7");
    // Room creation never changes the connection state.
    assert_eq!(client.state(), ConnectionState::Ready);
}

// ── Correlated calls inside a room ──────────────────────────────────

async fn join_test_room(client: &RoomcastClient, server: &mut ServerEnd) {
    client.wait_for_init().await.unwrap();
    let script = async {
        let _ = server.next_frame().await;
        server.push(&response_ok(0, Value::Bool(true)));
    };
    let (outcome, ()) = tokio::join!(client.join_room("r1", vec![]), script);
    assert_eq!(outcome.unwrap(), true);
}

#[tokio::test]
async fn call_sends_method_and_returns_result() {
    let (transport, mut server) = channel_transport();
    let client = RoomcastClient::start(transport, BincodeCodec);
    join_test_room(&client, &mut server).await;

    let script = async {
        let frame = server.next_frame().await;
        assert_eq!(
            frame,
            vec![
                Value::Int(1),
                Value::from("call"),
                Value::from("ping"),
                Value::Int(42),
            ]
        );
        server.push(&response_ok(1, Value::from("pong")));
    };

    let (outcome, ()) = tokio::join!(client.call("ping", vec![Value::Int(42)]), script);
    assert_eq!(outcome.unwrap(), Value::from("pong"));
}

#[tokio::test]
async fn call_rejection_surfaces_server_error_value() {
    let (transport, mut server) = channel_transport();
    let client = RoomcastClient::start(transport, BincodeCodec);
    join_test_room(&client, &mut server).await;

    let script = async {
        let _ = server.next_frame().await;
        server.push(&response_err(1, Value::from("bad method")));
    };

    let (outcome, ()) = tokio::join!(client.call("nope", vec![]), script);
    let err = outcome.unwrap_err();
    assert!(
        matches!(err, RoomcastError::Remote(ref value) if *value == Value::from("bad method")),
        "unexpected error: {err:?}"
    );
    // A rejected call leaves the room membership intact.
    assert_eq!(client.state(), ConnectionState::Room);
}

#[tokio::test]
async fn bound_method_handle_round_trip() {
    let (transport, mut server) = channel_transport();
    let client = RoomcastClient::start(transport, BincodeCodec);
    join_test_room(&client, &mut server).await;

    let ping = client.method("ping");
    let script = async {
        let frame = server.next_frame().await;
        assert_eq!(frame.get(2), Some(&Value::from("ping")));
        server.push(&response_ok(1, Value::Null));
    };

    let (outcome, ()) = tokio::join!(ping.invoke(vec![]), script);
    assert_eq!(outcome.unwrap(), Value::Null);
}

// ── Broadcast fan-out ───────────────────────────────────────────────

#[tokio::test]
async fn broadcasts_fan_out_by_event_name() {
    let frames = vec![
        Some(Ok(common::encode_frame(&event_frame(
            "chat",
            vec![Value::from("alice"), Value::from("hi")],
        )))),
        Some(Ok(common::encode_frame(&event_frame(
            "presence",
            vec![Value::from("bob")],
        )))),
    ];
    let (transport, _sent, _closed) = ScriptedTransport::new(frames);
    let client = RoomcastClient::start(transport, BincodeCodec);

    let (chat_tx, mut chat_rx) = mpsc::unbounded_channel();
    client.messages().on("chat", move |args: &[Value]| {
        let _ = chat_tx.send(args.to_vec());
    });
    let (meta_tx, mut meta_rx) = mpsc::unbounded_channel();
    client.events().on(EventKind::Message, move |event| {
        if let ClientEvent::Message(payload) = event {
            let _ = meta_tx.send(payload.clone());
        }
    });

    // Only the matching keyed handler fires.
    let chat_args = chat_rx.recv().await.unwrap();
    assert_eq!(chat_args, vec![Value::from("alice"), Value::from("hi")]);
    assert!(chat_rx.try_recv().is_err());

    // The meta hub sees every event frame, name included.
    let first = meta_rx.recv().await.unwrap();
    assert_eq!(first.first(), Some(&Value::from("chat")));
    let second = meta_rx.recv().await.unwrap();
    assert_eq!(second.first(), Some(&Value::from("presence")));
}

#[tokio::test]
async fn event_without_textual_name_only_reaches_meta_hub() {
    let frames = vec![
        Some(Ok(common::encode_frame(&[
            Value::Int(2),
            Value::Int(99),
            Value::from("payload"),
        ]))),
        Some(Ok(common::encode_frame(&event_frame("done", vec![])))),
    ];
    let (transport, _sent, _closed) = ScriptedTransport::new(frames);
    let client = RoomcastClient::start(transport, BincodeCodec);

    let (meta_tx, mut meta_rx) = mpsc::unbounded_channel();
    client.events().on(EventKind::Message, move |event| {
        if let ClientEvent::Message(payload) = event {
            let _ = meta_tx.send(payload.clone());
        }
    });
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    client.messages().on("done", move |_: &[Value]| {
        let _ = done_tx.send(());
    });

    let nameless = meta_rx.recv().await.unwrap();
    assert_eq!(nameless.first(), Some(&Value::Int(99)));
    // The second frame proves the first produced no keyed dispatch.
    done_rx.recv().await.unwrap();
    assert!(done_rx.try_recv().is_err());
}

#[tokio::test]
async fn once_handler_fires_at_most_once() {
    let frames = vec![
        Some(Ok(common::encode_frame(&event_frame("tick", vec![])))),
        Some(Ok(common::encode_frame(&event_frame("tick", vec![])))),
        Some(Ok(common::encode_frame(&event_frame("done", vec![])))),
    ];
    let (transport, _sent, _closed) = ScriptedTransport::new(frames);
    let client = RoomcastClient::start(transport, BincodeCodec);

    let (tick_tx, mut tick_rx) = mpsc::unbounded_channel();
    client.messages().once("tick", move |_: &[Value]| {
        let _ = tick_tx.send(());
    });
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    client.messages().on("done", move |_: &[Value]| {
        let _ = done_tx.send(());
    });

    done_rx.recv().await.unwrap();
    tick_rx.recv().await.unwrap();
    assert!(tick_rx.try_recv().is_err());
}

#[tokio::test]
async fn off_unsubscribes_broadcast_handler() {
    let (transport, server) = channel_transport();
    let client = RoomcastClient::start(transport, BincodeCodec);
    client.wait_for_init().await.unwrap();

    let (tick_tx, mut tick_rx) = mpsc::unbounded_channel();
    let id = client.messages().on("tick", move |_: &[Value]| {
        let _ = tick_tx.send(());
    });
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    client.messages().on("done", move |_: &[Value]| {
        let _ = done_tx.send(());
    });

    assert!(client.messages().off("tick", id));
    server.push(&event_frame("tick", vec![]));
    server.push(&event_frame("done", vec![]));

    done_rx.recv().await.unwrap();
    assert!(tick_rx.try_recv().is_err());
}

// ── Close semantics ─────────────────────────────────────────────────

#[tokio::test]
async fn close_reports_code_and_reason_to_transport() {
    let (transport, server) = channel_transport();
    let client = RoomcastClient::start(transport, BincodeCodec);
    client.wait_for_init().await.unwrap();

    client.close("leaving");
    // Drain until the loop exits so the close has been processed.
    let mut from_client = server.from_client;
    assert!(from_client.recv().await.is_none());

    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(
        *server.closed.lock().unwrap(),
        Some((APP_CLOSE_CODE, "leaving".to_string()))
    );
}

#[tokio::test]
async fn close_rejects_every_pending_call() {
    let (transport, server) = channel_transport();
    let client = RoomcastClient::start(transport, BincodeCodec);
    client.wait_for_init().await.unwrap();

    let ServerEnd {
        mut from_client, ..
    } = server;

    let (first, second, third, ()) = tokio::join!(
        client.create_room(Value::Null),
        client.create_room(Value::Null),
        client.create_room(Value::Null),
        async {
            for _ in 0..3 {
                let _ = from_client.recv().await.unwrap();
            }
            client.close("shutting down");
        }
    );

    for outcome in [first, second, third] {
        let err = outcome.unwrap_err();
        assert!(
            matches!(err, RoomcastError::ConnectionClosed { ref reason } if reason == "shutting down"),
            "unexpected error: {err:?}"
        );
    }
}

#[tokio::test]
async fn operations_after_close_fail_synchronously() {
    let (transport, _server) = channel_transport();
    let client = RoomcastClient::start(transport, BincodeCodec);
    client.wait_for_init().await.unwrap();
    client.close("done");

    let err = client.join_room("r1", vec![]).await.unwrap_err();
    assert!(matches!(
        err,
        RoomcastError::InvalidState {
            operation: "joinRoom",
            state: ConnectionState::Closed,
        }
    ));
    let err = client.create_room(Value::Null).await.unwrap_err();
    assert!(matches!(err, RoomcastError::InvalidState { .. }));
    let err = client.call("ping", vec![]).await.unwrap_err();
    assert!(matches!(err, RoomcastError::InvalidState { .. }));
}

#[tokio::test]
async fn server_error_frame_closes_connection() {
    let frames = vec![Some(Err(RoomcastError::TransportReceive(
        "connection reset".into(),
    )))];
    let (transport, _sent, _closed) = ScriptedTransport::new(frames);
    let client = RoomcastClient::start(transport, BincodeCodec);

    let (close_tx, mut close_rx) = mpsc::unbounded_channel();
    client.events().on(EventKind::Close, move |event| {
        if let ClientEvent::Close(reason) = event {
            let _ = close_tx.send(reason.clone());
        }
    });

    let reason = close_rx.recv().await.unwrap();
    assert!(reason.contains("connection reset"), "reason: {reason}");
    assert_eq!(client.state(), ConnectionState::Closed);
}

// ── State observation ───────────────────────────────────────────────

#[tokio::test]
async fn state_events_trace_the_full_lifecycle() {
    let (transport, mut server) = channel_transport();
    let client = RoomcastClient::start(transport, BincodeCodec);

    let states = Arc::new(StdMutex::new(Vec::new()));
    {
        let states = Arc::clone(&states);
        client.events().on(EventKind::State, move |event| {
            if let ClientEvent::State(state) = event {
                states.lock().unwrap().push(*state);
            }
        });
    }

    join_test_room(&client, &mut server).await;
    client.close("bye");

    assert_eq!(
        *states.lock().unwrap(),
        vec![
            ConnectionState::Ready,
            ConnectionState::Join,
            ConnectionState::Room,
            ConnectionState::Closed,
        ]
    );
}

#[tokio::test]
async fn state_names_are_lowercase() {
    assert_eq!(ConnectionState::Init.to_string(), "init");
    assert_eq!(ConnectionState::Ready.to_string(), "ready");
    assert_eq!(ConnectionState::Join.to_string(), "join");
    assert_eq!(ConnectionState::Room.to_string(), "room");
    assert_eq!(ConnectionState::Closed.to_string(), "closed");
}
