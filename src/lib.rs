//! Async client for the Roomcast room protocol.
//!
//! Roomcast servers host rooms that clients create, join, and interact
//! with over one persistent binary-framed socket. This crate provides the
//! client side: a connection handle with correlated request/response
//! calls, room broadcasts, and connection lifecycle events.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use roomcast_client::{BincodeCodec, RoomcastClient, Value};
//! use roomcast_client::transports::WebSocketTransport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = WebSocketTransport::connect("wss://example.com/ws").await?;
//!     let client = RoomcastClient::start(transport, BincodeCodec);
//!     client.wait_for_init().await?;
//!
//!     client.messages().on("chat", |args| {
//!         println!("chat: {args:?}");
//!     });
//!
//!     client.join_room("lobby", vec![Value::from("password")]).await?;
//!     let reply = client.call("ping", vec![]).await?;
//!     println!("ping -> {reply:?}");
//!
//!     client.close("bye");
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! [`RoomcastClient::start`] takes an already-connected [`Transport`] and
//! a [`FrameCodec`] and spawns a background connection loop that owns
//! both. The handle communicates with the loop over channels, so every
//! facade method is callable from any task. Inbound frames are either
//! responses (settled against the pending-call table by call id) or event
//! broadcasts (fanned out through the two [`EventHub`] surfaces).
//!
//! The connection walks a one-way state machine, `init → ready → join →
//! room → closed`, with a single rollback edge from `join` back to `init`
//! when a join fails. State checks happen before any frame is sent, so an
//! operation in the wrong state fails fast without touching the wire.
//!
//! # Transports
//!
//! The [`Transport`] trait abstracts the socket. With the default
//! `transport-websocket` feature, [`transports::WebSocketTransport`]
//! provides a `tokio-tungstenite` implementation speaking binary frames.
//! Any message-oriented byte transport can be plugged in instead.

pub mod client;
pub mod codec;
pub mod error;
pub mod event;
pub mod hub;
pub mod protocol;
pub mod transport;
pub mod transports;
pub mod value;

pub use client::{ConnectionState, RemoteMethod, RoomcastClient};
pub use codec::{BincodeCodec, FrameCodec};
pub use error::{Result, RoomcastError};
pub use event::{ClientEvent, EventKind};
pub use hub::{EventHub, HandlerId};
pub use protocol::{ModuleDescriptor, RoomDescriptor};
pub use transport::Transport;
pub use value::Value;

#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
