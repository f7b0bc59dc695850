//! Transport implementations for the Roomcast protocol.
//!
//! This module provides concrete [`Transport`](crate::Transport)
//! implementations behind feature gates. Enable the corresponding Cargo
//! feature to pull in a transport:
//!
//! | Feature                | Transport              |
//! |------------------------|------------------------|
//! | `transport-websocket`  | [`WebSocketTransport`] |
//!
//! # Example
//!
//! ```rust,ignore
//! # async fn example() -> Result<(), roomcast_client::RoomcastError> {
//! use roomcast_client::{Transport, WebSocketTransport};
//!
//! let mut ws = WebSocketTransport::connect("ws://localhost:8088/ws").await?;
//! ws.send(vec![0x01, 0x02]).await?;
//!
//! if let Some(Ok(frame)) = ws.recv().await {
//!     println!("server sent {} bytes", frame.len());
//! }
//!
//! ws.close(4000, "done".to_string()).await?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::WebSocketTransport;
