//! Multicast TCP Chat Library
//!
//! A single-room chat service over a fixed-layout frame protocol, built
//! on tokio using the Actor pattern for room state.
//!
//! # Features
//! - Fixed-layout frame codec (header, type, nickname field, body)
//! - Unique nicknames, claimed with `Query` and refused with `Negative`
//! - Broadcast of chat messages to every connected participant
//! - Replay of the last 100 messages to newly named participants
//! - Client-side negotiation: a claim is accepted once its timer runs out
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning the `Room`
//! - Each connection has a `handler` with a read task and a write task
//! - No locks needed - all room access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use multicast_chat::{ChatServer, handle_connection};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("0.0.0.0:9000").await.unwrap();
//!     let (cmd_tx, cmd_rx) = mpsc::channel(256);
//!
//!     tokio::spawn(ChatServer::new(cmd_rx).run());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         let cmd_tx = cmd_tx.clone();
//!         tokio::spawn(handle_connection(stream, cmd_tx));
//!     }
//! }
//! ```

pub mod error;
pub mod frame;
pub mod handler;
pub mod participant;
pub mod room;
pub mod server;
pub mod session;
pub mod stream;
pub mod types;

// Re-export main types for convenience
pub use error::{AppError, FrameError, SendError};
pub use frame::{Frame, FrameType, Header, MAX_BODY_LENGTH, MAX_NICK_LENGTH};
pub use handler::{handle_connection, serve_connection};
pub use participant::Participant;
pub use room::Room;
pub use server::{ChatServer, ServerCommand};
pub use session::{spawn_session, ClientEvent, ClientHandle, SessionConfig};
pub use stream::{FrameReader, ReadState};
pub use types::ClientId;
