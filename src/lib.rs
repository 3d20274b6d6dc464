//! Room-based TCP Chat Library
//!
//! A minimal chat server and client speaking a fixed binary protocol:
//! a 20-byte header (type, user, reserved, room) optionally followed by a
//! length-prefixed text payload.
//!
//! # Features
//! - REG/REGACK handshake with explicit rejection of taken names
//! - Named rooms created on first registration
//! - Per-room FIFO fan-out to every member, sender included
//! - Liveness pings that evict clients whose connection died
//! - Incremental framing tolerant of partial and coalesced reads
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning the client and room registries
//! - Each connection has a session task communicating with the server
//! - Each room has a fan-out task owning its membership list
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use roomchat::{handle_connection, ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let (cmd_tx, cmd_rx) = mpsc::channel(256);
//!     let config = Arc::new(ServerConfig::default());
//!
//!     tokio::spawn(ChatServer::new(cmd_rx).run());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, cmd_tx.clone(), config.clone()));
//!     }
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod handler;
pub mod message;
pub mod registry;
pub mod room;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use codec::{Header, PacketType};
pub use config::{ClientConfig, ServerConfig};
pub use connection::Connection;
pub use error::ChatError;
pub use frame::{Packet, PacketReader};
pub use handler::handle_connection;
pub use message::{ChatLine, Message};
pub use registry::{Client, ClientInfo, ClientRegistry};
pub use room::{Room, RoomRegistry};
pub use server::{ChatServer, ServerCommand};
pub use types::{RoomName, SessionId, Username};
