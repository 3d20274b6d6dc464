//! Error types for the chat server and client
//!
//! A single error enum covers protocol, registration and transport failures.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Chat errors
///
/// Covers both fatal errors (connection termination) and
/// registration errors (reported to the peer before closing).
#[derive(Debug, Error)]
pub enum ChatError {
    /// Header shorter than 20 bytes or payload length mismatch (fatal)
    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    /// Username already bound to a live session
    #[error("Username already taken: {0}")]
    NameTaken(String),

    /// Username or room name is empty, too long or contains NUL
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Message text does not fit the 1-byte length prefix
    #[error("Payload too large: {0} bytes (max 255)")]
    PayloadTooLarge(usize),

    /// Handshake reply was not REGACK
    #[error("Registration rejected by server (type {0})")]
    ProtocolRejection(u8),

    /// Peer connection closed or writer task gone
    #[error("Connection lost")]
    ConnectionLost,

    /// Outbound queue full: the peer is not draining its socket
    #[error("Outbound queue full")]
    QueueFull,

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - server actor gone)
    #[error("Channel send error")]
    ChannelSend,
}

impl ChatError {
    /// Build a `MalformedPacket` error from anything displayable
    pub fn malformed(reason: impl Into<String>) -> Self {
        ChatError::MalformedPacket(reason.into())
    }
}
