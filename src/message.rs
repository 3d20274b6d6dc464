//! Chat message values
//!
//! `Message` is what a room queues and fans out on the server.
//! `ChatLine` is what the client prints for a delivered CHATMSG.

use chrono::{DateTime, Utc};

use crate::types::{RoomName, Username};

/// A message waiting for fan-out in its room
///
/// Produced once per SENDMSG and consumed once by the room's fan-out task.
#[derive(Debug, Clone)]
pub struct Message {
    pub sender: Username,
    pub room: RoomName,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(sender: Username, room: RoomName, text: String) -> Self {
        Self {
            sender,
            room,
            text,
            timestamp: Utc::now(),
        }
    }
}

/// A delivered message as seen by a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub user: String,
    pub room: String,
    pub text: String,
}

impl std::fmt::Display for ChatLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}@{}]: {}", self.user, self.room, self.text)
    }
}
