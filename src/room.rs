//! Room Registry and per-room fan-out
//!
//! Each room owns one fan-out task. The task owns the room's membership list
//! and drains a single FIFO queue of room events (joins, leaves, messages),
//! so membership changes never race with delivery.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec::{encode_message, PacketType};
use crate::connection::Connection;
use crate::message::Message;
use crate::types::{RoomName, SessionId, Username};

/// A bound client as seen by its room
#[derive(Debug, Clone)]
pub struct Member {
    pub username: Username,
    pub session: SessionId,
    pub connection: Connection,
}

/// Reported by a fan-out task when a member's connection is dead or its
/// outbound queue is full
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eviction {
    pub username: Username,
    pub session: SessionId,
}

#[derive(Debug)]
enum RoomEvent {
    Join(Member),
    Leave { username: Username, session: SessionId },
    Deliver(Message),
}

/// A chat room
///
/// The fan-out task lives exactly as long as this value.
#[derive(Debug)]
pub struct Room {
    pub name: RoomName,
    events: mpsc::UnboundedSender<RoomEvent>,
    task: JoinHandle<()>,
}

impl Room {
    fn spawn(name: RoomName, evictions: mpsc::UnboundedSender<Eviction>) -> Self {
        let (events, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(fan_out(name.clone(), receiver, evictions));
        Self {
            name,
            events,
            task,
        }
    }

    fn send(&self, event: RoomEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

impl Drop for Room {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Fan-out loop for one room
async fn fan_out(
    name: RoomName,
    mut events: mpsc::UnboundedReceiver<RoomEvent>,
    evictions: mpsc::UnboundedSender<Eviction>,
) {
    debug!("Fan-out task started for room '{}'", name);
    let mut members: Vec<Member> = Vec::new();

    while let Some(event) = events.recv().await {
        match event {
            RoomEvent::Join(member) => {
                members.retain(|m| m.username != member.username);
                debug!("'{}' joined room '{}'", member.username, name);
                members.push(member);
            }
            RoomEvent::Leave { username, session } => {
                members.retain(|m| !(m.username == username && m.session == session));
                debug!("'{}' left room '{}'", username, name);
            }
            RoomEvent::Deliver(message) => {
                deliver(&name, &mut members, message, &evictions);
            }
        }
    }

    debug!("Fan-out task ended for room '{}'", name);
}

fn deliver(
    name: &RoomName,
    members: &mut Vec<Member>,
    message: Message,
    evictions: &mpsc::UnboundedSender<Eviction>,
) {
    debug!(
        "Distributing message from '{}' sent at {} to {} members of '{}'",
        message.sender,
        message.timestamp,
        members.len(),
        name
    );

    let packet = match encode_message(
        PacketType::ChatMsg,
        message.sender.as_str(),
        name.as_str(),
        &message.text,
    ) {
        Ok(packet) => packet,
        Err(e) => {
            warn!("Dropping message from '{}': {}", message.sender, e);
            return;
        }
    };

    // A member whose queue is full is treated as dead so the rest of the
    // room keeps receiving
    let mut dead = Vec::new();
    for (index, member) in members.iter().enumerate() {
        if let Err(e) = member.connection.try_send(packet.clone()) {
            warn!("Delivery to '{}' in '{}' failed: {}", member.username, name, e);
            dead.push(index);
        }
    }

    for index in dead.into_iter().rev() {
        let member = members.remove(index);
        let _ = evictions.send(Eviction {
            username: member.username,
            session: member.session,
        });
    }
}

/// RoomName -> Room
#[derive(Debug)]
pub struct RoomRegistry {
    rooms: HashMap<RoomName, Room>,
    evictions: mpsc::UnboundedSender<Eviction>,
}

impl RoomRegistry {
    pub fn new(evictions: mpsc::UnboundedSender<Eviction>) -> Self {
        Self {
            rooms: HashMap::new(),
            evictions,
        }
    }

    /// Get a room, creating it and its fan-out task on first use
    pub fn ensure(&mut self, name: &RoomName) -> &Room {
        let evictions = &self.evictions;
        self.rooms.entry(name.clone()).or_insert_with(|| {
            info!("Created room '{}'", name);
            Room::spawn(name.clone(), evictions.clone())
        })
    }

    /// Add a member to a room's delivery list
    pub fn join(&self, name: &RoomName, member: Member) -> bool {
        match self.rooms.get(name) {
            Some(room) => room.send(RoomEvent::Join(member)),
            None => false,
        }
    }

    /// Remove a member from a room's delivery list
    pub fn leave(&self, name: &RoomName, username: Username, session: SessionId) {
        if let Some(room) = self.rooms.get(name) {
            room.send(RoomEvent::Leave { username, session });
        }
    }

    /// Queue a message for fan-out in its room
    ///
    /// The message is dropped if the room does not exist.
    pub fn enqueue(&self, message: Message) -> bool {
        match self.rooms.get(&message.room) {
            Some(room) => room.send(RoomEvent::Deliver(message)),
            None => {
                warn!(
                    "Dropping message from '{}': room '{}' does not exist",
                    message.sender, message.room
                );
                false
            }
        }
    }

    /// Drop every room, stopping all fan-out tasks
    pub fn clear(&mut self) {
        self.rooms.clear();
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
