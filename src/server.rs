//! ChatServer Actor implementation
//!
//! The central actor that owns the Client Registry and Room Registry.
//! Connection sessions and liveness tasks talk to it over an mpsc channel;
//! room fan-out tasks report dead members back over a second channel.

use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::ChatError;
use crate::message::Message;
use crate::registry::{ClientInfo, ClientRegistry};
use crate::room::{Eviction, Member, RoomRegistry};
use crate::types::{RoomName, SessionId, Username};

/// Commands sent from sessions to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// Claim a username and create the room if needed
    Register {
        username: Username,
        room: RoomName,
        addr: String,
        session: SessionId,
        reply: oneshot::Sender<Result<(), ChatError>>,
    },
    /// Attach the connection after REGACK and join the room's delivery list
    Bind {
        username: Username,
        session: SessionId,
        connection: Connection,
        pinger: AbortHandle,
        reply: oneshot::Sender<bool>,
    },
    /// Queue a message for the sender's room
    Send {
        session: SessionId,
        message: Message,
    },
    /// Deregistration, disconnect, or failed liveness ping
    Remove {
        username: Username,
        session: SessionId,
    },
    /// Look up a registered client
    Lookup {
        username: Username,
        reply: oneshot::Sender<Option<ClientInfo>>,
    },
    /// Stop all rooms and liveness tasks and end the actor
    Shutdown,
}

/// The main ChatServer actor
pub struct ChatServer {
    clients: ClientRegistry,
    rooms: RoomRegistry,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
    /// Dead members reported by fan-out tasks
    evictions: mpsc::UnboundedReceiver<Eviction>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>) -> Self {
        let (eviction_tx, evictions) = mpsc::unbounded_channel();
        Self {
            clients: ClientRegistry::new(),
            rooms: RoomRegistry::new(eviction_tx),
            receiver,
            evictions,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Runs until `Shutdown` is received or all command senders are dropped.
    pub async fn run(mut self) {
        info!("ChatServer started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    match cmd {
                        Some(ServerCommand::Shutdown) | None => break,
                        Some(cmd) => self.handle_command(cmd),
                    }
                }
                Some(eviction) = self.evictions.recv() => {
                    debug!("Fan-out reported '{}' as dead", eviction.username);
                    self.handle_remove(eviction.username, eviction.session);
                }
            }
        }

        info!(
            "ChatServer shutting down ({} clients, {} rooms)",
            self.clients.len(),
            self.rooms.len()
        );
        self.clients.clear();
        self.rooms.clear();
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Register {
                username,
                room,
                addr,
                session,
                reply,
            } => {
                let result = self.handle_register(username, room, addr, session);
                let _ = reply.send(result);
            }
            ServerCommand::Bind {
                username,
                session,
                connection,
                pinger,
                reply,
            } => {
                let bound = self.handle_bind(username, session, connection, pinger);
                let _ = reply.send(bound);
            }
            ServerCommand::Send { session, message } => {
                self.handle_send(session, message);
            }
            ServerCommand::Remove { username, session } => {
                self.handle_remove(username, session);
            }
            ServerCommand::Lookup { username, reply } => {
                let _ = reply.send(self.clients.lookup(&username).map(|c| c.info()));
            }
            ServerCommand::Shutdown => {}
        }
    }

    fn handle_register(
        &mut self,
        username: Username,
        room: RoomName,
        addr: String,
        session: SessionId,
    ) -> Result<(), ChatError> {
        self.clients.register(username, room.clone(), addr, session)?;
        self.rooms.ensure(&room);
        debug!(
            "Total clients: {}, Total rooms: {}",
            self.clients.len(),
            self.rooms.len()
        );
        Ok(())
    }

    fn handle_bind(
        &mut self,
        username: Username,
        session: SessionId,
        connection: Connection,
        pinger: AbortHandle,
    ) -> bool {
        if !self
            .clients
            .bind(&username, session, connection.clone(), pinger)
        {
            warn!("Bind for '{}' arrived after its registration ended", username);
            return false;
        }

        let Some(client) = self.clients.lookup(&username) else {
            return false;
        };
        let member = Member {
            username,
            session,
            connection,
        };
        self.rooms.join(&client.room, member)
    }

    fn handle_send(&mut self, session: SessionId, message: Message) {
        match self.clients.lookup(&message.sender) {
            Some(client) if client.session == session && client.is_bound() => {
                self.rooms.enqueue(message);
            }
            _ => {
                warn!(
                    "Dropping message from unregistered session {} ('{}')",
                    session, message.sender
                );
            }
        }
    }

    fn handle_remove(&mut self, username: Username, session: SessionId) {
        let Some(client) = self.clients.remove_session(&username, session) else {
            return;
        };
        self.rooms.leave(&client.room, username, session);
        debug!(
            "Total clients: {}, Total rooms: {}",
            self.clients.len(),
            self.rooms.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn register(
        tx: &mpsc::Sender<ServerCommand>,
        user: &str,
        room: &str,
        session: SessionId,
    ) -> Result<(), ChatError> {
        let (reply, rx) = oneshot::channel();
        tx.send(ServerCommand::Register {
            username: Username::new(user).unwrap(),
            room: RoomName::new(room).unwrap(),
            addr: "127.0.0.1:0".to_string(),
            session,
            reply,
        })
        .await
        .unwrap();
        rx.await.unwrap()
    }

    async fn lookup(tx: &mpsc::Sender<ServerCommand>, user: &str) -> Option<ClientInfo> {
        let (reply, rx) = oneshot::channel();
        tx.send(ServerCommand::Lookup {
            username: Username::new(user).unwrap(),
            reply,
        })
        .await
        .unwrap();
        rx.await.unwrap()
    }

    fn start() -> mpsc::Sender<ServerCommand> {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(ChatServer::new(rx).run());
        tx
    }

    #[tokio::test]
    async fn test_concurrent_register_one_wins() {
        let tx = start();

        let (first, second) = tokio::join!(
            register(&tx, "alice", "general", SessionId::new()),
            register(&tx, "alice", "general", SessionId::new()),
        );

        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(ChatError::NameTaken(_))))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_remove_requires_owning_session() {
        let tx = start();
        let session = SessionId::new();
        register(&tx, "alice", "general", session).await.unwrap();

        tx.send(ServerCommand::Remove {
            username: Username::new("alice").unwrap(),
            session: SessionId::new(),
        })
        .await
        .unwrap();
        assert!(lookup(&tx, "alice").await.is_some());

        tx.send(ServerCommand::Remove {
            username: Username::new("alice").unwrap(),
            session,
        })
        .await
        .unwrap();
        assert!(lookup(&tx, "alice").await.is_none());

        register(&tx, "alice", "random", SessionId::new()).await.unwrap();
        assert_eq!(lookup(&tx, "alice").await.unwrap().room.as_str(), "random");
    }

    #[tokio::test]
    async fn test_send_reaches_bound_members() {
        let tx = start();
        let session = SessionId::new();
        register(&tx, "alice", "general", session).await.unwrap();

        let (connection, mut outbound) = Connection::channel(4);
        let pinger = tokio::spawn(std::future::pending::<()>());
        let (reply, bound) = oneshot::channel();
        tx.send(ServerCommand::Bind {
            username: Username::new("alice").unwrap(),
            session,
            connection,
            pinger: pinger.abort_handle(),
            reply,
        })
        .await
        .unwrap();
        assert!(bound.await.unwrap());
        assert!(lookup(&tx, "alice").await.unwrap().bound);

        tx.send(ServerCommand::Send {
            session,
            message: Message::new(
                Username::new("alice").unwrap(),
                RoomName::new("general").unwrap(),
                "hi".to_string(),
            ),
        })
        .await
        .unwrap();

        let packet = outbound.recv().await.unwrap();
        let (header, rest) = crate::codec::decode_packet(&packet).unwrap();
        assert_eq!(header.user, "alice");
        assert_eq!(crate::codec::decode_message_payload(rest).unwrap(), "hi");

        tx.send(ServerCommand::Shutdown).await.unwrap();
        assert!(pinger.await.unwrap_err().is_cancelled());
    }
}
