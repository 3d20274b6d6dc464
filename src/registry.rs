//! Client Registry
//!
//! Authoritative mapping from username to the live session that owns it.
//! Owned by the `ChatServer` actor, so every operation here runs on one task
//! and check-and-insert is atomic without a lock.

use std::collections::HashMap;

use tokio::task::AbortHandle;
use tracing::{debug, info};

use crate::connection::Connection;
use crate::error::ChatError;
use crate::types::{RoomName, SessionId, Username};

/// A registered client
///
/// The connection and liveness task are attached by `bind` once the
/// handshake completes. Dropping the client stops its liveness task.
#[derive(Debug)]
pub struct Client {
    pub username: Username,
    pub room: RoomName,
    /// Remote address of the registering connection
    pub addr: String,
    pub session: SessionId,
    pub connection: Option<Connection>,
    pinger: Option<AbortHandle>,
}

impl Client {
    fn new(username: Username, room: RoomName, addr: String, session: SessionId) -> Self {
        Self {
            username,
            room,
            addr,
            session,
            connection: None,
            pinger: None,
        }
    }

    /// Whether the handshake completed and a connection is attached
    pub fn is_bound(&self) -> bool {
        self.connection.is_some()
    }

    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            username: self.username.clone(),
            room: self.room.clone(),
            addr: self.addr.clone(),
            session: self.session,
            bound: self.is_bound(),
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(pinger) = self.pinger.take() {
            pinger.abort();
        }
    }
}

/// Snapshot of a client for callers outside the actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub username: Username,
    pub room: RoomName,
    pub addr: String,
    pub session: SessionId,
    pub bound: bool,
}

/// Username -> Client
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<Username, Client>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a username for a session
    ///
    /// Fails with `NameTaken` if the username is already bound to a session.
    pub fn register(
        &mut self,
        username: Username,
        room: RoomName,
        addr: String,
        session: SessionId,
    ) -> Result<&Client, ChatError> {
        if self.clients.contains_key(&username) {
            info!("Username '{}' already taken", username);
            return Err(ChatError::NameTaken(username.to_string()));
        }

        info!("Registered '{}' in room '{}' from {}", username, room, addr);
        let client = Client::new(username.clone(), room, addr, session);
        Ok(self.clients.entry(username).or_insert(client))
    }

    /// Attach the connection and liveness task once the handshake completes
    ///
    /// Returns false if the username is no longer registered to `session`;
    /// the liveness task is aborted in that case.
    pub fn bind(
        &mut self,
        username: &Username,
        session: SessionId,
        connection: Connection,
        pinger: AbortHandle,
    ) -> bool {
        match self.clients.get_mut(username) {
            Some(client) if client.session == session => {
                client.connection = Some(connection);
                if let Some(old) = client.pinger.replace(pinger) {
                    old.abort();
                }
                debug!("Bound connection for '{}'", username);
                true
            }
            _ => {
                pinger.abort();
                false
            }
        }
    }

    pub fn lookup(&self, username: &Username) -> Option<&Client> {
        self.clients.get(username)
    }

    /// Remove a client, freeing the username
    pub fn remove(&mut self, username: &Username) -> Option<Client> {
        let client = self.clients.remove(username)?;
        info!("Removed client '{}' (session {})", username, client.session);
        Some(client)
    }

    /// Remove a client only if it is still owned by `session`
    pub fn remove_session(&mut self, username: &Username, session: SessionId) -> Option<Client> {
        match self.clients.get(username) {
            Some(client) if client.session == session => self.remove(username),
            _ => None,
        }
    }

    /// Drop every client, stopping all liveness tasks
    pub fn clear(&mut self) {
        self.clients.clear();
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
