//! Connection session handler
//!
//! Drives one accepted connection through registration, liveness pinging and
//! message ingestion, and cleans up the client's registration when the
//! connection ends for any reason.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{interval_at, Duration, Instant};
use tracing::{debug, info, warn};

use crate::codec::{decode_message_payload, encode_header, Header, PacketType};
use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::ChatError;
use crate::frame::PacketReader;
use crate::message::Message;
use crate::server::ServerCommand;
use crate::types::{RoomName, SessionId, Username};

/// Registered identity of a session
#[derive(Debug, Clone)]
struct Identity {
    username: Username,
    room: RoomName,
}

/// Handle a new TCP connection
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
    config: Arc<ServerConfig>,
) -> Result<(), ChatError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let (reader, writer) = stream.into_split();
    handle_session(reader, writer, peer_addr, cmd_tx, config).await
}

/// Run a session over any split byte stream
pub async fn handle_session<R, W>(
    reader: R,
    writer: W,
    peer_addr: String,
    cmd_tx: mpsc::Sender<ServerCommand>,
    config: Arc<ServerConfig>,
) -> Result<(), ChatError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let session = SessionId::new();
    debug!("Session {} started for {}", session, peer_addr);

    let (connection, write_task) = Connection::spawn(writer, config.outbound_queue_size);
    let mut packets = PacketReader::new(reader, config.recv_buffer_size);

    let identity =
        match await_registration(&mut packets, &connection, &cmd_tx, session, &peer_addr).await? {
            Some(identity) => identity,
            None => {
                // Let a queued rejection reach the socket before closing
                drop(connection);
                let _ = write_task.await;
                debug!("Session {} ended before registration", session);
                return Ok(());
            }
        };

    let result = registered_session(
        &mut packets,
        connection,
        &cmd_tx,
        &config,
        session,
        &identity,
    )
    .await;

    let _ = cmd_tx
        .send(ServerCommand::Remove {
            username: identity.username.clone(),
            session,
        })
        .await;

    info!(
        "Client '{}' disconnected from {} ({})",
        identity.username,
        peer_addr,
        match &result {
            Ok(()) => "closed".to_string(),
            Err(e) => e.to_string(),
        }
    );

    result
}

/// Read packets until a REG is accepted
///
/// Returns None if the stream closed or the registration was rejected.
async fn await_registration<R: AsyncRead + Unpin>(
    packets: &mut PacketReader<R>,
    connection: &Connection,
    cmd_tx: &mpsc::Sender<ServerCommand>,
    session: SessionId,
    peer_addr: &str,
) -> Result<Option<Identity>, ChatError> {
    loop {
        let Some(packet) = packets.read_packet().await? else {
            return Ok(None);
        };
        let header = packet.header;

        match header.packet_type() {
            Some(PacketType::Reg) => {}
            Some(other) => {
                warn!("Ignoring {:?} from {} before registration", other, peer_addr);
                continue;
            }
            None => {
                warn!("Ignoring unknown packet type {} from {}", header.kind, peer_addr);
                continue;
            }
        }

        info!(
            "Attempt to register '{}' in '{}' from {}",
            header.user, header.room, peer_addr
        );

        let names = if header.names_exact {
            Username::new(header.user.clone())
                .and_then(|u| RoomName::new(header.room.clone()).map(|r| (u, r)))
        } else {
            Err(ChatError::InvalidName(format!(
                "'{}@{}' is not valid UTF-8",
                header.user, header.room
            )))
        };
        let (username, room) = match names {
            Ok(names) => names,
            Err(e) => {
                warn!("Rejecting registration from {}: {}", peer_addr, e);
                reject(connection, &header).await;
                return Ok(None);
            }
        };

        let (reply, response) = oneshot::channel();
        cmd_tx
            .send(ServerCommand::Register {
                username: username.clone(),
                room: room.clone(),
                addr: peer_addr.to_string(),
                session,
                reply,
            })
            .await
            .map_err(|_| ChatError::ChannelSend)?;

        match response.await.map_err(|_| ChatError::ChannelSend)? {
            Ok(()) => return Ok(Some(Identity { username, room })),
            Err(ChatError::NameTaken(name)) => {
                warn!("Rejecting registration from {}: '{}' is taken", peer_addr, name);
                reject(connection, &header).await;
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
    }
}

async fn reject(connection: &Connection, header: &Header) {
    let packet = encode_header(PacketType::RegReject, &header.user, &header.room);
    if connection.send(Bytes::copy_from_slice(&packet)).await.is_err() {
        debug!("Connection closed before rejection could be sent");
    }
}

/// Complete the handshake and serve SENDMSG / DEREG until the session ends
async fn registered_session<R: AsyncRead + Unpin>(
    packets: &mut PacketReader<R>,
    connection: Connection,
    cmd_tx: &mpsc::Sender<ServerCommand>,
    config: &ServerConfig,
    session: SessionId,
    identity: &Identity,
) -> Result<(), ChatError> {
    if !config.handshake_delay.is_zero() {
        tokio::time::sleep(config.handshake_delay).await;
    }

    // The pinger waits for `start` so no PING can be queued ahead of REGACK
    let (start, started) = oneshot::channel();
    let pinger = spawn_pinger(
        identity.username.clone(),
        identity.room.clone(),
        session,
        connection.clone(),
        cmd_tx.clone(),
        config.ping_interval,
        started,
    );

    // Join the room before REGACK so anything sent after the client sees
    // REGACK is delivered to it
    let bound = bind(
        cmd_tx,
        identity,
        session,
        connection.clone(),
        pinger.abort_handle(),
    )
    .await;
    match bound {
        Ok(true) => {}
        Ok(false) => {
            pinger.abort();
            return Err(ChatError::ConnectionLost);
        }
        Err(e) => {
            pinger.abort();
            return Err(e);
        }
    }

    let ack = encode_header(
        PacketType::RegAck,
        identity.username.as_str(),
        identity.room.as_str(),
    );
    connection.send(Bytes::copy_from_slice(&ack)).await?;
    drop(connection);
    let _ = start.send(());

    info!(
        "Client '{}' registered in room '{}'",
        identity.username, identity.room
    );

    loop {
        let Some(packet) = packets.read_packet().await? else {
            return Ok(());
        };
        let header = &packet.header;

        match header.packet_type() {
            Some(PacketType::SendMsg) => {
                let text = decode_message_payload(&packet.payload)?;
                if header.user != identity.username.as_str()
                    || header.room != identity.room.as_str()
                {
                    warn!(
                        "SENDMSG header claims '{}@{}', using registered '{}@{}'",
                        header.user, header.room, identity.username, identity.room
                    );
                }
                debug!(
                    "Got message of length {} from '{}' to room '{}'",
                    text.len(),
                    identity.username,
                    identity.room
                );

                let message = Message::new(identity.username.clone(), identity.room.clone(), text);
                cmd_tx
                    .send(ServerCommand::Send { session, message })
                    .await
                    .map_err(|_| ChatError::ChannelSend)?;
            }
            Some(PacketType::Dereg) => {
                info!("Deregister received from '{}'", identity.username);
                return Ok(());
            }
            Some(other) => {
                warn!("Ignoring {:?} from '{}'", other, identity.username);
            }
            None => {
                warn!(
                    "Ignoring unknown packet type {} from '{}'",
                    header.kind, identity.username
                );
            }
        }
    }
}

async fn bind(
    cmd_tx: &mpsc::Sender<ServerCommand>,
    identity: &Identity,
    session: SessionId,
    connection: Connection,
    pinger: AbortHandle,
) -> Result<bool, ChatError> {
    let (reply, response) = oneshot::channel();
    cmd_tx
        .send(ServerCommand::Bind {
            username: identity.username.clone(),
            session,
            connection,
            pinger,
            reply,
        })
        .await
        .map_err(|_| ChatError::ChannelSend)?;
    response.await.map_err(|_| ChatError::ChannelSend)
}

/// Spawn the liveness ping task for a registered client
///
/// Waits for `start`, then queues a PING header every `interval`. A closed
/// connection or a full outbound queue removes the client and ends the task.
/// If `start` is dropped unsent the task ends without pinging.
pub fn spawn_pinger(
    username: Username,
    room: RoomName,
    session: SessionId,
    connection: Connection,
    cmd_tx: mpsc::Sender<ServerCommand>,
    interval: Duration,
    start: oneshot::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if start.await.is_err() {
            debug!("Pinger for '{}' cancelled before start", username);
            return;
        }

        let packet = Bytes::copy_from_slice(&encode_header(
            PacketType::Ping,
            username.as_str(),
            room.as_str(),
        ));
        let mut ticker = interval_at(Instant::now() + interval, interval);

        loop {
            ticker.tick().await;
            if let Err(e) = connection.try_send(packet.clone()) {
                info!("Liveness ping to '{}' failed: {}", username, e);
                let _ = cmd_tx
                    .send(ServerCommand::Remove { username, session })
                    .await;
                break;
            }
        }
    })
}
