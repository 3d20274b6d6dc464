//! Client-side session
//!
//! Performs the REG/REGACK handshake, then runs a send loop (console lines to
//! SENDMSG packets) and a receive loop (CHATMSG packets to printed lines)
//! concurrently until either side ends.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, trace};

use crate::codec::{
    decode_message_payload, encode_header, encode_message, PacketType, MAX_TEXT_LEN,
};
use crate::config::ClientConfig;
use crate::error::ChatError;
use crate::frame::PacketReader;
use crate::message::ChatLine;
use crate::types::{RoomName, Username};

/// Connect to a server and register
pub async fn connect(
    addr: &str,
    username: &Username,
    room: &RoomName,
    config: &ClientConfig,
) -> Result<(ClientSender<OwnedWriteHalf>, ClientReceiver<OwnedReadHalf>), ChatError> {
    let stream = TcpStream::connect(addr).await?;
    debug!("Connected to {}", addr);
    let (reader, writer) = stream.into_split();
    handshake(reader, writer, username, room, config).await
}

/// Send REG and wait for the reply
///
/// Any reply other than REGACK fails with `ProtocolRejection`.
pub async fn handshake<R, W>(
    reader: R,
    mut writer: W,
    username: &Username,
    room: &RoomName,
    config: &ClientConfig,
) -> Result<(ClientSender<W>, ClientReceiver<R>), ChatError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let reg = encode_header(PacketType::Reg, username.as_str(), room.as_str());
    writer.write_all(&reg).await?;
    writer.flush().await?;

    let mut packets = PacketReader::new(reader, config.recv_buffer_size);
    let reply = packets
        .read_packet()
        .await?
        .ok_or(ChatError::ConnectionLost)?;

    if reply.header.packet_type() != Some(PacketType::RegAck) {
        return Err(ChatError::ProtocolRejection(reply.header.kind));
    }
    info!("Registered as '{}' in room '{}'", username, room);

    let sender = ClientSender {
        writer,
        username: username.clone(),
        room: room.clone(),
    };
    Ok((sender, ClientReceiver { packets }))
}

/// Split text into chunks of at most `max` bytes on char boundaries
pub fn split_text(text: &str, max: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while rest.len() > max {
        let mut end = max;
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let (chunk, tail) = rest.split_at(end);
        chunks.push(chunk);
        rest = tail;
    }
    if !rest.is_empty() {
        chunks.push(rest);
    }
    chunks
}

/// Outbound half of a registered client
pub struct ClientSender<W> {
    writer: W,
    username: Username,
    room: RoomName,
}

impl<W: AsyncWrite + Unpin> ClientSender<W> {
    /// Send one SENDMSG packet
    pub async fn send(&mut self, text: &str) -> Result<(), ChatError> {
        let packet = encode_message(
            PacketType::SendMsg,
            self.username.as_str(),
            self.room.as_str(),
            text,
        )?;
        self.writer.write_all(&packet).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Send a console line, splitting it if it exceeds one payload
    ///
    /// Blank lines are not sent.
    pub async fn send_line(&mut self, line: &str) -> Result<(), ChatError> {
        for chunk in split_text(line, MAX_TEXT_LEN) {
            self.send(chunk).await?;
        }
        Ok(())
    }

    /// Send DEREG and close the write side
    pub async fn leave(&mut self) -> Result<(), ChatError> {
        let packet = encode_header(PacketType::Dereg, self.username.as_str(), self.room.as_str());
        self.writer.write_all(&packet).await?;
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Inbound half of a registered client
pub struct ClientReceiver<R> {
    packets: PacketReader<R>,
}

impl<R: AsyncRead + Unpin> ClientReceiver<R> {
    /// Wait for the next delivered chat message
    ///
    /// Other packet types are skipped. Returns Ok(None) when the server
    /// closes the connection.
    pub async fn next_line(&mut self) -> Result<Option<ChatLine>, ChatError> {
        loop {
            let Some(packet) = self.packets.read_packet().await? else {
                return Ok(None);
            };
            match packet.header.packet_type() {
                Some(PacketType::ChatMsg) => {
                    let text = decode_message_payload(&packet.payload)?;
                    return Ok(Some(ChatLine {
                        user: packet.header.user,
                        room: packet.header.room,
                        text,
                    }));
                }
                Some(PacketType::Ping) => trace!("Ping from server"),
                _ => debug!("Ignoring packet type {}", packet.header.kind),
            }
        }
    }
}

/// Run the send and receive loops until either ends
///
/// Input EOF sends DEREG and returns Ok. The server closing the connection
/// returns `ConnectionLost`.
pub async fn run_session<R, W, I, O>(
    mut sender: ClientSender<W>,
    mut receiver: ClientReceiver<R>,
    input: I,
    mut output: O,
) -> Result<(), ChatError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let send_loop = async {
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            sender.send_line(&line).await?;
        }
        debug!("Input closed, leaving");
        sender.leave().await
    };

    let recv_loop = async {
        while let Some(line) = receiver.next_line().await? {
            output.write_all(format!("{}\n", line).as_bytes()).await?;
            output.flush().await?;
        }
        Err::<(), ChatError>(ChatError::ConnectionLost)
    };

    tokio::select! {
        result = send_loop => result,
        result = recv_loop => result,
    }
}
