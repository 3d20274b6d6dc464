//! Connection handle
//!
//! Writes to a client socket go through a bounded queue drained by a single
//! writer task, so the fan-out and ping tasks never share the socket directly.
//! When a socket write fails the writer task ends, and every later `send`
//! reports `ConnectionLost`. Shared tasks use `try_send` so one peer that
//! stops reading cannot stall them.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::ChatError;

/// Cloneable handle to a client's outbound packet queue
#[derive(Debug, Clone)]
pub struct Connection {
    sender: mpsc::Sender<Bytes>,
}

impl Connection {
    /// Create a handle and the receiving end of its queue
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Create a handle backed by a writer task owning `writer`
    pub fn spawn<W>(writer: W, capacity: usize) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (connection, mut receiver) = Self::channel(capacity);

        let task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(packet) = receiver.recv().await {
                if let Err(e) = writer.write_all(&packet).await {
                    debug!("Socket write failed, ending write task: {}", e);
                    break;
                }
            }
            let _ = writer.shutdown().await;
            debug!("Write task ended");
        });

        (connection, task)
    }

    /// Queue an encoded packet for the socket
    ///
    /// Returns `ConnectionLost` once the writer task is gone.
    pub async fn send(&self, packet: Bytes) -> Result<(), ChatError> {
        self.sender
            .send(packet)
            .await
            .map_err(|_| ChatError::ConnectionLost)
    }

    /// Queue an encoded packet without waiting for queue space
    ///
    /// Returns `QueueFull` if the peer has fallen a full queue behind.
    pub fn try_send(&self, packet: Bytes) -> Result<(), ChatError> {
        self.sender.try_send(packet).map_err(|e| match e {
            TrySendError::Full(_) => ChatError::QueueFull,
            TrySendError::Closed(_) => ChatError::ConnectionLost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_send_reaches_socket() {
        let (near, mut far) = tokio::io::duplex(64);
        let (connection, task) = Connection::spawn(near, 8);

        connection.send(Bytes::from_static(b"abc")).await.unwrap();
        drop(connection);
        task.await.unwrap();

        let mut out = Vec::new();
        far.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"abc");
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (connection, receiver) = Connection::channel(1);
        drop(receiver);
        assert!(matches!(
            connection.send(Bytes::from_static(b"x")).await,
            Err(ChatError::ConnectionLost)
        ));
        assert!(matches!(
            connection.try_send(Bytes::from_static(b"x")),
            Err(ChatError::ConnectionLost)
        ));
    }

    #[tokio::test]
    async fn test_try_send_reports_full_queue() {
        let (connection, mut receiver) = Connection::channel(1);
        connection.try_send(Bytes::from_static(b"a")).unwrap();
        assert!(matches!(
            connection.try_send(Bytes::from_static(b"b")),
            Err(ChatError::QueueFull)
        ));

        assert_eq!(receiver.recv().await.unwrap(), Bytes::from_static(b"a"));
        connection.try_send(Bytes::from_static(b"c")).unwrap();
    }
}
