//! End-to-end scenarios over real TCP connections

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use roomchat::client::{connect, ClientReceiver, ClientSender};
use roomchat::{
    handle_connection, ChatError, ChatServer, ClientConfig, ClientInfo, RoomName, ServerCommand,
    ServerConfig, Username,
};

const WAIT: Duration = Duration::from_secs(2);

async fn start_server() -> (SocketAddr, mpsc::Sender<ServerCommand>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = Arc::new(ServerConfig {
        handshake_delay: Duration::ZERO,
        ping_interval: Duration::from_millis(50),
        ..ServerConfig::default()
    });

    let (cmd_tx, cmd_rx) = mpsc::channel(config.command_channel_size);
    tokio::spawn(ChatServer::new(cmd_rx).run());

    let accept_tx = cmd_tx.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(handle_connection(stream, accept_tx.clone(), config.clone()));
        }
    });

    (addr, cmd_tx)
}

async fn join(
    addr: SocketAddr,
    user: &str,
    room: &str,
) -> Result<(ClientSender<OwnedWriteHalf>, ClientReceiver<OwnedReadHalf>), ChatError> {
    connect(
        &addr.to_string(),
        &Username::new(user).unwrap(),
        &RoomName::new(room).unwrap(),
        &ClientConfig::default(),
    )
    .await
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

async fn next_text(receiver: &mut ClientReceiver<OwnedReadHalf>) -> String {
    timeout(WAIT, receiver.next_line())
        .await
        .expect("timed out waiting for message")
        .unwrap()
        .expect("server closed connection")
        .to_string()
}

#[tokio::test]
async fn test_room_fan_out_and_isolation() {
    let (addr, _cmd_tx) = start_server().await;

    let (mut a_tx, mut a_rx) = join(addr, "A", "general").await.unwrap();
    let (_b_tx, mut b_rx) = join(addr, "B", "general").await.unwrap();
    let (_c_tx, mut c_rx) = join(addr, "C", "random").await.unwrap();

    a_tx.send("hello").await.unwrap();
    assert_eq!(next_text(&mut a_rx).await, "[A@general]: hello");
    assert_eq!(next_text(&mut b_rx).await, "[A@general]: hello");

    a_tx.send("again").await.unwrap();
    assert_eq!(next_text(&mut b_rx).await, "[A@general]: again");

    // C only ever sees PINGs, which next_line skips
    assert!(timeout(Duration::from_millis(200), c_rx.next_line())
        .await
        .is_err());
}

#[tokio::test]
async fn test_concurrent_registration_one_wins() {
    let (addr, _cmd_tx) = start_server().await;

    let (first, second) = tokio::join!(join(addr, "dup", "general"), join(addr, "dup", "random"));
    let results = [first, second];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(ChatError::ProtocolRejection(3))))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_malformed_input_closes_only_that_connection() {
    let (addr, _cmd_tx) = start_server().await;

    let mut raw = TcpStream::connect(addr).await.unwrap();
    raw.write_all(&[1u8; 10]).await.unwrap();
    raw.shutdown().await.unwrap();

    let mut rest = Vec::new();
    let read = timeout(WAIT, raw.read_to_end(&mut rest)).await.unwrap();
    assert!(read.is_ok());
    assert!(rest.is_empty());

    // Server keeps serving
    let (mut tx, mut rx) = join(addr, "after", "general").await.unwrap();
    tx.send("still up").await.unwrap();
    assert_eq!(next_text(&mut rx).await, "[after@general]: still up");
}

#[tokio::test]
async fn test_dropped_client_is_removed() {
    let (addr, cmd_tx) = start_server().await;

    let (tx, rx) = join(addr, "gone", "general").await.unwrap();
    assert!(lookup(&cmd_tx, "gone").await.is_some());
    drop(tx);
    drop(rx);

    let mut removed = false;
    for _ in 0..100 {
        if lookup(&cmd_tx, "gone").await.is_none() {
            removed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(removed);

    // The name is free again and the room keeps working
    let (mut tx, mut rx) = join(addr, "gone", "general").await.unwrap();
    tx.send("back").await.unwrap();
    assert_eq!(next_text(&mut rx).await, "[gone@general]: back");
}

#[tokio::test]
async fn test_dereg_leaves_room() {
    let (addr, cmd_tx) = start_server().await;

    let (mut stay_tx, mut stay_rx) = join(addr, "stay", "general").await.unwrap();
    let (mut leave_tx, _leave_rx) = join(addr, "leave", "general").await.unwrap();

    leave_tx.leave().await.unwrap();
    let mut removed = false;
    for _ in 0..100 {
        if lookup(&cmd_tx, "leave").await.is_none() {
            removed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(removed);

    stay_tx.send("alone").await.unwrap();
    assert_eq!(next_text(&mut stay_rx).await, "[stay@general]: alone");
}

#[tokio::test]
async fn test_long_line_is_split() {
    let (addr, _cmd_tx) = start_server().await;
    let (mut tx, mut rx) = join(addr, "long", "general").await.unwrap();

    let line = "y".repeat(300);
    tx.send_line(&line).await.unwrap();
    assert_eq!(
        next_text(&mut rx).await,
        format!("[long@general]: {}", "y".repeat(255))
    );
    assert_eq!(
        next_text(&mut rx).await,
        format!("[long@general]: {}", "y".repeat(45))
    );

    assert!(matches!(
        tx.send(&line).await,
        Err(ChatError::PayloadTooLarge(300))
    ));
}
