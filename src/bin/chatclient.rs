//! Room Chat Client - Entry Point
//!
//! Usage: `chatclient <host> <port> <username> <chatroom>`
//!
//! Registers with the server, then sends stdin lines and prints delivered
//! messages until stdin closes or the server goes away.

use std::env;
use std::process::ExitCode;

use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use roomchat::client::{connect, run_session};
use roomchat::{ChatError, ClientConfig, RoomName, Username};

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so chat lines on stdout stay clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("roomchat=warn,chatclient=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 5 {
        eprintln!("chatclient <host> <port> <username> <chatroom>");
        return ExitCode::FAILURE;
    }
    let addr = format!("{}:{}", args[1], args[2]);

    let names = Username::new(args[3].clone())
        .and_then(|u| RoomName::new(args[4].clone()).map(|r| (u, r)));
    let (username, room) = match names {
        Ok(names) => names,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let config = ClientConfig::default();
    let (sender, receiver) = match connect(&addr, &username, &room, &config).await {
        Ok(halves) => halves,
        Err(ChatError::ProtocolRejection(kind)) => {
            eprintln!("Received {} from server. Wasn't a REGACK, so we shut down", kind);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("Error connecting to chat server {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };
    eprintln!("Received REGACK from server. You can now chat!");

    let input = BufReader::new(tokio::io::stdin());
    let code = match run_session(sender, receiver, input, tokio::io::stdout()).await {
        Ok(()) => {
            info!("Session closed");
            0
        }
        Err(e) => {
            error!("Session ended: {}", e);
            1
        }
    };

    // Exit directly: a pending stdin read would otherwise hold the runtime open
    std::process::exit(code);
}
