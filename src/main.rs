//! Room Chat Server - Entry Point
//!
//! Usage: `tcpserver <host> <port>`
//!
//! Starts the TCP listener and ChatServer actor, accepting connections
//! until Ctrl-C.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use roomchat::{handle_connection, ChatServer, ServerCommand, ServerConfig};

#[tokio::main]
async fn main() -> ExitCode {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=roomchat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("roomchat=info,tcpserver=info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        eprintln!("tcpserver <host> <port>");
        return ExitCode::FAILURE;
    }
    let addr = format!("{}:{}", args[1], args[2]);

    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Error creating TCP server on {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };
    info!("Chat server listening on {}", addr);

    let config = Arc::new(ServerConfig::default());

    // Create ChatServer actor channel and start
    let (cmd_tx, cmd_rx) = mpsc::channel(config.command_channel_size);
    let server = tokio::spawn(ChatServer::new(cmd_rx).run());

    // Connection accept loop
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!("New connection from {}", peer);
                    let cmd_tx = cmd_tx.clone();
                    let config = config.clone();

                    // Spawn session task for each connection
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, cmd_tx, config).await {
                            error!("Session for {} ended with error: {}", peer, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    let _ = cmd_tx.send(ServerCommand::Shutdown).await;
    if let Err(e) = server.await {
        error!("ChatServer task failed: {}", e);
    }

    ExitCode::SUCCESS
}
