//! Runtime tunables for the server and client

use std::time::Duration;

/// Default delay before REGACK is sent
pub const DEFAULT_HANDSHAKE_DELAY: Duration = Duration::from_secs(1);

/// Default liveness ping interval
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(5);

/// Default receive buffer capacity per connection
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 1024;

/// Server tunables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Pause between accepting a REG and sending REGACK
    pub handshake_delay: Duration,
    /// Interval between liveness pings to each registered client
    pub ping_interval: Duration,
    /// Initial capacity of each connection's receive buffer
    pub recv_buffer_size: usize,
    /// Capacity of the ChatServer command channel
    pub command_channel_size: usize,
    /// Capacity of each connection's outbound packet queue
    pub outbound_queue_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            handshake_delay: DEFAULT_HANDSHAKE_DELAY,
            ping_interval: DEFAULT_PING_INTERVAL,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            command_channel_size: 256,
            outbound_queue_size: 32,
        }
    }
}

/// Client tunables
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Initial capacity of the receive buffer
    pub recv_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
        }
    }
}
