//! Transports to the cloud broker and the local network.
//!
//! - [`session`]: WebSocket session state machine with reconnect and heartbeat
//! - [`websocket`]: thin reader/writer wrapper around `tokio-tungstenite`
//! - [`udp`]: local multicast listener
//! - [`clock`]: server-synchronized timestamps
//!
//! Transports never interpret frames. They push what they receive into the
//! inbound queue and write what the engine hands them.

pub mod clock;
pub mod session;
pub mod udp;
pub mod websocket;

pub use clock::ServerClock;
pub use session::{run_session, SessionSettings, WebSocketSession};
pub use udp::{UdpFrame, UdpSettings};

use std::fmt;

use thiserror::Error;

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid connect request: {0}")]
    InvalidRequest(String),

    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Connect timed out after {0} ms")]
    Timeout(u64),

    #[error("Failed to send: {0}")]
    Send(String),

    #[error("Failed to read: {0}")]
    Read(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
