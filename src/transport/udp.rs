//! Local UDP transport.
//!
//! Listens on the multicast group for requests from apps on the same
//! network and answers to the sender address. Frames are signed exactly
//! like WebSocket frames; verification happens in the engine.

use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::TransportError;
use crate::queue::{InboundMessage, Interface};

pub const UDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(224, 9, 9, 9);
pub const UDP_MULTICAST_PORT: u16 = 3333;

const RECV_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone)]
pub struct UdpSettings {
    pub enabled: bool,
    pub multicast_addr: Ipv4Addr,
    pub port: u16,
}

impl Default for UdpSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            multicast_addr: UDP_MULTICAST_ADDR,
            port: UDP_MULTICAST_PORT,
        }
    }
}

/// Frame to send back to a local peer
#[derive(Debug, Clone)]
pub struct UdpFrame {
    pub frame: String,
    pub peer: SocketAddr,
}

/// Binds the port on all interfaces and joins the multicast group
pub async fn bind_multicast(settings: &UdpSettings) -> Result<UdpSocket, TransportError> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, settings.port)).await?;
    socket.join_multicast_v4(settings.multicast_addr, Ipv4Addr::UNSPECIFIED)?;
    info!(
        "UDP listening on {}:{}",
        settings.multicast_addr, settings.port
    );
    Ok(socket)
}

/// Receive/send loop for one bound socket, runs until `cancel` fires.
pub async fn run_udp(
    socket: UdpSocket,
    inbound: mpsc::UnboundedSender<InboundMessage>,
    mut outbound: mpsc::UnboundedReceiver<UdpFrame>,
    cancel: CancellationToken,
) {
    let mut buffer = [0u8; RECV_BUFFER_SIZE];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            result = socket.recv_from(&mut buffer) => match result {
                Ok((0, _)) => continue,
                Ok((len, peer)) => {
                    let raw = String::from_utf8_lossy(&buffer[..len]).into_owned();
                    debug!("UDP frame from {} ({} bytes)", peer, len);
                    let message = InboundMessage { interface: Interface::Udp(peer), raw };
                    if inbound.send(message).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("UDP receive failed: {}", e),
            },

            frame = outbound.recv() => match frame {
                Some(UdpFrame { frame, peer }) => {
                    if let Err(e) = socket.send_to(frame.as_bytes(), peer).await {
                        warn!("UDP send to {} failed: {}", peer, e);
                    }
                }
                None => break,
            },
        }
    }

    info!("UDP transport stopped");
}
