//! Queues between the transports and the engine.
//!
//! Transport tasks push received frames into the [`InboundQueue`]. Capabilities
//! and the router push envelopes into the [`OutboundQueue`]. Both are drained
//! only in the engine tick, FIFO per queue.

use std::collections::VecDeque;
use std::net::SocketAddr;

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::protocol::{Envelope, ValueMap};
use crate::transport::ConnectionState;

/// Transport a frame arrived on or leaves through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interface {
    WebSocket,
    /// Local UDP with the sender address
    Udp(SocketAddr),
}

#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub interface: Interface,
    pub raw: String,
}

#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub interface: Interface,
    pub envelope: Envelope,
}

#[derive(Debug)]
pub struct InboundQueue {
    sender: mpsc::UnboundedSender<InboundMessage>,
    receiver: mpsc::UnboundedReceiver<InboundMessage>,
}

impl InboundQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self { sender, receiver }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<InboundMessage> {
        self.sender.clone()
    }

    /// Takes all frames waiting right now without blocking
    pub fn drain(&mut self) -> Vec<InboundMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.receiver.try_recv() {
            messages.push(message);
        }
        messages
    }
}

impl Default for InboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Outbound envelopes. Anything that cannot be sent stays in `pending`
/// until the connection is up.
#[derive(Debug)]
pub struct OutboundQueue {
    sender: mpsc::UnboundedSender<OutboundMessage>,
    receiver: mpsc::UnboundedReceiver<OutboundMessage>,
    pending: VecDeque<OutboundMessage>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver,
            pending: VecDeque::new(),
        }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<OutboundMessage> {
        self.sender.clone()
    }

    pub fn push(&self, message: OutboundMessage) {
        // the queue owns a receiver, so this only fails during teardown
        if self.sender.send(message).is_err() {
            warn!("Outbound queue closed, message dropped");
        }
    }

    /// Moves new messages from the channel into `pending`
    pub fn collect(&mut self) -> usize {
        let mut collected = 0;
        while let Ok(message) = self.receiver.try_recv() {
            self.pending.push_back(message);
            collected += 1;
        }
        if collected > 0 {
            debug!("Collected {} outbound messages, {} pending", collected, self.pending.len());
        }
        collected
    }

    pub fn pop(&mut self) -> Option<OutboundMessage> {
        self.pending.pop_front()
    }

    /// Puts an undeliverable message back at the front
    pub fn requeue_front(&mut self, message: OutboundMessage) {
        self.pending.push_front(message);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Send side of the engine for capabilities and application code.
#[derive(Debug, Clone)]
pub struct EventSender {
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    status: watch::Receiver<ConnectionState>,
}

impl EventSender {
    pub fn new(
        outbound: mpsc::UnboundedSender<OutboundMessage>,
        status: watch::Receiver<ConnectionState>,
    ) -> Self {
        Self { outbound, status }
    }

    pub fn is_connected(&self) -> bool {
        *self.status.borrow() == ConnectionState::Connected
    }

    /// Queues an event for the WebSocket. `false` while not connected.
    pub fn send_event(&self, event: Envelope) -> bool {
        if !self.is_connected() {
            debug!(
                "Not connected, event {} of {} dropped",
                event.payload.action, event.payload.device_id
            );
            return false;
        }
        self.enqueue(event)
    }

    /// Queues a request and returns its reply token. The answer arrives
    /// through the engine's response callback.
    pub fn send_request(&self, device_id: &str, action: &str, value: ValueMap) -> Option<String> {
        if !self.is_connected() {
            debug!("Not connected, request {} for {} dropped", action, device_id);
            return None;
        }
        let request = Envelope::request(device_id, action).with_value(value);
        let reply_token = request.payload.reply_token.clone();
        self.enqueue(request).then_some(reply_token)
    }

    fn enqueue(&self, envelope: Envelope) -> bool {
        let message = OutboundMessage {
            interface: Interface::WebSocket,
            envelope,
        };
        match self.outbound.send(message) {
            Ok(()) => true,
            Err(_) => {
                warn!("Outbound queue closed, engine is gone");
                false
            }
        }
    }
}
