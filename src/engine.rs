//! Engine: the tick loop tying transports, devices and queues together.
//!
//! # Architecture
//!
//! ```text
//!  WebSocket task ─┐                               ┌─► WebSocket task
//!                  ├─► InboundQueue ─► handle() ───┤
//!  UDP task ───────┘     verify, route,   │        └─► UDP task
//!                        clock sync       ▼
//!            capabilities ──────────► OutboundQueue (stamp + sign on flush)
//! ```
//!
//! All protocol work happens synchronously in [`Engine::handle`]. Transport
//! tasks only move frames between sockets and the queues.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::capability::EventLimits;
use crate::config::EngineConfig;
use crate::device::module::module_device;
use crate::device::{Device, DeviceBuilder, DeviceRegistry, ModuleCommandHandler};
use crate::error::EngineError;
use crate::protocol::signature;
use crate::protocol::{parse_timestamp_frame, Envelope, MessageType, ValueMap};
use crate::queue::{EventSender, InboundMessage, InboundQueue, Interface, OutboundMessage, OutboundQueue};
use crate::transport::udp::{bind_multicast, run_udp};
use crate::transport::{
    run_session, ConnectionState, ServerClock, UdpFrame, WebSocketSession,
};

type ResponseCallback = Box<dyn FnMut(&Envelope) + Send>;
type ConnectionCallback = Box<dyn FnMut() + Send>;

/// Channels and tasks of a started engine
struct Links {
    websocket: mpsc::UnboundedSender<String>,
    udp: Option<mpsc::UnboundedSender<UdpFrame>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

pub struct Engine {
    config: EngineConfig,
    registry: DeviceRegistry,
    // held here so the registry's weak entry stays alive
    module_device: Arc<Device>,
    module_commands: Arc<ModuleCommandHandler>,
    inbound: InboundQueue,
    outbound: OutboundQueue,
    clock: ServerClock,
    status: Arc<watch::Sender<ConnectionState>>,
    status_rx: watch::Receiver<ConnectionState>,
    last_state: ConnectionState,
    links: Option<Links>,
    on_response: Option<ResponseCallback>,
    on_connected: Option<ConnectionCallback>,
    on_disconnected: Option<ConnectionCallback>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let (status, status_rx) = watch::channel(ConnectionState::Disconnected);
        let outbound = OutboundQueue::new();
        let events = EventSender::new(outbound.sender(), status_rx.clone());
        let (module_device, module_commands) = module_device(events, config.events.limits());

        let mut registry = DeviceRegistry::new();
        registry.register(&module_device);

        Self {
            config,
            registry,
            module_device,
            module_commands,
            inbound: InboundQueue::new(),
            outbound,
            clock: ServerClock::new(),
            status: Arc::new(status),
            status_rx,
            last_state: ConnectionState::Disconnected,
            links: None,
            on_response: None,
            on_connected: None,
            on_disconnected: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Send side for application code outside of capabilities
    pub fn event_sender(&self) -> EventSender {
        EventSender::new(self.outbound.sender(), self.status_rx.clone())
    }

    pub fn event_limits(&self) -> EventLimits {
        self.config.events.limits()
    }

    /// Starts composing a device wired to this engine's queues
    pub fn device(&self, id: &str, product_type: &str) -> DeviceBuilder {
        Device::builder(id, product_type, self.event_sender(), self.event_limits())
    }

    /// Registers a device for routing. The engine keeps only a weak
    /// reference; dropping the last `Arc` unregisters it.
    pub fn register_device(&mut self, device: &Arc<Device>) -> bool {
        let added = self.registry.register(device);
        if added && self.links.is_some() {
            debug!(
                "Device {} registered while running, announced on next connect",
                device.id()
            );
        }
        added
    }

    pub fn unregister_device(&mut self, device: &Arc<Device>) -> bool {
        if Arc::ptr_eq(device, &self.module_device) {
            warn!("The module device cannot be unregistered");
            return false;
        }
        self.registry.unregister(device)
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Handler for commands addressed to the module itself
    pub fn module_commands(&self) -> Arc<ModuleCommandHandler> {
        self.module_commands.clone()
    }

    /// Called with every response the server sends to our own requests
    pub fn on_response<F>(&mut self, callback: F)
    where
        F: FnMut(&Envelope) + Send + 'static,
    {
        self.on_response = Some(Box::new(callback));
    }

    pub fn on_connected<F>(&mut self, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.on_connected = Some(Box::new(callback));
    }

    pub fn on_disconnected<F>(&mut self, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.on_disconnected = Some(Box::new(callback));
    }

    /// Queues a request to the server and returns its reply token, `None`
    /// while not connected.
    pub fn send_request(&self, device_id: &str, action: &str, value: ValueMap) -> Option<String> {
        self.event_sender().send_request(device_id, action, value)
    }

    /// Spawns the transport tasks on the current tokio runtime.
    pub fn begin(&mut self) -> Result<(), EngineError> {
        if self.links.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        let credentials = &self.config.credentials;
        if credentials.app_key.is_empty() {
            return Err(EngineError::MissingCredentials("app_key is empty".to_string()));
        }
        if credentials.app_secret.is_empty() {
            return Err(EngineError::MissingCredentials("app_secret is empty".to_string()));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| EngineError::Runtime(e.to_string()))?;

        let device_ids = self.registry.device_ids();
        info!("Starting engine for devices {:?}", device_ids);

        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        let (websocket, websocket_rx) = mpsc::unbounded_channel();
        let session = WebSocketSession::create(
            self.config.session_settings(&device_ids),
            self.inbound.sender(),
            self.status.clone(),
        );
        tasks.push(runtime.spawn(run_session(session, websocket_rx, cancel.clone())));

        let udp = if self.config.udp.enabled {
            let (udp, udp_rx) = mpsc::unbounded_channel();
            let settings = self.config.udp.settings();
            let inbound = self.inbound.sender();
            let cancel = cancel.clone();
            tasks.push(runtime.spawn(async move {
                match bind_multicast(&settings).await {
                    Ok(socket) => run_udp(socket, inbound, udp_rx, cancel).await,
                    Err(e) => warn!("UDP transport unavailable, continuing without: {}", e),
                }
            }));
            Some(udp)
        } else {
            None
        };

        self.links = Some(Links {
            websocket,
            udp,
            cancel,
            tasks,
        });
        Ok(())
    }

    /// One engine tick: connection callbacks, inbound frames, outbound flush.
    pub fn handle(&mut self) {
        self.observe_connection();
        self.registry.prune();

        for message in self.inbound.drain() {
            self.handle_inbound(message);
        }

        self.flush_outbound();
    }

    /// Ticks every `engine.tick_ms` until `shutdown` resolves, then stops.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let tick = Duration::from_millis(self.config.engine.tick_ms.max(1));
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!("Engine loop running ({} ms tick)", tick.as_millis());
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = ticker.tick() => self.handle(),
            }
        }

        self.stop().await;
    }

    /// Cancels the transport tasks and waits for them to finish
    pub async fn stop(&mut self) {
        let Some(links) = self.links.take() else {
            return;
        };
        info!("Stopping engine");
        links.cancel.cancel();
        for task in links.tasks {
            if let Err(e) = task.await {
                error!("Transport task failed: {}", e);
            }
        }
        self.status.send_replace(ConnectionState::Disconnected);
        self.observe_connection();
        if !self.outbound.is_empty() {
            debug!("{} outbound messages left unsent", self.outbound.len());
        }
    }

    pub fn is_running(&self) -> bool {
        self.links.is_some()
    }

    pub fn is_connected(&self) -> bool {
        *self.status_rx.borrow() == ConnectionState::Connected
    }

    /// Server epoch seconds, 0 until the server sent its time
    pub fn timestamp(&self) -> u64 {
        self.clock.now()
    }

    pub fn server_time(&self) -> Option<DateTime<Utc>> {
        self.clock.server_time()
    }

    fn observe_connection(&mut self) {
        let state = *self.status_rx.borrow();
        if state == self.last_state {
            return;
        }
        debug!("Connection {} -> {}", self.last_state, state);

        match state {
            ConnectionState::Connected => {
                info!("Connected to server");
                if let Some(callback) = self.on_connected.as_mut() {
                    callback();
                }
            }
            // a fast reconnect may skip the Disconnected state between ticks
            ConnectionState::Disconnected | ConnectionState::Connecting
                if self.last_state == ConnectionState::Connected =>
            {
                info!("Disconnected from server");
                if let Some(callback) = self.on_disconnected.as_mut() {
                    callback();
                }
            }
            _ => {}
        }
        self.last_state = state;
    }

    fn handle_inbound(&mut self, message: InboundMessage) {
        let raw = message.raw.as_str();
        if let Err(e) = signature::check(&self.config.credentials.app_secret, raw) {
            warn!("Dropping frame from {:?}: {}", message.interface, e);
            return;
        }

        if signature::is_timestamp_frame(raw) {
            match parse_timestamp_frame(raw) {
                Some(timestamp) => {
                    debug!("Server time {}", timestamp);
                    self.clock.sync(timestamp);
                }
                None => warn!("Dropping malformed timestamp frame: {}", raw),
            }
            return;
        }

        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping malformed frame from {:?}: {}", message.interface, e);
                return;
            }
        };

        if envelope.payload.created_at > 0 {
            self.clock.sync(envelope.payload.created_at);
        }

        match envelope.kind() {
            MessageType::Request => {
                debug!(
                    "Request {} for {} via {:?}",
                    envelope.payload.action, envelope.payload.device_id, message.interface
                );
                let response = self.registry.route(&envelope);
                self.outbound.push(OutboundMessage {
                    interface: message.interface,
                    envelope: response,
                });
            }
            MessageType::Response => match self.on_response.as_mut() {
                Some(callback) => callback(&envelope),
                None => debug!("Response {} without callback", envelope.payload.reply_token),
            },
            MessageType::Event => {
                debug!("Ignoring event {} from server", envelope.payload.action)
            }
        }
    }

    fn flush_outbound(&mut self) {
        self.outbound.collect();
        if self.outbound.is_empty() || !self.is_connected() || !self.clock.is_synced() {
            return;
        }
        let Some(links) = self.links.as_ref() else {
            return;
        };
        let secret = self.config.credentials.app_secret.as_str();

        while let Some(mut message) = self.outbound.pop() {
            message.envelope.payload.created_at = self.clock.now();
            let frame = match signature::sign(secret, &mut message.envelope) {
                Ok(frame) => frame,
                Err(e) => {
                    error!(
                        "Failed to sign {} for {}: {}",
                        message.envelope.payload.action, message.envelope.payload.device_id, e
                    );
                    continue;
                }
            };

            match message.interface {
                Interface::WebSocket => {
                    if links.websocket.send(frame).is_err() {
                        warn!("WebSocket task gone, keeping {} pending", self.outbound.len() + 1);
                        self.outbound.requeue_front(message);
                        break;
                    }
                }
                Interface::Udp(peer) => {
                    let sent = links
                        .udp
                        .as_ref()
                        .is_some_and(|udp| udp.send(UdpFrame { frame, peer }).is_ok());
                    if !sent {
                        warn!("UDP transport gone, reply to {} dropped", peer);
                    }
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn attach_links(
        &mut self,
    ) -> (mpsc::UnboundedReceiver<String>, mpsc::UnboundedReceiver<UdpFrame>) {
        let (websocket, websocket_rx) = mpsc::unbounded_channel();
        let (udp, udp_rx) = mpsc::unbounded_channel();
        self.links = Some(Links {
            websocket,
            udp: Some(udp),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        });
        self.status.send_replace(ConnectionState::Connected);
        (websocket_rx, udp_rx)
    }
}
