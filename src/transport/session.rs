//! WebSocket session with statum state machine
//!
//! Owns the connection to the cloud broker for the lifetime of the engine.
//! Connection loss is never fatal: the session falls back to
//! `Disconnected`, waits `reconnect_delay` and tries again until it is
//! cancelled.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected
//!      ▲               │              │
//!      └───────────────┴──────────────┘
//!        (connect failed / connection lost)
//! ```
//!
//! The current state is published as [`ConnectionState`] on a `watch`
//! channel so the engine and capabilities can gate outbound traffic on it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use statum::{machine, state};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::websocket::{self, WsMessage, WsReader, WsWriter};
use super::{ConnectionState, TransportError};
use crate::queue::{InboundMessage, Interface};

/// States of the WebSocket session
#[state]
#[derive(Debug, Clone)]
pub enum LinkState {
    Disconnected, // waiting for the next attempt
    Connecting,   // handshake in flight
    Connected,    // frames flowing
}

/// Connection parameters, fixed for the lifetime of the session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub connect_timeout: Duration,
    pub reconnect_delay: Duration,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    /// missed pongs after which the connection is dropped
    pub retry_count: u32,
}

/// Why a connected session ended
#[derive(Debug)]
pub enum Disconnect {
    Shutdown,
    Closed { code: u16, reason: String },
    HeartbeatTimeout,
    Error(TransportError),
}

#[machine]
pub struct WebSocketSession<S: LinkState> {
    settings: SessionSettings,
    inbound: mpsc::UnboundedSender<InboundMessage>,
    status: Arc<watch::Sender<ConnectionState>>,
    attempts: u64,
}

impl<S: LinkState> WebSocketSession<S> {
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    fn publish(&self, state: ConnectionState) {
        self.status.send_replace(state);
    }
}

/// Outcome of a connect attempt
pub enum ConnectAttempt {
    Established(WebSocketSession<Connected>, WsWriter, WsReader),
    Failed(WebSocketSession<Disconnected>, TransportError),
}

impl WebSocketSession<Disconnected> {
    pub fn create(
        settings: SessionSettings,
        inbound: mpsc::UnboundedSender<InboundMessage>,
        status: Arc<watch::Sender<ConnectionState>>,
    ) -> Self {
        info!("Creating WebSocket session for {}", settings.url);
        Self::new(settings, inbound, status, 0)
    }

    /// Waits out the reconnect delay (not before the first attempt)
    pub async fn prepare_connect(
        mut self,
        cancel: &CancellationToken,
    ) -> WebSocketSession<Connecting> {
        if self.attempts > 0 {
            debug!(
                "Reconnecting in {} ms",
                self.settings.reconnect_delay.as_millis()
            );
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.settings.reconnect_delay) => {}
            }
        }
        self.attempts += 1;
        self.publish(ConnectionState::Connecting);
        self.transition()
    }
}

impl WebSocketSession<Connecting> {
    pub async fn connect(self) -> ConnectAttempt {
        info!(
            "Connecting to {} (attempt {})",
            self.settings.url, self.attempts
        );
        let timeout = self.settings.connect_timeout;
        let result = tokio::time::timeout(
            timeout,
            websocket::connect(&self.settings.url, &self.settings.headers),
        )
        .await
        .unwrap_or_else(|_| Err(TransportError::Timeout(timeout.as_millis() as u64)));

        match result {
            Ok((writer, reader)) => {
                info!("Connected to {}", self.settings.url);
                self.publish(ConnectionState::Connected);
                ConnectAttempt::Established(self.transition(), writer, reader)
            }
            Err(e) => {
                self.publish(ConnectionState::Disconnected);
                ConnectAttempt::Failed(self.transition(), e)
            }
        }
    }
}

impl WebSocketSession<Connected> {
    /// Pumps frames until the connection drops or `cancel` fires.
    ///
    /// Text frames go to the inbound queue tagged as WebSocket traffic;
    /// frames from `outbound` are written as they arrive.
    pub async fn run_until_disconnect(
        self,
        mut writer: WsWriter,
        mut reader: WsReader,
        outbound: &mut mpsc::UnboundedReceiver<String>,
        cancel: &CancellationToken,
    ) -> (WebSocketSession<Disconnected>, Disconnect) {
        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + self.settings.ping_interval,
            self.settings.ping_interval,
        );
        let mut ping_sent: Option<Instant> = None;
        let mut missed_pongs = 0u32;

        let reason = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Err(e) = writer.send_close().await {
                        debug!("Close frame not delivered: {}", e);
                    }
                    break Disconnect::Shutdown;
                }

                message = reader.recv() => match message {
                    Some(Ok(WsMessage::Text(raw))) => {
                        debug!("Received frame ({} bytes)", raw.len());
                        let message = InboundMessage { interface: Interface::WebSocket, raw };
                        if self.inbound.send(message).is_err() {
                            break Disconnect::Shutdown;
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        if let Err(e) = writer.send_pong(data).await {
                            break Disconnect::Error(e);
                        }
                    }
                    Some(Ok(WsMessage::Pong(_))) => {
                        ping_sent = None;
                        missed_pongs = 0;
                    }
                    Some(Ok(WsMessage::Binary(data))) => {
                        warn!("Ignoring binary frame ({} bytes)", data.len());
                    }
                    Some(Ok(WsMessage::Close { code, reason })) => {
                        break Disconnect::Closed { code, reason };
                    }
                    Some(Err(e)) => break Disconnect::Error(e),
                    None => break Disconnect::Closed { code: 1006, reason: String::new() },
                },

                frame = outbound.recv() => match frame {
                    Some(frame) => {
                        if let Err(e) = writer.send_text(frame).await {
                            break Disconnect::Error(e);
                        }
                    }
                    None => break Disconnect::Shutdown,
                },

                _ = heartbeat.tick() => {
                    if let Some(sent) = ping_sent {
                        if sent.elapsed() >= self.settings.ping_timeout {
                            missed_pongs += 1;
                            warn!("No pong received ({}/{})", missed_pongs, self.settings.retry_count);
                        }
                    }
                    if missed_pongs >= self.settings.retry_count {
                        break Disconnect::HeartbeatTimeout;
                    }
                    if let Err(e) = writer.send_ping(Vec::new()).await {
                        break Disconnect::Error(e);
                    }
                    ping_sent = Some(Instant::now());
                }
            }
        };

        self.publish(ConnectionState::Disconnected);
        (self.transition(), reason)
    }
}

/// Session loop: connect, pump, reconnect, until `cancel` fires.
pub async fn run_session(
    session: WebSocketSession<Disconnected>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    let mut session = session;

    while !cancel.is_cancelled() {
        let connecting = session.prepare_connect(&cancel).await;
        if cancel.is_cancelled() {
            connecting.publish(ConnectionState::Disconnected);
            break;
        }

        session = match connecting.connect().await {
            ConnectAttempt::Established(connected, writer, reader) => {
                let (disconnected, reason) = connected
                    .run_until_disconnect(writer, reader, &mut outbound, &cancel)
                    .await;
                match reason {
                    Disconnect::Shutdown => info!("WebSocket session shut down"),
                    Disconnect::Closed { code, reason } => {
                        warn!("Connection closed by server ({}): {}", code, reason)
                    }
                    Disconnect::HeartbeatTimeout => warn!("Heartbeat timed out"),
                    Disconnect::Error(e) => error!("Connection lost: {}", e),
                }
                disconnected
            }
            ConnectAttempt::Failed(disconnected, e) => {
                warn!("Connect failed: {}", e);
                disconnected
            }
        };
    }

    info!("WebSocket session stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    fn settings(url: &str) -> SessionSettings {
        SessionSettings {
            url: url.to_string(),
            headers: vec![("appkey".to_string(), "key".to_string())],
            connect_timeout: Duration::from_millis(500),
            reconnect_delay: Duration::from_millis(20),
            ping_interval: Duration::from_secs(300),
            ping_timeout: Duration::from_secs(10),
            retry_count: 2,
        }
    }

    #[tokio::test]
    async fn test_failed_connect_falls_back_to_disconnected() {
        let (inbound, _inbound_rx) = mpsc::unbounded_channel();
        let (status, mut status_rx) = watch::channel(ConnectionState::Disconnected);
        let session = WebSocketSession::create(settings("ws://127.0.0.1:1/"), inbound, Arc::new(status));
        let cancel = CancellationToken::new();

        let connecting = session.prepare_connect(&cancel).await;
        assert_eq!(*status_rx.borrow_and_update(), ConnectionState::Connecting);

        match connecting.connect().await {
            ConnectAttempt::Failed(disconnected, _) => {
                assert_eq!(disconnected.attempts, 1);
                assert_eq!(*status_rx.borrow(), ConnectionState::Disconnected);
            }
            ConnectAttempt::Established(..) => panic!("nothing listens on port 1"),
        }
    }

    #[tokio::test]
    async fn test_session_loop_stops_on_cancel() {
        let (inbound, _inbound_rx) = mpsc::unbounded_channel();
        let (status, status_rx) = watch::channel(ConnectionState::Disconnected);
        let session = WebSocketSession::create(settings("ws://127.0.0.1:1/"), inbound, Arc::new(status));
        let (_outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_session(session, outbound_rx, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("session loop did not stop")
            .unwrap();
        assert_eq!(*status_rx.borrow(), ConnectionState::Disconnected);
    }

    async fn local_server() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/", listener.local_addr().unwrap());
        (listener, url)
    }

    async fn establish(
        settings: SessionSettings,
    ) -> (
        WebSocketSession<Connected>,
        WsWriter,
        WsReader,
        mpsc::UnboundedReceiver<InboundMessage>,
        watch::Receiver<ConnectionState>,
    ) {
        let (inbound, inbound_rx) = mpsc::unbounded_channel();
        let (status, status_rx) = watch::channel(ConnectionState::Disconnected);
        let session = WebSocketSession::create(settings, inbound, Arc::new(status));
        let connecting = session.prepare_connect(&CancellationToken::new()).await;
        match connecting.connect().await {
            ConnectAttempt::Established(connected, writer, reader) => {
                (connected, writer, reader, inbound_rx, status_rx)
            }
            ConnectAttempt::Failed(_, e) => panic!("connect failed: {}", e),
        }
    }

    #[tokio::test]
    async fn test_frames_flow_until_server_closes() {
        let (listener, url) = local_server().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text("hello".to_string())).await.unwrap();
            while let Some(Ok(message)) = ws.next().await {
                if message == Message::Text("out".to_string()) {
                    break;
                }
            }
            let _ = ws.close(None).await;
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (connected, writer, reader, mut inbound_rx, status_rx) = establish(settings(&url)).await;
        assert_eq!(*status_rx.borrow(), ConnectionState::Connected);

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        outbound_tx.send("out".to_string()).unwrap();
        let (disconnected, reason) = tokio::time::timeout(
            Duration::from_secs(2),
            connected.run_until_disconnect(writer, reader, &mut outbound_rx, &CancellationToken::new()),
        )
        .await
        .expect("session did not end");

        assert!(matches!(reason, Disconnect::Closed { .. }));
        assert_eq!(disconnected.attempts, 1);
        assert_eq!(*status_rx.borrow(), ConnectionState::Disconnected);

        let message = inbound_rx.try_recv().unwrap();
        assert_eq!(message.interface, Interface::WebSocket);
        assert_eq!(message.raw, "hello");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_missed_pongs_drop_connection() {
        let (listener, url) = local_server().await;
        // never reads, so pings go unanswered
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(ws);
        });

        let mut settings = settings(&url);
        settings.ping_interval = Duration::from_millis(50);
        settings.ping_timeout = Duration::from_millis(10);
        let (connected, writer, reader, _inbound_rx, status_rx) = establish(settings).await;

        let (_outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let (_, reason) = tokio::time::timeout(
            Duration::from_secs(2),
            connected.run_until_disconnect(writer, reader, &mut outbound_rx, &CancellationToken::new()),
        )
        .await
        .expect("heartbeat did not fire");

        assert!(matches!(reason, Disconnect::HeartbeatTimeout));
        assert_eq!(*status_rx.borrow(), ConnectionState::Disconnected);
        server.abort();
    }

    #[tokio::test]
    async fn test_session_loop_reconnects_after_close() {
        let (listener, url) = local_server().await;
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        let server = tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = ws.close(None).await;
            }
        });

        let (inbound, _inbound_rx) = mpsc::unbounded_channel();
        let (status, status_rx) = watch::channel(ConnectionState::Disconnected);
        let session = WebSocketSession::create(settings(&url), inbound, Arc::new(status));
        let (_outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_session(session, outbound_rx, cancel.clone()));

        tokio::time::timeout(Duration::from_secs(2), async {
            while accepted.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session did not reconnect");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("session loop did not stop")
            .unwrap();
        assert_eq!(*status_rx.borrow(), ConnectionState::Disconnected);
        server.abort();
    }
}
