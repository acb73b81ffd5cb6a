//! WebSocket reader/writer halves over `tokio-tungstenite`.
//!
//! [`connect`] performs the handshake with the broker's connect headers and
//! returns split halves for use in a `tokio::select!` loop.

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

use super::TransportError;

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Received WebSocket message.
#[derive(Debug)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close { code: u16, reason: String },
}

#[derive(Debug)]
pub struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, tungstenite::Message>,
}

impl WsWriter {
    pub async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sink
            .send(tungstenite::Message::Text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    pub async fn send_ping(&mut self, data: Vec<u8>) -> Result<(), TransportError> {
        self.sink
            .send(tungstenite::Message::Ping(data))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    pub async fn send_pong(&mut self, data: Vec<u8>) -> Result<(), TransportError> {
        self.sink
            .send(tungstenite::Message::Pong(data))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    pub async fn send_close(&mut self) -> Result<(), TransportError> {
        self.sink
            .send(tungstenite::Message::Close(None))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

#[derive(Debug)]
pub struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

impl WsReader {
    /// Next message, `None` when the stream ends. Raw frames are skipped.
    pub async fn recv(&mut self) -> Option<Result<WsMessage, TransportError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(TransportError::Read(e.to_string()))),
            };
            let message = match message {
                tungstenite::Message::Text(text) => WsMessage::Text(text),
                tungstenite::Message::Binary(data) => WsMessage::Binary(data),
                tungstenite::Message::Ping(data) => WsMessage::Ping(data),
                tungstenite::Message::Pong(data) => WsMessage::Pong(data),
                tungstenite::Message::Close(frame) => {
                    let (code, reason) = frame
                        .map(|cf| (cf.code.into(), cf.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    WsMessage::Close { code, reason }
                }
                tungstenite::Message::Frame(_) => continue,
            };
            return Some(Ok(message));
        }
    }
}

/// Connects to `url` with the given request headers.
pub async fn connect(
    url: &str,
    headers: &[(String, String)],
) -> Result<(WsWriter, WsReader), TransportError> {
    use tungstenite::client::IntoClientRequest;

    let mut request = url
        .into_client_request()
        .map_err(|e| TransportError::InvalidRequest(format!("invalid URL {}: {}", url, e)))?;

    for (name, value) in headers {
        let header_name = tungstenite::http::HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("header {}: {}", name, e)))?;
        let header_value = tungstenite::http::HeaderValue::from_str(value)
            .map_err(|e| TransportError::InvalidRequest(format!("value of {}: {}", name, e)))?;
        request.headers_mut().insert(header_name, header_value);
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;

    let (sink, stream) = ws_stream.split();
    Ok((WsWriter { sink }, WsReader { stream }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_invalid_url() {
        let result = connect("not-a-url", &[]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invalid_header_value() {
        let headers = vec![("appkey".to_string(), "line\nbreak".to_string())];
        let result = connect("ws://127.0.0.1:1/", &headers).await;
        assert!(matches!(result, Err(TransportError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_connect_unreachable_host() {
        let result = connect("ws://127.0.0.1:1/", &[]).await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }
}
