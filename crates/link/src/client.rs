//! Push transport: a long-lived WebSocket session.
//!
//! [`PushTransport`] performs the handshake and yields a [`PushSession`];
//! [`WsPushTransport`] is the `tokio-tungstenite` implementation used in
//! production. The coordinator only sees the traits, so tests substitute
//! in-memory sessions.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::LinkError;

/// Opens push sessions.
#[async_trait]
pub trait PushTransport: Send + Sync + 'static {
    /// Perform the handshake.
    ///
    /// Failure is reported as [`LinkError::TransportHandshakeFailure`].
    async fn connect(&self) -> Result<Box<dyn PushSession>, LinkError>;
}

/// An established push session.
#[async_trait]
pub trait PushSession: Send {
    /// Next text frame.
    ///
    /// `None` means the peer closed the session. Must be cancel-safe: the
    /// coordinator polls it inside `tokio::select!`.
    async fn next_frame(&mut self) -> Option<Result<String, LinkError>>;

    /// Send one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), LinkError>;

    /// Close the session. Errors are logged, not returned.
    async fn close(&mut self);
}

/// WebSocket push transport.
pub struct WsPushTransport {
    url: String,
}

impl WsPushTransport {
    /// * `url` - full WebSocket URL, e.g. `ws://host:8080/websocket`.
    pub fn new(url: String) -> Self {
        Self { url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PushTransport for WsPushTransport {
    async fn connect(&self) -> Result<Box<dyn PushSession>, LinkError> {
        let (stream, _response) = connect_async(self.url.as_str()).await.map_err(|e| {
            LinkError::TransportHandshakeFailure(format!(
                "Failed to connect to {}: {e}",
                self.url
            ))
        })?;

        tracing::info!(url = %self.url, "Push transport connected");
        Ok(Box::new(WsSession { stream }))
    }
}

/// A live WebSocket session.
pub struct WsSession {
    stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

#[async_trait]
impl PushSession for WsSession {
    async fn next_frame(&mut self) -> Option<Result<String, LinkError>> {
        while let Some(msg) = self.stream.next().await {
            match msg {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => {
                        tracing::debug!("Ignoring non-UTF-8 binary frame");
                    }
                },
                Ok(Message::Close(frame)) => {
                    tracing::info!(?frame, "Push transport closed by server");
                    return None;
                }
                // Ping/Pong are answered by tungstenite.
                Ok(_) => {}
                Err(e) => return Some(Err(LinkError::TransportClosed(e.to_string()))),
            }
        }
        None
    }

    async fn send_text(&mut self, text: String) -> Result<(), LinkError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| LinkError::TransportClosed(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "Error closing push transport");
        }
    }
}
