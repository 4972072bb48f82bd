//! Transport seam: how the driver opens a link and moves text frames.
//!
//! [`Connector`] and [`Link`] are the only things the driver knows about the
//! network.  [`WsConnector`] implements them over `tokio-tungstenite`; tests
//! implement them over in-memory channels.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::debug;

use crate::domain::ClientError;

/// Opens links to a relay.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a link to `url` (a bare `ws://host:port` socket URL).
    async fn connect(&self, url: &str) -> Result<Box<dyn Link>, ClientError>;
}

/// One open, bidirectional text-frame link.
#[async_trait]
pub trait Link: Send {
    async fn send(&mut self, text: String) -> Result<(), ClientError>;

    /// The next inbound text frame, or `None` once the link is closed.
    ///
    /// Must be cancel-safe: the driver polls it inside `select!`.
    async fn recv(&mut self) -> Option<Result<String, ClientError>>;

    async fn close(&mut self);
}

// ── WebSocket implementation ──────────────────────────────────────────────────

/// Connects with `tokio_tungstenite::connect_async`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Link>, ClientError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        Ok(Box::new(WsLink { stream }))
    }
}

struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Link for WsLink {
    async fn send(&mut self, text: String) -> Result<(), ClientError> {
        self.stream
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ClientError>> {
        loop {
            match self.stream.next().await? {
                Ok(WsMessage::Text(text)) => return Some(Ok(text)),
                Ok(WsMessage::Binary(bytes)) => {
                    return Some(Ok(String::from_utf8_lossy(&bytes).into_owned()))
                }
                // tungstenite answers pings itself.
                Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_)) => {}
                Ok(WsMessage::Close(frame)) => {
                    debug!(?frame, "relay closed the link");
                    return None;
                }
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return None,
                Err(e) => return Some(Err(ClientError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
