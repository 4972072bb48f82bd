//! WebSocket server: accept loop and per-connection task management.
//!
//! This module is responsible for:
//!
//! 1. Accepting TCP connections on an already-bound listener.
//! 2. Upgrading each connection to a WebSocket session.
//! 3. Registering the session with the relay under a fresh [`ConnectionId`].
//! 4. Pumping frames in both directions until either side closes.
//! 5. Stopping the accept loop when the shared `running` flag is cleared.
//!
//! # Outbound path (for beginners)
//!
//! The router is synchronous and must never wait on a socket.  Each session
//! therefore gets an unbounded channel: the router pushes [`Outbound`] items
//! into it through a [`ChannelSink`], and the session task drains the channel
//! into the WebSocket writer.
//!
//! ```text
//! router ──ChannelSink──► mpsc ──► session task ──► ws_tx ──► peer
//! peer ──► ws_rx ──► session task ──► RelayService::handle_frame ──► router
//! ```

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};

use promptlink_core::protocol::encode_server_envelope;
use promptlink_core::{ConnectionId, ConnectionSink, Liveness, ServerEnvelope, SinkError};

use crate::application::RelayService;

// ── Outbound channel ──────────────────────────────────────────────────────────

/// One item queued for a session's WebSocket writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// An encoded JSON text frame.
    Frame(String),
    /// A transport-level ping.
    Probe,
    /// Close the connection.
    Close,
}

/// [`ConnectionSink`] backed by a session's outbound channel.
pub struct ChannelSink {
    tx: UnboundedSender<Outbound>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<Outbound>) -> Self {
        Self { tx }
    }
}

impl ConnectionSink for ChannelSink {
    fn send(&self, envelope: &ServerEnvelope) -> Result<(), SinkError> {
        let text =
            encode_server_envelope(envelope).map_err(|e| SinkError::Encode(e.to_string()))?;
        self.tx
            .send(Outbound::Frame(text))
            .map_err(|_| SinkError::Closed)
    }

    fn probe(&self) -> Result<Liveness, SinkError> {
        self.tx
            .send(Outbound::Probe)
            .map_err(|_| SinkError::Closed)?;
        Ok(Liveness::Pending)
    }

    fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Runs the WebSocket accept loop until `running` is set to `false`.
///
/// Each accepted connection is handed off to a dedicated Tokio task so that
/// one slow peer never blocks others.
pub async fn run_server(listener: TcpListener, service: RelayService, running: Arc<AtomicBool>) {
    match listener.local_addr() {
        Ok(addr) => info!("relay listening on {addr}"),
        Err(e) => warn!("relay listening on an unknown address: {e}"),
    }

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // A short timeout lets the loop notice the shutdown flag while idle.
        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new connection from {peer_addr}");
                let service = service.clone();
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, service).await;
                });
            }
            Ok(Err(e)) => error!("accept error: {e}"),
            Err(_) => {}
        }
    }
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, service: RelayService) {
    match run_session(stream, peer_addr, service).await {
        Ok(()) => debug!("session {peer_addr} closed normally"),
        Err(e) => warn!("session {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs one WebSocket session from handshake to disconnect.
///
/// The connection is always removed from the relay on the way out, whatever
/// ended the session.
async fn run_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    service: RelayService,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let id = ConnectionId::new();
    let (out_tx, mut out_rx) = unbounded_channel();
    service
        .connect(id, Arc::new(ChannelSink::new(out_tx)))
        .await;
    info!(conn = %id, peer = %peer_addr, "connection opened");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let result: anyhow::Result<()> = loop {
        tokio::select! {
            inbound = ws_rx.next() => match inbound {
                Some(Ok(WsMessage::Text(text))) => service.handle_frame(id, &text).await,
                Some(Ok(WsMessage::Binary(bytes))) => {
                    let text = String::from_utf8_lossy(&bytes);
                    service.handle_frame(id, &text).await;
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {
                    service.mark_alive(id).await;
                }
                Some(Ok(WsMessage::Close(_))) | None => break Ok(()),
                Some(Ok(WsMessage::Frame(_))) => {}
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => break Ok(()),
                Some(Err(e)) => break Err(e).context("WebSocket read failed"),
            },

            outbound = out_rx.recv() => match outbound {
                Some(Outbound::Frame(text)) => {
                    if let Err(e) = ws_tx.send(WsMessage::Text(text)).await {
                        break Err(e).context("WebSocket write failed");
                    }
                }
                Some(Outbound::Probe) => {
                    if let Err(e) = ws_tx.send(WsMessage::Ping(Vec::new())).await {
                        break Err(e).context("WebSocket ping failed");
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break Ok(());
                }
            },
        }
    };

    service.disconnect(id).await;
    info!(conn = %id, "connection closed");
    result
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use promptlink_core::ServerMessage;

    use super::*;

    #[test]
    fn test_channel_sink_send_queues_encoded_frame() {
        // Arrange
        let (tx, mut rx) = unbounded_channel();
        let sink = ChannelSink::new(tx);

        // Act
        sink.send(&ServerEnvelope::new(ServerMessage::ExtensionRegistered, 7))
            .unwrap();

        // Assert
        match rx.try_recv().unwrap() {
            Outbound::Frame(text) => {
                let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                assert_eq!(value["type"], "extension_registered");
                assert_eq!(value["timestamp"], 7);
            }
            other => panic!("expected a frame, got {other:?}"),
        }
    }

    #[test]
    fn test_channel_sink_probe_queues_ping_and_reports_pending() {
        let (tx, mut rx) = unbounded_channel();
        let sink = ChannelSink::new(tx);

        assert_eq!(sink.probe(), Ok(Liveness::Pending));
        assert_eq!(rx.try_recv().unwrap(), Outbound::Probe);
    }

    #[test]
    fn test_channel_sink_reports_closed_after_session_ends() {
        let (tx, rx) = unbounded_channel();
        let sink = ChannelSink::new(tx);
        drop(rx);

        let result = sink.send(&ServerEnvelope::new(ServerMessage::PromptDelivered, 0));

        assert_eq!(result, Err(SinkError::Closed));
        assert_eq!(sink.probe(), Err(SinkError::Closed));
    }

    #[test]
    fn test_channel_sink_close_queues_close() {
        let (tx, mut rx) = unbounded_channel();
        let sink = ChannelSink::new(tx);

        sink.close();

        assert_eq!(rx.try_recv().unwrap(), Outbound::Close);
    }
}
