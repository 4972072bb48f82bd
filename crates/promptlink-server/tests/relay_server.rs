//! Live WebSocket tests: a real `RelayServer` on a loopback port, driven by
//! `tokio-tungstenite` clients.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_test::assert_ok;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};

use promptlink_core::protocol::{decode_server_message, encode_client_message};
use promptlink_core::{
    ClientMessage, DeviceType, ErrorCode, PromptSink, ServerMessage, SessionToken,
};
use promptlink_server::{RelayServer, ServerConfig};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Default)]
struct ChatSurface {
    prompts: Mutex<Vec<String>>,
}

impl PromptSink for ChatSurface {
    fn deliver_prompt(&self, text: &str) {
        self.prompts.lock().unwrap().push(text.to_string());
    }
}

fn loopback_config() -> ServerConfig {
    ServerConfig {
        bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        preferred_ports: Vec::new(),
        fallback_ports: Vec::new(),
        ..ServerConfig::default()
    }
}

async fn dial(server: &RelayServer) -> Ws {
    let url = server.endpoint().socket_url();
    let (ws, _) = assert_ok!(connect_async(url.as_str()).await);
    ws
}

async fn send(ws: &mut Ws, msg: &ClientMessage) {
    let text = encode_client_message(msg).unwrap();
    ws.send(WsMessage::Text(text)).await.unwrap();
}

/// Next protocol message, skipping transport frames.
async fn recv(ws: &mut Ws) -> ServerMessage {
    loop {
        let frame = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("read failed");
        if let WsMessage::Text(text) = frame {
            return decode_server_message(&text).unwrap();
        }
    }
}

async fn pair(ws: &mut Ws, code: &str) -> SessionToken {
    send(
        ws,
        &ClientMessage::Pair {
            code: code.to_string(),
            device_info: None,
        },
    )
    .await;
    match recv(ws).await {
        ServerMessage::Paired { token, .. } => token,
        other => panic!("expected paired, got {other:?}"),
    }
}

#[tokio::test]
async fn test_paired_device_prompt_reaches_embedded_host() {
    // Arrange
    let chat = Arc::new(ChatSurface::default());
    let server = RelayServer::start(loopback_config(), Some(chat.clone()))
        .await
        .unwrap();
    let (code, url) = server.generate_pairing_code(DeviceType::Phone).await;
    assert!(url.unwrap().to_string().ends_with(&format!("?code={}", code.code)));
    let mut phone = dial(&server).await;
    let token = pair(&mut phone, &code.code).await;

    // Act
    send(
        &mut phone,
        &ClientMessage::Prompt {
            token: Some(token),
            prompt: Some("hello".to_string()),
        },
    )
    .await;

    // Assert
    assert_eq!(recv(&mut phone).await, ServerMessage::PromptReceived);
    assert_eq!(recv(&mut phone).await, ServerMessage::PromptDelivered);
    assert_eq!(*chat.prompts.lock().unwrap(), vec!["hello".to_string()]);

    server.shutdown().await;
}

#[tokio::test]
async fn test_socket_target_receives_prompt_relay() {
    // Arrange
    let server = RelayServer::start(loopback_config(), None).await.unwrap();
    let mut extension = dial(&server).await;
    send(&mut extension, &ClientMessage::RegisterExtension).await;
    assert_eq!(recv(&mut extension).await, ServerMessage::ExtensionRegistered);

    let (code, _) = server.generate_pairing_code(DeviceType::Tablet).await;
    let mut tablet = dial(&server).await;
    let token = pair(&mut tablet, &code.code).await;

    // Act
    send(
        &mut tablet,
        &ClientMessage::Prompt {
            token: Some(token),
            prompt: Some("  draft a reply  ".to_string()),
        },
    )
    .await;

    // Assert
    assert_eq!(
        recv(&mut extension).await,
        ServerMessage::PromptRelay {
            prompt: "draft a reply".to_string(),
            source_hint: "tablet".to_string(),
        }
    );
    assert_eq!(recv(&mut tablet).await, ServerMessage::PromptReceived);
    assert_eq!(recv(&mut tablet).await, ServerMessage::PromptDelivered);

    server.shutdown().await;
}

#[tokio::test]
async fn test_prompt_without_target_fails_fast() {
    let server = RelayServer::start(loopback_config(), None).await.unwrap();
    let (code, _) = server.generate_pairing_code(DeviceType::Phone).await;
    let mut phone = dial(&server).await;
    let token = pair(&mut phone, &code.code).await;

    send(
        &mut phone,
        &ClientMessage::Prompt {
            token: Some(token),
            prompt: Some("anyone there?".to_string()),
        },
    )
    .await;

    assert_eq!(recv(&mut phone).await, ServerMessage::PromptReceived);
    assert_eq!(
        recv(&mut phone).await,
        ServerMessage::PromptFailed {
            reason: ErrorCode::NoTargetRegistered
        }
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_malformed_frame_gets_error_and_connection_stays_open() {
    // Arrange
    let server = RelayServer::start(loopback_config(), None).await.unwrap();
    let mut peer = dial(&server).await;

    // Act
    peer.send(WsMessage::Text("{not json".to_string()))
        .await
        .unwrap();
    let first = recv(&mut peer).await;
    send(&mut peer, &ClientMessage::Ping { timestamp: Some(42) }).await;
    let second = recv(&mut peer).await;

    // Assert
    assert_eq!(
        first,
        ServerMessage::Error {
            reason: ErrorCode::MalformedEnvelope
        }
    );
    assert_eq!(
        second,
        ServerMessage::Pong {
            echoed_timestamp: Some(42)
        }
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_token_survives_reconnect_via_preauth() {
    // Arrange
    let server = RelayServer::start(loopback_config(), None).await.unwrap();
    let (code, _) = server.generate_pairing_code(DeviceType::Phone).await;
    let mut first = dial(&server).await;
    let token = pair(&mut first, &code.code).await;
    first.close(None).await.unwrap();

    // Act
    let mut second = dial(&server).await;
    send(
        &mut second,
        &ClientMessage::Preauth {
            token: token.clone(),
            device_info: None,
        },
    )
    .await;
    let reply = recv(&mut second).await;

    // Assert
    match reply {
        ServerMessage::Paired {
            token: resumed,
            expires_in_seconds,
        } => {
            assert_eq!(resumed, token);
            assert!(expires_in_seconds > 86_000);
        }
        other => panic!("expected paired, got {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_open_connections() {
    // Arrange
    let server = RelayServer::start(loopback_config(), None).await.unwrap();
    let mut peer = dial(&server).await;
    send(&mut peer, &ClientMessage::Ping { timestamp: None }).await;
    recv(&mut peer).await;

    // Act
    server.shutdown().await;

    // Assert: the next thing the peer sees is a close or the end of stream.
    let next = timeout(Duration::from_secs(5), peer.next())
        .await
        .expect("timed out waiting for close");
    match next {
        None | Some(Ok(WsMessage::Close(_))) | Some(Err(_)) => {}
        Some(Ok(other)) => panic!("expected close, got {other:?}"),
    }
}
