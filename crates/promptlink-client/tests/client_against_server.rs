//! End-to-end: `RelayClient` instances talking to a real `RelayServer` on a
//! loopback port.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use tokio_test::assert_ok;

use promptlink_client::{ClientConfig, ClientEvent, RelayClient, Role};
use promptlink_core::{ConnectionState, DeviceType, PromptSink};
use promptlink_server::{RelayServer, ServerConfig};

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

/// Reads events until `wanted` matches one, failing after five seconds.
async fn wait_for(
    events: &mut UnboundedReceiver<ClientEvent>,
    wanted: impl Fn(&ClientEvent) -> bool,
) -> ClientEvent {
    timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn test_device_pairs_by_code_and_prompt_reaches_host() {
    // Arrange
    let chat = Arc::new(ChatSurface::default());
    let server = RelayServer::start(loopback_config(), Some(chat.clone()))
        .await
        .unwrap();
    let (_, url) = server.generate_pairing_code(DeviceType::Tablet).await;
    let (client, mut events) = RelayClient::connect(ClientConfig::new(url.unwrap()), None);

    // Act
    assert_ok!(client.submit_prompt("hello").await);

    // Assert
    wait_for(&mut events, |e| matches!(e, ClientEvent::Paired { .. })).await;
    wait_for(&mut events, |e| *e == ClientEvent::PromptDelivered).await;
    assert_eq!(*chat.prompts.lock().unwrap(), vec!["hello".to_string()]);

    client.shutdown().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_target_client_receives_prompt_from_token_device() {
    // Arrange
    let server = RelayServer::start(loopback_config(), None).await.unwrap();
    let surface = Arc::new(ChatSurface::default());
    let target_config =
        ClientConfig::new(server.endpoint().clone()).with_role(Role::Target);
    let (target, mut target_events) = RelayClient::connect(target_config, Some(surface.clone()));
    wait_for(&mut target_events, |e| *e == ClientEvent::TargetRegistered).await;

    let (_, token_url) = server.issue_token(None).await;
    let (device, mut device_events) =
        RelayClient::connect(ClientConfig::new(token_url.unwrap()), None);

    // Act
    assert_ok!(device.submit_prompt("  summarise this  ").await);

    // Assert
    wait_for(&mut device_events, |e| *e == ClientEvent::PromptDelivered).await;
    let delivered = timeout(Duration::from_secs(5), async {
        while surface.prompts.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(delivered.is_ok());
    assert_eq!(
        *surface.prompts.lock().unwrap(),
        vec!["summarise this".to_string()]
    );

    device.shutdown().await;
    target.shutdown().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_server_shutdown_schedules_reconnect() {
    // Arrange
    let server = RelayServer::start(loopback_config(), None).await.unwrap();
    let (_, token_url) = server.issue_token(None).await;
    let (client, mut events) = RelayClient::connect(ClientConfig::new(token_url.unwrap()), None);
    wait_for(&mut events, |e| {
        *e == ClientEvent::StateChanged(ConnectionState::Connected)
    })
    .await;

    // Act
    server.shutdown().await;

    // Assert
    let event = wait_for(&mut events, |e| {
        matches!(e, ClientEvent::ReconnectScheduled { .. })
    })
    .await;
    assert!(matches!(
        event,
        ClientEvent::ReconnectScheduled { attempt: 1, .. }
    ));

    client.shutdown().await;
}
