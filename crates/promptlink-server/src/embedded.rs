//! Embeddable relay: start a full server from inside a host application.
//!
//! A desktop app that wants phones to type into it creates a [`RelayServer`]
//! with its own [`PromptSink`].  The sink is attached as an in-process target,
//! so prompts arrive as plain function calls while the app still exposes the
//! normal WebSocket endpoint for devices (and for a browser extension that
//! may later take over the target slot).
//!
//! ```no_run
//! use std::sync::Arc;
//! use promptlink_core::{DeviceType, PromptSink};
//! use promptlink_server::{RelayServer, ServerConfig};
//!
//! struct Chat;
//! impl PromptSink for Chat {
//!     fn deliver_prompt(&self, text: &str) {
//!         println!("prompt: {text}");
//!     }
//! }
//!
//! # async fn run() -> anyhow::Result<()> {
//! let server = RelayServer::start(ServerConfig::default(), Some(Arc::new(Chat))).await?;
//! let (code, url) = server.generate_pairing_code(DeviceType::Phone).await;
//! println!("pair with {} or open {:?}", code.code, url.map(|u| u.to_string()));
//! server.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

use promptlink_core::{
    ConnectUrl, DeviceInfo, DeviceType, PairingSession, PromptSink, RelayRouter, RelayStats,
    RelayStore, SystemClock, TokenSession,
};

use crate::application::{run_expiry_loop, run_heartbeat_loop, RelayService};
use crate::domain::ServerConfig;
use crate::infrastructure::lan;
use crate::infrastructure::port::bind_available;
use crate::infrastructure::ws_server::run_server;

/// A running relay: listener, accept loop and both sweeps.
pub struct RelayServer {
    service: RelayService,
    local_addr: SocketAddr,
    endpoint: ConnectUrl,
    running: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RelayServer {
    /// Binds a port, builds the relay and spawns its tasks.
    ///
    /// When `local_target` is given it is registered as the initial target.
    ///
    /// # Errors
    ///
    /// Fails if no port can be bound or the listener cannot be handed to tokio.
    pub async fn start(
        config: ServerConfig,
        local_target: Option<Arc<dyn PromptSink>>,
    ) -> anyhow::Result<Self> {
        let std_listener = bind_available(
            config.bind_ip,
            &config.preferred_ports,
            &config.fallback_ports,
        )?;
        std_listener
            .set_nonblocking(true)
            .context("failed to make listener non-blocking")?;
        let listener =
            TcpListener::from_std(std_listener).context("failed to register listener with tokio")?;
        let local_addr = listener
            .local_addr()
            .context("failed to read bound address")?;

        let endpoint = ConnectUrl::new(config.tls, lan::advertised_host(&config), local_addr.port());
        let router = RelayRouter::new(RelayStore::new(Arc::new(SystemClock)))
            .with_endpoint(endpoint.clone());
        let service = RelayService::new(router);

        if let Some(sink) = local_target {
            let id = service.attach_local_target(sink).await;
            info!(conn = %id, "in-process target attached");
        }

        let running = Arc::new(AtomicBool::new(true));
        let tasks = vec![
            tokio::spawn(run_server(listener, service.clone(), Arc::clone(&running))),
            tokio::spawn(run_heartbeat_loop(service.clone(), config.heartbeat_interval)),
            tokio::spawn(run_expiry_loop(service.clone(), config.token_sweep_interval)),
        ];

        info!(endpoint = %endpoint, "relay started");
        Ok(Self {
            service,
            local_addr,
            endpoint,
            running,
            tasks,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The advertised socket URL, without a credential.
    pub fn endpoint(&self) -> &ConnectUrl {
        &self.endpoint
    }

    pub fn service(&self) -> &RelayService {
        &self.service
    }

    pub async fn generate_pairing_code(
        &self,
        device_type: DeviceType,
    ) -> (PairingSession, Option<ConnectUrl>) {
        self.service.generate_pairing_code(device_type).await
    }

    pub async fn issue_token(
        &self,
        device_info: Option<DeviceInfo>,
    ) -> (TokenSession, Option<ConnectUrl>) {
        self.service.issue_token(device_info).await
    }

    pub async fn stats(&self) -> RelayStats {
        self.service.stats().await
    }

    /// Whether the accept loop has not yet been told to stop.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stops accepting, closes every connection and stops both sweeps.
    pub async fn shutdown(mut self) {
        self.running.store(false, Ordering::Relaxed);
        self.service.close_all().await;
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("relay stopped");
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        for task in &self.tasks {
            task.abort();
        }
    }
}
