//! Shared, async-safe handle to the relay router.
//!
//! [`RelayRouter`] is synchronous and wants `&mut self`.  Every connection
//! task, both sweep loops and the embedding host need it at the same time, so
//! [`RelayService`] puts it behind one `tokio::sync::Mutex` and exposes the
//! operations they use.  Each method holds the lock for exactly one router
//! call, which keeps every compound check-then-act inside the router atomic.

use std::sync::Arc;

use tokio::sync::Mutex;

use promptlink_core::{
    ConnectUrl, ConnectionId, ConnectionSink, DeviceInfo, DeviceType, LocalTarget,
    PairingSession, PromptSink, RelayRouter, RelayStats, SweepReport, TokenSession,
};

/// Cloneable handle to the single relay router of a server instance.
#[derive(Clone)]
pub struct RelayService {
    router: Arc<Mutex<RelayRouter>>,
}

impl RelayService {
    pub fn new(router: RelayRouter) -> Self {
        Self {
            router: Arc::new(Mutex::new(router)),
        }
    }

    // ── Connection lifecycle ──────────────────────────────────────────────────

    pub async fn connect(&self, id: ConnectionId, sink: Arc<dyn ConnectionSink>) {
        self.router.lock().await.connect(id, sink);
    }

    pub async fn disconnect(&self, id: ConnectionId) {
        self.router.lock().await.disconnect(id);
    }

    pub async fn handle_frame(&self, id: ConnectionId, text: &str) {
        self.router.lock().await.handle_frame(id, text);
    }

    pub async fn mark_alive(&self, id: ConnectionId) {
        self.router.lock().await.mark_alive(id);
    }

    /// Registers an in-process target and returns its connection id.
    ///
    /// The local target occupies the target slot until a socket peer sends
    /// `register_extension`, at which point the socket peer wins.
    pub async fn attach_local_target(&self, sink: Arc<dyn PromptSink>) -> ConnectionId {
        let id = ConnectionId::new();
        let mut router = self.router.lock().await;
        router.connect(id, Arc::new(LocalTarget::new(sink)));
        router.register_target(id);
        id
    }

    // ── Sweeps ────────────────────────────────────────────────────────────────

    pub async fn sweep_heartbeats(&self) -> Vec<ConnectionId> {
        self.router.lock().await.sweep_heartbeats()
    }

    pub async fn sweep_expired(&self) -> SweepReport {
        self.router.lock().await.sweep_expired()
    }

    pub async fn close_all(&self) {
        self.router.lock().await.close_all();
    }

    // ── Host helpers ──────────────────────────────────────────────────────────

    pub async fn generate_pairing_code(
        &self,
        device_type: DeviceType,
    ) -> (PairingSession, Option<ConnectUrl>) {
        self.router.lock().await.generate_pairing_code(device_type)
    }

    pub async fn issue_token(
        &self,
        device_info: Option<DeviceInfo>,
    ) -> (TokenSession, Option<ConnectUrl>) {
        self.router.lock().await.issue_token(device_info)
    }

    pub async fn endpoint(&self) -> Option<ConnectUrl> {
        self.router.lock().await.endpoint().cloned()
    }

    pub async fn stats(&self) -> RelayStats {
        self.router.lock().await.stats()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
