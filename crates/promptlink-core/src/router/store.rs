//! The single owned store behind the router.
//!
//! [`RelayStore`] bundles the three managers and exposes only the compound
//! operations the router needs.  Each compound operation (e.g. "consume code,
//! bind token, bind connection") runs under one `&mut self` borrow, so as
//! long as the store sits behind one lock the check-then-act sequences cannot
//! interleave across connections.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::domain::clock::Clock;
use crate::domain::pairing::{CodeSource, PairingCodeManager, PairingError, PairingSession};
use crate::domain::registry::{ConnectionEntry, ConnectionRegistry};
use crate::domain::sink::ConnectionSink;
use crate::domain::token::{TokenSession, TokenSessionManager};
use crate::domain::types::{ConnectionId, DeviceInfo, DeviceType, SessionToken};

/// A snapshot of the store's size, for logs and host UIs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStats {
    pub connections: usize,
    pub authenticated: usize,
    pub has_target: bool,
    pub pending_codes: usize,
    pub token_sessions: usize,
}

/// What one expiry sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_tokens: usize,
    pub expired_codes: usize,
}

/// Pairing codes, token sessions and connections under one owner.
pub struct RelayStore {
    clock: Arc<dyn Clock>,
    pairing: PairingCodeManager,
    tokens: TokenSessionManager,
    connections: ConnectionRegistry,
}

impl RelayStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            pairing: PairingCodeManager::new(clock.clone()),
            tokens: TokenSessionManager::new(clock.clone()),
            connections: ConnectionRegistry::new(),
            clock,
        }
    }

    /// Like [`RelayStore::new`] but with a custom pairing-code source.
    pub fn with_code_source(clock: Arc<dyn Clock>, codes: Box<dyn CodeSource>) -> Self {
        Self {
            pairing: PairingCodeManager::with_code_source(clock.clone(), codes),
            tokens: TokenSessionManager::new(clock.clone()),
            connections: ConnectionRegistry::new(),
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ── Connections ───────────────────────────────────────────────────────────

    pub fn add_connection(&mut self, id: ConnectionId, sink: Arc<dyn ConnectionSink>) {
        let now = self.clock.now();
        self.connections.insert(id, sink, now);
    }

    /// Drops a connection.  Its token session survives for reconnection.
    pub fn remove_connection(&mut self, id: ConnectionId) -> Option<ConnectionEntry> {
        self.connections.remove(id)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&ConnectionEntry> {
        self.connections.get(id)
    }

    pub fn mark_alive(&mut self, id: ConnectionId) {
        self.connections.mark_alive(id);
    }

    pub fn heartbeat_sweep(&mut self) -> Vec<ConnectionId> {
        self.connections.heartbeat_sweep()
    }

    /// Closes every connection (shutdown).  Token sessions are kept.
    pub fn close_all_connections(&mut self) -> usize {
        self.connections.close_all()
    }

    pub fn register_target(&mut self, id: ConnectionId) -> Option<ConnectionId> {
        self.connections.register_target(id)
    }

    pub fn lookup_target(&self) -> Option<&ConnectionEntry> {
        self.connections.lookup_target()
    }

    // ── Pairing & tokens ──────────────────────────────────────────────────────

    pub fn generate_code(&mut self, device_type: DeviceType) -> PairingSession {
        self.pairing.generate_code(device_type)
    }

    /// Redeems `code` on behalf of connection `id`.
    ///
    /// On success the code is consumed, its token session is created and the
    /// connection is bound to the token.  On failure nothing changes except
    /// that an expired code is deleted.
    pub fn commit_pairing(
        &mut self,
        id: ConnectionId,
        code: &str,
        device_info: Option<DeviceInfo>,
    ) -> Result<TokenSession, PairingError> {
        let pairing = self.pairing.validate(code)?;
        self.pairing.mark_consumed(code);

        let session = self
            .tokens
            .bind(pairing.token.clone(), pairing.device_type, device_info);
        self.connections.bind_token(id, pairing.token);
        info!(conn = %id, device_type = %session.device_type, "device paired");
        Ok(session)
    }

    /// Re-attaches an unexpired token to connection `id`.
    ///
    /// Returns `None` if the token is unknown or expired.
    pub fn preauth(
        &mut self,
        id: ConnectionId,
        token: &SessionToken,
        device_info: Option<DeviceInfo>,
    ) -> Option<TokenSession> {
        if !self.tokens.touch(token) {
            return None;
        }
        if let Some(info) = device_info {
            self.tokens.update_device_info(token, info);
        }
        self.connections.bind_token(id, token.clone());
        info!(conn = %id, "device re-authenticated");
        self.tokens.get_unexpired(token).cloned()
    }

    /// Creates a token session without a pairing code, for hosts that hand
    /// a token to a device out of band (e.g. inside a QR code).
    pub fn issue_token(&mut self, device_info: Option<DeviceInfo>) -> TokenSession {
        self.tokens
            .bind(SessionToken::generate(), DeviceType::Unknown, device_info)
    }

    /// The session behind `token` if it is unexpired and held by `id`.
    /// Read-only: `last_activity` is left as it is.
    pub fn session_held_by(&self, id: ConnectionId, token: &SessionToken) -> Option<&TokenSession> {
        if !self.connections.is_bound_to(token, id) {
            return None;
        }
        self.tokens.get_unexpired(token)
    }

    /// The full validity check for a token presented by connection `id`:
    /// the session exists, has not expired, and `id` is the connection
    /// currently holding it.  Refreshes `last_activity` on success.
    pub fn authorize(&mut self, id: ConnectionId, token: &SessionToken) -> Option<TokenSession> {
        if !self.connections.is_bound_to(token, id) {
            return None;
        }
        if !self.tokens.touch(token) {
            return None;
        }
        self.tokens.get_unexpired(token).cloned()
    }

    /// Deletes expired token sessions (unbinding their connections) and
    /// expired pairing codes.
    pub fn sweep_expired(&mut self) -> SweepReport {
        let expired = self.tokens.sweep_expired();
        for token in &expired {
            self.connections.unbind_token(token);
        }
        let expired_codes = self.pairing.sweep_expired();
        SweepReport {
            expired_tokens: expired.len(),
            expired_codes,
        }
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            connections: self.connections.len(),
            authenticated: self.connections.authenticated_count(),
            has_target: self.connections.has_target(),
            pending_codes: self.pairing.pending_count(),
            token_sessions: self.tokens.len(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
