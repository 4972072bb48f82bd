//! Relay Router: inbound frame dispatch and prompt relay.
//!
//! # Dispatch (for beginners)
//!
//! Every text frame from a connection goes through [`RelayRouter::handle_frame`]:
//!
//! ```text
//!  text ──► decode ──► match type ──► RelayStore operation ──► reply(s) via sinks
//!             │
//!             └─ bad JSON / unknown type ──► error{MalformedEnvelope}
//! ```
//!
//! Replies go out through the sender's own [`ConnectionSink`]; a relayed
//! prompt goes out through the target's sink.  No error ever closes the
//! sender's connection.
//!
//! Delivery is at-most-once and optimistic: `prompt_delivered` means "handed
//! to the target's socket", not "processed by the target".

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::pairing::{PairingError, PairingSession, PAIRING_CODE_TTL};
use crate::domain::prompt::{validate_prompt, PromptError};
use crate::domain::sink::ConnectionSink;
use crate::domain::token::TokenSession;
use crate::domain::types::{ConnectionId, DeviceInfo, DeviceType, SessionToken};
use crate::protocol::codec::{decode_client_message, ProtocolError};
use crate::protocol::connect_url::ConnectUrl;
use crate::protocol::messages::{ClientMessage, ErrorCode, ServerEnvelope, ServerMessage};
use crate::router::store::{RelayStats, RelayStore, SweepReport};

impl From<PairingError> for ErrorCode {
    fn from(err: PairingError) -> Self {
        match err {
            PairingError::NotFound => ErrorCode::CodeNotFound,
            PairingError::AlreadyUsed => ErrorCode::CodeAlreadyUsed,
            PairingError::Expired => ErrorCode::CodeExpired,
        }
    }
}

impl From<PromptError> for ErrorCode {
    fn from(err: PromptError) -> Self {
        match err {
            PromptError::Empty => ErrorCode::EmptyPrompt,
            PromptError::TooLong(_) => ErrorCode::PromptTooLong,
        }
    }
}

/// The message-dispatch core.
pub struct RelayRouter {
    store: RelayStore,
    /// Where peers reach this relay; used to build join URLs.
    endpoint: Option<ConnectUrl>,
}

impl RelayRouter {
    pub fn new(store: RelayStore) -> Self {
        Self {
            store,
            endpoint: None,
        }
    }

    /// Sets the advertised endpoint so code and token replies carry a join URL.
    pub fn with_endpoint(mut self, endpoint: ConnectUrl) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn endpoint(&self) -> Option<&ConnectUrl> {
        self.endpoint.as_ref()
    }

    pub fn store(&self) -> &RelayStore {
        &self.store
    }

    // ── Connection lifecycle ──────────────────────────────────────────────────

    /// Registers a freshly accepted connection.
    pub fn connect(&mut self, id: ConnectionId, sink: Arc<dyn ConnectionSink>) {
        self.store.add_connection(id, sink);
        debug!(conn = %id, "connection added");
    }

    /// Forgets a closed connection.  Its token stays valid for reconnection;
    /// if it was the target, the target slot empties.
    pub fn disconnect(&mut self, id: ConnectionId) {
        if let Some(entry) = self.store.remove_connection(id) {
            debug!(conn = %id, was_target = entry.is_target, "connection removed");
        }
    }

    /// Records a transport-level sign of life (e.g. a WebSocket pong).
    pub fn mark_alive(&mut self, id: ConnectionId) {
        self.store.mark_alive(id);
    }

    /// One heartbeat tick.  Returns the reclaimed connections.
    pub fn sweep_heartbeats(&mut self) -> Vec<ConnectionId> {
        self.store.heartbeat_sweep()
    }

    /// One expiry tick for tokens and pairing codes.
    pub fn sweep_expired(&mut self) -> SweepReport {
        let report = self.store.sweep_expired();
        if report.expired_tokens > 0 || report.expired_codes > 0 {
            info!(
                tokens = report.expired_tokens,
                codes = report.expired_codes,
                "expired sessions swept"
            );
        }
        report
    }

    /// Closes every connection, e.g. on shutdown.
    pub fn close_all(&mut self) {
        let closed = self.store.close_all_connections();
        info!(closed, "all connections closed");
    }

    pub fn stats(&self) -> RelayStats {
        self.store.stats()
    }

    // ── Host-side helpers ─────────────────────────────────────────────────────

    /// Issues a pairing code directly, e.g. for a host to show at startup.
    pub fn generate_pairing_code(
        &mut self,
        device_type: DeviceType,
    ) -> (PairingSession, Option<ConnectUrl>) {
        let session = self.store.generate_code(device_type);
        let url = self.code_url(&session.code);
        (session, url)
    }

    /// Issues a token without a pairing code, for the `?token=` fast path.
    pub fn issue_token(
        &mut self,
        device_info: Option<DeviceInfo>,
    ) -> (TokenSession, Option<ConnectUrl>) {
        let session = self.store.issue_token(device_info);
        let url = self
            .endpoint
            .clone()
            .map(|endpoint| endpoint.with_token(session.token.clone()));
        (session, url)
    }

    /// Puts a connection in the target slot without a `register_extension`
    /// frame (used for an in-process target).
    pub fn register_target(&mut self, id: ConnectionId) {
        self.store.register_target(id);
    }

    fn code_url(&self, code: &str) -> Option<ConnectUrl> {
        self.endpoint
            .clone()
            .and_then(|endpoint| endpoint.with_code(code).ok())
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    /// Handles one inbound text frame from connection `id`.
    ///
    /// Any frame at all counts as a sign of life for the heartbeat.
    pub fn handle_frame(&mut self, id: ConnectionId, text: &str) {
        self.store.mark_alive(id);

        match decode_client_message(text) {
            Ok(msg) => self.handle_message(id, msg),
            Err(err) => {
                match &err {
                    ProtocolError::UnknownType(name) => {
                        warn!(conn = %id, msg_type = %name, "unknown message type")
                    }
                    other => warn!(conn = %id, error = %other, "malformed frame"),
                }
                self.reply(
                    id,
                    ServerMessage::Error {
                        reason: ErrorCode::MalformedEnvelope,
                    },
                );
            }
        }
    }

    /// Handles one already-decoded message from connection `id`.
    pub fn handle_message(&mut self, id: ConnectionId, msg: ClientMessage) {
        debug!(conn = %id, msg_type = msg.type_name(), "inbound message");

        match msg {
            ClientMessage::GeneratePairingCode { device_type } => {
                let (session, url) = self.generate_pairing_code(device_type);
                self.reply(
                    id,
                    ServerMessage::PairingCodeGenerated {
                        code: session.code,
                        expires_in_seconds: PAIRING_CODE_TTL.as_secs(),
                        connect_url: url.map(|u| u.to_string()),
                    },
                );
            }

            ClientMessage::Pair { code, device_info } => {
                let reply = match self.store.commit_pairing(id, &code, device_info) {
                    Ok(session) => self.paired(&session),
                    Err(err) => {
                        debug!(conn = %id, error = %err, "pairing rejected");
                        ServerMessage::Error { reason: err.into() }
                    }
                };
                self.reply(id, reply);
            }

            ClientMessage::Preauth { token, device_info } => {
                let reply = match self.store.preauth(id, &token, device_info) {
                    Some(session) => self.paired(&session),
                    None => ServerMessage::Error {
                        reason: ErrorCode::InvalidOrExpiredToken,
                    },
                };
                self.reply(id, reply);
            }

            ClientMessage::Prompt { token, prompt } => self.relay_prompt(id, token, prompt),

            ClientMessage::RegisterExtension => {
                self.store.register_target(id);
                self.reply(id, ServerMessage::ExtensionRegistered);
            }

            ClientMessage::Ping { timestamp } => {
                self.reply(
                    id,
                    ServerMessage::Pong {
                        echoed_timestamp: timestamp,
                    },
                );
            }
        }
    }

    fn paired(&self, session: &TokenSession) -> ServerMessage {
        ServerMessage::Paired {
            token: session.token.clone(),
            expires_in_seconds: session.remaining_secs(self.store.clock().now()),
        }
    }

    fn relay_prompt(
        &mut self,
        id: ConnectionId,
        token: Option<SessionToken>,
        prompt: Option<String>,
    ) {
        let Some(token) = token.filter(|t| self.store.session_held_by(id, t).is_some()) else {
            self.reply_error(id, ErrorCode::InvalidOrExpiredToken);
            return;
        };

        // Only an accepted prompt counts as activity on the token.
        let raw = prompt.unwrap_or_default();
        let text = match validate_prompt(&raw) {
            Ok(text) => text.to_string(),
            Err(err) => {
                self.reply_error(id, err.into());
                return;
            }
        };

        let Some(session) = self.store.authorize(id, &token) else {
            self.reply_error(id, ErrorCode::InvalidOrExpiredToken);
            return;
        };

        self.reply(id, ServerMessage::PromptReceived);

        let Some(target) = self.store.lookup_target() else {
            info!(conn = %id, "prompt dropped: no target registered");
            self.reply(
                id,
                ServerMessage::PromptFailed {
                    reason: ErrorCode::NoTargetRegistered,
                },
            );
            return;
        };

        let target_id = target.id;
        let relay = ServerEnvelope::new(
            ServerMessage::PromptRelay {
                prompt: text,
                source_hint: session.device_type.to_string(),
            },
            self.store.clock().now_millis(),
        );

        match target.sink.send(&relay) {
            Ok(()) => {
                debug!(from = %id, to = %target_id, "prompt relayed");
                self.reply(id, ServerMessage::PromptDelivered);
            }
            Err(err) => {
                warn!(target_conn = %target_id, error = %err, "target unreachable, removing it");
                self.store.remove_connection(target_id);
                self.reply(
                    id,
                    ServerMessage::PromptFailed {
                        reason: ErrorCode::TargetUnreachable,
                    },
                );
            }
        }
    }

    fn reply_error(&self, id: ConnectionId, reason: ErrorCode) {
        self.reply(id, ServerMessage::Error { reason });
    }

    fn reply(&self, id: ConnectionId, body: ServerMessage) {
        let Some(entry) = self.store.connection(id) else {
            debug!(conn = %id, msg_type = body.type_name(), "reply to unknown connection dropped");
            return;
        };
        let envelope = ServerEnvelope::new(body, self.store.clock().now_millis());
        if let Err(err) = entry.sink.send(&envelope) {
            debug!(conn = %id, error = %err, "reply not sent");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
