//! Client-side protocol state: handshake, remembered token, offline queue and
//! liveness.
//!
//! [`ClientSession`] never touches a socket.  The driver tells it what
//! happened (link opened, frame arrived, heartbeat tick, prompt submitted)
//! and sends whatever frames it hands back.  That keeps the whole handshake
//! and queueing policy testable without a network.
//!
//! # Handshake
//!
//! ```text
//! token known       ──► preauth{token}     (queue flushed right away)
//! only a code       ──► pair{code}         (queue flushed once `paired` arrives)
//! role = Target     ──► register_extension
//! ```
//!
//! After the first successful `pair` the token is remembered, so every later
//! reconnect uses `preauth` instead of the spent code.
//!
//! A prompt submitted while a `pair` is in flight waits in the queue.  Once
//! the relay has rejected the code or token, the link stays up but is no
//! longer authenticated: prompts are refused rather than queued, since
//! nothing would ever flush them.

use std::time::{Instant, SystemTime};

use tracing::{debug, warn};

use promptlink_core::{
    ClientMessage, ErrorCode, JoinCredential, LivenessMonitor, OfflineQueue, Queued,
    ServerMessage, SessionToken,
};

use crate::domain::{ClientConfig, ClientEvent, Role};

/// What to do with a submitted prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Submit {
    /// Write this frame now.
    Send(ClientMessage),
    /// The prompt was queued.
    Queued { queued: usize, dropped_oldest: bool },
    /// Connected, but with no token and no handshake in flight.
    NotAuthenticated,
}

/// What one heartbeat tick asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum Heartbeat {
    Ping(ClientMessage),
    /// A ping went unanswered for two intervals; close the link.
    Dead,
}

/// The session's reaction to one inbound frame.
#[derive(Debug, Default, PartialEq)]
pub struct Inbound {
    pub events: Vec<ClientEvent>,
    /// Prompt text for the local [`promptlink_core::PromptSink`].
    pub relay: Option<String>,
    /// The queue may now be flushed.
    pub flush: bool,
}

pub struct ClientSession {
    role: Role,
    code: Option<String>,
    token: Option<SessionToken>,
    device_info: Option<promptlink_core::DeviceInfo>,
    queue: OfflineQueue<String>,
    liveness: LivenessMonitor,
    /// A `pair` was sent and neither `paired` nor an error has come back.
    pairing: bool,
}

impl ClientSession {
    pub fn new(config: &ClientConfig) -> Self {
        let (code, token) = match &config.url.credential {
            Some(JoinCredential::Code(code)) => (Some(code.clone()), None),
            Some(JoinCredential::Token(token)) => (None, Some(token.clone())),
            None => (None, None),
        };
        Self {
            role: config.role,
            code,
            token,
            device_info: config.device_info.clone(),
            queue: OfflineQueue::new(config.queue_capacity),
            liveness: LivenessMonitor::new(config.heartbeat_interval),
            pairing: false,
        }
    }

    pub fn token(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    // ── Link lifecycle ────────────────────────────────────────────────────────

    /// Frames to send as soon as the link opens.
    pub fn on_open(&mut self) -> Vec<ClientMessage> {
        self.liveness.reset();
        let mut frames = Vec::new();

        if let Some(token) = &self.token {
            frames.push(ClientMessage::Preauth {
                token: token.clone(),
                device_info: self.device_info.clone(),
            });
        } else if let Some(code) = &self.code {
            frames.push(ClientMessage::Pair {
                code: code.clone(),
                device_info: self.device_info.clone(),
            });
            self.pairing = true;
        }

        if self.role == Role::Target {
            frames.push(ClientMessage::RegisterExtension);
        }
        frames
    }

    pub fn on_close(&mut self) {
        self.liveness.reset();
        self.pairing = false;
    }

    // ── Prompts ───────────────────────────────────────────────────────────────

    /// Decides whether `text` can go out now or must wait in the queue.
    ///
    /// A prompt is sent directly when the link is up and a token is known,
    /// and queued while offline or while a `pair` is in flight.  A connected
    /// link with neither gets [`Submit::NotAuthenticated`].
    pub fn submit(&mut self, text: String, connected: bool, now: SystemTime) -> Submit {
        if connected {
            if let Some(msg) = self.prompt_message(&text) {
                return Submit::Send(msg);
            }
            if !self.pairing {
                return Submit::NotAuthenticated;
            }
        }
        let dropped_oldest = self.queue.push(text, now).is_some();
        if dropped_oldest {
            warn!("offline queue full; dropped the oldest prompt");
        }
        Submit::Queued {
            queued: self.queue.len(),
            dropped_oldest,
        }
    }

    /// A `prompt` frame for `text` under the current token.
    pub fn prompt_message(&self, text: &str) -> Option<ClientMessage> {
        self.token.as_ref().map(|token| ClientMessage::Prompt {
            token: Some(token.clone()),
            prompt: Some(text.to_string()),
        })
    }

    /// Empties the offline queue, oldest first.  Returns nothing while no
    /// token is known.
    pub fn drain_queue(&mut self) -> Vec<Queued<String>> {
        if self.token.is_none() {
            return Vec::new();
        }
        self.queue.drain()
    }

    /// Puts back entries a flush could not send.
    pub fn requeue(&mut self, entries: Vec<Queued<String>>) {
        self.queue.requeue_front(entries);
    }

    // ── Inbound ───────────────────────────────────────────────────────────────

    pub fn on_message(&mut self, msg: ServerMessage) -> Inbound {
        let mut inbound = Inbound::default();

        match msg {
            ServerMessage::Paired {
                token,
                expires_in_seconds,
            } => {
                self.token = Some(token.clone());
                self.pairing = false;
                inbound.flush = true;
                inbound.events.push(ClientEvent::Paired {
                    token,
                    expires_in_seconds,
                });
            }
            ServerMessage::ExtensionRegistered => {
                inbound.events.push(ClientEvent::TargetRegistered);
            }
            ServerMessage::PromptReceived => inbound.events.push(ClientEvent::PromptReceived),
            ServerMessage::PromptDelivered => inbound.events.push(ClientEvent::PromptDelivered),
            ServerMessage::PromptFailed { reason } => {
                inbound.events.push(ClientEvent::PromptFailed(reason));
            }
            ServerMessage::PromptRelay {
                prompt,
                source_hint,
            } => {
                debug!(source = %source_hint, "prompt relayed to this client");
                inbound.relay = Some(prompt);
            }
            ServerMessage::Pong { echoed_timestamp } => self.liveness.on_pong(echoed_timestamp),
            ServerMessage::Error { reason } => {
                let mut auth_lost = false;
                match reason {
                    // A rejected preauth means the remembered token is dead.
                    ErrorCode::InvalidOrExpiredToken => {
                        if self.token.take().is_some() {
                            warn!("relay rejected the stored token; it has been forgotten");
                            auth_lost = true;
                        }
                    }
                    ErrorCode::CodeNotFound | ErrorCode::CodeAlreadyUsed | ErrorCode::CodeExpired => {
                        if self.pairing {
                            warn!("relay rejected the pairing code");
                            self.pairing = false;
                            auth_lost = self.token.is_none();
                        }
                    }
                    _ => {}
                }
                inbound.events.push(ClientEvent::ServerError(reason));
                if auth_lost {
                    inbound.events.push(ClientEvent::ReauthRequired);
                }
            }
            ServerMessage::PairingCodeGenerated { .. } => {
                debug!("ignoring pairing_code_generated");
            }
        }
        inbound
    }

    // ── Heartbeat ─────────────────────────────────────────────────────────────

    /// One heartbeat tick at `now`, stamping a new ping with `timestamp`.
    pub fn heartbeat(&mut self, now: Instant, timestamp: u64) -> Heartbeat {
        if self.liveness.is_dead(now) {
            return Heartbeat::Dead;
        }
        self.liveness.on_ping_sent(timestamp, now);
        Heartbeat::Ping(ClientMessage::Ping {
            timestamp: Some(timestamp),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use promptlink_core::ConnectUrl;

    use super::*;

    fn device(url: &str) -> ClientSession {
        ClientSession::new(&ClientConfig::from_url(url).unwrap())
    }

    fn paired(token: &str) -> ServerMessage {
        ServerMessage::Paired {
            token: SessionToken::from(token),
            expires_in_seconds: 86_400,
        }
    }

    #[test]
    fn test_on_open_with_code_sends_pair() {
        let mut session = device("ws://host:8787?code=482913");

        let frames = session.on_open();

        assert_eq!(
            frames,
            vec![ClientMessage::Pair {
                code: "482913".to_string(),
                device_info: None,
            }]
        );
    }

    #[test]
    fn test_on_open_with_token_sends_preauth() {
        let mut session = device("ws://host:8787?token=abc123");

        let frames = session.on_open();

        assert_eq!(
            frames,
            vec![ClientMessage::Preauth {
                token: SessionToken::from("abc123"),
                device_info: None,
            }]
        );
    }

    #[test]
    fn test_target_role_registers_extension() {
        let config =
            ClientConfig::new(ConnectUrl::new(false, "host", 8787)).with_role(Role::Target);
        let mut session = ClientSession::new(&config);

        assert_eq!(session.on_open(), vec![ClientMessage::RegisterExtension]);
    }

    #[test]
    fn test_token_is_remembered_and_used_on_reconnect() {
        // Arrange
        let mut session = device("ws://host:8787?code=482913");
        session.on_open();

        // Act
        session.on_message(paired("tok-1"));
        session.on_close();
        let frames = session.on_open();

        // Assert
        assert_eq!(
            frames,
            vec![ClientMessage::Preauth {
                token: SessionToken::from("tok-1"),
                device_info: None,
            }]
        );
    }

    #[test]
    fn test_submit_while_pairing_is_queued_even_when_connected() {
        let mut session = device("ws://host:8787?code=482913");
        session.on_open();

        let outcome = session.submit("hello".to_string(), true, SystemTime::now());

        assert_eq!(
            outcome,
            Submit::Queued {
                queued: 1,
                dropped_oldest: false
            }
        );
    }

    #[test]
    fn test_submit_with_token_while_connected_sends() {
        let mut session = device("ws://host:8787?token=abc123");

        let outcome = session.submit("hello".to_string(), true, SystemTime::now());

        assert_eq!(
            outcome,
            Submit::Send(ClientMessage::Prompt {
                token: Some(SessionToken::from("abc123")),
                prompt: Some("hello".to_string()),
            })
        );
    }

    #[test]
    fn test_queue_keeps_newest_ten_and_drains_in_order() {
        // Arrange
        let mut session = device("ws://host:8787?code=482913");
        let now = SystemTime::now();

        // Act
        let mut last = None;
        for i in 0..11 {
            last = Some(session.submit(format!("p{i}"), false, now));
        }
        session.on_message(paired("tok-1"));
        let drained: Vec<String> = session.drain_queue().into_iter().map(|q| q.item).collect();

        // Assert
        assert_eq!(
            last,
            Some(Submit::Queued {
                queued: 10,
                dropped_oldest: true
            })
        );
        let expected: Vec<String> = (1..11).map(|i| format!("p{i}")).collect();
        assert_eq!(drained, expected);
        assert_eq!(session.queued(), 0);
    }

    #[test]
    fn test_drain_queue_waits_for_token() {
        let mut session = device("ws://host:8787?code=482913");
        session.submit("hello".to_string(), false, SystemTime::now());

        assert!(session.drain_queue().is_empty());
        assert_eq!(session.queued(), 1);
    }

    #[test]
    fn test_paired_requests_flush_and_reports_event() {
        let mut session = device("ws://host:8787?code=482913");

        let inbound = session.on_message(paired("tok-1"));

        assert!(inbound.flush);
        assert_eq!(
            inbound.events,
            vec![ClientEvent::Paired {
                token: SessionToken::from("tok-1"),
                expires_in_seconds: 86_400,
            }]
        );
    }

    #[test]
    fn test_rejected_token_is_forgotten() {
        let mut session = device("ws://host:8787?token=stale");

        let inbound = session.on_message(ServerMessage::Error {
            reason: ErrorCode::InvalidOrExpiredToken,
        });

        assert_eq!(session.token(), None);
        assert_eq!(
            inbound.events,
            vec![
                ClientEvent::ServerError(ErrorCode::InvalidOrExpiredToken),
                ClientEvent::ReauthRequired,
            ]
        );
    }

    #[test]
    fn test_submit_after_rejected_token_is_refused_not_queued() {
        // Arrange
        let mut session = device("ws://host:8787?token=stale");
        session.on_open();
        session.on_message(ServerMessage::Error {
            reason: ErrorCode::InvalidOrExpiredToken,
        });

        // Act
        let outcomes: Vec<Submit> = (0..12)
            .map(|i| session.submit(format!("p{i}"), true, SystemTime::now()))
            .collect();

        // Assert
        assert!(outcomes.iter().all(|o| *o == Submit::NotAuthenticated));
        assert_eq!(session.queued(), 0);
    }

    #[test]
    fn test_rejected_code_ends_pairing() {
        // Arrange
        let mut session = device("ws://host:8787?code=482913");
        session.on_open();

        // Act
        let inbound = session.on_message(ServerMessage::Error {
            reason: ErrorCode::CodeAlreadyUsed,
        });
        let outcome = session.submit("hello".to_string(), true, SystemTime::now());

        // Assert
        assert!(inbound.events.contains(&ClientEvent::ReauthRequired));
        assert_eq!(outcome, Submit::NotAuthenticated);
    }

    #[test]
    fn test_prompt_level_error_keeps_token() {
        let mut session = device("ws://host:8787?token=abc123");

        let inbound = session.on_message(ServerMessage::Error {
            reason: ErrorCode::EmptyPrompt,
        });

        assert_eq!(session.token(), Some(&SessionToken::from("abc123")));
        assert_eq!(
            inbound.events,
            vec![ClientEvent::ServerError(ErrorCode::EmptyPrompt)]
        );
    }

    #[test]
    fn test_submit_while_offline_is_queued_without_token() {
        let mut session = device("ws://host:8787");

        let outcome = session.submit("hello".to_string(), false, SystemTime::now());

        assert!(matches!(outcome, Submit::Queued { queued: 1, .. }));
    }

    #[test]
    fn test_prompt_relay_is_handed_to_sink() {
        let mut session = device("ws://host:8787");

        let inbound = session.on_message(ServerMessage::PromptRelay {
            prompt: "hello".to_string(),
            source_hint: "phone".to_string(),
        });

        assert_eq!(inbound.relay.as_deref(), Some("hello"));
    }

    #[test]
    fn test_heartbeat_declares_dead_after_two_silent_intervals() {
        // Arrange
        let config = ClientConfig::from_url("ws://host:8787").unwrap();
        let interval = config.heartbeat_interval;
        let mut session = ClientSession::new(&config);
        let start = Instant::now();

        // Act
        let first = session.heartbeat(start, 1_000);
        let second = session.heartbeat(start + interval, 2_000);
        let third = session.heartbeat(start + interval * 2, 3_000);

        // Assert
        assert!(matches!(first, Heartbeat::Ping(_)));
        assert!(matches!(second, Heartbeat::Ping(_)));
        assert_eq!(third, Heartbeat::Dead);
    }

    #[test]
    fn test_pong_keeps_link_alive() {
        let mut session = device("ws://host:8787");
        let start = Instant::now();
        let interval = Duration::from_secs(30);

        session.heartbeat(start, 1_000);
        session.on_message(ServerMessage::Pong {
            echoed_timestamp: Some(1_000),
        });
        let next = session.heartbeat(start + interval * 3, 2_000);

        assert!(matches!(next, Heartbeat::Ping(_)));
    }
}
