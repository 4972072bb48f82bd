//! Token Session Manager: bearer tokens and their absolute 24-hour expiry.
//!
//! A token session outlives the socket that created it.  When a phone drops
//! off Wi-Fi its connection entry disappears, but the token stays valid so the
//! phone can come back with `preauth` until the 24 hours are up.
//!
//! Expiry is fixed at creation.  `last_activity` is bookkeeping only and never
//! pushes `expires_at` out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::debug;

use crate::domain::clock::Clock;
use crate::domain::types::{DeviceInfo, DeviceType, SessionToken};

/// How long a bearer token stays valid after it is bound.
pub const TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A bearer token issued to one device.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSession {
    pub token: SessionToken,
    pub device_type: DeviceType,
    pub device_info: Option<DeviceInfo>,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
    pub last_activity: SystemTime,
}

impl TokenSession {
    /// Tokens are rejected from the exact expiry instant onward.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }

    /// Whole seconds until expiry.
    pub fn remaining_secs(&self, now: SystemTime) -> u64 {
        self.expires_at
            .duration_since(now)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Owns every token session.
pub struct TokenSessionManager {
    sessions: HashMap<SessionToken, TokenSession>,
    clock: Arc<dyn Clock>,
}

impl TokenSessionManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: HashMap::new(),
            clock,
        }
    }

    /// Creates (or replaces) the session for `token`, expiring 24 hours from now.
    pub fn bind(
        &mut self,
        token: SessionToken,
        device_type: DeviceType,
        device_info: Option<DeviceInfo>,
    ) -> TokenSession {
        let now = self.clock.now();
        let session = TokenSession {
            token: token.clone(),
            device_type,
            device_info,
            created_at: now,
            expires_at: now + TOKEN_TTL,
            last_activity: now,
        };
        self.sessions.insert(token, session.clone());
        debug!(device_type = %session.device_type, "token session bound");
        session
    }

    /// Returns the session if it exists and has not expired.
    pub fn get_unexpired(&self, token: &SessionToken) -> Option<&TokenSession> {
        let now = self.clock.now();
        self.sessions.get(token).filter(|s| !s.is_expired(now))
    }

    pub fn is_unexpired(&self, token: &SessionToken) -> bool {
        self.get_unexpired(token).is_some()
    }

    /// Records use of an unexpired token.  Returns `false` if the token is
    /// unknown or expired.
    pub fn touch(&mut self, token: &SessionToken) -> bool {
        let now = self.clock.now();
        match self.sessions.get_mut(token) {
            Some(session) if !session.is_expired(now) => {
                session.last_activity = now;
                true
            }
            _ => false,
        }
    }

    /// Merges newer device metadata into an existing session.
    pub fn update_device_info(&mut self, token: &SessionToken, device_info: DeviceInfo) {
        if let Some(session) = self.sessions.get_mut(token) {
            session.device_info = Some(device_info);
        }
    }

    pub fn remove(&mut self, token: &SessionToken) -> Option<TokenSession> {
        self.sessions.remove(token)
    }

    /// Deletes every expired session and returns their tokens so the caller
    /// can unbind any connection still holding one.
    pub fn sweep_expired(&mut self) -> Vec<SessionToken> {
        let now = self.clock.now();
        let expired: Vec<SessionToken> = self
            .sessions
            .values()
            .filter(|s| s.is_expired(now))
            .map(|s| s.token.clone())
            .collect();
        for token in &expired {
            self.sessions.remove(token);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
