//! Pairing Code Manager: issues and validates one-time six-digit codes.
//!
//! # Lifecycle of a code (for beginners)
//!
//! ```text
//!  generate_code ──► active ──(pair)──► consumed ──(10 min)──► swept
//!                      │
//!                      └──(10 min, never used)──► expired ──► deleted on next
//!                                                              validate / sweep
//! ```
//!
//! Each code is bound to a fresh bearer token at generation time.  When a
//! device redeems the code, the router flips it to consumed and hands the
//! token out.  Consumed codes stay in the map until their own expiry so that a
//! second attempt reports [`PairingError::AlreadyUsed`] rather than
//! [`PairingError::NotFound`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use rand::Rng;
use thiserror::Error;
use tracing::debug;

use crate::domain::clock::Clock;
use crate::domain::types::{DeviceType, SessionToken};

/// How long a pairing code stays redeemable.
pub const PAIRING_CODE_TTL: Duration = Duration::from_secs(10 * 60);

/// Reasons a pairing code fails validation.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum PairingError {
    #[error("pairing code not found")]
    NotFound,
    #[error("pairing code already used")]
    AlreadyUsed,
    #[error("pairing code expired")]
    Expired,
}

/// One issued pairing code and the token it unlocks.
#[derive(Debug, Clone, PartialEq)]
pub struct PairingSession {
    pub code: String,
    pub token: SessionToken,
    pub device_type: DeviceType,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
    /// `false` once the code has been redeemed.
    pub is_active: bool,
}

impl PairingSession {
    /// Codes are still redeemable at exactly `expires_at`.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        now > self.expires_at
    }

    /// Seconds left before expiry, rounded down.
    pub fn remaining_secs(&self, now: SystemTime) -> u64 {
        self.expires_at
            .duration_since(now)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

// ── Code sources ──────────────────────────────────────────────────────────────

/// Supplies candidate six-digit codes.
pub trait CodeSource: Send {
    fn next_code(&mut self) -> String;
}

/// Uniformly random codes from `000000` to `999999`.
#[derive(Debug, Default)]
pub struct RandomCodeSource;

impl CodeSource for RandomCodeSource {
    fn next_code(&mut self) -> String {
        let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
        format!("{n:06}")
    }
}

/// Hands out a fixed list of codes, then falls back to random ones.
///
/// Lets tests and demos pin the code a device will see.
#[derive(Debug, Default)]
pub struct ScriptedCodeSource {
    script: VecDeque<String>,
}

impl ScriptedCodeSource {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: codes.into_iter().map(Into::into).collect(),
        }
    }
}

impl CodeSource for ScriptedCodeSource {
    fn next_code(&mut self) -> String {
        self.script
            .pop_front()
            .unwrap_or_else(|| RandomCodeSource.next_code())
    }
}

// ── PairingCodeManager ────────────────────────────────────────────────────────

/// Owns every outstanding pairing code.
pub struct PairingCodeManager {
    sessions: HashMap<String, PairingSession>,
    codes: Box<dyn CodeSource>,
    clock: Arc<dyn Clock>,
}

impl PairingCodeManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_code_source(clock, Box::new(RandomCodeSource))
    }

    pub fn with_code_source(clock: Arc<dyn Clock>, codes: Box<dyn CodeSource>) -> Self {
        Self {
            sessions: HashMap::new(),
            codes,
            clock,
        }
    }

    /// Issues a new code bound to a freshly generated token.
    ///
    /// A candidate that collides with a stored, unexpired code (consumed or
    /// not) is discarded and another is drawn.  A collision with an expired
    /// code simply overwrites it.
    pub fn generate_code(&mut self, device_type: DeviceType) -> PairingSession {
        let now = self.clock.now();
        let code = loop {
            let candidate = self.codes.next_code();
            match self.sessions.get(&candidate) {
                Some(existing) if !existing.is_expired(now) => {
                    debug!("pairing code collision, drawing again");
                }
                _ => break candidate,
            }
        };

        let session = PairingSession {
            code: code.clone(),
            token: SessionToken::generate(),
            device_type,
            created_at: now,
            expires_at: now + PAIRING_CODE_TTL,
            is_active: true,
        };
        self.sessions.insert(code, session.clone());
        debug!(%device_type, "pairing code issued");
        session
    }

    /// Checks `code` without consuming it.
    ///
    /// Checks run in order: unknown code, already consumed, expired.  An
    /// expired code is deleted before the error is returned.
    pub fn validate(&mut self, code: &str) -> Result<PairingSession, PairingError> {
        let now = self.clock.now();
        let session = self.sessions.get(code).ok_or(PairingError::NotFound)?;

        if !session.is_active {
            return Err(PairingError::AlreadyUsed);
        }
        if session.is_expired(now) {
            self.sessions.remove(code);
            debug!("expired pairing code removed on validation");
            return Err(PairingError::Expired);
        }
        Ok(session.clone())
    }

    /// Flips a code to consumed.  Returns `false` if the code is unknown.
    pub fn mark_consumed(&mut self, code: &str) -> bool {
        match self.sessions.get_mut(code) {
            Some(session) => {
                session.is_active = false;
                true
            }
            None => false,
        }
    }

    /// Drops every code past its expiry, consumed or not.
    ///
    /// Returns how many were removed.
    pub fn sweep_expired(&mut self) -> usize {
        let now = self.clock.now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired(now));
        before - self.sessions.len()
    }

    /// Number of codes that could still be redeemed.
    pub fn pending_count(&self) -> usize {
        let now = self.clock.now();
        self.sessions
            .values()
            .filter(|s| s.is_active && !s.is_expired(now))
            .count()
    }

    /// Number of stored codes, including consumed ones awaiting sweep.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
