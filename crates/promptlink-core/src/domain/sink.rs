//! Outbound seams: where the engine hands bytes and prompts to the outside.
//!
//! # Why traits here? (for beginners)
//!
//! The router must "send a frame to connection X", but the core crate has no
//! sockets.  [`ConnectionSink`] is the abstraction it talks to: the server
//! implements it over a tokio channel feeding a WebSocket writer, tests
//! implement it with a `Vec` that records every envelope, and the embedded
//! host implements it with a direct function call ([`LocalTarget`]).

use std::sync::Arc;

use thiserror::Error;

use crate::protocol::messages::{ServerEnvelope, ServerMessage};

/// Why a frame could not be handed to a connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("connection closed")]
    Closed,
    /// The envelope could not be turned into a wire frame.
    #[error("failed to encode frame: {0}")]
    Encode(String),
}

/// What a liveness probe achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// A probe was sent; the peer must answer before the next sweep.
    Pending,
    /// The sink is known alive without waiting (in-process targets).
    Confirmed,
}

/// The write half of one connection, as seen by the router.
///
/// Every method must return promptly: the router calls them while it holds
/// exclusive access to its maps.
#[cfg_attr(test, mockall::automock)]
pub trait ConnectionSink: Send + Sync {
    /// Queues one envelope for the peer.
    fn send(&self, envelope: &ServerEnvelope) -> Result<(), SinkError>;

    /// Sends a transport-level liveness probe.
    fn probe(&self) -> Result<Liveness, SinkError>;

    /// Asks the transport to close the connection.
    fn close(&self);
}

/// The target application's "deliver text" entry point.
///
/// Fire-and-forget: the engine never waits for, or inspects, the outcome.
pub trait PromptSink: Send + Sync {
    fn deliver_prompt(&self, text: &str);
}

/// Adapts a [`PromptSink`] so an in-process host can sit in the target slot.
///
/// Only `prompt_relay` frames mean anything to it; everything else sent to the
/// target (e.g. `extension_registered`) is dropped.
pub struct LocalTarget {
    sink: Arc<dyn PromptSink>,
}

impl LocalTarget {
    pub fn new(sink: Arc<dyn PromptSink>) -> Self {
        Self { sink }
    }
}

impl ConnectionSink for LocalTarget {
    fn send(&self, envelope: &ServerEnvelope) -> Result<(), SinkError> {
        if let ServerMessage::PromptRelay { prompt, .. } = &envelope.body {
            self.sink.deliver_prompt(prompt);
        }
        Ok(())
    }

    fn probe(&self) -> Result<Liveness, SinkError> {
        Ok(Liveness::Confirmed)
    }

    fn close(&self) {}
}

// ── Tests ─────────────────────────────────────────────────────────────────────
