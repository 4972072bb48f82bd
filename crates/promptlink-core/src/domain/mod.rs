//! Domain entities for PromptLink.
//!
//! This module contains pure business logic with no infrastructure
//! dependencies: no sockets, no timers, no async runtime.
//!
//! # What lives here? (for beginners)
//!
//! The server half of the engine is three stateful managers:
//!
//! - [`pairing`] – one-time six-digit codes that expire after ten minutes.
//! - [`token`] – bearer tokens that expire exactly 24 hours after issue.
//! - [`registry`] – live connections, the single target slot, and
//!   heartbeat-based reclamation of dead sockets.
//!
//! The client half is three small pieces the client adapter drives:
//!
//! - [`reconnect`] – the connect / backoff / give-up state machine.
//! - [`offline_queue`] – the bounded FIFO for prompts typed while offline.
//! - [`liveness`] – detection of a silent server via ping timestamps.
//!
//! Time always comes from an injected [`clock::Clock`], so every expiry rule
//! is unit-tested without sleeping.

pub mod clock;
pub mod liveness;
pub mod offline_queue;
pub mod pairing;
pub mod prompt;
pub mod reconnect;
pub mod registry;
pub mod sink;
pub mod token;
pub mod types;
