//! # promptlink-core
//!
//! Pairing, session and relay protocol engine for PromptLink.
//!
//! This crate is shared by the relay server and the reconnecting client.  It
//! has zero dependencies on sockets, timers or an async runtime: adapters
//! feed it frames and clock readings, and it answers through the
//! [`ConnectionSink`] and [`PromptSink`] traits.
//!
//! # Architecture overview (for beginners)
//!
//! PromptLink lets a phone (or any secondary device) type short prompts that
//! appear, in near real time, in a chat surface on another machine on the
//! same network.  That other machine's application is the **target**.
//!
//! 1. The device asks for, or is shown, a six-digit **pairing code**.
//! 2. It redeems the code for a 24-hour **bearer token** (`pair`), or skips
//!    straight to a token it was handed (`preauth`).
//! 3. It sends `prompt` frames carrying the token; the relay forwards them to
//!    the one registered target.
//!
//! The crate is organised as:
//!
//! - **`protocol`** – The JSON envelopes that travel over the WebSocket, their
//!   codec, and the `ws://host:port?code=…` join-URL helper.
//!
//! - **`domain`** – Pure state: pairing codes, token sessions, the connection
//!   registry, plus the client-side reconnection state machine, offline
//!   queue and liveness monitor.
//!
//! - **`router`** – The [`RelayRouter`], which decodes inbound frames, drives
//!   the domain managers and routes prompts to the target.

pub mod domain;
pub mod protocol;
pub mod router;

// Re-export the most-used types at the crate root so callers can write
// `promptlink_core::RelayRouter` instead of the full module path.
pub use domain::clock::{unix_millis, Clock, ManualClock, SystemClock};
pub use domain::liveness::LivenessMonitor;
pub use domain::offline_queue::{OfflineQueue, Queued, DEFAULT_QUEUE_CAPACITY};
pub use domain::pairing::{
    CodeSource, PairingError, PairingSession, RandomCodeSource, ScriptedCodeSource,
    PAIRING_CODE_TTL,
};
pub use domain::prompt::{validate_prompt, PromptError, MAX_PROMPT_CHARS};
pub use domain::reconnect::{
    ConnectionState, Jitter, NoJitter, RandomJitter, ReconnectAction, ReconnectPolicy,
    ReconnectStateMachine,
};
pub use domain::sink::{ConnectionSink, Liveness, LocalTarget, PromptSink, SinkError};
pub use domain::token::{TokenSession, TOKEN_TTL};
pub use domain::types::{ConnectionId, DeviceInfo, DeviceType, SessionToken};
pub use protocol::{
    ClientMessage, ConnectUrl, ErrorCode, JoinCredential, ProtocolError, ServerEnvelope,
    ServerMessage, UrlError,
};
pub use router::{RelayRouter, RelayStats, RelayStore, SweepReport};
