//! promptlink-server library crate.
//!
//! Hosts the PromptLink relay: it accepts WebSocket connections from devices
//! and from a target application, and runs them through the
//! `promptlink-core` router.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Device / target (JSON over WebSocket)
//!         ↕
//! [promptlink-server]
//!   ├── domain/           ServerConfig
//!   ├── application/      RelayService (shared router handle), sweep loops
//!   ├── infrastructure/
//!   │     ├── ws_server/  Accept loop, per-connection pump (tokio-tungstenite)
//!   │     ├── port/       Preferred / fallback port selection
//!   │     └── storage/    TOML config file
//!   └── embedded          RelayServer: everything above, started from a host app
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O.
//! - `application` depends on `domain` and `promptlink-core` only.
//! - `infrastructure` depends on all other layers plus `tokio` and `tungstenite`.

/// Domain layer: pure configuration types (no I/O).
pub mod domain;

/// Application layer: the relay handle shared by every task.
pub mod application;

/// Infrastructure layer: sockets, ports and config files.
pub mod infrastructure;

pub mod embedded;

pub use application::RelayService;
pub use domain::ServerConfig;
pub use embedded::RelayServer;
