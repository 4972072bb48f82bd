//! promptlink-client library crate.
//!
//! The peer side of PromptLink.  A device (phone, tablet, laptop) uses it to
//! pair with a relay and submit prompts; the target application uses it to
//! register for and receive relayed prompts.  Either way the link survives
//! network drops: prompts submitted while offline wait in a bounded queue and
//! reconnects back off exponentially.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Host UI ──submit_prompt / reconnect──► RelayClient ──ClientEvent──► Host UI
//!                                           │
//! [promptlink-client]
//!   ├── domain/           ClientConfig, Role, ClientError, ClientEvent
//!   ├── application/      ClientSession: handshake, token, queue, liveness
//!   └── infrastructure/
//!         ├── transport/     Connector / Link seam, WebSocket implementation
//!         └── relay_client/  Driver task: reconnect loop, heartbeat, flush
//! ```
//!
//! # Example
//!
//! ```no_run
//! use promptlink_client::{ClientConfig, RelayClient};
//!
//! # async fn demo() -> Result<(), promptlink_client::ClientError> {
//! let config = ClientConfig::from_url("ws://192.168.1.20:8787?code=482913")?;
//! let (client, mut events) = RelayClient::connect(config, None);
//! client.submit_prompt("summarise this page").await?;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

/// Domain layer: configuration, errors and events (no I/O).
pub mod domain;

/// Application layer: protocol session state.
pub mod application;

/// Infrastructure layer: transport and driver task.
pub mod infrastructure;

pub use domain::{ClientConfig, ClientError, ClientEvent, Role, SubmitOutcome};
pub use infrastructure::relay_client::RelayClient;
pub use infrastructure::transport::{Connector, Link, WsConnector};
