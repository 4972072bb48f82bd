//! Domain layer for promptlink-client: configuration, errors and events.

pub mod config;
pub mod events;

pub use config::{ClientConfig, ClientError, Role};
pub use events::{ClientEvent, SubmitOutcome};
