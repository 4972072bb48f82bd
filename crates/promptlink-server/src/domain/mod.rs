//! Domain layer for promptlink-server: pure configuration types.
//!
//! The relay's business rules live in `promptlink-core`; the only thing the
//! server adds at this layer is how one instance is configured.

pub mod config;

pub use config::ServerConfig;
