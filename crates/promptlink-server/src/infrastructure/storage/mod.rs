//! Persistent storage: the server's TOML configuration file.

pub mod config;
