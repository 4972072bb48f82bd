//! Runtime configuration for the relay server.
//!
//! [`ServerConfig`] is the resolved, validated set of settings the server
//! runs with.  It is built from CLI flags and the TOML file (see
//! `infrastructure::storage::config`) or taken from [`Default`] when a host
//! embeds the relay.
//!
//! Keeping it a plain struct (no environment reads, no file access) lets
//! tests construct exactly the configuration they need.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

/// All runtime settings for one relay instance.
///
/// # Example
///
/// ```rust
/// use promptlink_server::domain::ServerConfig;
///
/// let cfg = ServerConfig::default();
/// assert_eq!(cfg.preferred_ports.first(), Some(&8787));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Interface to bind.  `0.0.0.0` accepts LAN connections.
    pub bind_ip: IpAddr,

    /// Host name or IP put into join URLs.  `None` derives it from `bind_ip`
    /// (or, for a wildcard bind, from the host's LAN address).
    pub advertise_host: Option<String>,

    /// Ports tried first, in order.
    pub preferred_ports: Vec<u16>,

    /// Further port lists tried in order once every preferred port is taken.
    /// If all of them fail the OS picks a port.
    pub fallback_ports: Vec<Vec<u16>>,

    /// Period of the heartbeat sweep.  A silent peer is reclaimed after two.
    pub heartbeat_interval: Duration,

    /// Period of the token and pairing-code expiry sweep.
    pub token_sweep_interval: Duration,

    /// Advertise `wss://` instead of `ws://`.
    ///
    /// The relay itself speaks plain WebSocket; set this when a TLS proxy sits
    /// in front of it.
    pub tls: bool,
}

impl Default for ServerConfig {
    /// | Field                | Default              |
    /// |----------------------|----------------------|
    /// | bind_ip              | `0.0.0.0`            |
    /// | advertise_host       | derived              |
    /// | preferred_ports      | `8787..=8791`        |
    /// | fallback_ports       | `[[9787, 18787]]`    |
    /// | heartbeat_interval   | 30 seconds           |
    /// | token_sweep_interval | 5 minutes            |
    /// | tls                  | `false`              |
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            advertise_host: None,
            preferred_ports: (8787..=8791).collect(),
            fallback_ports: vec![vec![9787, 18787]],
            heartbeat_interval: Duration::from_secs(30),
            token_sweep_interval: Duration::from_secs(300),
            tls: false,
        }
    }
}

impl ServerConfig {
    /// Whether the advertised host has to be discovered from the network.
    pub fn needs_lan_address(&self) -> bool {
        self.advertise_host.is_none() && self.bind_ip.is_unspecified()
    }

    /// The host peers should dial.
    ///
    /// An explicit `advertise_host` wins, then a concrete bind address.  A
    /// wildcard bind is not dialable, so it is replaced by `lan_ip` (the
    /// host's outbound LAN address, see `infrastructure::lan`) and by
    /// loopback only when no LAN address is known.
    pub fn advertised_host(&self, lan_ip: Option<IpAddr>) -> String {
        if let Some(host) = &self.advertise_host {
            return host.clone();
        }
        if !self.bind_ip.is_unspecified() {
            return self.bind_ip.to_string();
        }
        match (lan_ip, self.bind_ip) {
            (Some(ip), _) => ip.to_string(),
            (None, IpAddr::V4(_)) => Ipv4Addr::LOCALHOST.to_string(),
            (None, IpAddr::V6(_)) => Ipv6Addr::LOCALHOST.to_string(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
