//! Client configuration and error types.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use promptlink_core::{
    ConnectUrl, DeviceInfo, ProtocolError, ReconnectPolicy, UrlError, DEFAULT_QUEUE_CAPACITY,
};

/// Errors surfaced by the client adapter.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The join URL could not be parsed.
    #[error("invalid join URL: {0}")]
    InvalidUrl(#[from] UrlError),

    /// The transport could not be opened.
    #[error("failed to connect: {0}")]
    Connect(String),

    /// Opening the transport took longer than the connect timeout.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// A frame could not be encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The established transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The client's driver task has stopped.
    #[error("client is shut down")]
    Closed,
}

/// Which side of the relay this client plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// Submits prompts (a phone, tablet or laptop).
    #[default]
    Device,
    /// Receives prompts (the browser extension / target application).
    Target,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Device => f.write_str("device"),
            Role::Target => f.write_str("target"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "device" => Ok(Role::Device),
            "target" => Ok(Role::Target),
            other => Err(format!("unknown role '{other}': expected device or target")),
        }
    }
}

/// Everything a [`crate::RelayClient`] needs to run.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Where to connect, and the code or token to join with.
    pub url: ConnectUrl,
    pub role: Role,
    /// Sent along with `pair` / `preauth`.
    pub device_info: Option<DeviceInfo>,
    /// Period of the client-side ping.  A ping unanswered for two periods
    /// closes the link.
    pub heartbeat_interval: Duration,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    /// Prompts held while offline; the oldest is dropped when full.
    pub queue_capacity: usize,
}

impl ClientConfig {
    /// A device configuration with default timing.
    pub fn new(url: ConnectUrl) -> Self {
        Self {
            url,
            role: Role::Device,
            device_info: None,
            heartbeat_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Parses a join URL (`ws://host:port?code=NNNNNN` or `?token=...`).
    pub fn from_url(text: &str) -> Result<Self, ClientError> {
        Ok(Self::new(ConnectUrl::parse(text)?))
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_device_info(mut self, info: DeviceInfo) -> Self {
        self.device_info = Some(info);
        self
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
