//! Small value types shared by every layer: device kinds, bearer tokens and
//! connection identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form metadata a device sends about itself when pairing.
///
/// The engine stores it verbatim and never interprets it.
pub type DeviceInfo = serde_json::Value;

/// The kind of device a pairing code was generated for.
///
/// Unknown strings on the wire deserialize to [`DeviceType::Unknown`] rather
/// than failing the whole envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Phone,
    Tablet,
    Laptop,
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceType::Phone => "phone",
            DeviceType::Tablet => "tablet",
            DeviceType::Laptop => "laptop",
            DeviceType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// An opaque bearer token handed to a device after a successful pairing.
///
/// Freshly generated tokens carry 128 random bits (a v4 UUID in simple hex
/// form). Tokens received from the wire are accepted as arbitrary strings and
/// simply fail lookup if they were never issued.
///
/// `Debug` output is redacted so tokens never end up in log lines by accident.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generates a new random token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the token text, e.g. for embedding in a connect URL.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(4).collect();
        write!(f, "SessionToken({prefix}…)")
    }
}

/// Identifies one accepted socket for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocates a fresh connection id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The first group is plenty to tell connections apart in logs.
        let text = self.0.to_string();
        f.write_str(&text[..8])
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
