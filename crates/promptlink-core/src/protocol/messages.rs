//! JSON envelope types for the PromptLink wire protocol.
//!
//! Every frame in either direction is a flat JSON object whose `"type"` field
//! names the variant; the remaining fields sit alongside it:
//!
//! ```json
//! {"type":"pair","code":"482913","deviceInfo":{"model":"Pixel"}}
//! {"type":"prompt","token":"9f2c…","prompt":"summarise this page"}
//! ```
//!
//! Server frames additionally carry `success`, a human-readable `message` and
//! a millisecond `timestamp` (see [`ServerEnvelope`]).  Those three fields are
//! decoration: a peer that only looks at `type` and the typed fields still
//! speaks the protocol.
//!
//! # Why two enums?
//!
//! Inbound and outbound frames carry different information.  Keeping
//! [`ClientMessage`] and [`ServerMessage`] apart makes it a compile-time error
//! to send a client-only frame from the server or vice versa.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::types::{DeviceInfo, DeviceType, SessionToken};

// ── Error taxonomy ────────────────────────────────────────────────────────────

/// Machine-distinguishable reason attached to every `error` and
/// `prompt_failed` frame.
///
/// None of these close the connection; the peer can keep using it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// No pairing session exists for the submitted code.
    CodeNotFound,
    /// The code was already consumed by an earlier `pair`.
    CodeAlreadyUsed,
    /// The code outlived its ten-minute window.
    CodeExpired,
    /// The token is unknown, expired, or not bound to this connection.
    InvalidOrExpiredToken,
    /// The prompt was empty or whitespace only.
    EmptyPrompt,
    /// The prompt exceeded the maximum length after trimming.
    PromptTooLong,
    /// No connection has registered as the target.
    NoTargetRegistered,
    /// A target is registered but its socket refused the hand-off.
    TargetUnreachable,
    /// The frame was not valid JSON, lacked a `type`, or named an unknown type.
    MalformedEnvelope,
}

impl ErrorCode {
    /// A short human-readable description, used for the `message` field.
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::CodeNotFound => "Pairing code not found",
            ErrorCode::CodeAlreadyUsed => "Pairing code has already been used",
            ErrorCode::CodeExpired => "Pairing code has expired",
            ErrorCode::InvalidOrExpiredToken => "Invalid or expired token",
            ErrorCode::EmptyPrompt => "Prompt is empty",
            ErrorCode::PromptTooLong => "Prompt is too long",
            ErrorCode::NoTargetRegistered => "No target application is connected",
            ErrorCode::TargetUnreachable => "Target application could not be reached",
            ErrorCode::MalformedEnvelope => "Malformed message",
        }
    }
}

// ── Client → Server ───────────────────────────────────────────────────────────

/// Every frame a peer can send to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Ask the relay for a fresh six-digit pairing code.
    GeneratePairingCode {
        #[serde(default)]
        device_type: DeviceType,
    },

    /// Redeem a pairing code for a bearer token.
    Pair {
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        device_info: Option<DeviceInfo>,
    },

    /// Re-attach a previously issued token to this connection.
    Preauth {
        token: SessionToken,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        device_info: Option<DeviceInfo>,
    },

    /// Submit prompt text for relay to the target.
    ///
    /// Both fields are optional on the wire so that a missing token or prompt
    /// produces its specific error code instead of a generic parse failure.
    Prompt {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<SessionToken>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
    },

    /// Claim the single target slot for this connection.
    RegisterExtension,

    /// Application-level liveness check; answered with `pong`.
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

impl ClientMessage {
    /// Wire names of every inbound `type`, used to tell "unknown type" apart
    /// from "known type with bad fields".
    pub const TYPE_NAMES: [&'static str; 6] = [
        "generate_pairing_code",
        "pair",
        "preauth",
        "prompt",
        "register_extension",
        "ping",
    ];

    /// Returns the wire `type` of this message.
    ///
    /// Used in log lines instead of `Debug` so codes, tokens and prompt text
    /// never reach the log.
    pub fn type_name(&self) -> &'static str {
        match self {
            ClientMessage::GeneratePairingCode { .. } => "generate_pairing_code",
            ClientMessage::Pair { .. } => "pair",
            ClientMessage::Preauth { .. } => "preauth",
            ClientMessage::Prompt { .. } => "prompt",
            ClientMessage::RegisterExtension => "register_extension",
            ClientMessage::Ping { .. } => "ping",
        }
    }
}

// ── Server → Client ───────────────────────────────────────────────────────────

/// Every typed frame the relay sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Answer to `generate_pairing_code`.
    PairingCodeGenerated {
        code: String,
        expires_in_seconds: u64,
        /// Ready-to-render join URL, present when the relay knows its
        /// advertised endpoint.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        connect_url: Option<String>,
    },

    /// Answer to a successful `pair` or `preauth`.
    Paired {
        token: SessionToken,
        expires_in_seconds: u64,
    },

    /// The relay accepted a prompt and is about to hand it to the target.
    PromptReceived,

    /// A prompt forwarded to the target connection.
    PromptRelay { prompt: String, source_hint: String },

    /// The prompt was handed to the target's socket.
    ///
    /// This is an optimistic acknowledgement: it does not mean the target
    /// application has processed the text.
    PromptDelivered,

    /// The prompt could not be handed off.
    PromptFailed { reason: ErrorCode },

    /// Answer to `register_extension`.
    ExtensionRegistered,

    /// Answer to `ping`, echoing its timestamp.
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        echoed_timestamp: Option<u64>,
    },

    /// A request was rejected.
    Error { reason: ErrorCode },
}

impl ServerMessage {
    /// Whether this frame reports success (`false` for errors and failures).
    pub fn is_success(&self) -> bool {
        !matches!(
            self,
            ServerMessage::Error { .. } | ServerMessage::PromptFailed { .. }
        )
    }

    /// The human-readable text placed in the envelope's `message` field.
    pub fn describe(&self) -> String {
        match self {
            ServerMessage::PairingCodeGenerated { .. } => "Pairing code generated".to_string(),
            ServerMessage::Paired { .. } => "Device paired".to_string(),
            ServerMessage::PromptReceived => "Prompt received".to_string(),
            ServerMessage::PromptRelay { .. } => "Incoming prompt".to_string(),
            ServerMessage::PromptDelivered => "Prompt delivered".to_string(),
            ServerMessage::PromptFailed { reason } | ServerMessage::Error { reason } => {
                reason.description().to_string()
            }
            ServerMessage::ExtensionRegistered => "Extension registered".to_string(),
            ServerMessage::Pong { .. } => "pong".to_string(),
        }
    }

    /// The typed payload mirrored under the envelope's `data` key, for
    /// messages that carry credentials.
    pub fn data(&self) -> Option<serde_json::Value> {
        match self {
            ServerMessage::PairingCodeGenerated {
                code,
                expires_in_seconds,
                connect_url,
            } => {
                let mut data = json!({ "code": code, "expiresInSeconds": expires_in_seconds });
                if let Some(url) = connect_url {
                    data["connectUrl"] = json!(url);
                }
                Some(data)
            }
            ServerMessage::Paired {
                token,
                expires_in_seconds,
            } => Some(json!({ "token": token.as_str(), "expiresInSeconds": expires_in_seconds })),
            _ => None,
        }
    }

    /// Returns the wire `type` of this message.
    pub fn type_name(&self) -> &'static str {
        match self {
            ServerMessage::PairingCodeGenerated { .. } => "pairing_code_generated",
            ServerMessage::Paired { .. } => "paired",
            ServerMessage::PromptReceived => "prompt_received",
            ServerMessage::PromptRelay { .. } => "prompt_relay",
            ServerMessage::PromptDelivered => "prompt_delivered",
            ServerMessage::PromptFailed { .. } => "prompt_failed",
            ServerMessage::ExtensionRegistered => "extension_registered",
            ServerMessage::Pong { .. } => "pong",
            ServerMessage::Error { .. } => "error",
        }
    }
}

/// A [`ServerMessage`] plus the decorative fields every server frame carries.
///
/// Serializes flat:
///
/// ```json
/// {"type":"prompt_delivered","success":true,"message":"Prompt delivered","timestamp":1704067200000}
/// ```
///
/// Credential-bearing answers also repeat their payload under `data`:
///
/// ```json
/// {"type":"paired","token":"…","expiresInSeconds":86400,"data":{"token":"…","expiresInSeconds":86400},…}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerEnvelope {
    #[serde(flatten)]
    pub body: ServerMessage,
    pub success: bool,
    #[serde(rename = "message")]
    pub text: String,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ServerEnvelope {
    /// Wraps `body`, deriving `success`, `message` and `data` from it.
    pub fn new(body: ServerMessage, timestamp: u64) -> Self {
        Self {
            success: body.is_success(),
            text: body.describe(),
            data: body.data(),
            body,
            timestamp,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
