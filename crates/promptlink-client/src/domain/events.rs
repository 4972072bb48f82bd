//! What the client reports to its host UI.

use std::time::Duration;

use promptlink_core::{ConnectionState, ErrorCode, SessionToken};

/// Outcome of [`crate::RelayClient::submit_prompt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Written to the live link.
    Sent,
    /// Held in the offline queue until the link is back.
    Queued,
    /// Refused: the link is up but the relay rejected this client's code or
    /// token.  Join again with a fresh code.
    NotAuthenticated,
}

/// Notifications emitted on the client's event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    StateChanged(ConnectionState),
    /// `pair` or `preauth` succeeded.
    Paired {
        token: SessionToken,
        expires_in_seconds: u64,
    },
    /// The relay accepted this client as the target.
    TargetRegistered,
    /// A prompt went into the offline queue.  `dropped_oldest` is set when
    /// the queue was full and its oldest entry was discarded.
    PromptQueued { queued: usize, dropped_oldest: bool },
    PromptReceived,
    PromptDelivered,
    PromptFailed(ErrorCode),
    /// An `error` frame from the relay.
    ServerError(ErrorCode),
    /// The relay rejected the code or token this client joined with.
    /// Further prompts are refused until the client joins again.
    ReauthRequired,
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// Automatic reconnects are exhausted; call `reconnect()` to try again.
    Failed,
}
