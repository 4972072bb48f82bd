//! Client-side liveness check.
//!
//! The client stamps each `ping` with a millisecond timestamp.  If no `pong`
//! echoing that timestamp (or a later one) arrives within two heartbeat
//! intervals of the oldest unanswered ping, the link is considered dead and
//! the client force-closes it.

use std::time::{Duration, Instant};

/// Tracks the oldest unanswered ping.
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    interval: Duration,
    outstanding: Option<(u64, Instant)>,
}

impl LivenessMonitor {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            outstanding: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Records a ping.  While an earlier ping is still unanswered the
    /// deadline keeps counting from that earlier one.
    pub fn on_ping_sent(&mut self, timestamp: u64, now: Instant) {
        if self.outstanding.is_none() {
            self.outstanding = Some((timestamp, now));
        }
    }

    /// Records a pong.  A pong echoing the outstanding timestamp or any later
    /// one clears it; stale or unstamped pongs are ignored.
    pub fn on_pong(&mut self, echoed: Option<u64>) {
        if let (Some((sent_ts, _)), Some(echoed)) = (self.outstanding, echoed) {
            if echoed >= sent_ts {
                self.outstanding = None;
            }
        }
    }

    /// Whether a ping has waited two intervals or more without a matching pong.
    pub fn is_dead(&self, now: Instant) -> bool {
        match self.outstanding {
            Some((_, sent_at)) => now.saturating_duration_since(sent_at) >= self.interval * 2,
            None => false,
        }
    }

    /// Forgets any outstanding ping (new connection).
    pub fn reset(&mut self) {
        self.outstanding = None;
    }
}
