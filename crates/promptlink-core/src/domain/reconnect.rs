//! Client Reconnection State Machine.
//!
//! Pure state: the machine never sleeps or opens sockets.  The client adapter
//! reports transport events (`on_open`, `on_close`) and the machine answers
//! with what to do next, such as "retry in 4.3 s" or "give up".
//!
//! ```text
//!                connect()                on_open()
//!  Disconnected ──────────► Connecting ─────────────► Connected
//!       ▲   │                  ▲  │                      │
//!       │   │ retry timer      │  │ on_close()           │ on_close() /
//!       │   └──────────────────┘  ▼                      │ liveness failure
//!       └──────────────────── Disconnected ◄─────────────┘
//!                                 │ attempts exhausted
//!                                 ▼
//!                               Failed ── manual reconnect() ──► Connecting
//! ```
//!
//! Delay before retry `n` (counting from 0) is
//! `min(2^n × base, cap) + jitter`, with jitter drawn uniformly from
//! `[0, max_jitter)`.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

/// Where the client's link currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Automatic retries are exhausted; only a manual reconnect leaves this state.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_jitter: Duration,
    /// Automatic retries allowed before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            max_jitter: Duration::from_millis(1_000),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// The delay before retry `attempt` (0-based), without jitter.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Source of the random part of each delay.
pub trait Jitter: Send + Sync {
    /// Returns a duration in `[0, max)`, or zero when `max` is zero.
    fn sample(&mut self, max: Duration) -> Duration;
}

/// Uniform jitter from the thread-local RNG.
#[derive(Debug, Default)]
pub struct RandomJitter;

impl Jitter for RandomJitter {
    fn sample(&mut self, max: Duration) -> Duration {
        let max_ms = max.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }
}

/// Always zero.  Makes delays deterministic in tests.
#[derive(Debug, Default)]
pub struct NoJitter;

impl Jitter for NoJitter {
    fn sample(&mut self, _max: Duration) -> Duration {
        Duration::ZERO
    }
}

/// What the adapter should do after the link went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectAction {
    /// Sleep `delay`, then call [`ReconnectStateMachine::on_retry_due`].
    Retry { attempt: u32, delay: Duration },
    /// Retries are exhausted; the machine is now [`ConnectionState::Failed`].
    GiveUp,
    /// The machine was stopped; do nothing.
    Idle,
}

/// The reconnection state machine.
pub struct ReconnectStateMachine {
    state: ConnectionState,
    attempt: u32,
    stopped: bool,
    policy: ReconnectPolicy,
    jitter: Box<dyn Jitter>,
}

impl ReconnectStateMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self::with_jitter(policy, Box::new(RandomJitter))
    }

    pub fn with_jitter(policy: ReconnectPolicy, jitter: Box<dyn Jitter>) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempt: 0,
            stopped: false,
            policy,
            jitter,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Retries scheduled since the last successful open.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Explicit connect request.  Returns `true` if the adapter should open a
    /// socket now.
    ///
    /// From `Failed` this is the manual reconnect: the attempt counter starts
    /// over.
    pub fn connect(&mut self) -> bool {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Failed => {
                if self.state == ConnectionState::Failed {
                    self.attempt = 0;
                }
                self.stopped = false;
                self.state = ConnectionState::Connecting;
                true
            }
            ConnectionState::Connecting | ConnectionState::Connected => false,
        }
    }

    /// The transport opened.
    pub fn on_open(&mut self) {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Connected;
            self.attempt = 0;
        }
    }

    /// The transport closed, failed to open, or failed its liveness check.
    pub fn on_close(&mut self) -> ReconnectAction {
        if self.stopped || self.state == ConnectionState::Failed {
            return ReconnectAction::Idle;
        }

        if self.attempt >= self.policy.max_attempts {
            self.state = ConnectionState::Failed;
            debug!(attempts = self.attempt, "reconnect attempts exhausted");
            return ReconnectAction::GiveUp;
        }

        self.state = ConnectionState::Disconnected;
        let delay =
            self.policy.base_delay_for(self.attempt) + self.jitter.sample(self.policy.max_jitter);
        self.attempt += 1;
        ReconnectAction::Retry {
            attempt: self.attempt,
            delay,
        }
    }

    /// A scheduled retry's delay elapsed.  Returns `true` if the adapter
    /// should open a socket now.
    pub fn on_retry_due(&mut self) -> bool {
        if self.stopped || self.state != ConnectionState::Disconnected {
            return false;
        }
        self.state = ConnectionState::Connecting;
        true
    }

    /// Stops the machine for good (until the next `connect`).
    pub fn stop(&mut self) {
        self.stopped = true;
        self.state = ConnectionState::Disconnected;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> ReconnectStateMachine {
        ReconnectStateMachine::with_jitter(ReconnectPolicy::default(), Box::new(NoJitter))
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_machine_can_live_inside_a_spawned_task() {
        // A driver holding the machine is borrowed across awaits in a spawned
        // task, so the machine must be both Send and Sync.
        assert_send_sync::<ReconnectStateMachine>();
        assert_send_sync::<Box<dyn Jitter>>();
    }

    #[test]
    fn test_base_delay_doubles_then_caps_at_30s() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (0..8)
            .map(|n| policy.base_delay_for(n).as_millis() as u64)
            .collect();
        assert_eq!(
            delays,
            vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000, 30_000]
        );
    }

    #[test]
    fn test_base_delay_does_not_overflow_for_huge_attempts() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.base_delay_for(200), Duration::from_millis(30_000));
    }

    #[test]
    fn test_happy_path_connect_then_open() {
        let mut sm = machine();
        assert!(sm.connect());
        assert_eq!(sm.state(), ConnectionState::Connecting);

        sm.on_open();

        assert_eq!(sm.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_connect_while_connected_is_a_no_op() {
        let mut sm = machine();
        sm.connect();
        sm.on_open();
        assert!(!sm.connect());
        assert_eq!(sm.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_ten_failures_schedule_non_decreasing_delays_and_eleventh_fails() {
        // Arrange
        let mut sm = machine();
        sm.connect();
        let mut delays = Vec::new();

        // Act: ten consecutive immediate failures.
        for expected_attempt in 1..=10 {
            match sm.on_close() {
                ReconnectAction::Retry { attempt, delay } => {
                    assert_eq!(attempt, expected_attempt);
                    delays.push(delay);
                }
                other => panic!("failure {expected_attempt} produced {other:?}"),
            }
            assert_eq!(sm.state(), ConnectionState::Disconnected);
            assert!(sm.on_retry_due());
        }
        let eleventh = sm.on_close();

        // Assert
        assert!(delays.windows(2).all(|w| w[0] <= w[1]), "{delays:?}");
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(30_000)));
        assert_eq!(eleventh, ReconnectAction::GiveUp);
        assert_eq!(sm.state(), ConnectionState::Failed);
        assert!(!sm.on_retry_due());
        assert_eq!(sm.on_close(), ReconnectAction::Idle);
    }

    #[test]
    fn test_successful_open_resets_attempt_counter() {
        let mut sm = machine();
        sm.connect();
        sm.on_close();
        sm.on_retry_due();
        sm.on_close();
        assert_eq!(sm.attempt(), 2);

        sm.on_retry_due();
        sm.on_open();

        assert_eq!(sm.attempt(), 0);
        match sm.on_close() {
            ReconnectAction::Retry { delay, .. } => assert_eq!(delay, Duration::from_millis(1_000)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_manual_reconnect_leaves_failed_and_restarts_backoff() {
        // Arrange
        let policy = ReconnectPolicy {
            max_attempts: 1,
            ..ReconnectPolicy::default()
        };
        let mut sm = ReconnectStateMachine::with_jitter(policy, Box::new(NoJitter));
        sm.connect();
        sm.on_close();
        sm.on_retry_due();
        assert_eq!(sm.on_close(), ReconnectAction::GiveUp);

        // Act
        let reopened = sm.connect();

        // Assert
        assert!(reopened);
        assert_eq!(sm.state(), ConnectionState::Connecting);
        assert_eq!(sm.attempt(), 0);
    }

    #[test]
    fn test_jitter_stays_below_max() {
        let mut jitter = RandomJitter;
        for _ in 0..500 {
            assert!(jitter.sample(Duration::from_millis(1_000)) < Duration::from_millis(1_000));
        }
        assert_eq!(jitter.sample(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_delay_includes_jitter_within_bounds() {
        let mut sm = ReconnectStateMachine::new(ReconnectPolicy::default());
        sm.connect();
        match sm.on_close() {
            ReconnectAction::Retry { delay, .. } => {
                assert!(delay >= Duration::from_millis(1_000));
                assert!(delay < Duration::from_millis(2_000));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_stopped_machine_does_not_retry() {
        let mut sm = machine();
        sm.connect();
        sm.on_open();

        sm.stop();

        assert_eq!(sm.on_close(), ReconnectAction::Idle);
        assert!(!sm.on_retry_due());
        assert_eq!(sm.state(), ConnectionState::Disconnected);
    }
}
