//! Periodic background sweeps.
//!
//! Two independent loops run for the lifetime of a server:
//!
//! ```text
//! heartbeat loop  every heartbeat_interval    reclaim silent connections, probe the rest
//! expiry loop     every token_sweep_interval  delete expired tokens and pairing codes
//! ```
//!
//! Both skip the immediate first tick of `tokio::time::interval`, so a
//! connection accepted right at startup gets a full period before its first
//! probe.

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::application::relay_service::RelayService;

/// Runs the heartbeat sweep forever.  Abort the task to stop it.
pub async fn run_heartbeat_loop(service: RelayService, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let reclaimed = service.sweep_heartbeats().await;
        if reclaimed.is_empty() {
            debug!("heartbeat sweep: all connections alive");
        } else {
            info!(count = reclaimed.len(), "heartbeat sweep reclaimed dead connections");
        }
    }
}

/// Runs the token and pairing-code expiry sweep forever.
pub async fn run_expiry_loop(service: RelayService, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        service.sweep_expired().await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use promptlink_core::{
        ConnectionId, ConnectionSink, Liveness, RelayRouter, RelayStore, ServerEnvelope,
        SinkError, SystemClock,
    };

    use super::*;

    #[derive(Default)]
    struct SilentPeer {
        probes: AtomicUsize,
        closed: AtomicUsize,
    }

    impl ConnectionSink for SilentPeer {
        fn send(&self, _envelope: &ServerEnvelope) -> Result<(), SinkError> {
            Ok(())
        }
        fn probe(&self) -> Result<Liveness, SinkError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            Ok(Liveness::Pending)
        }
        fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn service() -> RelayService {
        RelayService::new(RelayRouter::new(RelayStore::new(Arc::new(SystemClock))))
    }

    #[tokio::test]
    async fn test_heartbeat_loop_reclaims_silent_connection_after_two_ticks() {
        // Arrange
        let service = service();
        let peer = Arc::new(SilentPeer::default());
        service.connect(ConnectionId::new(), peer.clone()).await;

        // Act
        let task = tokio::spawn(run_heartbeat_loop(
            service.clone(),
            Duration::from_millis(20),
        ));
        tokio::time::sleep(Duration::from_millis(150)).await;
        task.abort();

        // Assert
        assert_eq!(service.stats().await.connections, 0);
        assert_eq!(peer.probes.load(Ordering::SeqCst), 1);
        assert_eq!(peer.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_heartbeat_loop_keeps_connection_that_keeps_answering() {
        // Arrange
        let service = service();
        let id = ConnectionId::new();
        service.connect(id, Arc::new(SilentPeer::default())).await;
        let task = tokio::spawn(run_heartbeat_loop(
            service.clone(),
            Duration::from_millis(40),
        ));

        // Act: answer far more often than the sweep runs.
        for _ in 0..15 {
            service.mark_alive(id).await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        task.abort();

        // Assert
        assert_eq!(service.stats().await.connections, 1);
    }

    #[tokio::test]
    async fn test_expiry_loop_runs_without_disturbing_live_tokens() {
        let service = service();
        service.issue_token(None).await;

        let task = tokio::spawn(run_expiry_loop(service.clone(), Duration::from_millis(10)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        task.abort();

        assert_eq!(service.stats().await.token_sessions, 1);
    }
}
