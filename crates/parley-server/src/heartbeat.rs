//! Heartbeat liveness monitor.
//!
//! One monitor task per active session, running independently of command
//! processing on the same connection. Each cycle enqueues a `PING`, waits
//! the pong window, and checks whether a qualifying `PONG` arrived — a
//! last-pong timestamp at or after the instant the `PING` was sent. At
//! `max_missed` consecutive misses the monitor cancels the session's shared
//! token, forcing an ungraceful teardown, and stops. Every wait races the
//! same token so the monitor also stops promptly when the session ends for
//! any other reason.

use std::time::{Duration, Instant};

use parley_proto::Reply;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::env::Environment;

/// Heartbeat timing and tolerance parameters.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    /// Time between `PING` probes.
    pub ping_interval: Duration,
    /// How long after a `PING` a qualifying `PONG` may arrive.
    pub pong_wait: Duration,
    /// Consecutive misses that force the session closed.
    pub max_missed: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(10),
            pong_wait: Duration::from_secs(5),
            max_missed: 3,
        }
    }
}

/// Sleep `duration`, unless the session is cancelled first.
///
/// Returns `false` if cancellation won the race.
async fn wait<E: Environment>(env: &E, cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = env.sleep(duration) => true,
    }
}

/// Run the monitor until cancellation or the miss threshold.
///
/// `last_pong` is fed by the session's read loop every time the peer sends
/// `PONG`; `outbox` is the same queue the session's write loop drains, so a
/// probe that cannot even be enqueued counts as a miss.
pub(crate) async fn run<E: Environment>(
    env: E,
    config: HeartbeatConfig,
    conn_id: u64,
    outbox: mpsc::UnboundedSender<Reply>,
    last_pong: watch::Receiver<Instant>,
    cancel: CancellationToken,
) {
    let mut missed: u32 = 0;

    loop {
        if outbox.send(Reply::Ping).is_err() {
            missed += 1;
            tracing::warn!(conn_id, missed, "failed to send PING");
            if missed >= config.max_missed {
                tracing::warn!(conn_id, "heartbeat timeout, dropping session");
                cancel.cancel();
                return;
            }
            if !wait(&env, &cancel, config.ping_interval).await {
                return;
            }
            continue;
        }
        let sent_at = env.now();
        tracing::trace!(conn_id, "PING");

        if !wait(&env, &cancel, config.pong_wait).await {
            return;
        }

        if *last_pong.borrow() >= sent_at {
            if missed > 0 {
                tracing::info!(conn_id, missed, "PONG recovered");
            }
            missed = 0;
        } else {
            missed += 1;
            tracing::warn!(conn_id, missed, "no PONG");
            if missed >= config.max_missed {
                tracing::warn!(conn_id, "heartbeat timeout, dropping session");
                cancel.cancel();
                return;
            }
        }

        let remaining = config.ping_interval.saturating_sub(config.pong_wait);
        if !wait(&env, &cancel, remaining).await {
            return;
        }
    }
}
