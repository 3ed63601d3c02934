//! Ping/pong heartbeat for WebSocket keepalive.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use billhub_core::config::RealtimeConfig;

use super::handle::{ConnectionHandle, SendOutcome};
use crate::message::types::OutboundEvent;

/// Heartbeat configuration
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between pings
    pub ping_interval: Duration,
    /// Idle time after which the connection is considered dead
    pub ping_timeout: Duration,
}

impl From<&RealtimeConfig> for HeartbeatConfig {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            ping_interval: config.ping_interval(),
            ping_timeout: config.ping_timeout(),
        }
    }
}

/// Run heartbeat loop for a connection.
///
/// Sends periodic pings and closes the connection once no inbound frame
/// (pong or otherwise) has arrived within the timeout. Returns when the
/// connection is closed for any reason.
pub async fn run_heartbeat(handle: Arc<ConnectionHandle>, config: HeartbeatConfig) {
    let closed = handle.closed();
    let mut interval = time::interval(config.ping_interval);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            _ = interval.tick() => {}
        }

        let idle = handle.idle_for();
        if idle > config.ping_timeout {
            tracing::warn!(
                conn_id = %handle.id,
                idle_secs = idle.as_secs(),
                "Connection heartbeat timeout"
            );
            handle.close();
            break;
        }

        if handle.send(OutboundEvent::ping()) == SendOutcome::Closed {
            tracing::debug!(conn_id = %handle.id, "Ping send failed, connection closed");
            break;
        }
    }

    tracing::debug!(conn_id = %handle.id, "Heartbeat loop ended");
}
