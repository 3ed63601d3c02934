//! Individual WebSocket connection handle.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use billhub_core::types::id::{ConnectionId, UserId};

use crate::message::types::OutboundEvent;

/// Result of queueing an event on one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Queued for the writer task.
    Queued,
    /// Queue full; event dropped.
    Dropped,
    /// Connection already closed.
    Closed,
}

/// A handle to a single WebSocket connection.
///
/// Holds the sender half of the connection's outbound queue plus the
/// identity it was authenticated as. The gateway's writer task owns the
/// receiving half and serializes whatever arrives.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique connection ID
    pub id: ConnectionId,
    /// User who owns this connection
    pub user_id: UserId,
    /// When the connection was established
    pub connected_at: DateTime<Utc>,
    /// Sender for outbound events
    sender: mpsc::Sender<OutboundEvent>,
    /// Last inbound frame or pong
    last_activity: Mutex<Instant>,
    /// Whether the connection is still alive
    alive: AtomicBool,
    /// Fired when the server decides to close this connection
    closed: CancellationToken,
}

impl ConnectionHandle {
    /// Create a new connection handle
    pub fn new(id: ConnectionId, user_id: UserId, sender: mpsc::Sender<OutboundEvent>) -> Self {
        Self {
            id,
            user_id,
            connected_at: Utc::now(),
            sender,
            last_activity: Mutex::new(Instant::now()),
            alive: AtomicBool::new(true),
            closed: CancellationToken::new(),
        }
    }

    /// Queue an outbound event without waiting.
    pub fn send(&self, event: OutboundEvent) -> SendOutcome {
        if !self.is_alive() {
            return SendOutcome::Closed;
        }
        match self.sender.try_send(event) {
            Ok(()) => SendOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(ev)) => {
                tracing::warn!(
                    conn_id = %self.id,
                    event = ev.name(),
                    "Connection send buffer full, dropping event"
                );
                SendOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.close();
                SendOutcome::Closed
            }
        }
    }

    /// Check if connection is alive
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Mark the connection dead and wake anything waiting on [`Self::closed`].
    pub fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.closed.cancel();
    }

    /// Token cancelled once the server closes this connection.
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Update last activity timestamp
    pub fn touch(&self) {
        if let Ok(mut last) = self.last_activity.lock() {
            *last = Instant::now();
        }
    }

    /// Time since the last inbound frame.
    pub fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .map(|last| last.elapsed())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_until_closed() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(ConnectionId::new(), UserId::new(), tx);

        assert_eq!(handle.send(OutboundEvent::ping()), SendOutcome::Queued);
        assert_eq!(handle.send(OutboundEvent::ping()), SendOutcome::Dropped);
        assert!(matches!(rx.recv().await, Some(OutboundEvent::Ping { .. })));

        drop(rx);
        assert_eq!(handle.send(OutboundEvent::ping()), SendOutcome::Closed);
        assert!(!handle.is_alive());
        assert!(handle.closed().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_resets_idle_time() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(ConnectionId::new(), UserId::new(), tx);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(handle.idle_for() >= Duration::from_secs(30));

        handle.touch();
        assert!(handle.idle_for() < Duration::from_secs(1));
    }
}
