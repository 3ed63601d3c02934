//! Typing-indicator coordinator.
//!
//! State is keyed by the ordered pair `(sender, recipient)`. Each active
//! entry owns the handle of its expiry task, so a later `start` or `stop`
//! aborts the previous timer instead of leaving it to fire.

use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use billhub_core::types::id::UserId;

use crate::connection::registry::ConnectionRegistry;
use crate::message::types::OutboundEvent;

/// One active typing flag.
#[derive(Debug)]
struct TypingEntry {
    /// Bumped on every refresh; an expiry only fires for its own generation.
    generation: u64,
    /// Last start/refresh.
    updated_at: Instant,
    /// Pending auto-expiry.
    timer: JoinHandle<()>,
}

/// Coordinates "user X is typing to user Y" signals.
///
/// Emits `typing:update` only on edges: one `true` when a pair starts
/// typing, one `false` when it stops or expires. Refreshing an active pair
/// only pushes the expiry back.
#[derive(Debug)]
pub struct TypingCoordinator {
    /// Used to reach the recipient's connections.
    registry: Arc<ConnectionRegistry>,
    /// Auto-expiry window.
    timeout: Duration,
    /// (sender, recipient) → active flag.
    states: DashMap<(UserId, UserId), TypingEntry>,
    /// Generation source.
    next_generation: AtomicU64,
    /// Back-reference handed to expiry tasks.
    this: Weak<TypingCoordinator>,
}

impl TypingCoordinator {
    /// Creates a coordinator whose flags expire after `timeout`.
    pub fn new(registry: Arc<ConnectionRegistry>, timeout: Duration) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            registry,
            timeout,
            states: DashMap::new(),
            next_generation: AtomicU64::new(1),
            this: this.clone(),
        })
    }

    /// Marks `sender` as typing to `recipient` and (re)arms the expiry.
    ///
    /// Returns `true` if this was a false → true edge and an update was sent.
    pub fn start(&self, sender: UserId, recipient: UserId) -> bool {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let timer = self.spawn_expiry(sender, recipient, generation);
        let entry = TypingEntry {
            generation,
            updated_at: Instant::now(),
            timer,
        };

        let started = match self.states.entry((sender, recipient)) {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.insert(entry);
                previous.timer.abort();
                false
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                true
            }
        };

        if started {
            self.emit(sender, recipient, true);
        }
        started
    }

    /// Clears the flag immediately.
    ///
    /// Returns `true` if a flag was active and `isTyping: false` was sent.
    pub fn stop(&self, sender: UserId, recipient: UserId) -> bool {
        match self.states.remove(&(sender, recipient)) {
            Some((_, entry)) => {
                entry.timer.abort();
                self.emit(sender, recipient, false);
                true
            }
            None => false,
        }
    }

    /// Drops every flag involving a user who just went offline.
    ///
    /// Flags they held as sender are stopped (recipients see `false`);
    /// flags aimed at them are discarded silently since nobody is listening.
    pub fn clear_user(&self, user_id: UserId) {
        let keys: Vec<(UserId, UserId)> = self
            .states
            .iter()
            .map(|entry| *entry.key())
            .filter(|(sender, recipient)| *sender == user_id || *recipient == user_id)
            .collect();

        for (sender, recipient) in keys {
            if sender == user_id {
                self.stop(sender, recipient);
            } else if let Some((_, entry)) = self.states.remove(&(sender, recipient)) {
                entry.timer.abort();
            }
        }
    }

    /// Whether `sender` is currently flagged as typing to `recipient`.
    pub fn is_typing(&self, sender: UserId, recipient: UserId) -> bool {
        self.states.contains_key(&(sender, recipient))
    }

    /// Number of active flags.
    pub fn active_count(&self) -> usize {
        self.states.len()
    }

    fn spawn_expiry(&self, sender: UserId, recipient: UserId, generation: u64) -> JoinHandle<()> {
        let this = self.this.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(coordinator) = this.upgrade() {
                coordinator.expire(sender, recipient, generation);
            }
        })
    }

    fn expire(&self, sender: UserId, recipient: UserId, generation: u64) {
        let removed = self
            .states
            .remove_if(&(sender, recipient), |_, entry| entry.generation == generation);
        if let Some((_, entry)) = removed {
            debug!(
                sender = %sender,
                recipient = %recipient,
                idle_ms = entry.updated_at.elapsed().as_millis() as u64,
                "Typing indicator expired"
            );
            self.emit(sender, recipient, false);
        }
    }

    fn emit(&self, sender: UserId, recipient: UserId, is_typing: bool) {
        self.registry.send_to_user(
            recipient,
            &OutboundEvent::TypingUpdate {
                user_id: sender,
                is_typing,
            },
        );
    }
}

impl Drop for TypingCoordinator {
    fn drop(&mut self) {
        for entry in self.states.iter() {
            entry.timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use billhub_core::config::RealtimeConfig;

    use super::*;
    use crate::metrics::RealtimeMetrics;

    const TIMEOUT: Duration = Duration::from_secs(8);

    fn setup() -> (Arc<ConnectionRegistry>, Arc<TypingCoordinator>) {
        let registry = Arc::new(ConnectionRegistry::new(
            RealtimeConfig::default(),
            Arc::new(RealtimeMetrics::new()),
        ));
        let typing = TypingCoordinator::new(registry.clone(), TIMEOUT);
        (registry, typing)
    }

    fn drain(rx: &mut mpsc::Receiver<OutboundEvent>) -> Vec<OutboundEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    fn update(user_id: UserId, is_typing: bool) -> OutboundEvent {
        OutboundEvent::TypingUpdate { user_id, is_typing }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_then_expire_emits_once_each() {
        let (registry, typing) = setup();
        let (a, b) = (UserId::new(), UserId::new());
        let mut b_conn = registry.open(b);

        assert!(typing.start(a, b));
        assert_eq!(drain(&mut b_conn.outbound), vec![update(a, true)]);

        tokio::time::sleep(TIMEOUT + Duration::from_millis(1)).await;
        assert_eq!(drain(&mut b_conn.outbound), vec![update(a, false)]);
        assert!(!typing.is_typing(a, b));

        tokio::time::sleep(TIMEOUT * 2).await;
        assert!(drain(&mut b_conn.outbound).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_extends_without_duplicate_emit() {
        let (registry, typing) = setup();
        let (a, b) = (UserId::new(), UserId::new());
        let mut b_conn = registry.open(b);

        assert!(typing.start(a, b));
        tokio::time::sleep(Duration::from_secs(5)).await;
        let refreshed_at = Instant::now();
        assert!(!typing.start(a, b));
        assert_eq!(typing.states.get(&(a, b)).unwrap().updated_at, refreshed_at);
        tokio::time::sleep(Duration::from_secs(5)).await;

        // 10s after the first start, but only 5s after the refresh.
        assert!(typing.is_typing(a, b));
        assert_eq!(drain(&mut b_conn.outbound), vec![update(a, true)]);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(drain(&mut b_conn.outbound), vec![update(a, false)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_expiry() {
        let (registry, typing) = setup();
        let (a, b) = (UserId::new(), UserId::new());
        let mut b_conn = registry.open(b);

        typing.start(a, b);
        assert!(typing.stop(a, b));
        assert!(!typing.stop(a, b));

        tokio::time::sleep(TIMEOUT * 2).await;
        assert_eq!(
            drain(&mut b_conn.outbound),
            vec![update(a, true), update(a, false)]
        );
        assert_eq!(typing.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pairs_are_independent() {
        let (registry, typing) = setup();
        let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());
        let mut b_conn = registry.open(b);
        let mut c_conn = registry.open(c);

        typing.start(a, b);
        typing.start(a, c);
        typing.stop(a, b);

        assert!(typing.is_typing(a, c));
        assert_eq!(
            drain(&mut b_conn.outbound),
            vec![update(a, true), update(a, false)]
        );
        assert_eq!(drain(&mut c_conn.outbound), vec![update(a, true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_user_releases_all_timers() {
        let (registry, typing) = setup();
        let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());
        let mut b_conn = registry.open(b);
        let mut a_conn = registry.open(a);

        typing.start(a, b);
        typing.start(c, a);
        drain(&mut b_conn.outbound);
        drain(&mut a_conn.outbound);

        typing.clear_user(a);
        assert_eq!(typing.active_count(), 0);
        assert_eq!(drain(&mut b_conn.outbound), vec![update(a, false)]);
        assert!(drain(&mut a_conn.outbound).is_empty());

        tokio::time::sleep(TIMEOUT * 2).await;
        assert!(drain(&mut b_conn.outbound).is_empty());
        assert!(drain(&mut a_conn.outbound).is_empty());
    }
}
