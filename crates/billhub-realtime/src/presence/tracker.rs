//! Presence tracker: online/offline derived from the registry, pushed to watchers.
//!
//! Status itself is never stored here: a user is online exactly when the
//! [`ConnectionRegistry`] holds a connection for them. The tracker only keeps
//! last-seen timestamps and the watcher subscriptions created by
//! `presence:check`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use billhub_core::types::id::{ConnectionId, UserId};

use super::status::{PresenceEntry, PresenceState};
use crate::connection::registry::ConnectionRegistry;
use crate::message::types::OutboundEvent;

/// Tracks last-seen times and presence watchers.
#[derive(Debug)]
pub struct PresenceTracker {
    /// Registry, the source of truth for online status.
    registry: Arc<ConnectionRegistry>,
    /// User ID → time their last connection closed.
    last_seen: DashMap<UserId, DateTime<Utc>>,
    /// Watched user → connections watching them.
    watchers: DashMap<UserId, HashSet<ConnectionId>>,
    /// Watching connection → users it watches. Reverse index for cleanup.
    watching: DashMap<ConnectionId, HashSet<UserId>>,
}

impl PresenceTracker {
    /// Create a new presence tracker
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            last_seen: DashMap::new(),
            watchers: DashMap::new(),
            watching: DashMap::new(),
        }
    }

    /// Current status of one user. Unknown users are offline with no last-seen.
    pub fn status_of(&self, user_id: UserId) -> PresenceEntry {
        if self.registry.is_online(user_id) {
            PresenceEntry {
                user_id,
                status: PresenceState::Online,
                last_seen: None,
            }
        } else {
            PresenceEntry {
                user_id,
                status: PresenceState::Offline,
                last_seen: self.last_seen.get(&user_id).map(|t| *t.value()),
            }
        }
    }

    /// Called on the user's offline → online edge. Returns connections notified.
    pub fn on_user_connected(&self, user_id: UserId) -> usize {
        self.broadcast(user_id)
    }

    /// Called on the user's online → offline edge. Returns connections notified.
    pub fn on_user_disconnected(&self, user_id: UserId, at: DateTime<Utc>) -> usize {
        self.last_seen.insert(user_id, at);
        self.broadcast(user_id)
    }

    /// Reports the status of each requested user and makes `requester` a
    /// watcher of all of them.
    pub fn check_presence(
        &self,
        requester: ConnectionId,
        user_ids: &[UserId],
    ) -> Vec<PresenceEntry> {
        // A connection that has already gone away must not leave entries behind.
        if self.registry.get(requester).is_some() {
            for user_id in user_ids {
                self.watchers.entry(*user_id).or_default().insert(requester);
                self.watching.entry(requester).or_default().insert(*user_id);
            }
        }

        user_ids.iter().map(|id| self.status_of(*id)).collect()
    }

    /// Drops every subscription held by a closed connection.
    pub fn forget_watcher(&self, conn_id: ConnectionId) {
        let Some((_, watched)) = self.watching.remove(&conn_id) else {
            return;
        };
        for user_id in watched {
            self.remove_watch(user_id, conn_id);
        }
        debug!(conn_id = %conn_id, "Presence watcher removed");
    }

    /// Number of connections watching `user_id`.
    pub fn watcher_count(&self, user_id: UserId) -> usize {
        self.watchers.get(&user_id).map(|w| w.len()).unwrap_or(0)
    }

    /// Number of connections holding at least one subscription.
    pub fn watching_connection_count(&self) -> usize {
        self.watching.len()
    }

    fn remove_watch(&self, user_id: UserId, conn_id: ConnectionId) {
        if let Entry::Occupied(mut occupied) = self.watchers.entry(user_id) {
            occupied.get_mut().remove(&conn_id);
            if occupied.get().is_empty() {
                occupied.remove();
            }
        }
    }

    /// Pushes the user's current status to their watchers.
    fn broadcast(&self, user_id: UserId) -> usize {
        let targets: Vec<ConnectionId> = match self.watchers.get(&user_id) {
            Some(set) => set.iter().copied().collect(),
            None => return 0,
        };

        let entry = self.status_of(user_id);
        let event = OutboundEvent::UserStatus {
            user_id,
            status: entry.status,
            last_seen: entry.last_seen,
        };

        let mut notified = 0;
        for conn_id in targets {
            if self.registry.send_to_connection(conn_id, event.clone()) {
                notified += 1;
            } else if self.registry.get(conn_id).is_none() {
                // Watcher closed without cleanup reaching us yet.
                self.forget_watcher(conn_id);
            }
        }

        debug!(
            user_id = %user_id,
            status = entry.status.as_str(),
            notified,
            "Presence change broadcast"
        );
        notified
    }
}
