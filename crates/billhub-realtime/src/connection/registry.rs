//! Connection registry, the single owner of who is connected where.
//!
//! Keeps two indexes, connection ID → handle and user ID → handles. Every
//! other component asks the registry where to deliver instead of keeping a
//! copy of connection lists.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use billhub_core::config::RealtimeConfig;
use billhub_core::types::id::{ConnectionId, UserId};

use crate::message::types::OutboundEvent;
use crate::metrics::RealtimeMetrics;

use super::handle::{ConnectionHandle, SendOutcome};

/// Outcome of adding a connection.
#[derive(Debug)]
pub struct Registered {
    /// The stored handle.
    pub handle: Arc<ConnectionHandle>,
    /// `true` when this is the user's first live connection (offline → online).
    pub came_online: bool,
    /// Connections closed to stay under the per-user cap.
    pub evicted: Vec<Arc<ConnectionHandle>>,
}

/// A freshly opened connection plus the receiving half of its queue.
#[derive(Debug)]
pub struct Registration {
    /// Registry outcome.
    pub registered: Registered,
    /// Outbound events for the gateway writer task.
    pub outbound: mpsc::Receiver<OutboundEvent>,
}

/// Outcome of removing a connection.
#[derive(Debug)]
pub struct Unregistered {
    /// The removed handle.
    pub handle: Arc<ConnectionHandle>,
    /// Set when this was the user's last connection (online → offline).
    pub went_offline_at: Option<DateTime<Utc>>,
}

/// Thread-safe registry of all live connections.
#[derive(Debug)]
pub struct ConnectionRegistry {
    /// Connection ID → handle.
    by_id: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    /// User ID → that user's handles, oldest first.
    by_user: DashMap<UserId, Vec<Arc<ConnectionHandle>>>,
    /// Metrics.
    metrics: Arc<RealtimeMetrics>,
    /// Configuration.
    config: RealtimeConfig,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new(config: RealtimeConfig, metrics: Arc<RealtimeMetrics>) -> Self {
        Self {
            by_id: DashMap::new(),
            by_user: DashMap::new(),
            metrics,
            config,
        }
    }

    /// Opens a new connection for an authenticated user.
    pub fn open(&self, user_id: UserId) -> Registration {
        let (tx, rx) = mpsc::channel(self.config.channel_buffer_size.max(1));
        let handle = Arc::new(ConnectionHandle::new(ConnectionId::new(), user_id, tx));
        Registration {
            registered: self.register(handle),
            outbound: rx,
        }
    }

    /// Records a live connection.
    ///
    /// Registering a handle whose ID is already present replaces the earlier
    /// entry. When the user is at `max_connections_per_user` the oldest
    /// connections are closed and removed first.
    pub fn register(&self, handle: Arc<ConnectionHandle>) -> Registered {
        let user_id = handle.user_id;
        let max = self.config.max_connections_per_user.max(1);
        let mut evicted = Vec::new();

        let came_online = match self.by_user.entry(user_id) {
            Entry::Vacant(vacant) => {
                vacant.insert(vec![handle.clone()]);
                true
            }
            Entry::Occupied(mut occupied) => {
                let list = occupied.get_mut();
                list.retain(|c| c.id != handle.id);
                while list.len() >= max {
                    evicted.push(list.remove(0));
                }
                list.push(handle.clone());
                false
            }
        };

        match self.by_id.insert(handle.id, handle.clone()) {
            None => self.metrics.connection_opened(),
            Some(replaced) if !Arc::ptr_eq(&replaced, &handle) => {
                debug!(conn_id = %handle.id, "Replacing handle registered under the same id");
                replaced.close();
            }
            Some(_) => {}
        }

        for old in &evicted {
            warn!(
                conn_id = %old.id,
                user_id = %user_id,
                max,
                "User at max connections, closing oldest"
            );
            if self.by_id.remove(&old.id).is_some() {
                self.metrics.connection_closed();
            }
            old.close();
        }

        info!(
            conn_id = %handle.id,
            user_id = %user_id,
            came_online,
            "WebSocket connection registered"
        );

        Registered {
            handle,
            came_online,
            evicted,
        }
    }

    /// Removes a connection by ID. Unknown IDs are ignored.
    pub fn unregister(&self, conn_id: ConnectionId) -> Option<Unregistered> {
        let (_, handle) = self.by_id.remove(&conn_id)?;
        handle.close();
        self.metrics.connection_closed();

        let mut went_offline_at = None;
        if let Entry::Occupied(mut occupied) = self.by_user.entry(handle.user_id) {
            occupied.get_mut().retain(|c| c.id != conn_id);
            if occupied.get().is_empty() {
                occupied.remove();
                went_offline_at = Some(Utc::now());
            }
        }

        info!(
            conn_id = %conn_id,
            user_id = %handle.user_id,
            went_offline = went_offline_at.is_some(),
            "WebSocket connection unregistered"
        );

        Some(Unregistered {
            handle,
            went_offline_at,
        })
    }

    /// Live connection IDs for a user (empty if none).
    pub fn connections_for(&self, user_id: UserId) -> Vec<ConnectionId> {
        self.by_user
            .get(&user_id)
            .map(|list| list.iter().map(|c| c.id).collect())
            .unwrap_or_default()
    }

    /// Gets a specific connection by ID.
    pub fn get(&self, conn_id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.by_id.get(&conn_id).map(|entry| entry.value().clone())
    }

    /// The user that owns a connection.
    pub fn user_of(&self, conn_id: ConnectionId) -> Option<UserId> {
        self.by_id.get(&conn_id).map(|entry| entry.user_id)
    }

    /// Whether the user has at least one live connection.
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.by_user.contains_key(&user_id)
    }

    /// Queues an event on one connection. Returns `false` if it is gone.
    pub fn send_to_connection(&self, conn_id: ConnectionId, event: OutboundEvent) -> bool {
        match self.get(conn_id) {
            Some(handle) => self.deliver(&handle, event),
            None => false,
        }
    }

    /// Queues an event on every connection of a user. Returns how many accepted it.
    pub fn send_to_user(&self, user_id: UserId, event: &OutboundEvent) -> usize {
        self.send_to_user_except(user_id, None, event)
    }

    /// Like [`Self::send_to_user`] but skipping one connection.
    pub fn send_to_user_except(
        &self,
        user_id: UserId,
        except: Option<ConnectionId>,
        event: &OutboundEvent,
    ) -> usize {
        let targets: Vec<Arc<ConnectionHandle>> = self
            .by_user
            .get(&user_id)
            .map(|list| list.clone())
            .unwrap_or_default();

        targets
            .iter()
            .filter(|c| Some(c.id) != except)
            .filter(|c| self.deliver(c, event.clone()))
            .count()
    }

    fn deliver(&self, handle: &ConnectionHandle, event: OutboundEvent) -> bool {
        match handle.send(event) {
            SendOutcome::Queued => {
                self.metrics.events_sent(1);
                true
            }
            SendOutcome::Dropped => {
                self.metrics.event_dropped();
                false
            }
            SendOutcome::Closed => {
                debug!(conn_id = %handle.id, "Skipping closed connection");
                self.metrics.event_dropped();
                false
            }
        }
    }

    /// Closes every connection. The gateway tasks observe the close and unregister.
    pub fn close_all(&self) -> usize {
        let all: Vec<Arc<ConnectionHandle>> =
            self.by_id.iter().map(|entry| entry.value().clone()).collect();
        for conn in &all {
            conn.close();
        }
        info!(count = all.len(), "All connections closed");
        all.len()
    }

    /// Total live connections.
    pub fn connection_count(&self) -> usize {
        self.by_id.len()
    }

    /// Number of distinct connected users.
    pub fn user_count(&self) -> usize {
        self.by_user.len()
    }
}
