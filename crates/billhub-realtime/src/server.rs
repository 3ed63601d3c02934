//! Top-level real-time engine that ties together all subsystems.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use billhub_core::config::RealtimeConfig;
use billhub_core::error::AppError;
use billhub_core::result::AppResult;
use billhub_core::traits::identity::IdentityVerifier;
use billhub_core::types::id::{ConnectionId, UserId};
use billhub_store::MessageStore;

use crate::connection::heartbeat::{HeartbeatConfig, run_heartbeat};
use crate::connection::registry::{ConnectionRegistry, Registration};
use crate::gateway::dispatcher::EventDispatcher;
use crate::metrics::RealtimeMetrics;
use crate::presence::tracker::PresenceTracker;
use crate::relay::service::MessageRelay;
use crate::typing::coordinator::TypingCoordinator;

/// Central real-time engine that coordinates all WebSocket subsystems.
///
/// Components never call each other's lifecycle hooks directly; the engine
/// forwards registry edges (first connection, last disconnection) to
/// presence and typing.
#[derive(Clone)]
pub struct RealtimeEngine {
    /// Live connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Presence tracker.
    pub presence: Arc<PresenceTracker>,
    /// Typing indicators.
    pub typing: Arc<TypingCoordinator>,
    /// Message relay.
    pub relay: Arc<MessageRelay>,
    /// Inbound event router.
    pub dispatcher: Arc<EventDispatcher>,
    /// Metrics collector.
    pub metrics: Arc<RealtimeMetrics>,
    /// Token verification.
    identity: Arc<dyn IdentityVerifier>,
    /// Engine configuration.
    config: RealtimeConfig,
    /// Cancelled on shutdown.
    shutdown: CancellationToken,
}

impl std::fmt::Debug for RealtimeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeEngine")
            .field("connections", &self.registry.connection_count())
            .field("users", &self.registry.user_count())
            .finish()
    }
}

impl RealtimeEngine {
    /// Creates a new real-time engine with all subsystems.
    pub fn new(
        config: RealtimeConfig,
        identity: Arc<dyn IdentityVerifier>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        let metrics = Arc::new(RealtimeMetrics::new());
        let registry = Arc::new(ConnectionRegistry::new(config.clone(), metrics.clone()));
        let presence = Arc::new(PresenceTracker::new(registry.clone()));
        let typing = TypingCoordinator::new(registry.clone(), config.typing_timeout());
        let relay = Arc::new(MessageRelay::new(
            registry.clone(),
            store,
            config.max_content_length,
            metrics.clone(),
        ));
        let dispatcher = Arc::new(EventDispatcher::new(
            registry.clone(),
            presence.clone(),
            typing.clone(),
            relay.clone(),
            metrics.clone(),
            config.max_message_size_bytes,
        ));

        info!(
            max_connections_per_user = config.max_connections_per_user,
            typing_timeout_ms = config.typing_timeout_ms,
            "Real-time engine initialized"
        );

        Self {
            registry,
            presence,
            typing,
            relay,
            dispatcher,
            metrics,
            identity,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Resolves the handshake credential to a user.
    pub async fn authenticate(&self, token: Option<&str>) -> AppResult<UserId> {
        if self.shutdown.is_cancelled() {
            return Err(AppError::service_unavailable("Server is shutting down"));
        }
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::authentication("Missing access token"))?;
        self.identity.verify(token).await
    }

    /// Registers a connection for an authenticated user and starts its heartbeat.
    pub fn connect(&self, user_id: UserId) -> Registration {
        let registration = self.registry.open(user_id);
        let registered = &registration.registered;

        if registered.came_online {
            self.presence.on_user_connected(user_id);
        }
        for evicted in &registered.evicted {
            self.presence.forget_watcher(evicted.id);
        }

        tokio::spawn(run_heartbeat(
            registered.handle.clone(),
            HeartbeatConfig::from(&self.config),
        ));

        registration
    }

    /// Routes one inbound text frame.
    pub async fn handle_text(&self, conn_id: ConnectionId, raw: &str) {
        self.dispatcher.handle_text(conn_id, raw).await;
    }

    /// Tears down a connection. Safe to call more than once.
    pub fn disconnect(&self, conn_id: ConnectionId) {
        self.presence.forget_watcher(conn_id);

        let Some(removed) = self.registry.unregister(conn_id) else {
            debug!(conn_id = %conn_id, "Disconnect for already removed connection");
            return;
        };

        if let Some(at) = removed.went_offline_at {
            let user_id = removed.handle.user_id;
            self.typing.clear_user(user_id);
            self.presence.on_user_disconnected(user_id, at);
        }
    }

    /// Token cancelled when the engine shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stops accepting connections and closes every live one.
    pub fn shutdown(&self) {
        info!("Shutting down real-time engine");
        self.shutdown.cancel();
        let closed = self.registry.close_all();
        info!(closed, "Real-time engine shut down");
    }
}
