//! Application state shared across all handlers.

use std::sync::Arc;
use std::time::Instant;

use billhub_core::config::AppConfig;
use billhub_realtime::RealtimeEngine;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<AppConfig>,
    /// WebSocket engine.
    pub realtime: Arc<RealtimeEngine>,
    /// Process start, for uptime.
    pub started_at: Instant,
}

impl AppState {
    /// Creates state for a freshly started server.
    pub fn new(config: Arc<AppConfig>, realtime: Arc<RealtimeEngine>) -> Self {
        Self {
            config,
            realtime,
            started_at: Instant::now(),
        }
    }
}
