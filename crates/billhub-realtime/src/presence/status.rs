//! Presence status definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use billhub_core::types::id::UserId;

/// Whether a user currently has a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    /// At least one live connection.
    Online,
    /// No live connection.
    Offline,
}

impl PresenceState {
    /// Converts to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// Status of one user as reported by `presence:check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    /// User.
    pub user_id: UserId,
    /// Current status.
    pub status: PresenceState,
    /// Last disconnect time. `None` while online or if never seen.
    pub last_seen: Option<DateTime<Utc>>,
}
