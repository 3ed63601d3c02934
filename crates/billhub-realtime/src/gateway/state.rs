//! Per-connection lifecycle states.

use serde::{Deserialize, Serialize};

use billhub_core::error::AppError;

/// Lifecycle of one gateway connection.
///
/// `Connecting → Authenticating → Established → Closed`. Any state may jump
/// to `Closed`; nothing leaves `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Transport handshake in progress.
    Connecting,
    /// Credential being verified.
    Authenticating,
    /// Registered and accepting events.
    Established,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    /// Whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Authenticating)
                | (Self::Authenticating, Self::Established)
                | (Self::Connecting | Self::Authenticating | Self::Established, Self::Closed)
        )
    }

    /// Moves to `next`, rejecting illegal transitions.
    pub fn transition(self, next: Self) -> Result<Self, AppError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(AppError::internal(format!(
                "Invalid connection state transition {} -> {}",
                self.as_str(),
                next.as_str()
            )))
        }
    }

    /// Inbound application events are only processed once established.
    pub fn accepts_events(self) -> bool {
        self == Self::Established
    }

    /// Converts to string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Established => "established",
            Self::Closed => "closed",
        }
    }
}
