//! Inbound and outbound WebSocket event definitions.
//!
//! Every frame on the wire is a JSON object `{"event": <name>, "data": <payload>}`.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use validator::Validate;

use billhub_core::error::AppError;
use billhub_core::types::id::{BookingId, MessageId, UserId};
use billhub_entity::message::Message;

use crate::presence::status::{PresenceEntry, PresenceState};

/// Inbound event names.
pub mod names {
    /// Send a chat message.
    pub const MESSAGE_SEND: &str = "message:send";
    /// Mark one message read.
    pub const MESSAGE_READ: &str = "message:read";
    /// Mark a whole conversation read.
    pub const CONVERSATION_READ: &str = "conversation:read";
    /// Start typing.
    pub const TYPING_START: &str = "typing:start";
    /// Stop typing.
    pub const TYPING_STOP: &str = "typing:stop";
    /// Ask for presence of users and watch them.
    pub const PRESENCE_CHECK: &str = "presence:check";
    /// Heartbeat reply.
    pub const PONG: &str = "pong";
}

/// A raw frame before its payload is interpreted.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFrame {
    /// Event name.
    pub event: String,
    /// Event payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl RawFrame {
    /// Parses the outer `{event, data}` shape.
    pub fn parse(text: &str) -> Result<Self, AppError> {
        serde_json::from_str(text)
            .map_err(|e| AppError::validation(format!("Failed to parse frame: {e}")))
    }
}

/// `message:send` payload.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    /// Addressee.
    pub receiver_id: UserId,
    /// Body.
    #[validate(length(min = 1, message = "content must not be empty"))]
    pub content: String,
    /// Optional booking the conversation is about.
    #[serde(default)]
    pub booking_id: Option<BookingId>,
}

/// `message:read` payload.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MessageReadPayload {
    /// Message to flip.
    pub message_id: MessageId,
}

/// `conversation:read` payload.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConversationReadPayload {
    /// The other participant.
    pub partner_id: UserId,
}

/// `typing:start` / `typing:stop` payload.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    /// Who is being typed to.
    pub receiver_id: UserId,
}

/// `presence:check` payload.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PresenceCheckPayload {
    /// Users to report on and watch.
    #[validate(length(max = 200, message = "too many userIds"))]
    pub user_ids: Vec<UserId>,
}

/// `pong` payload.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct PongPayload {
    /// Echoed server timestamp.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Events sent by the client to the server.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// `message:send`
    MessageSend(SendMessagePayload),
    /// `message:read`
    MessageRead(MessageReadPayload),
    /// `conversation:read`
    ConversationRead(ConversationReadPayload),
    /// `typing:start`
    TypingStart(TypingPayload),
    /// `typing:stop`
    TypingStop(TypingPayload),
    /// `presence:check`
    PresenceCheck(PresenceCheckPayload),
    /// `pong`
    Pong(PongPayload),
}

impl InboundEvent {
    /// Interprets a frame's payload according to its event name.
    pub fn from_frame(frame: RawFrame) -> Result<Self, AppError> {
        let RawFrame { event, data } = frame;
        let parsed = match event.as_str() {
            names::MESSAGE_SEND => Self::MessageSend(payload(&event, data)?),
            names::MESSAGE_READ => Self::MessageRead(payload(&event, data)?),
            names::CONVERSATION_READ => Self::ConversationRead(payload(&event, data)?),
            names::TYPING_START => Self::TypingStart(payload(&event, data)?),
            names::TYPING_STOP => Self::TypingStop(payload(&event, data)?),
            names::PRESENCE_CHECK => Self::PresenceCheck(payload(&event, data)?),
            names::PONG if data.is_null() => Self::Pong(PongPayload::default()),
            names::PONG => Self::Pong(payload(&event, data)?),
            other => {
                return Err(AppError::validation(format!("Unknown event '{other}'")));
            }
        };
        Ok(parsed)
    }

    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageSend(_) => names::MESSAGE_SEND,
            Self::MessageRead(_) => names::MESSAGE_READ,
            Self::ConversationRead(_) => names::CONVERSATION_READ,
            Self::TypingStart(_) => names::TYPING_START,
            Self::TypingStop(_) => names::TYPING_STOP,
            Self::PresenceCheck(_) => names::PRESENCE_CHECK,
            Self::Pong(_) => names::PONG,
        }
    }
}

fn payload<T>(event: &str, data: serde_json::Value) -> Result<T, AppError>
where
    T: DeserializeOwned + Validate,
{
    let value: T = serde_json::from_value(data)
        .map_err(|e| AppError::validation(format!("Invalid '{event}' payload: {e}")))?;
    value
        .validate()
        .map_err(|e| AppError::validation(format!("Invalid '{event}' payload: {e}")))?;
    Ok(value)
}

/// Events sent by the server to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundEvent {
    /// A message addressed to (or sent from another device of) this user.
    #[serde(rename = "message:new")]
    MessageNew(Message),
    /// Acknowledges a `message:send` on the originating connection.
    #[serde(rename = "message:sent")]
    MessageSent(Message),
    /// Current unread badge count.
    #[serde(rename = "unread:count")]
    UnreadCount {
        /// Unread messages addressed to the user.
        count: u64,
    },
    /// Someone started or stopped typing to this user.
    #[serde(rename = "typing:update", rename_all = "camelCase")]
    TypingUpdate {
        /// Who is typing.
        user_id: UserId,
        /// Whether they are typing now.
        is_typing: bool,
    },
    /// A watched user went online or offline.
    #[serde(rename = "user:status", rename_all = "camelCase")]
    UserStatus {
        /// Watched user.
        user_id: UserId,
        /// New status.
        status: PresenceState,
        /// When the user was last seen, for offline users.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_seen: Option<DateTime<Utc>>,
    },
    /// Reply to `presence:check`.
    #[serde(rename = "presence:status")]
    PresenceStatus {
        /// One entry per requested user, in request order.
        statuses: Vec<PresenceEntry>,
    },
    /// Server keepalive.
    #[serde(rename = "ping")]
    Ping {
        /// Server timestamp (ms since epoch).
        timestamp: i64,
    },
    /// A failure scoped to this connection.
    #[serde(rename = "error")]
    Error {
        /// Machine-readable code.
        code: String,
        /// Description.
        message: String,
        /// Inbound event that failed, when known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event: Option<String>,
    },
}

impl OutboundEvent {
    /// Builds an `error` event from an application error.
    pub fn error(err: &AppError, event: Option<&str>) -> Self {
        Self::Error {
            code: err.kind.code().to_string(),
            message: err.message.clone(),
            event: event.map(str::to_string),
        }
    }

    /// Builds a `ping` stamped with the current time.
    pub fn ping() -> Self {
        Self::Ping {
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageNew(_) => "message:new",
            Self::MessageSent(_) => "message:sent",
            Self::UnreadCount { .. } => "unread:count",
            Self::TypingUpdate { .. } => "typing:update",
            Self::UserStatus { .. } => "user:status",
            Self::PresenceStatus { .. } => "presence:status",
            Self::Ping { .. } => "ping",
            Self::Error { .. } => "error",
        }
    }
}
