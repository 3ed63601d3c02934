//! WebSocket event types and frame validation.

pub mod types;
pub mod validator;

pub use types::{InboundEvent, OutboundEvent, RawFrame};
