//! # billhub-entity
//!
//! Domain entities shared between the message store and the real-time
//! layer.

pub mod booking;
pub mod message;

pub use booking::Booking;
pub use message::{Message, NewMessage};
