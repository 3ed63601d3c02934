//! # billhub-realtime
//!
//! WebSocket messaging engine for BillHub: connection registry, presence
//! tracking, typing indicators and the chat message relay.

pub mod connection;
pub mod gateway;
pub mod message;
pub mod metrics;
pub mod presence;
pub mod relay;
pub mod server;
pub mod typing;

pub use server::RealtimeEngine;
