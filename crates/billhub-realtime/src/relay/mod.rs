//! Chat message relay.

pub mod service;

pub use service::MessageRelay;
