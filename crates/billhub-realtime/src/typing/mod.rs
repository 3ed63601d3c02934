//! Typing indicators with automatic expiry.

pub mod coordinator;

pub use coordinator::TypingCoordinator;
