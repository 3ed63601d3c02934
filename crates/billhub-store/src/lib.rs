//! # billhub-store
//!
//! The message persistence seam consumed by the real-time relay, plus an
//! in-memory implementation used for development and tests.

pub mod memory;
pub mod store;

pub use memory::MemoryMessageStore;
pub use store::MessageStore;
