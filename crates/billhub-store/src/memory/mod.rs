//! In-memory message store.

pub mod store;

pub use store::MemoryMessageStore;
