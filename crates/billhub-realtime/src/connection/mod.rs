//! WebSocket connection management: handles, registry, heartbeat.

pub mod handle;
pub mod heartbeat;
pub mod registry;

pub use handle::ConnectionHandle;
pub use registry::ConnectionRegistry;
