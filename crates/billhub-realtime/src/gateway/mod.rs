//! WebSocket gateway plumbing independent of the HTTP framework.

pub mod dispatcher;
pub mod state;

pub use dispatcher::EventDispatcher;
pub use state::ConnectionState;
