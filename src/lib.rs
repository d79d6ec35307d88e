//! Signal Relay Library
//!
//! A WebSocket rendezvous server: every message a client sends is
//! broadcast unchanged to every other connected client. Peers use it to
//! swap session descriptions and candidates before connecting directly.

pub mod config;
pub mod connection;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod shutdown;

pub use config::Config;
pub use connection::{ConnectionHandle, ConnectionId, Payload, Registry};
pub use relay::{RelayDispatcher, Session, SessionEvent, SessionState};
pub use server::RelayServer;
pub use shutdown::ShutdownCoordinator;

/// Common error type for the relay server
pub type Result<T> = anyhow::Result<T>;
