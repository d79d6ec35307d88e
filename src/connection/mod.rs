//! Connection Module
//!
//! Connection identifiers, send handles and the registry of open connections.

pub mod handle;
pub mod registry;

pub use handle::{ConnectionHandle, ConnectionId, Payload, DEFAULT_OUTBOUND_CAPACITY};
pub use registry::Registry;
