//! Server Module
//!
//! One listening socket serving the relay endpoint, the static page and
//! the health and metrics probes.

pub mod api;
#[allow(clippy::module_inception)]
pub mod server;
pub mod socket;

pub use api::{create_router, AppState};
pub use server::RelayServer;
