//! Relay Module
//!
//! Fans each client message out to every other open connection.

pub mod dispatcher;
pub mod session;

pub use dispatcher::{BroadcastReport, RelayDispatcher};
pub use session::{Session, SessionEvent, SessionState};
