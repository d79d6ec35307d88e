//! Relay Session

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::connection::{ConnectionHandle, ConnectionId, Payload};
use super::{BroadcastReport, RelayDispatcher};

/// Lifecycle state of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
}

/// Transport events that drive a session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The transport accepted the connection
    Accept,
    /// The client sent a message
    Message(Payload),
    /// The client went away (peer close or transport error)
    Close,
}

/// State machine for one client connection.
///
/// `Connecting` moves to `Open` on `Accept`, which registers the
/// connection. Each `Message` while `Open` is broadcast to every other
/// connection. `Close` retires the session for good. Events that do not
/// apply to the current state are ignored.
///
/// Dropping an open session unregisters it.
pub struct Session {
    id: ConnectionId,
    handle: ConnectionHandle,
    state: SessionState,
    dispatcher: RelayDispatcher,
    start_time: Instant,
    messages_in: u64,
    bytes_in: u64,
}

impl Session {
    pub(crate) fn new(id: ConnectionId, handle: ConnectionHandle, dispatcher: RelayDispatcher) -> Self {
        debug!(connection_id = %id, "Creating new relay session");

        Self {
            id,
            handle,
            state: SessionState::Connecting,
            dispatcher,
            start_time: Instant::now(),
            messages_in: 0,
            bytes_in: 0,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn messages_in(&self) -> u64 {
        self.messages_in
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    /// Feed one event and return the resulting state
    pub fn handle_event(&mut self, event: SessionEvent) -> SessionState {
        match (self.state, event) {
            (SessionState::Connecting, SessionEvent::Accept) => {
                self.dispatcher.register(&self.id, self.handle.clone());
                self.state = SessionState::Open;
                info!(connection_id = %self.id, "connected");
            }
            (SessionState::Connecting, SessionEvent::Close) => {
                self.state = SessionState::Closed;
                debug!(connection_id = %self.id, "Connection closed before it was accepted");
            }
            (SessionState::Open, SessionEvent::Message(payload)) => {
                self.relay(&payload);
            }
            (SessionState::Open, SessionEvent::Close) => {
                self.close();
            }
            (state, event) => {
                debug!(connection_id = %self.id, ?state, ?event, "Ignoring event");
            }
        }
        self.state
    }

    fn relay(&mut self, payload: &Payload) -> BroadcastReport {
        self.messages_in += 1;
        self.bytes_in += payload.len() as u64;
        self.dispatcher.broadcast(&self.id, payload)
    }

    fn close(&mut self) {
        self.dispatcher.unregister(&self.id, &self.handle);
        self.state = SessionState::Closed;
        self.log_stats();
    }

    /// Log session statistics
    pub fn log_stats(&self) {
        info!(
            connection_id = %self.id,
            duration_ms = self.duration().as_millis() as u64,
            messages_in = self.messages_in,
            bytes_in = self.bytes_in,
            "Relay session closed"
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state == SessionState::Open {
            self.close();
        }
    }
}
