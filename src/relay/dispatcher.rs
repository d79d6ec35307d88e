//! Relay Dispatcher

use std::sync::Arc;

use tracing::{debug, warn};

use crate::connection::{ConnectionHandle, ConnectionId, Payload, Registry};
use crate::metrics::RelayMetrics;
use super::Session;

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients the payload was queued to
    pub delivered: usize,
    /// Recipients whose send failed and were skipped
    pub failed: usize,
}

/// Routes each inbound message to every other open connection
#[derive(Clone)]
pub struct RelayDispatcher {
    registry: Arc<Registry>,
    metrics: Arc<RelayMetrics>,
}

impl RelayDispatcher {
    pub fn new(registry: Arc<Registry>, metrics: Arc<RelayMetrics>) -> Self {
        Self { registry, metrics }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    /// Start the lifecycle of a freshly accepted connection
    pub fn open_session(&self, id: ConnectionId, handle: ConnectionHandle) -> Session {
        Session::new(id, handle, self.clone())
    }

    pub(crate) fn register(&self, id: &ConnectionId, handle: ConnectionHandle) {
        let replaced = self.registry.register(id.clone(), handle);
        if replaced.is_some() {
            warn!(connection_id = %id, "Connection id already registered, replacing previous connection");
        }
        self.metrics.connection_opened(replaced.is_some());
    }

    pub(crate) fn unregister(&self, id: &ConnectionId, handle: &ConnectionHandle) {
        if self.registry.unregister_handle(id, handle) {
            self.metrics.connection_closed();
        } else {
            debug!(connection_id = %id, "Connection was no longer registered");
        }
    }

    /// Queue `payload` to every open connection except `from`.
    ///
    /// Sends never wait on recipients. A failed send is logged and skipped.
    pub fn broadcast(&self, from: &ConnectionId, payload: &Payload) -> BroadcastReport {
        self.metrics.message_received();

        let mut report = BroadcastReport::default();
        for (recipient, handle) in self.registry.snapshot_except(from) {
            match handle.send(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    debug!(connection_id = %recipient, sender = %from, error = %e, "Skipping recipient");
                    report.failed += 1;
                }
            }
        }

        self.metrics.record_broadcast(report.delivered, report.failed);
        debug!(
            connection_id = %from,
            bytes = payload.len(),
            delivered = report.delivered,
            failed = report.failed,
            "Broadcast message"
        );
        report
    }
}
