//! Connection Registry

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use super::{ConnectionHandle, ConnectionId};

/// Tracks every open connection by id
///
/// All access goes through the internal lock, which is never held while
/// sending to a connection.
#[derive(Debug, Default)]
pub struct Registry {
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `id`.
    ///
    /// Returns the handle that was replaced, if any. A replaced handle is
    /// orphaned: it receives nothing further and is not closed here.
    pub fn register(&self, id: ConnectionId, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let replaced = self.connections.write().insert(id.clone(), handle);
        debug!(connection_id = %id, replaced = replaced.is_some(), "Registered connection");
        replaced
    }

    /// Remove the entry for `id`. Absent ids are ignored.
    pub fn unregister(&self, id: &ConnectionId) -> Option<ConnectionHandle> {
        let removed = self.connections.write().remove(id);
        if removed.is_some() {
            debug!(connection_id = %id, "Unregistered connection");
        }
        removed
    }

    /// Remove the entry for `id` only if it still belongs to `handle`.
    ///
    /// Returns true if an entry was removed.
    pub fn unregister_handle(&self, id: &ConnectionId, handle: &ConnectionHandle) -> bool {
        let mut connections = self.connections.write();
        match connections.get(id) {
            Some(current) if current.same_connection(handle) => {
                connections.remove(id);
                debug!(connection_id = %id, "Unregistered connection");
                true
            }
            _ => false,
        }
    }

    /// Every connection except `excluded`, as of this call
    pub fn snapshot_except(&self, excluded: &ConnectionId) -> Vec<(ConnectionId, ConnectionHandle)> {
        self.connections
            .read()
            .iter()
            .filter(|(id, _)| *id != excluded)
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.read().contains_key(id)
    }

    /// Ids of all open connections, sorted
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.connections.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Payload;

    #[test]
    fn test_register_and_snapshot_excludes_sender() {
        let registry = Registry::new();
        let (a, _rx_a) = ConnectionHandle::channel();
        let (b, _rx_b) = ConnectionHandle::channel();
        let (c, _rx_c) = ConnectionHandle::channel();

        registry.register("1".into(), a.clone());
        registry.register("2".into(), b.clone());
        registry.register("3".into(), c.clone());
        assert_eq!(registry.len(), 3);

        let others = registry.snapshot_except(&"1".into());
        assert_eq!(others.len(), 2);
        assert!(others.iter().all(|(_, h)| !h.same_connection(&a)));
        assert!(others.iter().any(|(id, h)| id.as_str() == "2" && h.same_connection(&b)));
        assert!(others.iter().any(|(id, h)| id.as_str() == "3" && h.same_connection(&c)));
    }

    #[test]
    fn test_snapshot_of_unknown_id_returns_everyone() {
        let registry = Registry::new();
        let (a, _rx_a) = ConnectionHandle::channel();
        registry.register("1".into(), a);

        assert_eq!(registry.snapshot_except(&"9".into()).len(), 1);
        assert!(Registry::new().snapshot_except(&"1".into()).is_empty());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = Registry::new();
        let (a, _rx_a) = ConnectionHandle::channel();
        registry.register("1".into(), a);

        assert!(registry.unregister(&"1".into()).is_some());
        assert!(registry.unregister(&"1".into()).is_none());
        assert!(registry.unregister(&"never".into()).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_register_overwrites_and_orphans_old_handle() {
        let registry = Registry::new();
        let (old, mut old_rx) = ConnectionHandle::channel();
        let (new, mut new_rx) = ConnectionHandle::channel();

        assert!(registry.register("1".into(), old.clone()).is_none());
        let replaced = registry.register("1".into(), new.clone()).unwrap();
        assert!(replaced.same_connection(&old));
        assert_eq!(registry.len(), 1);

        for (_, handle) in registry.snapshot_except(&"2".into()) {
            handle.send(Payload::from("hi")).unwrap();
        }
        assert_eq!(new_rx.recv().await, Some(Payload::from("hi")));
        assert!(old_rx.try_recv().is_err());
    }

    #[test]
    fn test_unregister_handle_keeps_newer_entry() {
        let registry = Registry::new();
        let (old, _old_rx) = ConnectionHandle::channel();
        let (new, _new_rx) = ConnectionHandle::channel();

        registry.register("1".into(), old.clone());
        registry.register("1".into(), new.clone());

        assert!(!registry.unregister_handle(&"1".into(), &old));
        assert!(registry.contains(&"1".into()));
        assert!(registry.unregister_handle(&"1".into(), &new));
        assert!(!registry.contains(&"1".into()));
    }

    #[test]
    fn test_ids_are_sorted() {
        let registry = Registry::new();
        for id in ["3", "1", "2"] {
            let (handle, _rx) = ConnectionHandle::channel();
            registry.register(id.into(), handle);
        }
        let ids: Vec<String> = registry.ids().iter().map(|id| id.to_string()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }
}
