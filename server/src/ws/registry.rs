//! Connection registry: the authoritative set of live viewer connections.
//!
//! Membership is keyed by [`ConnectionId`]. Register and deregister take the
//! exclusive lock. Fan-out visits the set under the shared lock, collects the
//! connections that failed, and removes them afterwards under the exclusive
//! lock, so the map is never mutated while a shared-mode iteration is running.
//!
//! The lock is a `std::sync::RwLock`: every critical section is synchronous
//! and no guard is ever held across an `.await`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use axum::extract::ws::Message;
use tokio::sync::mpsc::error::TrySendError;

use super::{ConnectionId, ConnectionSender};

/// A registered viewer: its identity plus the sender of its outbound queue.
///
/// The registry holds the only sender. Dropping the entry closes the queue,
/// which makes the writer task close the socket.
#[derive(Debug)]
pub struct Viewer {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    tx: ConnectionSender,
}

impl Viewer {
    pub fn new(id: ConnectionId, peer: Option<SocketAddr>, tx: ConnectionSender) -> Self {
        Self { id, peer, tx }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Enqueue a frame without waiting.
    pub fn try_send(&self, msg: Message) -> Result<(), TrySendError<Message>> {
        self.tx.try_send(msg)
    }
}

/// Result of one [`ConnectionRegistry::visit_and_prune`] pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneReport {
    /// Connections for which the visitor succeeded.
    pub retained: usize,
    /// Connections removed because the visitor reported failure.
    pub pruned: Vec<ConnectionId>,
}

struct Inner {
    viewers: RwLock<HashMap<ConnectionId, Viewer>>,
    next_id: AtomicU64,
}

/// Shared handle to the set of live viewers. Clones refer to the same set.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<Inner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                viewers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Allocate an id for a new connection.
    pub fn next_id(&self) -> ConnectionId {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Add a viewer. Returns `false` and leaves the set untouched if a
    /// viewer with the same id is already registered.
    pub fn register(&self, viewer: Viewer) -> bool {
        let id = viewer.id;
        let mut viewers = self.write();

        if viewers.contains_key(&id) {
            return false;
        }
        viewers.insert(id, viewer);

        tracing::debug!(connection_id = id, connections = viewers.len(), "Connection registered");
        true
    }

    /// Remove a viewer. Absent ids are a no-op. Returns whether anything was removed.
    pub fn deregister(&self, id: ConnectionId) -> bool {
        let mut viewers = self.write();
        let removed = viewers.remove(&id).is_some();

        if removed {
            tracing::debug!(connection_id = id, connections = viewers.len(), "Connection unregistered");
        }
        removed
    }

    /// Call `visit` on every live viewer and remove those for which it
    /// returns `false`.
    ///
    /// Visiting happens under the shared lock so concurrent passes can
    /// overlap. Failed ids are collected and removed afterwards under the
    /// exclusive lock. A viewer registered after the shared lock is taken is
    /// not visited by this pass.
    pub fn visit_and_prune<F>(&self, mut visit: F) -> PruneReport
    where
        F: FnMut(&Viewer) -> bool,
    {
        let mut report = PruneReport::default();

        {
            let viewers = self.read();
            for viewer in viewers.values() {
                if visit(viewer) {
                    report.retained += 1;
                } else {
                    report.pruned.push(viewer.id);
                }
            }
        }

        if !report.pruned.is_empty() {
            let mut viewers = self.write();
            for id in &report.pruned {
                viewers.remove(id);
            }
            tracing::debug!(
                pruned = report.pruned.len(),
                connections = viewers.len(),
                "Pruned dead connections"
            );
        }

        report
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A visitor cannot leave the map half-updated, so a poisoned lock is
    // still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConnectionId, Viewer>> {
        self.inner
            .viewers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConnectionId, Viewer>> {
        self.inner
            .viewers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn viewer(registry: &ConnectionRegistry) -> (Viewer, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(8);
        (Viewer::new(registry.next_id(), None, tx), rx)
    }

    #[test]
    fn ids_are_unique() {
        let registry = ConnectionRegistry::new();
        let a = registry.next_id();
        let b = registry.next_id();
        assert_ne!(a, b);
    }

    #[test]
    fn register_and_deregister() {
        let registry = ConnectionRegistry::new();
        let (v, _rx) = viewer(&registry);
        let id = v.id();

        assert!(registry.register(v));
        assert!(registry.contains(id));
        assert_eq!(registry.len(), 1);

        assert!(registry.deregister(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_id_is_not_registered_twice() {
        let registry = ConnectionRegistry::new();
        let (tx1, _rx1) = mpsc::channel(1);
        let (tx2, _rx2) = mpsc::channel(1);

        assert!(registry.register(Viewer::new(7, None, tx1)));
        assert!(!registry.register(Viewer::new(7, None, tx2)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn deregister_absent_is_noop() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.deregister(42));

        let (v, _rx) = viewer(&registry);
        let id = v.id();
        registry.register(v);
        assert!(registry.deregister(id));
        assert!(!registry.deregister(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn visit_and_prune_removes_failures_only() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = viewer(&registry);
        let (b, _rx_b) = viewer(&registry);
        let (c, _rx_c) = viewer(&registry);
        let (a_id, b_id, c_id) = (a.id(), b.id(), c.id());
        registry.register(a);
        registry.register(b);
        registry.register(c);

        let mut visited = Vec::new();
        let report = registry.visit_and_prune(|v| {
            visited.push(v.id());
            v.id() != b_id
        });

        visited.sort_unstable();
        assert_eq!(visited, vec![a_id, b_id, c_id]);
        assert_eq!(report.retained, 2);
        assert_eq!(report.pruned, vec![b_id]);
        assert!(registry.contains(a_id));
        assert!(!registry.contains(b_id));
        assert!(registry.contains(c_id));

        // Pruned viewers are not visited again.
        let report = registry.visit_and_prune(|v| {
            assert_ne!(v.id(), b_id);
            true
        });
        assert_eq!(report.retained, 2);
        assert!(report.pruned.is_empty());
    }

    #[test]
    fn deregister_after_prune_is_noop() {
        let registry = ConnectionRegistry::new();
        let (v, _rx) = viewer(&registry);
        let id = v.id();
        registry.register(v);

        registry.visit_and_prune(|_| false);
        assert!(!registry.deregister(id));
    }

    #[test]
    fn clones_share_the_set() {
        let registry = ConnectionRegistry::new();
        let other = registry.clone();
        let (v, _rx) = viewer(&registry);
        registry.register(v);

        assert_eq!(other.len(), 1);
    }

    #[test]
    fn concurrent_churn_and_visits() {
        let registry = ConnectionRegistry::new();
        let mut handles = Vec::new();

        for _ in 0..4 {
            let registry = registry.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..200 {
                    let (tx, _rx) = mpsc::channel(1);
                    let id = registry.next_id();
                    registry.register(Viewer::new(id, None, tx));
                    registry.visit_and_prune(|_| true);
                    registry.deregister(id);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(registry.is_empty());
    }
}
