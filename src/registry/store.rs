//! Session registry implementation

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::entry::SessionEntry;
use crate::error::SessionTeardownError;
use crate::session::SessionId;
use crate::transport::PeerTransport;

/// Outcome of draining the registry
#[derive(Debug, Default)]
pub struct DrainReport {
    /// Sessions whose transport closed cleanly
    pub closed: usize,
    /// Sessions whose transport failed to close
    pub failed: Vec<SessionTeardownError>,
}

impl DrainReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Registry of live sessions
///
/// Thread-safe via `RwLock`.
pub struct SessionRegistry<T> {
    sessions: RwLock<HashMap<SessionId, Arc<SessionEntry<T>>>>,
}

impl<T: PeerTransport> SessionRegistry<T> {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a session
    pub async fn add(&self, entry: SessionEntry<T>) -> Arc<SessionEntry<T>> {
        let entry = Arc::new(entry);
        let count = {
            let mut sessions = self.sessions.write().await;
            sessions.insert(entry.id, Arc::clone(&entry));
            sessions.len()
        };

        tracing::debug!(
            session_id = %entry.id,
            role = %entry.role,
            sessions = count,
            "Session registered"
        );
        entry
    }

    /// Remove a session; returns its entry if it was still registered
    pub async fn remove(&self, id: SessionId) -> Option<Arc<SessionEntry<T>>> {
        let removed = self.sessions.write().await.remove(&id);
        if removed.is_some() {
            tracing::debug!(session_id = %id, "Session unregistered");
        }
        removed
    }

    pub async fn get(&self, id: SessionId) -> Option<Arc<SessionEntry<T>>> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn contains(&self, id: SessionId) -> bool {
        self.sessions.read().await.contains_key(&id)
    }

    /// Number of registered sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// IDs of all registered sessions, ascending
    pub async fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.read().await.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Close every registered session concurrently
    ///
    /// The registry is emptied first. One session failing to close does
    /// not stop the others; every failure is collected in the report.
    pub async fn drain_all(&self) -> DrainReport {
        let sessions: Vec<_> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, entry)| entry).collect()
        };

        let mut report = DrainReport::default();
        if sessions.is_empty() {
            return report;
        }

        tracing::info!(sessions = sessions.len(), "Draining sessions");

        let closing: Vec<_> = sessions
            .into_iter()
            .map(|entry| {
                let id = entry.id;
                (id, tokio::spawn(async move { entry.transport.close().await }))
            })
            .collect();

        for (id, handle) in closing {
            match handle.await {
                Ok(Ok(())) => report.closed += 1,
                Ok(Err(e)) => report.failed.push(SessionTeardownError {
                    session_id: id,
                    reason: e.to_string(),
                }),
                Err(e) => report.failed.push(SessionTeardownError {
                    session_id: id,
                    reason: format!("close task failed: {}", e),
                }),
            }
        }

        if report.is_clean() {
            tracing::info!(closed = report.closed, "All sessions closed");
        } else {
            tracing::warn!(
                closed = report.closed,
                failed = report.failed.len(),
                "Some sessions failed to close"
            );
            for failure in &report.failed {
                tracing::debug!(error = %failure, "Session teardown failure");
            }
        }

        report
    }
}

impl<T: PeerTransport> Default for SessionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::{mpsc, watch};

    use super::*;
    use crate::session::{SessionPhase, SessionRole};
    use crate::transport::{MemoryPeer, MemoryTransport, MemoryTransportFactory, TransportEvent, TransportFactory};

    struct Fixture {
        registry: SessionRegistry<MemoryTransport>,
        peers: Vec<MemoryPeer>,
        _events: Vec<mpsc::Receiver<TransportEvent>>,
        _phases: Vec<watch::Sender<SessionPhase>>,
    }

    async fn fixture(count: u64) -> Fixture {
        let (factory, mut peer_rx) = MemoryTransportFactory::new();
        let registry = SessionRegistry::new();
        let mut fixture = Fixture {
            registry,
            peers: Vec::new(),
            _events: Vec::new(),
            _phases: Vec::new(),
        };

        for n in 1..=count {
            let id = SessionId(n);
            let (events_tx, events_rx) = mpsc::channel(4);
            let transport = Arc::new(factory.create(id, events_tx));
            let (phase_tx, phase_rx) = watch::channel(SessionPhase::Active);
            fixture
                .registry
                .add(SessionEntry::new(id, SessionRole::Observer, transport, phase_rx))
                .await;
            fixture.peers.push(peer_rx.try_recv().unwrap());
            fixture._events.push(events_rx);
            fixture._phases.push(phase_tx);
        }
        fixture
    }

    #[tokio::test]
    async fn test_register_and_unregister() {
        let fixture = fixture(2).await;
        let registry = &fixture.registry;
        assert_eq!(registry.len().await, 2);
        assert_eq!(registry.ids().await, vec![SessionId(1), SessionId(2)]);

        let entry = registry.get(SessionId(1)).await.unwrap();
        assert_eq!(entry.phase(), SessionPhase::Active);

        assert!(registry.remove(SessionId(1)).await.is_some());
        assert!(registry.remove(SessionId(1)).await.is_none());
        assert!(!registry.contains(SessionId(1)).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_drain_collects_every_failure() {
        let fixture = fixture(10).await;
        for n in [2usize, 5, 9] {
            fixture.peers[n - 1].fail_close();
        }

        let report = fixture.registry.drain_all().await;

        assert_eq!(report.closed, 7);
        let mut failed: Vec<_> = report.failed.iter().map(|e| e.session_id).collect();
        failed.sort();
        assert_eq!(failed, vec![SessionId(2), SessionId(5), SessionId(9)]);

        assert!(fixture.registry.is_empty().await);
        assert!(fixture.peers.iter().all(MemoryPeer::is_closed));
    }

    #[tokio::test]
    async fn test_drain_empty_registry() {
        let registry: SessionRegistry<MemoryTransport> = SessionRegistry::new();
        let report = registry.drain_all().await;
        assert!(report.is_clean());
        assert_eq!(report.closed, 0);
    }
}
