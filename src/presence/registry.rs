//! Connection-counting presence registry

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Emitted when a principal goes from zero to one connection or back
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChanged {
    pub principal_id: String,
    pub is_online: bool,
}

/// Open-connection counts per principal with edge-triggered notification.
///
/// A principal is online while it has an entry; entries are created on the
/// first connection and removed when the last one closes. Each mutation runs
/// under the key's shard lock and publishes before releasing it, so events
/// for one principal are observed in mutation order.
pub struct PresenceRegistry {
    counts: DashMap<String, u32>,
    events: broadcast::Sender<StatusChanged>,
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl PresenceRegistry {
    /// `capacity` bounds each subscriber's backlog; slower subscribers lag
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            counts: DashMap::new(),
            events,
        }
    }

    /// Register one more open connection for `principal_id`
    pub fn add_connection(&self, principal_id: &str) {
        match self.counts.entry(principal_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let count = entry.get_mut();
                *count = count.saturating_add(1);
                trace!(principal = %principal_id, count = *count, "Connection added");
            }
            Entry::Vacant(entry) => {
                let _guard = entry.insert(1);
                debug!(principal = %principal_id, "Principal online");
                self.publish(principal_id, true);
            }
        }
    }

    /// Drop one open connection. Absent principals are ignored, so duplicate
    /// close notifications from the transport are harmless.
    pub fn remove_connection(&self, principal_id: &str) {
        let Entry::Occupied(mut entry) = self.counts.entry(principal_id.to_string()) else {
            trace!(principal = %principal_id, "Remove for absent principal ignored");
            return;
        };

        if *entry.get() > 1 {
            *entry.get_mut() -= 1;
            trace!(principal = %principal_id, count = *entry.get(), "Connection removed");
            return;
        }

        // Publish before the shard lock is released so a concurrent re-add
        // cannot emit its "online" ahead of this "offline".
        self.publish(principal_id, false);
        entry.remove();
        debug!(principal = %principal_id, "Principal offline");
    }

    /// Register a connection and get a guard that unregisters it on drop
    pub fn connect(self: &Arc<Self>, principal_id: &str) -> PresenceGuard {
        self.add_connection(principal_id);
        PresenceGuard {
            registry: Arc::clone(self),
            principal_id: principal_id.to_string(),
        }
    }

    pub fn is_online(&self, principal_id: &str) -> bool {
        self.counts.contains_key(principal_id)
    }

    pub fn connection_count(&self, principal_id: &str) -> u32 {
        self.counts.get(principal_id).map(|c| *c).unwrap_or(0)
    }

    /// Ids of all principals currently online, sorted
    pub fn online_principals(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.counts.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn online_count(&self) -> usize {
        self.counts.len()
    }

    /// Receive every status change emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChanged> {
        self.events.subscribe()
    }

    /// Invoke `listener` once per status change, in emission order.
    ///
    /// The listener runs on its own task and stops when the returned handle
    /// is aborted or the registry is dropped.
    pub fn on_status_change<F>(&self, mut listener: F) -> JoinHandle<()>
    where
        F: FnMut(StatusChanged) + Send + 'static,
    {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => listener(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Presence listener lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn publish(&self, principal_id: &str, is_online: bool) {
        // Err only means nobody is subscribed
        let _ = self.events.send(StatusChanged {
            principal_id: principal_id.to_string(),
            is_online,
        });
    }
}

/// One registered connection. Dropping it removes exactly that connection.
#[must_use = "dropping the guard immediately unregisters the connection"]
pub struct PresenceGuard {
    registry: Arc<PresenceRegistry>,
    principal_id: String,
}

impl PresenceGuard {
    pub fn principal_id(&self) -> &str {
        &self.principal_id
    }
}

impl Drop for PresenceGuard {
    fn drop(&mut self) {
        self.registry.remove_connection(&self.principal_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn drain(rx: &mut broadcast::Receiver<StatusChanged>) -> Vec<StatusChanged> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn changed(id: &str, is_online: bool) -> StatusChanged {
        StatusChanged {
            principal_id: id.into(),
            is_online,
        }
    }

    #[test]
    fn test_only_edges_emit() {
        let registry = PresenceRegistry::default();
        let mut rx = registry.subscribe();

        registry.add_connection("u");
        assert_eq!(drain(&mut rx), vec![changed("u", true)]);

        registry.add_connection("u");
        registry.add_connection("u");
        registry.remove_connection("u");
        registry.remove_connection("u");
        assert!(drain(&mut rx).is_empty());
        assert!(registry.is_online("u"));
        assert_eq!(registry.connection_count("u"), 1);

        registry.remove_connection("u");
        assert_eq!(drain(&mut rx), vec![changed("u", false)]);
        assert!(!registry.is_online("u"));
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let registry = PresenceRegistry::default();
        let mut rx = registry.subscribe();

        registry.remove_connection("ghost");
        registry.remove_connection("ghost");

        assert!(drain(&mut rx).is_empty());
        assert_eq!(registry.connection_count("ghost"), 0);
    }

    #[test]
    fn test_waiting_subscriber_woken_only_by_edges() {
        use tokio_test::{assert_pending, assert_ready, task};

        let registry = PresenceRegistry::default();
        let mut rx = registry.subscribe();
        let mut next = task::spawn(rx.recv());

        assert_pending!(next.poll());
        registry.remove_connection("ghost");
        assert_pending!(next.poll());

        registry.add_connection("u");
        assert!(next.is_woken());
        let event = assert_ready!(next.poll()).unwrap();
        assert_eq!(event, changed("u", true));
    }

    #[test]
    fn test_guard_removes_once() {
        let registry = Arc::new(PresenceRegistry::default());
        let mut rx = registry.subscribe();

        let first = registry.connect("u");
        let second = registry.connect("u");
        assert_eq!(first.principal_id(), "u");
        assert_eq!(registry.connection_count("u"), 2);

        drop(first);
        assert_eq!(registry.connection_count("u"), 1);
        drop(second);
        assert!(!registry.is_online("u"));

        assert_eq!(drain(&mut rx), vec![changed("u", true), changed("u", false)]);
    }

    #[test]
    fn test_online_principals_sorted() {
        let registry = PresenceRegistry::default();
        registry.add_connection("b");
        registry.add_connection("a");
        registry.add_connection("b");

        assert_eq!(registry.online_principals(), vec!["a", "b"]);
        assert_eq!(registry.online_count(), 2);
    }

    #[tokio::test]
    async fn test_listener_sees_events_in_order() {
        let registry = PresenceRegistry::default();
        let (tx, mut seen) = tokio::sync::mpsc::unbounded_channel();
        let handle = registry.on_status_change(move |event| {
            let _ = tx.send(event);
        });

        registry.add_connection("a");
        registry.add_connection("b");
        registry.remove_connection("a");

        let mut got = Vec::new();
        for _ in 0..3 {
            let event = tokio::time::timeout(Duration::from_secs(1), seen.recv())
                .await
                .unwrap()
                .unwrap();
            got.push(event);
        }
        assert_eq!(
            got,
            vec![changed("a", true), changed("b", true), changed("a", false)]
        );
        handle.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_churn_balances() {
        let registry = Arc::new(PresenceRegistry::new(16_384));
        let mut rx = registry.subscribe();

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    for _ in 0..100 {
                        let _guard = registry.connect("shared");
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert!(!registry.is_online("shared"));
        assert_eq!(registry.connection_count("shared"), 0);

        // Edges must alternate online/offline, starting online and ending offline
        let events = drain(&mut rx);
        assert!(!events.is_empty());
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.is_online, i % 2 == 0);
        }
        assert!(!events.last().unwrap().is_online);
    }
}
