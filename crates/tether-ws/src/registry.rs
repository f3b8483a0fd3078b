//! Registry of live connections.
//!
//! The registry maps [`ConnectionId`]s to [`ConnectionHandle`]s behind a
//! single mutex. The lock is only held for map operations, never while a
//! message is being queued or written, so a slow peer cannot stall the
//! accept loop or other connections.
//!
//! Connection tasks register right after the handshake and hold a
//! [`RegistrationGuard`], which unregisters them on every exit path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use metrics::{counter, gauge};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::connection::{ConnectionHandle, ConnectionId};
use crate::error::{WsError, WsResult};
use crate::message::Message;
use crate::shutdown::ShutdownSignal;

/// Counter of connections admitted to the registry.
pub const METRIC_REGISTERED: &str = "tether_connections_registered_total";
/// Counter of connections turned away by the registry.
pub const METRIC_REJECTED: &str = "tether_connections_rejected_total";
/// Gauge of live connections.
pub const METRIC_ACTIVE: &str = "tether_connections_active";
/// Counter of broadcast deliveries that failed.
pub const METRIC_BROADCAST_FAILURES: &str = "tether_broadcast_failures_total";

/// Registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Live connections.
    pub active_connections: usize,
    /// Connections ever registered.
    pub total_registered: usize,
    /// Registrations refused (duplicate, limit, shutdown).
    pub total_rejected: usize,
    /// Connections removed.
    pub total_removed: usize,
}

/// The set of live connections.
///
/// # Example
///
/// ```ignore
/// use tether_ws::{ConnectionRegistry, Message, RegistryConfig};
///
/// let registry = ConnectionRegistry::new(RegistryConfig::default());
/// let _guard = registry.register_guarded(conn.handle())?;
/// registry.broadcast(&Message::text("hello everyone"));
/// ```
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, ConnectionHandle>>,
    config: RegistryConfig,
    shutdown: ShutdownSignal,
    total_registered: AtomicUsize,
    total_rejected: AtomicUsize,
    total_removed: AtomicUsize,
}

impl ConnectionRegistry {
    /// Create a new registry.
    pub fn new(config: RegistryConfig) -> Arc<Self> {
        Self::with_shutdown(config, ShutdownSignal::new())
    }

    /// Create a registry that shares an existing shutdown signal.
    pub fn with_shutdown(config: RegistryConfig, shutdown: ShutdownSignal) -> Arc<Self> {
        Arc::new(Self {
            connections: Mutex::new(HashMap::new()),
            config,
            shutdown,
            total_registered: AtomicUsize::new(0),
            total_rejected: AtomicUsize::new(0),
            total_removed: AtomicUsize::new(0),
        })
    }

    /// Add a connection.
    ///
    /// Fails if the ID is already present, the connection limit is reached,
    /// or the registry is shutting down.
    pub fn register(&self, handle: ConnectionHandle) -> WsResult<()> {
        if self.shutdown.is_shutdown() {
            return Err(self.reject(WsError::connection_limit("registry is shutting down")));
        }

        let id = handle.id();
        let active = {
            let mut connections = self.connections.lock();
            if connections.contains_key(&id) {
                drop(connections);
                return Err(self.reject(WsError::already_registered(id.to_string())));
            }
            let max = self.config.max_connections;
            if max > 0 && connections.len() >= max {
                drop(connections);
                warn!(connection_id = %id, max, "connection limit reached");
                return Err(self.reject(WsError::connection_limit(format!(
                    "maximum connections ({max}) reached"
                ))));
            }
            connections.insert(id, handle);
            connections.len()
        };

        self.total_registered.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_REGISTERED).increment(1);
        gauge!(METRIC_ACTIVE).set(active as f64);
        info!(connection_id = %id, active, "connection registered");
        Ok(())
    }

    /// Add a connection and return a guard that removes it on drop.
    pub fn register_guarded(self: &Arc<Self>, handle: ConnectionHandle) -> WsResult<RegistrationGuard> {
        let id = handle.id();
        self.register(handle)?;
        Ok(RegistrationGuard {
            registry: Arc::clone(self),
            id,
        })
    }

    fn reject(&self, error: WsError) -> WsError {
        self.total_rejected.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_REJECTED).increment(1);
        error
    }

    /// Remove a connection. Removing an absent ID is a no-op.
    pub fn unregister(&self, id: &ConnectionId) -> Option<ConnectionHandle> {
        let (removed, active) = {
            let mut connections = self.connections.lock();
            let removed = connections.remove(id);
            (removed, connections.len())
        };

        if removed.is_some() {
            self.total_removed.fetch_add(1, Ordering::Relaxed);
            gauge!(METRIC_ACTIVE).set(active as f64);
            info!(connection_id = %id, active, "connection unregistered");
        }
        removed
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Check whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Check whether a connection is registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.lock().contains_key(id)
    }

    /// Get a connection's handle.
    pub fn get(&self, id: &ConnectionId) -> Option<ConnectionHandle> {
        self.connections.lock().get(id).cloned()
    }

    /// IDs of all live connections.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.lock().keys().copied().collect()
    }

    /// Queue a message for one connection.
    pub fn send_to(&self, id: &ConnectionId, message: Message) -> WsResult<()> {
        let handle = self
            .get(id)
            .ok_or_else(|| WsError::connection_not_found(id.to_string()))?;

        handle.send(message).inspect_err(|_| {
            self.unregister(id);
            handle.abort();
        })
    }

    /// Queue a message for every live connection.
    ///
    /// Delivery is best-effort: a connection that is closed, or whose queue
    /// is full because its peer stopped reading, is removed and aborted, and
    /// the rest still receive the message. Returns how many connections
    /// accepted it.
    pub fn broadcast(&self, message: &Message) -> usize {
        let snapshot: Vec<ConnectionHandle> = self.connections.lock().values().cloned().collect();

        let mut delivered = 0;
        for handle in snapshot {
            match handle.send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(connection_id = %handle.id(), error = %e, "broadcast delivery failed");
                    counter!(METRIC_BROADCAST_FAILURES).increment(1);
                    self.unregister(&handle.id());
                    handle.abort();
                }
            }
        }

        debug!(delivered, "broadcast complete");
        delivered
    }

    /// Get registry statistics.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            active_connections: self.count(),
            total_registered: self.total_registered.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
            total_removed: self.total_removed.load(Ordering::Relaxed),
        }
    }

    /// The shutdown signal shared with registered connections.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Check if shutdown has been triggered.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_shutdown()
    }

    /// Refuse new registrations and tell every connection to close.
    ///
    /// Returns the number of connections live at the time of the call.
    pub fn shutdown(&self) -> usize {
        let count = self.count();
        if !self.shutdown.is_shutdown() {
            info!(connections = count, "initiating shutdown");
            self.shutdown.trigger();
        }
        count
    }
}

/// Removes a connection from its registry when dropped.
#[derive(Debug)]
pub struct RegistrationGuard {
    registry: Arc<ConnectionRegistry>,
    id: ConnectionId,
}

impl RegistrationGuard {
    /// The guarded connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Command;
    use tokio::sync::mpsc::Receiver;

    fn registry(max: usize) -> Arc<ConnectionRegistry> {
        ConnectionRegistry::new(RegistryConfig::new().max_connections(max))
    }

    fn queued_text(rx: &mut Receiver<Command>) -> Option<String> {
        match rx.try_recv().ok()? {
            Command::Send(Message::Text(text)) => Some(text),
            _ => None,
        }
    }

    #[test]
    fn test_register_and_unregister() {
        let registry = registry(10);
        let (handle, _rx) = ConnectionHandle::test_pair(8);
        let id = handle.id();

        registry.register(handle).unwrap();
        assert_eq!(registry.count(), 1);
        assert!(registry.contains(&id));

        assert!(registry.unregister(&id).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = registry(10);
        let (handle, _rx) = ConnectionHandle::test_pair(8);
        let id = handle.id();
        registry.register(handle).unwrap();

        assert!(registry.unregister(&id).is_some());
        assert!(registry.unregister(&id).is_none());
        assert_eq!(registry.stats().total_removed, 1);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = registry(10);
        let (handle, _rx) = ConnectionHandle::test_pair(8);

        registry.register(handle.clone()).unwrap();
        let err = registry.register(handle).unwrap_err();
        assert!(matches!(err, WsError::AlreadyRegistered { .. }));
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.stats().total_rejected, 1);
    }

    #[test]
    fn test_connection_limit() {
        let registry = registry(2);
        let mut receivers = Vec::new();
        for _ in 0..2 {
            let (handle, rx) = ConnectionHandle::test_pair(8);
            receivers.push(rx);
            registry.register(handle).unwrap();
        }

        let (handle, _rx) = ConnectionHandle::test_pair(8);
        let err = registry.register(handle).unwrap_err();
        assert!(matches!(err, WsError::ConnectionLimitReached(_)));
    }

    #[test]
    fn test_zero_limit_is_unlimited() {
        let registry = registry(0);
        let mut receivers = Vec::new();
        for _ in 0..5 {
            let (handle, rx) = ConnectionHandle::test_pair(8);
            receivers.push(rx);
            registry.register(handle).unwrap();
        }
        assert_eq!(registry.count(), 5);
    }

    #[test]
    fn test_broadcast_reaches_everyone() {
        let registry = registry(10);
        let (a, mut rx_a) = ConnectionHandle::test_pair(8);
        let (b, mut rx_b) = ConnectionHandle::test_pair(8);
        registry.register(a).unwrap();
        registry.register(b).unwrap();

        assert_eq!(registry.broadcast(&Message::text("hi")), 2);
        assert_eq!(queued_text(&mut rx_a), Some("hi".to_string()));
        assert_eq!(queued_text(&mut rx_b), Some("hi".to_string()));
    }

    #[test]
    fn test_broadcast_prunes_dead_connection() {
        let registry = registry(10);
        let (alive, mut rx_alive) = ConnectionHandle::test_pair(8);
        let (dead, rx_dead) = ConnectionHandle::test_pair(8);
        let dead_id = dead.id();
        registry.register(alive).unwrap();
        registry.register(dead).unwrap();
        drop(rx_dead);

        assert_eq!(registry.broadcast(&Message::text("still here")), 1);
        assert_eq!(queued_text(&mut rx_alive), Some("still here".to_string()));
        assert!(!registry.contains(&dead_id));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_broadcast_prunes_full_queue() {
        let registry = registry(10);
        let (slow, _rx_slow) = ConnectionHandle::test_pair(2);
        let (fast, mut rx_fast) = ConnectionHandle::test_pair(8);
        let slow_id = slow.id();
        registry.register(slow.clone()).unwrap();
        registry.register(fast).unwrap();

        assert_eq!(registry.broadcast(&Message::text("one")), 2);
        assert_eq!(registry.broadcast(&Message::text("two")), 2);
        assert_eq!(queued_text(&mut rx_fast), Some("one".to_string()));
        assert_eq!(queued_text(&mut rx_fast), Some("two".to_string()));

        // The slow queue is full; the third message evicts it.
        assert_eq!(registry.broadcast(&Message::text("three")), 1);
        assert!(!registry.contains(&slow_id));
        assert!(slow.is_aborted());
        assert_eq!(queued_text(&mut rx_fast), Some("three".to_string()));
    }

    #[test]
    fn test_send_to_full_queue_fails() {
        let registry = registry(10);
        let (handle, _rx) = ConnectionHandle::test_pair(1);
        let id = handle.id();
        registry.register(handle.clone()).unwrap();

        registry.send_to(&id, Message::text("fits")).unwrap();
        let err = registry.send_to(&id, Message::text("overflow")).unwrap_err();
        assert!(matches!(err, WsError::SendFailed(_)));
        assert!(!registry.contains(&id));
        assert!(handle.is_aborted());
    }

    #[test]
    fn test_send_to_unknown_connection() {
        let registry = registry(10);
        let err = registry
            .send_to(&ConnectionId::new(), Message::text("x"))
            .unwrap_err();
        assert!(matches!(err, WsError::ConnectionNotFound { .. }));
    }

    #[test]
    fn test_guard_unregisters_on_drop() {
        let registry = registry(10);
        let (handle, _rx) = ConnectionHandle::test_pair(8);
        let guard = registry.register_guarded(handle).unwrap();
        let id = guard.id();
        assert!(registry.contains(&id));

        drop(guard);
        assert!(!registry.contains(&id));
    }

    #[test]
    fn test_shutdown_rejects_new_connections() {
        let registry = registry(10);
        let (handle, _rx) = ConnectionHandle::test_pair(8);
        registry.register(handle).unwrap();

        assert_eq!(registry.shutdown(), 1);
        assert!(registry.is_shutdown());
        assert!(registry.shutdown_signal().is_shutdown());

        let (late, _rx) = ConnectionHandle::test_pair(8);
        assert!(registry.register(late).is_err());
    }

    #[test]
    fn test_stats() {
        let registry = registry(10);
        let (handle, _rx) = ConnectionHandle::test_pair(8);
        let id = handle.id();
        registry.register(handle).unwrap();
        registry.unregister(&id);

        let stats = registry.stats();
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.total_registered, 1);
        assert_eq!(stats.total_removed, 1);
    }
}
