//! Connection records and the live-connection registry.
//!
//! Every accepted connection is tracked by a `ConnectionRecord` for as long
//! as its handler task runs, so shutdown can enumerate in-flight handlers
//! and cancel them. The registry lock guards only map operations and is
//! never held across an await point.

use slab::Slab;
use std::net::SocketAddr;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Current state of a connection handler.
#[derive(Debug)]
pub enum ConnState {
    /// Reading chunks from the socket and appending them to the shared log.
    Receiving,
    /// A newline-terminated message completed; echoing the log back.
    Responding {
        /// Snapshot of the full log content to write to the socket.
        echo: Vec<u8>,
    },
    /// Terminal state: peer closed, I/O failure, or cancellation.
    Closed,
}

/// A live client connection.
#[derive(Debug)]
pub struct ConnectionRecord {
    /// Peer address, for log events.
    pub peer: SocketAddr,
    /// Cancellation handle observed by the connection's handler task.
    pub cancel: CancellationToken,
}

impl ConnectionRecord {
    /// Create a record for a newly accepted connection.
    pub fn new(peer: SocketAddr, cancel: CancellationToken) -> Self {
        Self { peer, cancel }
    }
}

/// Registry of live connections using slab allocation.
///
/// Provides O(1) insert and remove under a single lock. A record is present
/// exactly while its handler task is running or about to start; ids of
/// removed records may be reused, but no two live records share one.
pub struct ConnectionRegistry {
    connections: Mutex<Slab<ConnectionRecord>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(Slab::new()),
        }
    }

    /// Insert a record, returning the id that identifies it until removal.
    pub fn register(&self, record: ConnectionRecord) -> usize {
        self.connections.lock().unwrap().insert(record)
    }

    /// Remove a record by id.
    ///
    /// Removing an id that is no longer present is a no-op, so cleanup
    /// paths can run unconditionally.
    pub fn unregister(&self, id: usize) -> Option<ConnectionRecord> {
        self.connections.lock().unwrap().try_remove(id)
    }

    /// Cancel every live connection.
    ///
    /// Tokens are snapshotted under the lock and cancelled after it is
    /// released; records stay registered until their handlers exit and
    /// unregister themselves.
    pub fn cancel_all(&self) {
        let tokens: Vec<CancellationToken> = self
            .connections
            .lock()
            .unwrap()
            .iter()
            .map(|(_, record)| record.cancel.clone())
            .collect();

        for token in tokens {
            token.cancel();
        }
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    /// Check if no connections are live.
    pub fn is_empty(&self) -> bool {
        self.connections.lock().unwrap().is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes a connection's registry entry when dropped.
///
/// Handler tasks hold one of these so the entry is released on every exit
/// path, including cancellation mid-read.
pub struct ConnectionGuard<'a> {
    registry: &'a ConnectionRegistry,
    id: usize,
}

impl<'a> ConnectionGuard<'a> {
    /// Tie the registry entry `id` to this guard's lifetime.
    pub fn new(registry: &'a ConnectionRegistry, id: usize) -> Self {
        Self { registry, id }
    }
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        if let Some(record) = self.registry.unregister(self.id) {
            debug!(conn = self.id, peer = %record.peer, "Unregistered connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ConnectionRecord {
        ConnectionRecord::new("127.0.0.1:4000".parse().unwrap(), CancellationToken::new())
    }

    #[test]
    fn test_register_and_unregister() {
        let registry = ConnectionRegistry::new();

        let id1 = registry.register(record());
        let id2 = registry.register(record());
        assert_ne!(id1, id2);
        assert_eq!(registry.len(), 2);

        assert!(registry.unregister(id1).is_some());
        assert_eq!(registry.len(), 1);

        // Removing an already removed id is a no-op
        assert!(registry.unregister(id1).is_none());
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(id2).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_guard_releases_entry_on_drop() {
        let registry = ConnectionRegistry::new();
        let id = registry.register(record());

        {
            let _guard = ConnectionGuard::new(&registry, id);
            assert_eq!(registry.len(), 1);
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancel_all_hits_every_live_record() {
        let registry = ConnectionRegistry::new();

        let tokens: Vec<CancellationToken> =
            (0..3).map(|_| CancellationToken::new()).collect();
        for token in &tokens {
            registry.register(ConnectionRecord::new(
                "127.0.0.1:4000".parse().unwrap(),
                token.clone(),
            ));
        }

        registry.cancel_all();

        assert!(tokens.iter().all(|t| t.is_cancelled()));
        // Cancellation does not remove records; handlers do that on exit
        assert_eq!(registry.len(), 3);
    }
}
