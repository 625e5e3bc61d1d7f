//! Connection registry.
//!
//! The authoritative set of live connections, keyed by [`ConnectionId`].
//! Presence in the map means the connection's receive loop has not yet
//! observed termination.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           ConnectionRegistry            │
//! │        Mutex<FxHashMap<Id, Handle>>     │
//! │  ┌─────────────────────────────────┐    │
//! │  │ conn-1 → ConnectionHandle       │    │
//! │  │ conn-2 → ConnectionHandle       │    │
//! │  │ conn-3 → ConnectionHandle       │    │
//! │  └─────────────────────────────────┘    │
//! └───────────────┬─────────────────────────┘
//!                 │ snapshot() (lock released before return)
//!                 ▼
//!        Vec<ConnectionHandle> ──► fan-out
//! ```
//!
//! Every operation holds the lock only for the map operation itself, never
//! across I/O.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::identifiers::ConnectionId;
use crate::transport::ConnectionHandle;

// ============================================================================
// ConnectionRegistry
// ============================================================================

/// Concurrency-safe set of live connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<FxHashMap<ConnectionId, ConnectionHandle>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a connection.
    ///
    /// Returns `false` and leaves the existing entry untouched if the ID is
    /// already registered.
    pub fn add(&self, handle: ConnectionHandle) -> bool {
        let id = handle.id();
        let inserted = {
            let mut connections = self.connections.lock();
            if connections.contains_key(&id) {
                false
            } else {
                connections.insert(id, handle);
                true
            }
        };

        trace!(connection = %id, inserted, "Registry add");
        inserted
    }

    /// Removes a connection. No-op if absent.
    pub fn remove(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        let removed = self.connections.lock().remove(&id);
        trace!(connection = %id, removed = removed.is_some(), "Registry remove");
        removed
    }

    /// Returns a point-in-time copy of all registered connections.
    ///
    /// The lock is released before this returns; the snapshot can be
    /// iterated while other connections join or leave.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ConnectionHandle> {
        self.connections.lock().values().cloned().collect()
    }

    /// Returns `true` if the ID is registered.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.lock().contains_key(&id)
    }

    /// Number of registered connections.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    /// Returns `true` if no connection is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
