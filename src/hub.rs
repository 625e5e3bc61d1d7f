//! Broadcast hub.
//!
//! Owns the [`ConnectionRegistry`], runs one receive loop per connection and
//! fans each received message out to every other live connection.
//!
//! # Connection Lifecycle
//!
//! ```text
//!   register ──► Active ──(EOF / error / oversize / close)──► Closing ──► Closed
//!                  │                                            │
//!                  └─ receive() ─► broadcast()                  └─ remove + close (once)
//! ```
//!
//! `Closing` is driven by a drop guard, so deregistration and close happen
//! exactly once on every exit path, including task cancellation.
//!
//! # Fan-out
//!
//! Each peer has a bounded outbound queue drained by its own writer task.
//! [`BroadcastHub::broadcast`] queues the message for every peer with room
//! without waiting. Peers whose queue is full are then waited on together,
//! which throttles the originating receive loop to the pace of its readers.
//! A peer whose queue stays full for `send_timeout` is treated as stuck: it
//! loses the message and is closed, so it can hold up a sender only once.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::RelayConfig;
use crate::error::Error;
use crate::identifiers::ConnectionId;
use crate::message::Message;
use crate::registry::ConnectionRegistry;
use crate::transport::{ConnectionHandle, Enqueue, MessageSink, MessageSource};

// ============================================================================
// HubStats
// ============================================================================

/// Hub-wide counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Connections currently registered.
    pub connections: usize,
    /// Messages received from clients.
    pub received: u64,
    /// Per-peer sends queued by fan-out.
    pub dispatched: u64,
    /// Per-peer sends dropped by fan-out.
    pub dropped: u64,
    /// Peers closed for not draining their queue within `send_timeout`.
    pub evicted: u64,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    dispatched: AtomicU64,
    dropped: AtomicU64,
    evicted: AtomicU64,
}

// ============================================================================
// Session
// ============================================================================

/// Removes the connection from the registry and closes it when dropped.
struct Deregister {
    registry: Arc<ConnectionRegistry>,
    handle: ConnectionHandle,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        let id = self.handle.id();
        if self.registry.remove(id).is_some() {
            debug!(connection = %id, "Connection deregistered");
        }
        self.handle.close();
    }
}

/// A registered connection whose receive loop has not run yet.
struct Session {
    guard: Deregister,
    writer: JoinHandle<()>,
}

// ============================================================================
// BroadcastHub
// ============================================================================

/// Relays every received message to all other connections.
///
/// # Example
///
/// ```ignore
/// let hub = Arc::new(BroadcastHub::new(&RelayConfig::default()));
///
/// let (client, sink, source) = ws_relay::transport::channel::pair();
/// let (id, task) = hub.spawn(None, sink, source);
/// ```
#[derive(Debug)]
pub struct BroadcastHub {
    registry: Arc<ConnectionRegistry>,
    max_message_size: usize,
    outbound_capacity: usize,
    send_timeout: Duration,
    shutdown: AtomicBool,
    counters: Counters,
}

impl BroadcastHub {
    /// Creates a hub with the limits from `config`.
    #[must_use]
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            max_message_size: config.max_message_size,
            outbound_capacity: config.outbound_capacity,
            send_timeout: config.send_timeout(),
            shutdown: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    /// Returns the registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Number of registered connections.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Returns the hub counters.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.registry.len(),
            received: self.counters.received.load(Ordering::Relaxed),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// BroadcastHub - Registration
// ============================================================================

impl BroadcastHub {
    /// Registers a connection and runs its receive loop on a new task.
    ///
    /// The connection is a registry member when this returns. The task
    /// finishes after the connection is deregistered and its transport closed.
    pub fn spawn<W, R>(
        self: &Arc<Self>,
        peer_addr: Option<SocketAddr>,
        sink: W,
        source: R,
    ) -> (ConnectionId, JoinHandle<()>)
    where
        W: MessageSink,
        R: MessageSource,
    {
        let session = self.register(peer_addr, sink);
        let id = session.guard.handle.id();

        let hub = Arc::clone(self);
        let task = tokio::spawn(async move { hub.run(session, source).await });

        (id, task)
    }

    /// Registers a connection and runs its receive loop to completion.
    ///
    /// Returns once the connection is deregistered and its transport closed.
    pub async fn serve<W, R>(&self, peer_addr: Option<SocketAddr>, sink: W, source: R)
    where
        W: MessageSink,
        R: MessageSource,
    {
        let session = self.register(peer_addr, sink);
        self.run(session, source).await;
    }

    fn register<W: MessageSink>(&self, peer_addr: Option<SocketAddr>, sink: W) -> Session {
        let (handle, writer) =
            ConnectionHandle::channel(ConnectionId::next(), peer_addr, self.outbound_capacity);
        let writer = tokio::spawn(writer.run(sink));

        self.registry.add(handle.clone());

        info!(
            connection = %handle.id(),
            ?peer_addr,
            connections = self.registry.len(),
            "Connection registered"
        );

        // Lost a race with shutdown(): the loop exits straight away.
        if self.shutdown.load(Ordering::SeqCst) {
            handle.close();
        }

        Session {
            guard: Deregister {
                registry: Arc::clone(&self.registry),
                handle,
            },
            writer,
        }
    }

    async fn run<R: MessageSource>(&self, session: Session, source: R) {
        let Session { guard, writer } = session;
        let id = guard.handle.id();

        self.receive_loop(&guard.handle, source).await;

        // Closing
        drop(guard);

        if let Err(e) = writer.await {
            warn!(connection = %id, error = %e, "Writer task failed");
        }

        info!(connection = %id, "Connection closed");
    }

    async fn receive_loop<R: MessageSource>(&self, handle: &ConnectionHandle, mut source: R) {
        let id = handle.id();
        let mut closed = handle.closed_signal();

        if *closed.borrow_and_update() {
            return;
        }

        loop {
            let received = tokio::select! {
                biased;

                _ = closed.changed() => {
                    debug!(connection = %id, "Connection closed locally");
                    break;
                }

                received = source.receive() => received,
            };

            match received {
                Ok(Some(message)) => {
                    if message.len() > self.max_message_size {
                        let e = Error::message_too_large(message.len(), self.max_message_size);
                        warn!(connection = %id, error = %e, "Receive failed");
                        break;
                    }

                    self.counters.received.fetch_add(1, Ordering::Relaxed);

                    tokio::select! {
                        biased;

                        _ = closed.changed() => {
                            debug!(connection = %id, "Connection closed during fan-out");
                            break;
                        }

                        _ = self.broadcast(id, &message) => {}
                    }
                }

                Ok(None) => {
                    debug!(connection = %id, "Peer disconnected");
                    break;
                }

                Err(e) => {
                    warn!(connection = %id, error = %e, "Receive failed");
                    break;
                }
            }
        }
    }
}

// ============================================================================
// BroadcastHub - Fan-out
// ============================================================================

impl BroadcastHub {
    /// Queues `message` for every registered connection except `origin`.
    ///
    /// Returns the number of peers the message was queued for. Peers with
    /// room are served first without waiting; full peers are then waited on
    /// concurrently for at most `send_timeout`. A peer still full after that
    /// is evicted. Failures never propagate to the caller.
    pub async fn broadcast(&self, origin: ConnectionId, message: &Message) -> usize {
        let peers = self.registry.snapshot();
        let mut dispatched = 0;
        let mut dropped = 0;
        let mut congested = Vec::new();

        for peer in peers.iter().filter(|peer| peer.id() != origin) {
            match peer.try_enqueue(message.clone()) {
                Enqueue::Queued => dispatched += 1,
                Enqueue::Full(message) => congested.push((peer, message)),
                Enqueue::Closed => {
                    dropped += 1;
                    debug!(origin = %origin, target = %peer.id(), "Skipped closed peer");
                }
            }
        }

        if !congested.is_empty() {
            trace!(origin = %origin, peers = congested.len(), "Waiting on full queues");

            let sends = congested.into_iter().map(|(peer, message)| async move {
                (peer, peer.send_timeout(message, self.send_timeout).await)
            });

            for (peer, sent) in join_all(sends).await {
                match sent {
                    Ok(()) => dispatched += 1,
                    Err(e @ Error::QueueFull { .. }) => {
                        dropped += 1;
                        self.evict(origin, peer, &e);
                    }
                    Err(e) => {
                        dropped += 1;
                        debug!(
                            origin = %origin,
                            target = %peer.id(),
                            error = %e,
                            "Dropped message for peer"
                        );
                    }
                }
            }
        }

        self.counters
            .dispatched
            .fetch_add(dispatched as u64, Ordering::Relaxed);
        self.counters
            .dropped
            .fetch_add(dropped as u64, Ordering::Relaxed);

        trace!(
            origin = %origin,
            bytes = message.len(),
            dispatched,
            dropped,
            "Broadcast"
        );

        dispatched
    }

    fn evict(&self, origin: ConnectionId, peer: &ConnectionHandle, error: &Error) {
        if peer.close() {
            self.counters.evicted.fetch_add(1, Ordering::Relaxed);
            warn!(
                origin = %origin,
                target = %peer.id(),
                error = %error,
                timeout = ?self.send_timeout,
                "Peer queue stayed full, evicting"
            );
        }
    }
}

// ============================================================================
// BroadcastHub - Lifecycle
// ============================================================================

impl BroadcastHub {
    /// Closes every registered connection.
    ///
    /// Receive loops observe the close, deregister and finish. Connections
    /// registered afterwards are closed immediately.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);

        let connections = self.registry.snapshot();
        let count = connections.len();
        for connection in connections {
            connection.close();
        }

        info!(count, "Hub shutdown, connections closed");
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    #[inline]
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Tests
// ============================================================================
