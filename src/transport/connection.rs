//! Connection handle and outbound writer.
//!
//! A [`ConnectionHandle`] is what the registry stores. It is cheap to clone
//! and never performs I/O itself: sends go onto a bounded queue that a
//! dedicated [`OutboundWriter`] task drains into the transport.
//!
//! [`try_send`](ConnectionHandle::try_send) never waits.
//! [`send_timeout`](ConnectionHandle::send_timeout) waits for a free slot,
//! but never longer than the given timeout.
//!
//! # Writer Task
//!
//! The writer task:
//!
//! - Forwards queued messages to the [`MessageSink`] in FIFO order
//! - Stops when the handle is closed or the last handle is dropped
//! - Marks the connection closed if a transport send fails
//! - Closes the transport exactly once on the way out

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::message::Message;

use super::MessageSink;

// ============================================================================
// ConnectionStats
// ============================================================================

/// Per-connection delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Messages written to the transport.
    pub delivered: u64,
    /// Messages dropped because the queue was full or the connection closed.
    pub dropped: u64,
    /// Messages currently waiting in the outbound queue.
    pub queued: usize,
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    dropped: AtomicU64,
}

// ============================================================================
// Enqueue
// ============================================================================

/// Outcome of a non-waiting enqueue.
#[derive(Debug)]
pub(crate) enum Enqueue {
    Queued,
    /// Queue at capacity; the message is handed back.
    Full(Message),
    Closed,
}

// ============================================================================
// ConnectionHandle
// ============================================================================

struct HandleInner {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    capacity: usize,
    outbound_tx: mpsc::Sender<Message>,
    closed: watch::Sender<bool>,
    counters: Arc<Counters>,
}

/// Shared handle to a live connection.
///
/// # Thread Safety
///
/// `ConnectionHandle` is `Send + Sync`; clones refer to the same connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

impl ConnectionHandle {
    /// Creates a handle and the writer that serves its outbound queue.
    ///
    /// The writer does nothing until [`OutboundWriter::run`] is awaited.
    /// A capacity of 0 is treated as 1.
    #[must_use]
    pub fn channel(
        id: ConnectionId,
        peer_addr: Option<SocketAddr>,
        capacity: usize,
    ) -> (Self, OutboundWriter) {
        let capacity = capacity.max(1);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (closed, closed_rx) = watch::channel(false);
        let counters = Arc::new(Counters::default());

        let inner = Arc::new(HandleInner {
            id,
            peer_addr,
            capacity,
            outbound_tx,
            closed,
            counters: Arc::clone(&counters),
        });

        let writer = OutboundWriter {
            id,
            outbound_rx,
            closed_rx,
            counters,
            handle: Arc::downgrade(&inner),
        };

        (Self { inner }, writer)
    }

    /// Returns the connection ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Returns the remote address, if the transport has one.
    #[inline]
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.inner.peer_addr
    }

    /// Queues a message without waiting.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is closed
    /// - [`Error::QueueFull`] if the outbound queue is at capacity
    pub fn try_send(&self, message: Message) -> Result<()> {
        match self.try_enqueue(message) {
            Enqueue::Queued => Ok(()),
            Enqueue::Full(_) => {
                self.record_drop();
                Err(Error::queue_full(self.inner.id, self.inner.capacity))
            }
            Enqueue::Closed => Err(Error::ConnectionClosed),
        }
    }

    /// Queues a message without waiting, handing it back if the queue is
    /// full. Only a closed connection counts as a drop here.
    pub(crate) fn try_enqueue(&self, message: Message) -> Enqueue {
        if self.is_closed() {
            self.record_drop();
            return Enqueue::Closed;
        }

        match self.inner.outbound_tx.try_send(message) {
            Ok(()) => Enqueue::Queued,
            Err(TrySendError::Full(message)) => Enqueue::Full(message),
            Err(TrySendError::Closed(_)) => {
                self.record_drop();
                Enqueue::Closed
            }
        }
    }

    /// Queues a message, waiting up to `timeout` for a free slot.
    ///
    /// Gives up early if the connection is closed while waiting. Queue
    /// admission is FIFO among waiters.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is or becomes closed
    /// - [`Error::QueueFull`] if no slot frees up within `timeout`
    pub async fn send_timeout(&self, message: Message, timeout: Duration) -> Result<()> {
        let mut closed = self.closed_signal();

        let sent = if *closed.borrow_and_update() {
            Err(Error::ConnectionClosed)
        } else {
            tokio::select! {
                biased;

                _ = closed.changed() => Err(Error::ConnectionClosed),

                sent = tokio::time::timeout(timeout, self.inner.outbound_tx.send(message)) => {
                    match sent {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(_)) => Err(Error::ConnectionClosed),
                        Err(_) => Err(Error::queue_full(self.inner.id, self.inner.capacity)),
                    }
                }
            }
        };

        if sent.is_err() {
            self.record_drop();
        }
        sent
    }

    fn record_drop(&self) {
        self.inner.counters.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Marks the connection closed.
    ///
    /// Returns `true` for the call that performed the transition. The writer
    /// task observes the flag and closes the transport.
    pub fn close(&self) -> bool {
        let was_closed = self.inner.closed.send_replace(true);
        if !was_closed {
            debug!(connection = %self.inner.id, "Connection marked closed");
        }
        !was_closed
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Receiver that changes when the connection is closed.
    pub(crate) fn closed_signal(&self) -> watch::Receiver<bool> {
        self.inner.closed.subscribe()
    }

    /// Returns a snapshot of the delivery counters.
    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            delivered: self.inner.counters.delivered.load(Ordering::Relaxed),
            dropped: self.inner.counters.dropped.load(Ordering::Relaxed),
            queued: self.inner.capacity - self.inner.outbound_tx.capacity(),
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("peer_addr", &self.inner.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================================================
// OutboundWriter
// ============================================================================

/// Drains a connection's outbound queue into its transport.
pub struct OutboundWriter {
    id: ConnectionId,
    outbound_rx: mpsc::Receiver<Message>,
    closed_rx: watch::Receiver<bool>,
    counters: Arc<Counters>,
    handle: Weak<HandleInner>,
}

impl OutboundWriter {
    /// Runs until the connection is closed, then closes `sink`.
    pub async fn run<W: MessageSink>(mut self, mut sink: W) {
        loop {
            tokio::select! {
                biased;

                // Closed locally, or every handle dropped
                _ = self.closed_rx.changed() => break,

                message = self.outbound_rx.recv() => {
                    let Some(message) = message else {
                        break;
                    };

                    let sent = tokio::select! {
                        biased;
                        _ = self.closed_rx.changed() => break,
                        sent = sink.send(message) => sent,
                    };

                    if let Err(e) = sent {
                        warn!(connection = %self.id, error = %e, "Send failed, closing connection");
                        self.mark_closed();
                        break;
                    }

                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                    trace!(connection = %self.id, "Message delivered");
                }
            }
        }

        if let Err(e) = sink.close().await {
            debug!(connection = %self.id, error = %e, "Transport close failed");
        }

        debug!(connection = %self.id, "Writer terminated");
    }

    fn mark_closed(&self) {
        if let Some(inner) = self.handle.upgrade() {
            inner.closed.send_replace(true);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::time::timeout;

    use crate::transport::channel;

    fn handle(capacity: usize) -> (ConnectionHandle, OutboundWriter) {
        ConnectionHandle::channel(ConnectionId::next(), None, capacity)
    }

    #[test]
    fn test_try_send_queue_full() {
        let (handle, _writer) = handle(2);

        handle.try_send(Message::text("a")).unwrap();
        handle.try_send(Message::text("b")).unwrap();
        let err = handle.try_send(Message::text("c")).unwrap_err();

        assert!(matches!(err, Error::QueueFull { capacity: 2, .. }));
        let stats = handle.stats();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.queued, 2);
    }

    #[test]
    fn test_try_send_after_close() {
        let (handle, _writer) = handle(4);
        handle.close();

        let err = handle.try_send(Message::text("late")).unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[test]
    fn test_close_reports_first_transition_only() {
        let (handle, _writer) = handle(4);
        assert!(!handle.is_closed());
        assert!(handle.close());
        assert!(!handle.clone().close());
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_send_timeout_waits_for_writer() {
        let (mut client, sink, _source) = channel::pair();
        let (handle, writer) = handle(1);

        handle.try_send(Message::text("first")).unwrap();

        // Queue is full until the writer starts draining it.
        let waiting = handle.send_timeout(Message::text("second"), Duration::from_secs(1));
        let task = tokio::spawn(writer.run(sink));
        waiting.await.unwrap();

        for expected in ["first", "second"] {
            let msg = timeout(Duration::from_secs(1), client.recv())
                .await
                .expect("delivery")
                .expect("open");
            assert_eq!(msg.as_text(), Some(expected));
        }

        handle.close();
        task.await.expect("writer task");
        assert_eq!(handle.stats().dropped, 0);
    }

    #[tokio::test]
    async fn test_send_timeout_gives_up_on_stuck_queue() {
        let (handle, _writer) = handle(1);
        handle.try_send(Message::text("fills")).unwrap();

        let err = handle
            .send_timeout(Message::text("waits"), Duration::from_millis(20))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::QueueFull { capacity: 1, .. }));
        assert_eq!(handle.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_send_timeout_wakes_on_close() {
        let (handle, _writer) = handle(1);
        handle.try_send(Message::text("fills")).unwrap();

        let closer = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            closer.close();
        });

        let err = timeout(
            Duration::from_secs(1),
            handle.send_timeout(Message::text("waits"), Duration::from_secs(30)),
        )
        .await
        .expect("woken by close")
        .unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (handle, _writer) = handle(0);
        assert!(handle.try_send(Message::text("one")).is_ok());
    }

    #[tokio::test]
    async fn test_writer_delivers_in_order_and_closes_once() {
        let (mut client, sink, _source) = channel::pair();
        let (handle, writer) = handle(8);
        let task = tokio::spawn(writer.run(sink));

        for i in 0..3 {
            handle.try_send(Message::text(format!("m{i}"))).unwrap();
        }
        for i in 0..3 {
            let msg = timeout(Duration::from_secs(1), client.recv())
                .await
                .expect("delivery")
                .expect("open");
            assert_eq!(msg.as_text(), Some(format!("m{i}").as_str()));
        }

        handle.close();
        handle.close();
        task.await.expect("writer task");

        assert_eq!(client.server_close_count(), 1);
        assert_eq!(handle.stats().delivered, 3);
    }

    #[tokio::test]
    async fn test_writer_stops_when_handles_dropped() {
        let (client, sink, _source) = channel::pair();
        let (handle, writer) = handle(8);
        let task = tokio::spawn(writer.run(sink));

        drop(handle);
        timeout(Duration::from_secs(1), task)
            .await
            .expect("writer exits")
            .expect("writer task");
        assert_eq!(client.server_close_count(), 1);
    }

    #[tokio::test]
    async fn test_send_failure_marks_closed() {
        let (client, sink, _source) = channel::pair();
        let close_count = client.close_counter();
        drop(client);

        let (handle, writer) = handle(8);
        let task = tokio::spawn(writer.run(sink));

        handle.try_send(Message::text("nobody home")).unwrap();
        timeout(Duration::from_secs(1), task)
            .await
            .expect("writer exits")
            .expect("writer task");

        assert!(handle.is_closed());
        assert_eq!(handle.stats().delivered, 0);
        assert_eq!(close_count.load(Ordering::SeqCst), 1);
    }
}
