//! In-process transport pair.
//!
//! Connects a [`ChannelClient`] to the relay without a socket. Useful for
//! embedding the relay in-process and for exercising the hub under load.
//!
//! ```ignore
//! let (mut client, sink, source) = channel::pair();
//! let (id, task) = hub.spawn(None, sink, source);
//!
//! client.send(Message::text("hello"))?;
//! let echoed_to_peers = client.recv().await;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::message::Message;

use super::{MessageSink, MessageSource};

// ============================================================================
// Types
// ============================================================================

/// Client-to-server frame.
enum Inbound {
    Message(Message),
    Fail(String),
}

/// Creates a connected client and the server-side transport halves.
#[must_use]
pub fn pair() -> (ChannelClient, ChannelSink, ChannelSource) {
    let (to_server, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, from_server) = mpsc::unbounded_channel();
    let close_count = Arc::new(AtomicUsize::new(0));

    let client = ChannelClient {
        to_server,
        from_server,
        close_count: Arc::clone(&close_count),
    };
    let sink = ChannelSink {
        tx: Some(outbound_tx),
        close_count,
    };
    let source = ChannelSource { rx: inbound_rx };

    (client, sink, source)
}

// ============================================================================
// ChannelClient
// ============================================================================

/// Client end of an in-process connection.
///
/// Dropping the client is a clean disconnect.
pub struct ChannelClient {
    to_server: mpsc::UnboundedSender<Inbound>,
    from_server: mpsc::UnboundedReceiver<Message>,
    close_count: Arc<AtomicUsize>,
}

impl ChannelClient {
    /// Sends a message to the relay.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the server side is gone.
    pub fn send(&self, message: Message) -> Result<()> {
        self.to_server
            .send(Inbound::Message(message))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Makes the server's next receive fail with `reason`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the server side is gone.
    pub fn fail(&self, reason: impl Into<String>) -> Result<()> {
        self.to_server
            .send(Inbound::Fail(reason.into()))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Waits for the next relayed message. `None` once the server closed.
    pub async fn recv(&mut self) -> Option<Message> {
        self.from_server.recv().await
    }

    /// Returns a relayed message if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.from_server.try_recv().ok()
    }

    /// Number of times the server closed its side of this connection.
    #[inline]
    #[must_use]
    pub fn server_close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    /// Shared close counter, readable after the client is dropped.
    #[must_use]
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.close_count)
    }

    /// Disconnects from the relay.
    pub fn disconnect(self) {}
}

// ============================================================================
// Server Halves
// ============================================================================

/// Server-side inbound half.
pub struct ChannelSource {
    rx: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn receive(&mut self) -> Result<Option<Message>> {
        match self.rx.recv().await {
            Some(Inbound::Message(message)) => Ok(Some(message)),
            Some(Inbound::Fail(reason)) => Err(Error::connection(reason)),
            None => Ok(None),
        }
    }
}

/// Server-side outbound half.
pub struct ChannelSink {
    tx: Option<mpsc::UnboundedSender<Message>>,
    close_count: Arc<AtomicUsize>,
}

#[async_trait]
impl MessageSink for ChannelSink {
    async fn send(&mut self, message: Message) -> Result<()> {
        match &self.tx {
            Some(tx) => tx.send(message).map_err(|_| Error::ConnectionClosed),
            None => Err(Error::ConnectionClosed),
        }
    }

    async fn close(&mut self) -> Result<()> {
        // Every call is counted so a double close is observable.
        self.close_count.fetch_add(1, Ordering::SeqCst);
        self.tx = None;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
