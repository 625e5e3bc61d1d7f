//! Transport layer.
//!
//! The relay core only needs two capabilities from a transport: a blocking
//! receive of whole messages, and a send/close path. They are split into
//! [`MessageSource`] and [`MessageSink`] so that the receive loop and the
//! per-connection writer task can each own their half.
//!
//! # Architecture
//!
//! ```text
//!                   ┌────────────────────────────────────────────┐
//!   TCP accept ───► │ RelayServer (WebSocket upgrade on /ws)     │
//!                   └──────────────┬─────────────────────────────┘
//!                                  │ split()
//!                    ┌─────────────┴─────────────┐
//!                    ▼                           ▼
//!             MessageSource                 MessageSink
//!             (receive loop)        (OutboundWriter, bounded queue)
//!                    │                           ▲
//!                    └──► BroadcastHub ──────────┘
//!                         broadcast() → ConnectionHandle::send_timeout()
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `channel` | In-process transport pair |
//! | `connection` | Connection handle and outbound writer task |
//! | `server` | WebSocket server binding and accept loop |
//! | `websocket` | tokio-tungstenite implementation of the transport traits |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;
use crate::message::Message;

// ============================================================================
// Submodules
// ============================================================================

/// In-process transport pair.
pub mod channel;

/// Connection handle and outbound writer task.
pub mod connection;

/// WebSocket server for relay clients.
pub mod server;

/// WebSocket implementation of the transport traits.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{ChannelClient, ChannelSink, ChannelSource};
pub use connection::{ConnectionHandle, ConnectionStats, OutboundWriter};
pub(crate) use connection::Enqueue;
pub use server::RelayServer;
pub use websocket::{WsSink, WsSource};

// ============================================================================
// Transport Traits
// ============================================================================

/// Inbound half of a connection.
#[async_trait]
pub trait MessageSource: Send + 'static {
    /// Waits for the next message.
    ///
    /// Returns `Ok(None)` on a clean end-of-stream. Any `Err` is terminal
    /// for the connection.
    async fn receive(&mut self) -> Result<Option<Message>>;
}

/// Outbound half of a connection.
///
/// Only ever driven by one writer task, so implementations need not
/// serialize concurrent callers.
#[async_trait]
pub trait MessageSink: Send + 'static {
    /// Writes one message. May wait on transport backpressure.
    async fn send(&mut self, message: Message) -> Result<()>;

    /// Closes the transport.
    async fn close(&mut self) -> Result<()>;
}
