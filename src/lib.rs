//! ws-relay - Minimal real-time WebSocket message relay.
//!
//! Clients hold a persistent WebSocket connection; every message one client
//! sends is forwarded to all other connected clients.
//!
//! # Architecture
//!
//! - [`ConnectionRegistry`]: concurrency-safe set of live connections
//!   (add, remove, lock-free iteration over snapshots)
//! - [`BroadcastHub`]: owns the registry, runs one receive loop per
//!   connection, fans each message out to every other connection
//!
//! Key design principles:
//!
//! - No lock is ever held across I/O
//! - A slow or broken receiver never stalls the sender: each connection has
//!   a bounded outbound queue and its own writer task
//! - Failures are terminal only to the connection they belong to
//!
//! # Quick Start
//!
//! ```no_run
//! use ws_relay::{RelayConfig, RelayServer, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let server = RelayServer::bind(RelayConfig::new().with_port(3100)).await?;
//!     println!("Relay listening on {}", server.ws_url());
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | [`RelayConfig`] and defaults |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`hub`] | [`BroadcastHub`]: receive loops and fan-out |
//! | [`identifiers`] | [`ConnectionId`] |
//! | [`message`] | Opaque relay [`Message`] |
//! | [`registry`] | [`ConnectionRegistry`] |
//! | [`transport`] | Transport traits, WebSocket server, in-process channel |

// ============================================================================
// Modules
// ============================================================================

/// Relay configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Broadcast hub: per-connection receive loops and fan-out.
pub mod hub;

/// Type-safe identifiers.
pub mod identifiers;

/// Relay message type.
pub mod message;

/// Registry of live connections.
pub mod registry;

/// Transport traits and implementations.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::RelayConfig;
pub use error::{Error, Result};
pub use hub::{BroadcastHub, HubStats};
pub use identifiers::ConnectionId;
pub use message::{Message, MessageKind};
pub use registry::ConnectionRegistry;
pub use transport::{ConnectionHandle, ConnectionStats, MessageSink, MessageSource, RelayServer};
