//! Error types for the relay.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use ws_relay::{RelayConfig, RelayServer, Result};
//!
//! async fn example() -> Result<()> {
//!     let server = RelayServer::bind(RelayConfig::local()).await?;
//!     println!("listening on {}", server.ws_url());
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Delivery | [`Error::MessageTooLarge`], [`Error::QueueFull`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::ConnectionId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Errors are terminal only to the connection they belong to; nothing in the
/// relay core turns one of these into a process-wide failure.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when relay configuration is invalid or cannot be loaded.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport failure on a single connection.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// WebSocket handshake did not complete in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection is closed.
    ///
    /// Returned when sending to a connection that has already been torn down.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Delivery Errors
    // ========================================================================
    /// Inbound message exceeds the configured limit.
    #[error("Message of {size} bytes exceeds limit of {limit} bytes")]
    MessageTooLarge {
        /// Size of the offending message.
        size: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// Outbound queue of a target connection is full.
    ///
    /// The message is dropped for that target only.
    #[error("Outbound queue full for connection {connection_id} (capacity {capacity})")]
    QueueFull {
        /// Target connection.
        connection_id: ConnectionId,
        /// Queue capacity.
        capacity: usize,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a message too large error.
    #[inline]
    pub fn message_too_large(size: usize, limit: usize) -> Self {
        Self::MessageTooLarge { size, limit }
    }

    /// Creates a queue full error.
    #[inline]
    pub fn queue_full(connection_id: ConnectionId, capacity: usize) -> Self {
        Self::QueueFull {
            connection_id,
            capacity,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectionTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if a message was dropped for a single target.
    ///
    /// Fan-out swallows these after logging.
    #[inline]
    #[must_use]
    pub fn is_delivery_error(&self) -> bool {
        matches!(self, Self::QueueFull { .. } | Self::ConnectionClosed)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("reset by peer");
        assert_eq!(err.to_string(), "Connection failed: reset by peer");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("outbound_capacity must be > 0");
        assert_eq!(
            err.to_string(),
            "Configuration error: outbound_capacity must be > 0"
        );
    }

    #[test]
    fn test_message_too_large_display() {
        let err = Error::message_too_large(2048, 1024);
        assert_eq!(
            err.to_string(),
            "Message of 2048 bytes exceeds limit of 1024 bytes"
        );
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::connection_timeout(5000).is_timeout());
        assert!(!Error::connection("test").is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::connection_timeout(1000).is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_is_delivery_error() {
        let id = ConnectionId::next();
        assert!(Error::queue_full(id, 8).is_delivery_error());
        assert!(Error::ConnectionClosed.is_delivery_error());
        assert!(!Error::message_too_large(2, 1).is_delivery_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::AddrInUse, "address in use");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
