//! Relay configuration.
//!
//! Provides a type-safe interface for the listen address, the WebSocket
//! endpoint path, and the capacity bounds of the fan-out path.
//!
//! # Example
//!
//! ```ignore
//! use ws_relay::RelayConfig;
//!
//! let config = RelayConfig::new()
//!     .with_port(9000)
//!     .with_path("/chat")
//!     .with_max_message_size(16 * 1024)
//!     .with_outbound_capacity(64);
//!
//! config.validate()?;
//! ```
//!
//! Configuration can also be loaded from JSON; missing fields fall back to
//! the defaults:
//!
//! ```json
//! { "port": 9000, "path": "/chat", "outbound_capacity": 64 }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3100;

/// Default WebSocket endpoint path.
pub const DEFAULT_PATH: &str = "/ws";

/// Default maximum inbound message size (64 KiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Default per-connection outbound queue capacity.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Default WebSocket handshake timeout.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// Default time fan-out waits on a full outbound queue before evicting the peer.
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 2_000;

// ============================================================================
// RelayConfig
// ============================================================================

/// Relay server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// IP address to listen on.
    pub bind_ip: IpAddr,

    /// Port to listen on (0 for random).
    pub port: u16,

    /// Path the WebSocket upgrade is served on.
    pub path: String,

    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,

    /// Messages buffered per connection before fan-out has to wait.
    pub outbound_capacity: usize,

    /// How long fan-out waits for room in a full outbound queue. A peer
    /// whose queue stays full this long loses the message and is closed.
    pub send_timeout_ms: u64,

    /// Time allowed for the WebSocket upgrade after TCP accept.
    pub handshake_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl RelayConfig {
    /// Creates a configuration listening on all interfaces, port 3100.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            path: DEFAULT_PATH.to_string(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
        }
    }

    /// Creates a configuration bound to `127.0.0.1` on a random port.
    #[inline]
    #[must_use]
    pub fn local() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            ..Self::new()
        }
    }

    /// Parses a configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the JSON is malformed
    /// - [`Error::Config`] if the resulting configuration is invalid
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the file cannot be read
    /// - [`Error::Json`] if the JSON is malformed
    /// - [`Error::Config`] if the resulting configuration is invalid
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl RelayConfig {
    /// Sets the listen IP.
    #[inline]
    #[must_use]
    pub fn with_bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    /// Sets the listen port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the WebSocket endpoint path.
    #[inline]
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the maximum inbound message size.
    #[inline]
    #[must_use]
    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    /// Sets the per-connection outbound queue capacity.
    #[inline]
    #[must_use]
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }

    /// Sets the slow-peer send timeout.
    #[inline]
    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl RelayConfig {
    /// Socket address to bind.
    #[inline]
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Handshake timeout as a [`Duration`].
    #[inline]
    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Slow-peer send timeout as a [`Duration`].
    #[inline]
    #[must_use]
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Checks the configuration for values the relay cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if !self.path.starts_with('/') {
            return Err(Error::config(format!(
                "path must start with '/': {}",
                self.path
            )));
        }
        if self.max_message_size == 0 {
            return Err(Error::config("max_message_size must be > 0"));
        }
        if self.outbound_capacity == 0 {
            return Err(Error::config("outbound_capacity must be > 0"));
        }
        if self.send_timeout_ms == 0 {
            return Err(Error::config("send_timeout_ms must be > 0"));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(Error::config("handshake_timeout_ms must be > 0"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
