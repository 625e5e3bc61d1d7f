//! WebSocket server for relay clients.
//!
//! Binds a TCP listener, upgrades each accepted stream to a WebSocket on the
//! configured path, and hands the connection to the [`BroadcastHub`].
//!
//! # Connection Flow
//!
//! 1. `RelayServer::bind` - Bind listener, spawn accept loop
//! 2. Client opens TCP connection
//! 3. WebSocket upgrade on `config.path` (other paths get 404), bounded by
//!    `handshake_timeout`
//! 4. Connection registered with the hub, receive loop runs until disconnect

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::hub::BroadcastHub;

use super::websocket;

// ============================================================================
// Constants
// ============================================================================

/// How often the accept loop checks the shutdown flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// RelayServer
// ============================================================================

/// WebSocket relay server.
///
/// # Example
///
/// ```ignore
/// let server = RelayServer::bind(RelayConfig::local()).await?;
/// println!("WebSocket URL: {}", server.ws_url());
///
/// // ... clients connect and chat ...
///
/// server.shutdown();
/// ```
pub struct RelayServer {
    /// Address the listener is bound to.
    local_addr: SocketAddr,

    /// Configuration the server was started with.
    config: RelayConfig,

    /// Hub all connections are registered with.
    hub: Arc<BroadcastHub>,

    /// Shutdown flag.
    shutdown: AtomicBool,
}

// ============================================================================
// RelayServer - Constructor
// ============================================================================

impl RelayServer {
    /// Binds the listener and starts the accept loop.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `config` is invalid
    /// - [`Error::Io`] if binding fails
    pub async fn bind(config: RelayConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_addr()).await?;
        let local_addr = listener.local_addr()?;

        debug!(%local_addr, "Relay server bound");

        let server = Arc::new(Self {
            local_addr,
            hub: Arc::new(BroadcastHub::new(&config)),
            config,
            shutdown: AtomicBool::new(false),
        });

        let server_clone = Arc::clone(&server);
        tokio::spawn(async move {
            server_clone.accept_loop(listener).await;
        });

        info!(
            port = local_addr.port(),
            path = %server.config.path,
            "Relay server started"
        );

        Ok(server)
    }
}

// ============================================================================
// RelayServer - Public API
// ============================================================================

impl RelayServer {
    /// Returns the WebSocket URL clients should connect to.
    ///
    /// An unspecified bind address is reported as loopback.
    #[must_use]
    pub fn ws_url(&self) -> String {
        let host = match self.local_addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        let addr = SocketAddr::new(host, self.local_addr.port());
        format!("ws://{addr}{}", self.config.path)
    }

    /// Returns the port the server is bound to.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Returns the local socket address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the hub.
    #[inline]
    #[must_use]
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Stops accepting and closes every connection.
    pub fn shutdown(&self) {
        info!("Relay server shutting down");

        self.shutdown.store(true, Ordering::SeqCst);
        self.hub.shutdown();
    }
}

// ============================================================================
// RelayServer - Accept Loop
// ============================================================================

impl RelayServer {
    /// Background task that accepts new connections.
    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        debug!("Accept loop started");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                debug!("Accept loop shutting down");
                break;
            }

            // Accept with timeout to allow checking shutdown flag
            match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
                Ok(Ok((stream, addr))) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream, addr).await {
                            warn!(error = %e, ?addr, "Connection handling failed");
                        }
                    });
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Accept failed");
                }
                Err(_) => continue,
            }
        }

        debug!("Accept loop terminated");
    }

    /// Upgrades a TCP stream and serves it until disconnect.
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        debug!(?addr, "New TCP connection");

        let expected_path = self.config.path.clone();
        let check_path = move |request: &Request, response: Response| {
            if request.uri().path() == expected_path {
                Ok(response)
            } else {
                let mut rejection: ErrorResponse = ErrorResponse::new(Some("Not Found".into()));
                *rejection.status_mut() = StatusCode::NOT_FOUND;
                Err(rejection)
            }
        };

        let ws_config = WebSocketConfig::default()
            .max_message_size(Some(self.config.max_message_size))
            .max_frame_size(Some(self.config.max_message_size));

        let handshake_timeout = self.config.handshake_timeout();
        let ws_stream = timeout(
            handshake_timeout,
            accept_hdr_async_with_config(stream, check_path, Some(ws_config)),
        )
        .await
        .map_err(|_| Error::connection_timeout(self.config.handshake_timeout_ms))?
        .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        info!(?addr, "WebSocket connection established");

        let (sink, source) = websocket::split(ws_stream);
        self.hub.serve(Some(addr), sink, source).await;

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_bind_random_port() {
        let server = RelayServer::bind(RelayConfig::local())
            .await
            .expect("bind should succeed");

        assert!(server.port() > 0);
        assert_eq!(server.hub().connection_count(), 0);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_ws_url_format() {
        let server = RelayServer::bind(RelayConfig::local().with_path("/chat"))
            .await
            .expect("bind should succeed");

        let expected = format!("ws://127.0.0.1:{}/chat", server.port());
        assert_eq!(server.ws_url(), expected);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_ws_url_maps_unspecified_to_loopback() {
        let config = RelayConfig::new().with_port(0);
        let server = RelayServer::bind(config).await.expect("bind should succeed");

        assert!(server.ws_url().starts_with("ws://127.0.0.1:"));
        server.shutdown();
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let result = RelayServer::bind(RelayConfig::local().with_outbound_capacity(0)).await;
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_bind_port_in_use() {
        let first = RelayServer::bind(RelayConfig::local())
            .await
            .expect("bind should succeed");

        let result = RelayServer::bind(RelayConfig::local().with_port(first.port())).await;
        assert!(matches!(result, Err(Error::Io(_))));
        first.shutdown();
    }
}
