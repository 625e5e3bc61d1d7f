//! ws-relay server binary.
//!
//! ```text
//! ws-relay [--config <FILE>] [--port <PORT>] [--debug]
//! ```
//!
//! `RUST_LOG` overrides the default log filter.

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use ws_relay::{RelayConfig, RelayServer, Result};

// ============================================================================
// Types
// ============================================================================

/// WebSocket relay: forwards every client message to all other clients.
#[derive(Debug, Parser)]
#[command(name = "ws-relay", version)]
struct Args {
    /// JSON configuration file; missing fields use the defaults
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen port, overriding the configuration file
    #[arg(short, long)]
    port: Option<u16>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(long)]
    debug: bool,
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
fn init_logging(debug: bool) {
    let default_filter = if debug { "ws_relay=debug" } else { "ws_relay=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => RelayConfig::from_json_file(path)?,
        None => RelayConfig::new(),
    };
    if let Some(port) = args.port {
        config = config.with_port(port);
    }

    let server = RelayServer::bind(config).await?;
    info!(url = %server.ws_url(), "Relay ready");

    tokio::signal::ctrl_c().await?;

    server.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Relay failed");
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    #[test]
    fn test_args_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "ws-relay",
            "--config",
            "relay.json",
            "-p",
            "9000",
            "--debug",
        ])
        .expect("valid args");
        assert_eq!(args.config, Some(PathBuf::from("relay.json")));
        assert_eq!(args.port, Some(9000));
        assert!(args.debug);
    }

    #[test]
    fn test_rejects_bad_port() {
        assert!(Args::try_parse_from(["ws-relay", "--port", "http"]).is_err());
        assert!(Args::try_parse_from(["ws-relay", "--port"]).is_err());
    }
}
