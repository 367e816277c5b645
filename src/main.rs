//! jsonrpc-reactor: a JSON-RPC 2.0 server
//!
//! Serves the built-in `system.describe` method over:
//! - TCP: single-threaded reactor, netstring or raw JSON framing
//! - UDP: one message per datagram
//!
//! Configuration via CLI arguments or TOML file.

use jsonrpc_reactor::config::{Config, TransportKind};
use jsonrpc_reactor::rpc::Handler;
use jsonrpc_reactor::transport::{self, TcpServer, UdpServer};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        transport = ?config.transport,
        framing = ?config.framing,
        poll_timeout = ?config.poll_timeout,
        "Starting jsonrpc-reactor"
    );

    let handler = Handler::new();
    for method in handler.methods() {
        debug!(method = method.name(), builtin = method.is_builtin(), "Serving method");
    }

    match config.transport {
        TransportKind::Tcp => run_tcp(config, handler),
        TransportKind::Udp => run_udp(config, handler),
    }
}

/// Run the TCP reactor. Bind and listen failures are fatal.
fn run_tcp(config: Config, handler: Handler) -> Result<(), Box<dyn std::error::Error>> {
    let addr = transport::resolve(&config.listen)?;
    let mut server = TcpServer::bind(addr, handler, config.tcp_options())?;
    server.listen()?;
    server.run(config.poll_timeout)?;
    Ok(())
}

/// Run the UDP server.
fn run_udp(config: Config, handler: Handler) -> Result<(), Box<dyn std::error::Error>> {
    let addr = transport::resolve(&config.listen)?;
    let mut server = UdpServer::bind(addr, handler, config.framing)?;
    server.run()?;
    Ok(())
}
