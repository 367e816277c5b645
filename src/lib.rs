//! jsonrpc-reactor: a JSON-RPC 2.0 server engine
//!
//! Components:
//! - `rpc`: method registry and request dispatcher
//! - `netstring`: `<len>:<payload>,` framing codec
//! - `transport`: single-threaded TCP reactor, UDP server and clients
//! - `config`: CLI and TOML configuration for the server binary
//!
//! ```no_run
//! use jsonrpc_reactor::rpc::{response, Handler, Reply};
//! use jsonrpc_reactor::transport::{TcpOptions, TcpServer};
//! use serde_json::Value;
//!
//! let mut handler = Handler::new();
//! handler.register("ping", "Answer with pong", |request: &Value| {
//!     Reply::success(response::success(response::request_id(request), "pong".into()))
//! })?;
//!
//! let mut server = TcpServer::bind("127.0.0.1:8086".parse()?, handler, TcpOptions::default())?;
//! server.listen()?;
//! server.run(None)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod netstring;
pub mod rpc;
pub mod transport;
