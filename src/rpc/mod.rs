//! JSON-RPC 2.0 protocol engine.
//!
//! - `handler`: request validation, single/batch dispatch, error responses
//! - `registry`: named method entries with exact-match lookup
//! - `method`: the callable abstraction and the [`Reply`] it produces
//! - `response`: response builders and reserved error codes

pub mod handler;
pub mod method;
pub mod registry;
pub mod response;

pub use handler::{Handler, DESCRIBE_METHOD};
pub use method::{Method, MethodEntry, Reply};
pub use registry::RegistryError;
pub use response::{ErrorCode, JSONRPC_VERSION};
