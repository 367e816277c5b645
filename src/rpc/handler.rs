//! JSON-RPC request processing.
//!
//! The handler owns the method registry and turns request text into
//! response values:
//!
//! ```text
//! text ──parse──► object ──validate──► lookup ──invoke──► response
//!                 array  ──for each element as above, notifications dropped──► [responses]
//! ```
//!
//! Protocol violations never escape as Rust errors; they become JSON-RPC
//! error responses.

use super::method::{Method, MethodEntry, Reply, Target};
use super::registry::{Registry, RegistryError};
use super::response::{self, ErrorCode};
use serde_json::{json, Value};
use tracing::{debug, trace};

/// Name of the built-in introspection method.
pub const DESCRIBE_METHOD: &str = "system.describe";

/// JSON-RPC 2.0 dispatcher.
#[derive(Debug)]
pub struct Handler {
    registry: Registry,
}

impl Default for Handler {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler {
    /// Create a handler with only `system.describe` registered.
    pub fn new() -> Self {
        let mut registry = Registry::new();
        let description = json!({
            "description": "List the RPC methods available",
            "parameters": null,
            "returns": "Object that contains description of all methods registered",
        });
        let installed = registry.insert(MethodEntry::new(
            DESCRIBE_METHOD.to_string(),
            description,
            Target::Describe,
        ));
        debug_assert!(installed.is_ok(), "empty registry rejected {DESCRIBE_METHOD}");
        Self { registry }
    }

    /// Register `method` under `name`.
    ///
    /// `description` is free-form JSON (a string, or an object with
    /// parameter and return schemas) reported by `system.describe`.
    pub fn register<M>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<Value>,
        method: M,
    ) -> Result<(), RegistryError>
    where
        M: Method + 'static,
    {
        let entry = MethodEntry::new(
            name.into(),
            description.into(),
            Target::Custom(Box::new(method)),
        );
        debug!(method = entry.name(), "Registering method");
        self.registry.insert(entry)
    }

    /// Remove the method named `name`.
    ///
    /// Returns false if nothing was removed: the name is unknown or it is
    /// `system.describe`.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.registry.remove(name).is_some()
    }

    /// Find the entry registered under exactly `name`.
    pub fn lookup(&self, name: &str) -> Option<&MethodEntry> {
        self.registry.get(name)
    }

    /// Object mapping every user-registered method to its description.
    pub fn describe(&self) -> Value {
        self.registry.describe()
    }

    /// Every registered entry, `system.describe` first, then user methods in
    /// registration order.
    pub fn methods(&self) -> impl Iterator<Item = &MethodEntry> {
        self.registry.iter()
    }

    /// Number of registered methods, `system.describe` included.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Check the envelope of a single request.
    ///
    /// On failure, returns an `INVALID_REQUEST` response whose id is always
    /// null.
    pub fn validate(&self, request: &Value) -> Result<(), Value> {
        let invalid = || response::protocol_error(Value::Null, ErrorCode::InvalidRequest);

        let object = request.as_object().ok_or_else(invalid)?;

        if object.get("jsonrpc").and_then(Value::as_str) != Some(response::JSONRPC_VERSION) {
            return Err(invalid());
        }

        if let Some(id) = object.get("id") {
            if id.is_array() || id.is_object() {
                return Err(invalid());
            }
        }

        if !object.get("method").is_some_and(Value::is_string) {
            return Err(invalid());
        }

        Ok(())
    }

    /// Process a single request value.
    pub fn process(&self, request: &Value) -> Reply {
        if let Err(error) = self.validate(request) {
            return Reply::failure(error);
        }

        let method = request["method"].as_str().unwrap_or_default();
        trace!(method, "Dispatching request");

        let entry = match method {
            "" => None,
            name => self.registry.get(name),
        };

        match entry {
            Some(entry) => match &entry.target {
                Target::Describe => self.system_describe(request),
                Target::Custom(callable) => callable.invoke(request),
            },
            None => {
                debug!(method, "Method not found");
                Reply::failure(response::protocol_error(
                    response::request_id(request),
                    ErrorCode::MethodNotFound,
                ))
            }
        }
    }

    /// Process an already-parsed message: a single request or a batch.
    pub fn process_value(&self, message: Value) -> Reply {
        match message {
            Value::Array(batch) => {
                let responses: Vec<Value> = batch
                    .iter()
                    .filter_map(|request| {
                        let reply = self.process(request);
                        expects_response(request).then_some(reply.body)
                    })
                    .collect();
                Reply::success(Value::Array(responses))
            }
            single => self.process(&single),
        }
    }

    /// Parse and process request text.
    pub fn process_text(&self, text: &str) -> Reply {
        self.process_bytes(text.as_bytes())
    }

    /// Parse and process request bytes. Input that is not UTF-8 JSON
    /// yields a `PARSE_ERROR` response.
    pub fn process_bytes(&self, input: &[u8]) -> Reply {
        match serde_json::from_slice::<Value>(input) {
            Ok(message) => self.process_value(message),
            Err(e) => {
                debug!(error = %e, "Request is not valid JSON");
                Reply::failure(Self::parse_error())
            }
        }
    }

    /// The response sent for input that is not JSON.
    pub fn parse_error() -> Value {
        response::protocol_error(Value::Null, ErrorCode::ParseError)
    }

    /// Serialize a response value to compact JSON text.
    pub fn to_text(value: &Value) -> String {
        value.to_string()
    }

    fn system_describe(&self, request: &Value) -> Reply {
        Reply::success(response::success(
            response::request_id(request),
            self.describe(),
        ))
    }
}

/// Batch elements only get a response entry when they carry an `id`.
fn expects_response(request: &Value) -> bool {
    request.as_object().is_some_and(|o| o.contains_key("id"))
}
