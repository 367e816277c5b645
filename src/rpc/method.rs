//! Callable RPC methods.
//!
//! A method is anything that can turn a request value into a [`Reply`].
//! Closures implement [`Method`] directly; types with state can implement
//! the trait themselves.

use serde_json::Value;
use std::fmt;

/// Outcome of invoking a method or processing a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Response value. Null when nothing should be sent back.
    pub body: Value,
    /// Whether the call succeeded.
    pub ok: bool,
}

impl Reply {
    pub fn success(body: Value) -> Self {
        Self { body, ok: true }
    }

    pub fn failure(body: Value) -> Self {
        Self { body, ok: false }
    }

    /// A successful call with nothing to send back.
    pub fn notification() -> Self {
        Self::success(Value::Null)
    }

    /// True when there is no response to transmit.
    pub fn is_empty(&self) -> bool {
        self.body.is_null()
    }

    /// Take the response value, dropping the success flag.
    pub fn into_body(self) -> Value {
        self.body
    }
}

/// A callable bound to whatever state it needs.
///
/// The method receives the full request object and is responsible for
/// shaping its own response, either a success body or an error body built
/// with [`crate::rpc::response::error`].
pub trait Method: Send + Sync {
    fn invoke(&self, request: &Value) -> Reply;
}

impl<F> Method for F
where
    F: Fn(&Value) -> Reply + Send + Sync,
{
    fn invoke(&self, request: &Value) -> Reply {
        self(request)
    }
}

/// What a registry entry dispatches to.
pub(crate) enum Target {
    /// The built-in `system.describe` introspection method.
    Describe,
    Custom(Box<dyn Method>),
}

/// A named, described method owned by a handler's registry.
pub struct MethodEntry {
    name: String,
    description: Value,
    pub(crate) target: Target,
}

impl MethodEntry {
    pub(crate) fn new(name: String, description: Value, target: Target) -> Self {
        Self {
            name,
            description,
            target,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Free-form description, as reported by `system.describe`.
    pub fn description(&self) -> &Value {
        &self.description
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self.target, Target::Describe)
    }
}

impl fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodEntry")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("builtin", &self.is_builtin())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Counter {
        base: i64,
    }

    impl Method for Counter {
        fn invoke(&self, request: &Value) -> Reply {
            let n = request["params"].as_i64().unwrap_or(0);
            Reply::success(json!(self.base + n))
        }
    }

    #[test]
    fn test_closure_method() {
        let method = |request: &Value| Reply::success(request["params"].clone());
        let reply = method.invoke(&json!({"params": [1, 2]}));
        assert!(reply.ok);
        assert_eq!(reply.body, json!([1, 2]));
    }

    #[test]
    fn test_struct_method() {
        let method: Box<dyn Method> = Box::new(Counter { base: 10 });
        assert_eq!(method.invoke(&json!({"params": 5})).body, json!(15));
    }

    #[test]
    fn test_reply_states() {
        assert!(Reply::notification().is_empty());
        assert!(Reply::notification().ok);
        assert!(!Reply::failure(json!({})).ok);
        assert!(!Reply::success(json!(1)).is_empty());
        assert_eq!(Reply::failure(json!({"id": 1})).into_body(), json!({"id": 1}));
    }
}
