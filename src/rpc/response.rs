//! JSON-RPC 2.0 response construction.
//!
//! Every response is built fresh per request as an owned `serde_json::Value`.

use serde_json::{Map, Value};
use std::fmt;

/// JSON-RPC protocol version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// Reserved JSON-RPC error codes produced by the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Input is not valid JSON.
    ParseError,
    /// Valid JSON that is not a valid request object.
    InvalidRequest,
    /// No method registered under the requested name.
    MethodNotFound,
}

impl ErrorCode {
    /// Numeric code placed in the `error.code` member.
    pub fn code(&self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
        }
    }

    /// Human-readable text placed in the `error.message` member.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "Parse error.",
            ErrorCode::InvalidRequest => "Invalid JSON-RPC request.",
            ErrorCode::MethodNotFound => "Method not found.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

/// Build a success response: `{"jsonrpc":"2.0","id":..,"result":..}`.
pub fn success(id: Value, result: Value) -> Value {
    let mut response = Map::with_capacity(3);
    response.insert("jsonrpc".to_string(), Value::from(JSONRPC_VERSION));
    response.insert("id".to_string(), id);
    response.insert("result".to_string(), result);
    Value::Object(response)
}

/// Build an error response: `{"id":..,"jsonrpc":"2.0","error":{"code":..,"message":..}}`.
///
/// Methods may use this with their own codes and messages to signal
/// application failures.
pub fn error(id: Value, code: i64, message: &str) -> Value {
    let mut error = Map::with_capacity(2);
    error.insert("code".to_string(), Value::from(code));
    error.insert("message".to_string(), Value::from(message));

    let mut response = Map::with_capacity(3);
    response.insert("id".to_string(), id);
    response.insert("jsonrpc".to_string(), Value::from(JSONRPC_VERSION));
    response.insert("error".to_string(), Value::Object(error));
    Value::Object(response)
}

/// Build an error response for one of the reserved codes.
pub fn protocol_error(id: Value, code: ErrorCode) -> Value {
    error(id, code.code(), code.message())
}

/// The `id` of a request, or null when it has none.
pub fn request_id(request: &Value) -> Value {
    request.get("id").cloned().unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_codes() {
        assert_eq!(ErrorCode::ParseError.code(), -32700);
        assert_eq!(ErrorCode::InvalidRequest.code(), -32600);
        assert_eq!(ErrorCode::MethodNotFound.code(), -32601);
        assert_eq!(
            ErrorCode::MethodNotFound.to_string(),
            "-32601: Method not found."
        );
    }

    #[test]
    fn test_error_serialization_order() {
        let response = protocol_error(Value::Null, ErrorCode::InvalidRequest);
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"id":null,"jsonrpc":"2.0","error":{"code":-32600,"message":"Invalid JSON-RPC request."}}"#
        );
    }

    #[test]
    fn test_success() {
        let response = success(json!(7), json!("success"));
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"jsonrpc":"2.0","id":7,"result":"success"}"#
        );
    }

    #[test]
    fn test_request_id() {
        assert_eq!(request_id(&json!({"id": "abc"})), json!("abc"));
        assert_eq!(request_id(&json!({"method": "x"})), Value::Null);
        assert_eq!(request_id(&json!(42)), Value::Null);
    }
}
