//! JSON-RPC 2.0 wire types for the newline-delimited stdio transport.
//!
//! One JSON document per line, both directions. Incoming lines are
//! decoded into an [`RpcFrame`]; anything that is valid JSON but not a
//! recognizable JSON-RPC shape is reported as such so the reader can
//! discard it at debug level.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The MCP protocol version the gateway advertises during handshake.
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

/// Standard JSON-RPC error codes.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// An outgoing JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Correlation id.
    pub id: i64,
    /// Method name.
    pub method: String,
    /// Parameters, omitted when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Build a request.
    #[must_use]
    pub fn new(id: i64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC response, carrying either a result or an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Correlation id of the request being answered.
    pub id: i64,
    /// Result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl JsonRpcResponse {
    /// A successful response.
    #[must_use]
    pub fn success(id: i64, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// An error response.
    #[must_use]
    pub fn failure(id: i64, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// A JSON-RPC notification (no id, no response expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Parameters, omitted when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Build a notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Build an error object.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured data.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// A method-not-found error.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            error_codes::METHOD_NOT_FOUND,
            format!("method not found: {method}"),
        )
    }
}

/// One decoded line of backend stdout.
#[derive(Debug, Clone)]
pub enum RpcFrame {
    /// A response to one of our requests.
    Response(JsonRpcResponse),
    /// A request initiated by the backend (sampling etc.).
    Request(JsonRpcRequest),
    /// A notification from the backend.
    Notification(JsonRpcNotification),
}

impl RpcFrame {
    /// Decode a single line. Returns `None` when the line is valid JSON
    /// but not a JSON-RPC message (the caller discards it at debug).
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the line is not JSON at all.
    pub fn decode(line: &str) -> Result<Option<Self>, serde_json::Error> {
        let value: Value = serde_json::from_str(line)?;
        let Value::Object(ref obj) = value else {
            return Ok(None);
        };

        let has_id = obj.get("id").is_some_and(|id| !id.is_null());
        let has_method = obj.contains_key("method");

        if has_id && (obj.contains_key("result") || obj.contains_key("error")) {
            return Ok(serde_json::from_value(value).map(Self::Response).ok());
        }
        if has_method && has_id {
            return Ok(serde_json::from_value(value).map(Self::Request).ok());
        }
        if has_method {
            return Ok(serde_json::from_value(value).map(Self::Notification).ok());
        }
        Ok(None)
    }
}
