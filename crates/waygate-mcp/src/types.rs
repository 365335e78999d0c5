//! Tool definitions and call results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use waygate_core::{QualifiedToolName, ServerId};

/// Definition of a tool as presented to the client.
///
/// `name` is the fully-qualified form (`server__tool`) for
/// backend-sourced and synthesized tools, or the bare name for system
/// tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Client-visible tool name.
    pub name: String,
    /// Server this tool belongs to (empty for system tools).
    pub server: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// JSON Schema for input parameters.
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Create a definition with an empty object schema.
    #[must_use]
    pub fn new(name: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            server: server.into(),
            description: None,
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    /// Attach a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach an input schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Build from a backend's native tool object, prefixing the name.
    #[must_use]
    pub fn from_native(server: &ServerId, native: &Value) -> Self {
        let native_name = native
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let qualified = QualifiedToolName::new(server.clone(), native_name);
        Self {
            name: qualified.to_string(),
            server: server.as_str().to_string(),
            description: native
                .get("description")
                .and_then(Value::as_str)
                .map(String::from),
            input_schema: native
                .get("inputSchema")
                .cloned()
                .unwrap_or_else(|| serde_json::json!({"type": "object"})),
        }
    }

    /// Render back to the wire shape of a `tools/list` entry.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description.clone().unwrap_or_default(),
            "inputSchema": self.input_schema,
        })
    }
}

/// Result of a tool call, in MCP content form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Content blocks.
    pub content: Vec<Value>,
    /// Whether the result represents an error.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    /// A successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![serde_json::json!({"type": "text", "text": text.into()})],
            is_error: false,
        }
    }

    /// An error text result.
    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![serde_json::json!({"type": "text", "text": text.into()})],
            is_error: true,
        }
    }

    /// Render to the `tools/call` wire result.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        serde_json::json!({
            "content": self.content,
            "isError": self.is_error,
        })
    }
}
