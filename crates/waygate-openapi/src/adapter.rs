//! The virtual server: synthesis and execution.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use waygate_core::ServerId;
use waygate_mcp::{McpError, McpResult, ToolDefinition, ToolDispatcher};

use crate::client::{HttpCall, HttpClient};
use crate::config::VirtualServerConfig;
use crate::document::{OpenApiDocument, Operation, ParameterLocation};
use crate::error::{OpenApiError, OpenApiResult};

/// Everything needed to execute one synthesized tool.
#[derive(Debug, Clone)]
struct OperationBinding {
    method: String,
    path_template: String,
    path_params: Vec<String>,
    query_params: Vec<String>,
    header_params: Vec<String>,
    has_body: bool,
}

/// A non-process backend synthesized from an OpenAPI document.
pub struct VirtualHttpServer {
    config: VirtualServerConfig,
    client: Arc<dyn HttpClient>,
    bindings: RwLock<HashMap<String, OperationBinding>>,
    definitions: RwLock<Vec<ToolDefinition>>,
}

impl VirtualHttpServer {
    /// Create an adapter; call [`VirtualHttpServer::import`] to load
    /// the document and synthesize tools.
    #[must_use]
    pub fn new(config: VirtualServerConfig, client: Arc<dyn HttpClient>) -> Self {
        Self {
            config,
            client,
            bindings: RwLock::new(HashMap::new()),
            definitions: RwLock::new(Vec::new()),
        }
    }

    /// The configured tool prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        self.config.tool_prefix()
    }

    /// Fetch the document and (re)build the synthesized tool set.
    /// Returns how many tools were synthesized.
    ///
    /// # Errors
    ///
    /// Returns transport errors from the injected client and
    /// [`OpenApiError::Document`] for unusable documents.
    pub async fn import(&self) -> OpenApiResult<usize> {
        let raw = self.client.fetch_json(&self.config.spec_url).await?;
        let document = OpenApiDocument::parse(&raw)?;

        let mut bindings = HashMap::new();
        let mut definitions = Vec::new();
        for (path, method, operation) in document.operations() {
            let Some(operation_id) = operation.operation_id.as_deref() else {
                continue;
            };
            if !self.config.selects(operation_id) {
                debug!(operation = %operation_id, "filtered out by include/exclude globs");
                continue;
            }
            let tool_name = format!("{}__{}", self.prefix(), operation_id.to_lowercase());
            definitions.push(self.synthesize_definition(&tool_name, operation));
            bindings.insert(
                tool_name,
                bind_operation(path, method, operation),
            );
        }

        let count = bindings.len();
        if let Ok(mut guard) = self.bindings.write() {
            *guard = bindings;
        }
        if let Ok(mut guard) = self.definitions.write() {
            *guard = definitions;
        }
        info!(server = %self.config.name, tools = count, "imported OpenAPI document");
        Ok(count)
    }

    /// Re-fetch the document and rebuild the synthesized tools.
    ///
    /// # Errors
    ///
    /// Same as [`VirtualHttpServer::import`].
    pub async fn refresh(&self) -> OpenApiResult<usize> {
        self.import().await
    }

    /// Number of synthesized tools. Each tool counts once, under its
    /// prefixed name.
    #[must_use]
    pub fn tool_count(&self) -> usize {
        self.bindings.read().map(|b| b.len()).unwrap_or(0)
    }

    /// Build the input schema for one operation: path/query/header
    /// parameters plus the JSON body's properties.
    fn synthesize_definition(&self, tool_name: &str, operation: &Operation) -> ToolDefinition {
        let mut properties = serde_json::Map::new();
        let mut required: Vec<String> = Vec::new();

        for parameter in &operation.parameters {
            if parameter.location == ParameterLocation::Cookie {
                continue;
            }
            let mut schema = parameter
                .schema
                .clone()
                .unwrap_or_else(|| serde_json::json!({"type": "string"}));
            if let (Some(description), Some(obj)) =
                (&parameter.description, schema.as_object_mut())
            {
                obj.entry("description")
                    .or_insert_with(|| Value::String(description.clone()));
            }
            properties.insert(parameter.name.clone(), schema);
            if parameter.required {
                required.push(parameter.name.clone());
            }
        }

        if let Some(body_schema) = operation.json_body_schema() {
            if let Some(body_props) = body_schema.get("properties").and_then(Value::as_object) {
                for (name, schema) in body_props {
                    properties.entry(name.clone()).or_insert_with(|| schema.clone());
                }
            }
            if let Some(body_required) = body_schema.get("required").and_then(Value::as_array) {
                for name in body_required.iter().filter_map(Value::as_str) {
                    if !required.iter().any(|r| r == name) {
                        required.push(name.to_string());
                    }
                }
            }
        }

        let description = operation
            .summary
            .clone()
            .or_else(|| operation.description.clone())
            .unwrap_or_default();

        ToolDefinition::new(tool_name, self.config.name.clone())
            .with_description(description)
            .with_schema(serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }))
    }

    /// Execute a synthesized tool by its prefixed name.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiError::UnknownTool`] for unknown names,
    /// [`OpenApiError::MissingParameter`] for absent path parameters,
    /// and transport errors from the client.
    pub async fn execute(&self, tool_name: &str, args: &Value) -> OpenApiResult<Value> {
        let binding = self
            .bindings
            .read()
            .ok()
            .and_then(|bindings| bindings.get(tool_name).cloned())
            .ok_or_else(|| OpenApiError::UnknownTool {
                name: tool_name.to_string(),
            })?;

        let mut path = binding.path_template.clone();
        for name in &binding.path_params {
            let value = args
                .get(name)
                .map(value_as_path_segment)
                .ok_or_else(|| OpenApiError::MissingParameter { name: name.clone() })?;
            path = path.replace(&format!("{{{name}}}"), &value);
        }

        let query: Vec<(String, String)> = binding
            .query_params
            .iter()
            .filter_map(|name| {
                args.get(name)
                    .filter(|v| !v.is_null())
                    .map(|v| (name.clone(), value_as_path_segment(v)))
            })
            .collect();

        let mut headers: Vec<(String, String)> = binding
            .header_params
            .iter()
            .filter_map(|name| {
                args.get(name)
                    .filter(|v| !v.is_null())
                    .map(|v| (name.clone(), value_as_path_segment(v)))
            })
            .collect();
        if let Some(auth) = self.config.auth_header() {
            headers.push(auth);
        }

        let body = if binding.has_body {
            let consumed: Vec<&String> = binding
                .path_params
                .iter()
                .chain(&binding.query_params)
                .chain(&binding.header_params)
                .collect();
            let remaining: serde_json::Map<String, Value> = args
                .as_object()
                .map(|object| {
                    object
                        .iter()
                        .filter(|(key, _)| !consumed.iter().any(|c| *c == *key))
                        .map(|(key, value)| (key.clone(), value.clone()))
                        .collect()
                })
                .unwrap_or_default();
            Some(Value::Object(remaining))
        } else {
            None
        };

        let url = format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            path
        );
        let response = self
            .client
            .execute(HttpCall {
                method: binding.method.to_uppercase(),
                url,
                headers,
                query,
                body,
            })
            .await?;

        let data = serde_json::from_str::<Value>(&response.body)
            .unwrap_or(Value::String(response.body.clone()));
        Ok(serde_json::json!({
            "success": response.status < 400,
            "statusCode": response.status,
            "data": data,
        }))
    }
}

#[async_trait]
impl ToolDispatcher for VirtualHttpServer {
    async fn execute(&self, _server: &ServerId, tool: &str, args: Value) -> McpResult<Value> {
        let qualified = format!("{}__{}", self.prefix(), tool);
        Self::execute(self, &qualified, &args)
            .await
            .map_err(|e| match e {
                OpenApiError::UnknownTool { name } => McpError::NoUpstreamForTool { name },
                other => McpError::UpstreamRpc {
                    server: self.config.name.clone(),
                    code: waygate_mcp::error_codes::INTERNAL_ERROR,
                    message: other.to_string(),
                },
            })
    }

    async fn list_tools(&self) -> McpResult<Vec<ToolDefinition>> {
        Ok(self.definitions.read().map(|d| d.clone()).unwrap_or_default())
    }
}

impl std::fmt::Debug for VirtualHttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualHttpServer")
            .field("name", &self.config.name)
            .field("tools", &self.tool_count())
            .finish_non_exhaustive()
    }
}

fn bind_operation(path: &str, method: &str, operation: &Operation) -> OperationBinding {
    let mut path_params = Vec::new();
    let mut query_params = Vec::new();
    let mut header_params = Vec::new();
    for parameter in &operation.parameters {
        match parameter.location {
            ParameterLocation::Path => path_params.push(parameter.name.clone()),
            ParameterLocation::Query => query_params.push(parameter.name.clone()),
            ParameterLocation::Header => header_params.push(parameter.name.clone()),
            ParameterLocation::Cookie => {},
        }
    }
    OperationBinding {
        method: method.to_string(),
        path_template: path.to_string(),
        path_params,
        query_params,
        header_params,
        has_body: operation.json_body_schema().is_some(),
    }
}

fn value_as_path_segment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
