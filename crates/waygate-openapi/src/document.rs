//! The OpenAPI 3 subset the adapter understands.
//!
//! Only what tool synthesis needs: paths, operations, parameters, and
//! JSON request bodies. Everything else in the document is ignored.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{OpenApiError, OpenApiResult};

/// Where a parameter lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    /// Substituted into the URL path.
    Path,
    /// Appended to the query string.
    Query,
    /// Sent as a request header.
    Header,
    /// Cookie parameters are accepted but not forwarded.
    Cookie,
}

/// One operation parameter.
#[derive(Debug, Clone, Deserialize)]
pub struct Parameter {
    /// Parameter name.
    pub name: String,
    /// Location (`in` on the wire).
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    /// Whether the parameter is required.
    #[serde(default)]
    pub required: bool,
    /// JSON schema of the parameter value.
    #[serde(default)]
    pub schema: Option<Value>,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
}

/// One path operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// The operation id tools are named after.
    #[serde(default)]
    pub operation_id: Option<String>,
    /// Short summary used as the tool description.
    #[serde(default)]
    pub summary: Option<String>,
    /// Longer description, used when no summary exists.
    #[serde(default)]
    pub description: Option<String>,
    /// Parameters.
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Request body (only `application/json` is used).
    #[serde(default)]
    pub request_body: Option<Value>,
}

impl Operation {
    /// The JSON request-body schema, when one is declared.
    #[must_use]
    pub fn json_body_schema(&self) -> Option<&Value> {
        self.request_body
            .as_ref()?
            .get("content")?
            .get("application/json")?
            .get("schema")
    }
}

/// A parsed OpenAPI 3 document, reduced to its paths.
#[derive(Debug, Clone)]
pub struct OpenApiDocument {
    /// Path template -> method -> operation.
    pub paths: BTreeMap<String, BTreeMap<String, Operation>>,
}

const HTTP_METHODS: &[&str] = &["get", "put", "post", "delete", "patch", "head", "options"];

impl OpenApiDocument {
    /// Parse a fetched document.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiError::Document`] when the value has no usable
    /// `paths` object or does not declare OpenAPI 3.
    pub fn parse(value: &Value) -> OpenApiResult<Self> {
        let version = value
            .get("openapi")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !version.starts_with('3') {
            return Err(OpenApiError::Document {
                reason: format!("unsupported openapi version: {version:?}"),
            });
        }

        let Some(raw_paths) = value.get("paths").and_then(Value::as_object) else {
            return Err(OpenApiError::Document {
                reason: "document has no paths object".to_string(),
            });
        };

        let mut paths = BTreeMap::new();
        for (path, item) in raw_paths {
            let Some(item) = item.as_object() else {
                continue;
            };
            let mut operations = BTreeMap::new();
            for method in HTTP_METHODS {
                let Some(raw) = item.get(*method) else {
                    continue;
                };
                match serde_json::from_value::<Operation>(raw.clone()) {
                    Ok(operation) => {
                        operations.insert((*method).to_string(), operation);
                    },
                    Err(e) => {
                        tracing::debug!(path = %path, method = %method, error = %e, "skipping unparseable operation");
                    },
                }
            }
            if !operations.is_empty() {
                paths.insert(path.clone(), operations);
            }
        }
        Ok(Self { paths })
    }

    /// Iterate every (path, method, operation) triple.
    pub fn operations(&self) -> impl Iterator<Item = (&str, &str, &Operation)> {
        self.paths.iter().flat_map(|(path, methods)| {
            methods
                .iter()
                .map(move |(method, op)| (path.as_str(), method.as_str(), op))
        })
    }
}
