//! The injected HTTP client seam.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{OpenApiError, OpenApiResult};

/// One outgoing HTTP call, fully assembled by the adapter.
#[derive(Debug, Clone)]
pub struct HttpCall {
    /// HTTP method, uppercase.
    pub method: String,
    /// Absolute URL with path parameters substituted.
    pub url: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// JSON request body.
    pub body: Option<Value>,
}

/// The raw response the adapter maps into a tool result.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

/// The transport the adapter executes against. Injected so deployments
/// can wrap their own client (retries, proxies, test doubles).
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetch and parse a JSON document (the OpenAPI description).
    async fn fetch_json(&self, url: &str) -> OpenApiResult<Value>;

    /// Execute an assembled call.
    async fn execute(&self, call: HttpCall) -> OpenApiResult<HttpResponse>;
}

/// Reqwest-backed implementation of [`HttpClient`].
#[cfg(feature = "reqwest")]
#[derive(Debug, Clone, Default)]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

#[cfg(feature = "reqwest")]
impl ReqwestClient {
    /// Create a client with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "reqwest")]
#[async_trait]
impl HttpClient for ReqwestClient {
    async fn fetch_json(&self, url: &str) -> OpenApiResult<Value> {
        let response = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(|e| OpenApiError::Transport(e.to_string()))?;
        response
            .json()
            .await
            .map_err(|e| OpenApiError::Transport(e.to_string()))
    }

    async fn execute(&self, call: HttpCall) -> OpenApiResult<HttpResponse> {
        let method = reqwest::Method::from_bytes(call.method.as_bytes())
            .map_err(|e| OpenApiError::Transport(e.to_string()))?;
        let mut request = self.inner.request(method, &call.url).query(&call.query);
        for (name, value) in &call.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &call.body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| OpenApiError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| OpenApiError::Transport(e.to_string()))?;
        Ok(HttpResponse { status, body })
    }
}
