//! Request routing and response correlation.
//!
//! The router owns the correlation-id space: every outgoing request
//! gets a fresh id from a shared counter, and the (server, id) pair
//! maps to a oneshot resolver until the response arrives, the deadline
//! elapses, or the backend disconnects. List-type calls fan out to
//! every ready backend with settled-all semantics.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use waygate_core::{QualifiedToolName, ServerId};

use crate::dispatcher::ToolDispatcher;
use crate::error::{McpError, McpResult};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::supervisor::{BackendState, BackendSupervisor};
use crate::types::ToolDefinition;

/// Default per-hop request deadline.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Events surfaced from the backend fleet to the gateway.
#[derive(Debug)]
pub enum UpstreamEvent {
    /// A backend emitted a notification (already unwrapped from any
    /// `$/notification` envelope).
    Notification {
        /// Originating backend.
        server: ServerId,
        /// The relayed notification.
        notification: JsonRpcNotification,
    },
    /// A backend changed lifecycle state.
    StateChanged {
        /// The backend whose state changed.
        server: ServerId,
        /// The new state.
        state: BackendState,
    },
}

/// In-flight request table shared between the router (dispatch) and the
/// supervisor's reader tasks (response arrival).
pub(crate) struct PendingMap {
    next_id: AtomicI64,
    inflight: DashMap<(ServerId, i64), oneshot::Sender<McpResult<Value>>>,
}

impl PendingMap {
    pub(crate) fn new() -> Self {
        Self {
            // Id 0 is reserved for the initialize handshake.
            next_id: AtomicI64::new(1),
            inflight: DashMap::new(),
        }
    }

    /// Allocate a correlation id. Ids are never reused while in flight.
    pub(crate) fn allocate(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Register a resolver for (server, id).
    pub(crate) fn register(&self, server: ServerId, id: i64) -> oneshot::Receiver<McpResult<Value>> {
        let (tx, rx) = oneshot::channel();
        self.inflight.insert((server, id), tx);
        rx
    }

    /// Resolve a response frame. Unknown ids are logged and dropped;
    /// this also covers late responses to cancelled requests.
    pub(crate) fn resolve(&self, server: &ServerId, response: &JsonRpcResponse) {
        let Some((_, tx)) = self.inflight.remove(&(server.clone(), response.id)) else {
            debug!(server = %server, id = response.id, "dropping response with unknown correlation id");
            return;
        };
        let outcome = match &response.error {
            Some(err) => Err(McpError::from_rpc(server.as_str(), err)),
            None => Ok(response.result.clone().unwrap_or(Value::Null)),
        };
        let _ = tx.send(outcome);
    }

    /// Remove a single pending entry (cancellation / timeout).
    pub(crate) fn purge_one(&self, server: &ServerId, id: i64) {
        self.inflight.remove(&(server.clone(), id));
    }

    /// Reject every pending entry targeted at a server. Returns how
    /// many were rejected.
    pub(crate) fn purge_server(&self, server: &ServerId) -> usize {
        let keys: Vec<(ServerId, i64)> = self
            .inflight
            .iter()
            .filter(|entry| &entry.key().0 == server)
            .map(|entry| entry.key().clone())
            .collect();
        let mut rejected = 0usize;
        for key in keys {
            if let Some((_, tx)) = self.inflight.remove(&key) {
                let _ = tx.send(Err(McpError::UpstreamDisconnected {
                    server: server.to_string(),
                }));
                rejected = rejected.saturating_add(1);
            }
        }
        rejected
    }

    pub(crate) fn clear(&self) {
        self.inflight.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inflight.len()
    }
}

/// Routes client requests to backends and aggregates fan-out calls.
pub struct RequestRouter {
    supervisor: Arc<BackendSupervisor>,
    pending: Arc<PendingMap>,
    timeout: Duration,
}

impl RequestRouter {
    /// Create a router over a supervisor's fleet.
    #[must_use]
    pub fn new(supervisor: Arc<BackendSupervisor>) -> Self {
        let pending = supervisor.pending();
        Self {
            supervisor,
            pending,
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// Override the per-hop deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send one request to one backend and await its response.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::ServerNotReady`] when the backend is not
    /// ready, [`McpError::UpstreamTimeout`] on deadline, and the
    /// backend's own error when it answers with one.
    pub async fn request(
        &self,
        server: &ServerId,
        method: &str,
        params: Option<Value>,
    ) -> McpResult<Value> {
        match self.supervisor.state_of(server) {
            None => {
                return Err(McpError::ServerNotFound {
                    name: server.to_string(),
                });
            },
            Some(BackendState::Ready) => {},
            Some(state) => {
                return Err(McpError::ServerNotReady {
                    name: server.to_string(),
                    state: state.to_string(),
                });
            },
        }

        let id = self.pending.allocate();
        let rx = self.pending.register(server.clone(), id);
        let request = JsonRpcRequest::new(id, method, params);

        if let Err(e) = self
            .supervisor
            .write_message(server, &serde_json::to_value(&request)?)
            .await
        {
            self.pending.purge_one(server, id);
            return Err(e);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(McpError::UpstreamDisconnected {
                server: server.to_string(),
            }),
            Err(_) => {
                self.pending.purge_one(server, id);
                Err(McpError::UpstreamTimeout {
                    server: server.to_string(),
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                })
            },
        }
    }

    /// Route a `tools/call` by the tool's server prefix, rewriting the
    /// prefixed name to the backend's native name. The response result
    /// is returned unmodified.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::NoUpstreamForTool`] when the prefix matches
    /// no configured backend.
    pub async fn call_tool(&self, qualified: &str, args: Value) -> McpResult<Value> {
        let name = QualifiedToolName::parse(qualified).map_err(|_| McpError::NoUpstreamForTool {
            name: qualified.to_string(),
        })?;
        if !self.supervisor.is_configured(&name.server) {
            return Err(McpError::NoUpstreamForTool {
                name: qualified.to_string(),
            });
        }
        let params = serde_json::json!({
            "name": name.tool,
            "arguments": args,
        });
        self.request(&name.server, "tools/call", Some(params)).await
    }

    /// Fan out `tools/list` to every ready backend, rewriting each
    /// returned tool to its prefixed form. A failing backend
    /// contributes zero tools and never fails the aggregate.
    pub async fn list_tools(&self) -> Vec<ToolDefinition> {
        let servers = self.supervisor.ready_servers();
        let calls = servers.iter().map(|server| async {
            let outcome = self.request(server, "tools/list", None).await;
            (server.clone(), outcome)
        });

        let mut tools = Vec::new();
        for (server, outcome) in join_all(calls).await {
            match outcome {
                Ok(result) => {
                    let native_tools = result
                        .get("tools")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default();
                    tools.extend(
                        native_tools
                            .iter()
                            .map(|native| ToolDefinition::from_native(&server, native)),
                    );
                },
                Err(e) => {
                    warn!(server = %server, error = %e, "tools/list failed; contributing zero tools");
                },
            }
        }
        tools
    }

    /// Fan out `resources/list` with the same settled-all semantics,
    /// merging the resource arrays.
    pub async fn list_resources(&self) -> Value {
        let servers = self.supervisor.ready_servers();
        let calls = servers.iter().map(|server| async {
            let outcome = self.request(server, "resources/list", None).await;
            (server.clone(), outcome)
        });

        let mut resources = Vec::new();
        for (server, outcome) in join_all(calls).await {
            match outcome {
                Ok(result) => {
                    if let Some(list) = result.get("resources").and_then(Value::as_array) {
                        resources.extend(list.iter().cloned());
                    }
                },
                Err(e) => {
                    warn!(server = %server, error = %e, "resources/list failed; contributing zero resources");
                },
            }
        }
        serde_json::json!({ "resources": resources })
    }

    /// Send a request to a named backend, bypassing prefix routing
    /// (remote prompts, targeted resource reads).
    ///
    /// # Errors
    ///
    /// Propagates the same errors as [`RequestRouter::request`].
    pub async fn targeted(
        &self,
        server: &ServerId,
        method: &str,
        params: Option<Value>,
    ) -> McpResult<Value> {
        self.request(server, method, params).await
    }

    /// Route a method with no natural selector to the first ready
    /// backend.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::NoReadyBackend`] when the fleet is empty.
    pub async fn forward_default(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        let Some(server) = self.supervisor.ready_servers().into_iter().next() else {
            return Err(McpError::NoReadyBackend {
                method: method.to_string(),
            });
        };
        self.request(&server, method, params).await
    }
}

#[async_trait]
impl ToolDispatcher for RequestRouter {
    async fn execute(&self, server: &ServerId, tool: &str, args: Value) -> McpResult<Value> {
        let params = serde_json::json!({
            "name": tool,
            "arguments": args,
        });
        self.request(server, "tools/call", Some(params)).await
    }

    async fn list_tools(&self) -> McpResult<Vec<ToolDefinition>> {
        Ok(Self::list_tools(self).await)
    }
}

impl std::fmt::Debug for RequestRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRouter")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;

    fn server(name: &str) -> ServerId {
        ServerId::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_correlation_resolution() {
        let pending = PendingMap::new();
        let git = server("git");
        let id = pending.allocate();
        let rx = pending.register(git.clone(), id);

        pending.resolve(
            &git,
            &JsonRpcResponse::success(id, serde_json::json!({"ok": true})),
        );
        let value = rx.await.unwrap().unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test]
    async fn test_error_response_resolution() {
        let pending = PendingMap::new();
        let git = server("git");
        let id = pending.allocate();
        let rx = pending.register(git.clone(), id);

        pending.resolve(
            &git,
            &JsonRpcResponse::failure(id, crate::protocol::RpcError::new(-32601, "nope")),
        );
        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(err, McpError::UpstreamRpc { code: -32601, .. }));
    }

    #[tokio::test]
    async fn test_unknown_id_dropped() {
        let pending = PendingMap::new();
        let git = server("git");
        // No registration; must not panic.
        pending.resolve(&git, &JsonRpcResponse::success(99, Value::Null));
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test]
    async fn test_purge_server_rejects_inflight() {
        let pending = PendingMap::new();
        let git = server("git");
        let id = pending.allocate();
        let rx = pending.register(git.clone(), id);

        assert_eq!(pending.purge_server(&git), 1);
        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(err, McpError::UpstreamDisconnected { .. }));
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let pending = PendingMap::new();
        let a = pending.allocate();
        let b = pending.allocate();
        assert_ne!(a, b);
        // Id 0 is reserved for handshakes.
        assert!(a > 0 && b > 0);
    }

    #[tokio::test]
    async fn test_call_tool_unknown_prefix() {
        let (supervisor, _events) = BackendSupervisor::new();
        let router = RequestRouter::new(supervisor);
        let err = router
            .call_tool("ghost__tool", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::NoUpstreamForTool { .. }));
    }

    #[tokio::test]
    async fn test_call_tool_unqualified_name() {
        let (supervisor, _events) = BackendSupervisor::new();
        let router = RequestRouter::new(supervisor);
        let err = router
            .call_tool("set_role", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::NoUpstreamForTool { .. }));
    }

    #[tokio::test]
    async fn test_request_to_unready_backend() {
        let (supervisor, _events) = BackendSupervisor::new();
        supervisor.configure(server("git"), BackendConfig::new("true"));
        let router = RequestRouter::new(supervisor);
        let err = router
            .request(&server("git"), "tools/list", None)
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::ServerNotReady { .. }));
    }

    #[tokio::test]
    async fn test_forward_default_no_backends() {
        let (supervisor, _events) = BackendSupervisor::new();
        let router = RequestRouter::new(supervisor);
        let err = router.forward_default("prompts/list", None).await.unwrap_err();
        assert!(matches!(err, McpError::NoReadyBackend { .. }));
    }

    #[tokio::test]
    async fn test_list_tools_empty_fleet() {
        let (supervisor, _events) = BackendSupervisor::new();
        let router = RequestRouter::new(supervisor);
        assert!(router.list_tools().await.is_empty());
    }
}
