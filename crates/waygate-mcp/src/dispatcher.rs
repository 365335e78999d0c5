//! The tool-call dispatcher seam.
//!
//! Backend processes and synthesized HTTP servers are different sources
//! of tools, but the router treats them uniformly: every source
//! registers its server id with a dispatcher, and calls are routed to
//! the dispatcher owning the tool's prefix.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use waygate_core::ServerId;

use crate::error::McpResult;
use crate::types::ToolDefinition;

/// A source of tools that can execute calls.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Execute a tool by its NATIVE name (prefix already stripped).
    async fn execute(&self, server: &ServerId, tool: &str, args: Value) -> McpResult<Value>;

    /// List this source's tools, fully-qualified.
    async fn list_tools(&self) -> McpResult<Vec<ToolDefinition>>;
}

/// Prefix → dispatcher registry.
#[derive(Clone, Default)]
pub struct DispatcherRegistry {
    inner: Arc<RwLock<HashMap<ServerId, Arc<dyn ToolDispatcher>>>>,
}

impl DispatcherRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dispatcher for a server prefix, replacing any previous
    /// registration.
    pub fn register(&self, server: ServerId, dispatcher: Arc<dyn ToolDispatcher>) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(server, dispatcher);
        }
    }

    /// Remove a registration.
    pub fn unregister(&self, server: &ServerId) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(server);
        }
    }

    /// Look up the dispatcher owning a prefix.
    #[must_use]
    pub fn get(&self, server: &ServerId) -> Option<Arc<dyn ToolDispatcher>> {
        self.inner.read().ok().and_then(|map| map.get(server).cloned())
    }

    /// All registered server ids.
    #[must_use]
    pub fn servers(&self) -> Vec<ServerId> {
        self.inner
            .read()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every distinct dispatcher, deduplicated. A dispatcher serving
    /// many prefixes (the process router) appears once.
    #[must_use]
    pub fn unique_dispatchers(&self) -> Vec<Arc<dyn ToolDispatcher>> {
        let Ok(map) = self.inner.read() else {
            return Vec::new();
        };
        let mut unique: Vec<Arc<dyn ToolDispatcher>> = Vec::new();
        for dispatcher in map.values() {
            if !unique
                .iter()
                .any(|seen| Arc::ptr_eq(seen, dispatcher))
            {
                unique.push(Arc::clone(dispatcher));
            }
        }
        unique
    }
}

impl std::fmt::Debug for DispatcherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherRegistry")
            .field("servers", &self.servers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoDispatcher;

    #[async_trait]
    impl ToolDispatcher for EchoDispatcher {
        async fn execute(&self, _server: &ServerId, tool: &str, args: Value) -> McpResult<Value> {
            Ok(serde_json::json!({"tool": tool, "args": args}))
        }

        async fn list_tools(&self) -> McpResult<Vec<ToolDefinition>> {
            Ok(vec![ToolDefinition::new("echo__say", "echo")])
        }
    }

    #[tokio::test]
    async fn test_register_and_execute() {
        let registry = DispatcherRegistry::new();
        let echo = ServerId::new("echo").unwrap();
        registry.register(echo.clone(), Arc::new(EchoDispatcher));

        let dispatcher = registry.get(&echo).unwrap();
        let result = dispatcher
            .execute(&echo, "say", serde_json::json!({"msg": "hi"}))
            .await
            .unwrap();
        assert_eq!(result["tool"], "say");
    }

    #[test]
    fn test_unregister() {
        let registry = DispatcherRegistry::new();
        let echo = ServerId::new("echo").unwrap();
        registry.register(echo.clone(), Arc::new(EchoDispatcher));
        assert!(registry.get(&echo).is_some());
        registry.unregister(&echo);
        assert!(registry.get(&echo).is_none());
    }
}
