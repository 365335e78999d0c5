//! The sub-agent spawner seam.
//!
//! Spawning an agent loop is outside the gateway's scope; when a
//! deployment registers a spawner, the `spawn_sub_agent` system tool
//! becomes visible and delegates here.

use async_trait::async_trait;
use serde_json::Value;

use waygate_core::RoleId;

use crate::error::GatewayResult;

/// A delegation request from the `spawn_sub_agent` tool.
#[derive(Debug, Clone)]
pub struct SubAgentRequest {
    /// What the sub-agent should do.
    pub task: String,
    /// The role the sub-agent should run under, when requested.
    pub role: Option<RoleId>,
    /// The parent session's task id, for capability binding.
    pub parent_task_id: Option<String>,
}

/// Spawns sub-agents on behalf of the gateway.
#[async_trait]
pub trait SubAgentSpawner: Send + Sync {
    /// Spawn a sub-agent and return an opaque result for the caller.
    async fn spawn(&self, request: SubAgentRequest) -> GatewayResult<Value>;
}
