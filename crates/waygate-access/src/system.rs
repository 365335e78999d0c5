//! System tool names and definitions.
//!
//! System tools are served by the gateway itself and appear unprefixed
//! in the client's tool list.

use waygate_core::{MemoryLevel, RoleId};
use waygate_mcp::ToolDefinition;
use waygate_skills::MemoryGrant;

/// Switch the active role.
pub const SET_ROLE: &str = "set_role";
/// Save a memory entry to the active role's store.
pub const SAVE_MEMORY: &str = "save_memory";
/// Search memory entries.
pub const RECALL_MEMORY: &str = "recall_memory";
/// List memory entries.
pub const LIST_MEMORIES: &str = "list_memories";
/// Describe the current session (role, trust, tool count).
pub const GET_CONTEXT: &str = "get_context";
/// List the compiled roles.
pub const LIST_ROLES: &str = "list_roles";
/// Delegate a task to a sub-agent.
pub const SPAWN_SUB_AGENT: &str = "spawn_sub_agent";

/// Every system tool name.
pub const ALL: &[&str] = &[
    SET_ROLE,
    SAVE_MEMORY,
    RECALL_MEMORY,
    LIST_MEMORIES,
    GET_CONTEXT,
    LIST_ROLES,
    SPAWN_SUB_AGENT,
];

/// Whether a name refers to a system tool.
#[must_use]
pub fn is_system_tool(name: &str) -> bool {
    ALL.contains(&name)
}

/// Definition of the role-switch tool.
#[must_use]
pub fn set_role_tool() -> ToolDefinition {
    ToolDefinition::new(SET_ROLE, "")
        .with_description("Switch the active role. The visible tool set changes accordingly.")
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "role": {"type": "string", "description": "Role id to switch to"}
            },
            "required": ["role"]
        }))
}

/// Definition of the save-memory tool.
#[must_use]
pub fn save_memory_tool() -> ToolDefinition {
    ToolDefinition::new(SAVE_MEMORY, "")
        .with_description("Save a memory entry under a key in the active role's store.")
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "key": {"type": "string"},
                "content": {"type": "string"}
            },
            "required": ["key", "content"]
        }))
}

/// Definition of the recall-memory tool. The advertised description
/// depends on the active role's memory grant.
#[must_use]
pub fn recall_memory_tool(grant: &MemoryGrant) -> ToolDefinition {
    let description = match grant.level {
        MemoryLevel::All => {
            "Search memory entries across every role's store.".to_string()
        },
        MemoryLevel::Team => {
            let team = grant
                .team_roles
                .iter()
                .map(RoleId::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            format!("Search memory entries in your store and the team stores: {team}.")
        },
        _ => "Search memory entries in your role's own store.".to_string(),
    };
    ToolDefinition::new(RECALL_MEMORY, "")
        .with_description(description)
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"}
            },
            "required": ["query"]
        }))
}

/// Definition of the list-memories tool.
#[must_use]
pub fn list_memories_tool() -> ToolDefinition {
    ToolDefinition::new(LIST_MEMORIES, "")
        .with_description("List memory entries visible to the active role.")
        .with_schema(serde_json::json!({"type": "object", "properties": {}}))
}

/// Definition of the get-context tool.
#[must_use]
pub fn get_context_tool() -> ToolDefinition {
    ToolDefinition::new(GET_CONTEXT, "")
        .with_description("Describe the current session: active role, trust, visible tools.")
        .with_schema(serde_json::json!({"type": "object", "properties": {}}))
}

/// Definition of the list-roles tool.
#[must_use]
pub fn list_roles_tool() -> ToolDefinition {
    ToolDefinition::new(LIST_ROLES, "")
        .with_description("List every compiled role.")
        .with_schema(serde_json::json!({"type": "object", "properties": {}}))
}

/// Definition of the spawn-sub-agent tool.
#[must_use]
pub fn spawn_sub_agent_tool() -> ToolDefinition {
    ToolDefinition::new(SPAWN_SUB_AGENT, "")
        .with_description("Delegate a task to a sub-agent with its own identity.")
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "task": {"type": "string"},
                "role": {"type": "string"}
            },
            "required": ["task"]
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_is_system_tool() {
        assert!(is_system_tool("set_role"));
        assert!(is_system_tool("spawn_sub_agent"));
        assert!(!is_system_tool("git__log"));
    }

    #[test]
    fn test_recall_description_varies_by_grant() {
        let own = recall_memory_tool(&MemoryGrant::at_level(MemoryLevel::Isolated));
        assert!(own.description.unwrap().contains("own store"));

        let team = recall_memory_tool(&MemoryGrant {
            level: MemoryLevel::Team,
            team_roles: BTreeSet::from([RoleId::new("ops"), RoleId::new("qa")]),
        });
        let description = team.description.unwrap();
        assert!(description.contains("ops"));
        assert!(description.contains("qa"));

        let all = recall_memory_tool(&MemoryGrant::at_level(MemoryLevel::All));
        assert!(all.description.unwrap().contains("every role"));
    }
}
