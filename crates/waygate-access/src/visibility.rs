//! The visibility maps and the access gate.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use waygate_core::{AccessDecision, MemoryLevel, RoleId, ServerId};
use waygate_mcp::ToolDefinition;
use waygate_skills::{EffectiveRole, MemoryGrant};

use crate::system;

/// How system tools are injected for this gateway instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemToolPolicy {
    /// The client's role came from identity resolution at connect time;
    /// manual switching is prohibited and `set_role` is hidden.
    pub assigned_identity_mode: bool,
    /// A sub-agent spawner is registered on the facade.
    pub subagent_enabled: bool,
}

/// Added/removed tool names produced by a visibility recomputation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilityDelta {
    /// Names that became visible.
    pub added: BTreeSet<String>,
    /// Names that stopped being visible.
    pub removed: BTreeSet<String>,
}

impl VisibilityDelta {
    /// Whether the visible set changed at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// The virtual tool table: everything known, and what the active role
/// sees.
#[derive(Debug, Default)]
pub struct ToolVisibility {
    /// Every tool captured from every successful `tools/list`, keyed by
    /// fully-qualified name.
    all_tools: BTreeMap<String, ToolDefinition>,
    /// The active role's subset, system tools included.
    visible: BTreeMap<String, ToolDefinition>,
    /// The active role and its flattened permissions.
    current: Option<EffectiveRole>,
    policy: SystemToolPolicy,
}

impl ToolVisibility {
    /// Create an engine with the given system-tool policy.
    #[must_use]
    pub fn new(policy: SystemToolPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// The active role id, if any.
    #[must_use]
    pub fn current_role(&self) -> Option<&RoleId> {
        self.current.as_ref().and_then(|e| e.id.as_ref())
    }

    /// The active role's aggregated memory grant (empty when no role
    /// is set).
    #[must_use]
    pub fn effective_memory(&self) -> MemoryGrant {
        self.memory_grant()
    }

    /// Replace one server's entries in the all-tools map and refilter.
    /// Returns the resulting delta so the caller can notify the client
    /// when a backend's report changes the visible set.
    pub fn record_server_tools(
        &mut self,
        server: &ServerId,
        tools: Vec<ToolDefinition>,
    ) -> VisibilityDelta {
        self.all_tools
            .retain(|_, tool| tool.server != server.as_str());
        for tool in tools {
            self.all_tools.insert(tool.name.clone(), tool);
        }
        debug!(server = %server, total = self.all_tools.len(), "recorded server tools");
        self.refilter()
    }

    /// Recompute visibility for a new active role, returning the pure
    /// set difference against the previous snapshot.
    pub fn set_current_role(&mut self, effective: EffectiveRole) -> VisibilityDelta {
        self.current = Some(effective);
        self.refilter()
    }

    /// Tools currently visible, in name order.
    #[must_use]
    pub fn visible_tools(&self) -> Vec<ToolDefinition> {
        self.visible.values().cloned().collect()
    }

    /// Number of currently visible tools.
    #[must_use]
    pub fn visible_count(&self) -> usize {
        self.visible.len()
    }

    /// Everything any backend has reported, unfiltered.
    #[must_use]
    pub fn all_tools(&self) -> Vec<ToolDefinition> {
        self.all_tools.values().cloned().collect()
    }

    /// The gate consulted on every `tools/call`.
    ///
    /// System tools are gated by the same predicates that inject them;
    /// every other name must be present in the visible map.
    #[must_use]
    pub fn check_access(&self, name: &str) -> AccessDecision {
        if system::is_system_tool(name) {
            if self.system_tool_available(name) {
                return AccessDecision::Allowed;
            }
            return AccessDecision::denied(
                "tool_not_accessible",
                format!("system tool {name} is not available{}", self.role_hint()),
            );
        }

        if self.visible.contains_key(name) {
            return AccessDecision::Allowed;
        }
        let role = self
            .current_role()
            .map_or_else(|| "(none)".to_string(), ToString::to_string);

        // Distinguish "the role lacks this backend" from "the tool is
        // filtered out" for programmatic handling.
        if let (Some(tool), Some(effective)) = (self.all_tools.get(name), self.current.as_ref()) {
            let server_blocked = ServerId::new(tool.server.clone())
                .map(|id| !effective.servers.allows(&id))
                .unwrap_or(false);
            if server_blocked {
                return AccessDecision::denied(
                    "server_not_accessible",
                    format!(
                        "role {role} cannot access server {}{}",
                        tool.server,
                        self.role_hint()
                    ),
                );
            }
        }
        AccessDecision::denied(
            "tool_not_accessible",
            format!("tool {name} is not accessible for role {role}{}", self.role_hint()),
        )
    }

    fn role_hint(&self) -> &'static str {
        if self.policy.assigned_identity_mode {
            "; check your assigned role's tools"
        } else {
            "; use set_role to switch roles"
        }
    }

    fn memory_grant(&self) -> MemoryGrant {
        self.current
            .as_ref()
            .map(|e| e.memory.clone())
            .unwrap_or_default()
    }

    fn system_tool_available(&self, name: &str) -> bool {
        match name {
            system::SET_ROLE => !self.policy.assigned_identity_mode,
            system::SAVE_MEMORY | system::RECALL_MEMORY | system::LIST_MEMORIES => {
                self.memory_grant().level != MemoryLevel::None
            },
            system::GET_CONTEXT | system::LIST_ROLES => true,
            system::SPAWN_SUB_AGENT => self.policy.subagent_enabled,
            _ => false,
        }
    }

    /// Recompute the visible map from `all_tools`, the active role, and
    /// the system-tool predicates. Returns the delta.
    fn refilter(&mut self) -> VisibilityDelta {
        let previous: BTreeSet<String> = self.visible.keys().cloned().collect();

        let mut next: BTreeMap<String, ToolDefinition> = BTreeMap::new();
        if let Some(effective) = &self.current {
            for (name, tool) in &self.all_tools {
                let server_ok = ServerId::new(tool.server.clone())
                    .map(|id| effective.servers.allows(&id))
                    .unwrap_or(false);
                if server_ok && effective.allows_tool(name) {
                    next.insert(name.clone(), tool.clone());
                }
            }
        }

        // Inject system tools behind their predicates.
        if self.system_tool_available(system::SET_ROLE) {
            next.insert(system::SET_ROLE.to_string(), system::set_role_tool());
        }
        if self.system_tool_available(system::SAVE_MEMORY) {
            let grant = self.memory_grant();
            next.insert(system::SAVE_MEMORY.to_string(), system::save_memory_tool());
            next.insert(
                system::RECALL_MEMORY.to_string(),
                system::recall_memory_tool(&grant),
            );
            next.insert(
                system::LIST_MEMORIES.to_string(),
                system::list_memories_tool(),
            );
        }
        next.insert(system::GET_CONTEXT.to_string(), system::get_context_tool());
        next.insert(system::LIST_ROLES.to_string(), system::list_roles_tool());
        if self.system_tool_available(system::SPAWN_SUB_AGENT) {
            next.insert(
                system::SPAWN_SUB_AGENT.to_string(),
                system::spawn_sub_agent_tool(),
            );
        }

        let current: BTreeSet<String> = next.keys().cloned().collect();
        self.visible = next;

        VisibilityDelta {
            added: current.difference(&previous).cloned().collect(),
            removed: previous.difference(&current).cloned().collect(),
        }
    }
}
