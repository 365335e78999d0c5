//! Compiled role types.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use waygate_core::{MemoryLevel, RoleId, ServerScope, ToolPattern};

/// A role's memory grant: a level plus, at `team` level, the roles
/// whose stores are shared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryGrant {
    /// Access level.
    pub level: MemoryLevel,
    /// Team roles sharing stores (meaningful at `team` level only).
    pub team_roles: BTreeSet<RoleId>,
}

impl MemoryGrant {
    /// A grant at a bare level with no team roles.
    #[must_use]
    pub fn at_level(level: MemoryLevel) -> Self {
        Self {
            level,
            team_roles: BTreeSet::new(),
        }
    }

    /// Aggregate another grant into this one.
    ///
    /// The higher level wins outright. Two grants at `team` level union
    /// their team-role sets.
    pub fn merge(&mut self, other: &Self) {
        match other.level.cmp(&self.level) {
            std::cmp::Ordering::Greater => {
                self.level = other.level;
                self.team_roles = other.team_roles.clone();
            },
            std::cmp::Ordering::Equal => {
                if self.level == MemoryLevel::Team {
                    self.team_roles.extend(other.team_roles.iter().cloned());
                }
            },
            std::cmp::Ordering::Less => {},
        }
    }
}

/// A compiled role: the union of every skill grant that names it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    /// Unique role id.
    pub id: RoleId,
    /// Optional parent role.
    pub inherits: Option<RoleId>,
    /// Servers this role may reach (derived from its tool grants).
    pub allowed_servers: ServerScope,
    /// Tool allow patterns.
    pub allowed_tools: Vec<ToolPattern>,
    /// Tool deny patterns; deny wins over allow.
    pub denied_tools: Vec<ToolPattern>,
    /// Memory grant.
    pub memory: MemoryGrant,
    /// Opaque instruction text surfaced to the agent layer.
    pub system_instruction: String,
}

impl Role {
    /// Create an empty role.
    #[must_use]
    pub fn new(id: RoleId) -> Self {
        Self {
            id,
            inherits: None,
            allowed_servers: ServerScope::empty(),
            allowed_tools: Vec::new(),
            denied_tools: Vec::new(),
            memory: MemoryGrant::default(),
            system_instruction: String::new(),
        }
    }

    /// Add an allow pattern, keeping the list free of duplicates and
    /// widening the server scope to cover it.
    pub fn grant_pattern(&mut self, pattern: ToolPattern) {
        match &pattern {
            ToolPattern::Global => self.allowed_servers.merge(&ServerScope::All),
            ToolPattern::Server(server) => self.add_server(server.clone()),
            ToolPattern::Exact(name) => {
                if let Some((prefix, _)) = name.split_once("__") {
                    self.add_server(prefix.to_string());
                }
            },
        }
        if !self.allowed_tools.contains(&pattern) {
            self.allowed_tools.push(pattern);
        }
    }

    fn add_server(&mut self, name: String) {
        if let Ok(id) = waygate_core::ServerId::new(name) {
            self.allowed_servers
                .merge(&ServerScope::Listed([id].into_iter().collect()));
        }
    }
}

/// The flattened view of a role after inheritance resolution.
///
/// This is what the visibility engine filters against; it is replaced
/// atomically on every role switch.
#[derive(Debug, Clone, Default)]
pub struct EffectiveRole {
    /// The role the view was computed for.
    pub id: Option<RoleId>,
    /// Merged server scope across the inheritance chain.
    pub servers: ServerScope,
    /// Merged allow patterns.
    pub allowed_tools: Vec<ToolPattern>,
    /// Merged deny patterns.
    pub denied_tools: Vec<ToolPattern>,
    /// Aggregated memory grant.
    pub memory: MemoryGrant,
}

impl EffectiveRole {
    /// Whether a fully-qualified tool name is permitted: deny patterns
    /// are consulted first, then allow patterns.
    #[must_use]
    pub fn allows_tool(&self, qualified: &str) -> bool {
        if self.denied_tools.iter().any(|p| p.matches(qualified)) {
            return false;
        }
        self.allowed_tools.iter().any(|p| p.matches(qualified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_merge_higher_wins() {
        let mut grant = MemoryGrant::at_level(MemoryLevel::Isolated);
        grant.merge(&MemoryGrant::at_level(MemoryLevel::All));
        assert_eq!(grant.level, MemoryLevel::All);

        grant.merge(&MemoryGrant::at_level(MemoryLevel::None));
        assert_eq!(grant.level, MemoryLevel::All);
    }

    #[test]
    fn test_memory_merge_team_unions() {
        let mut a = MemoryGrant {
            level: MemoryLevel::Team,
            team_roles: [RoleId::new("dev")].into_iter().collect(),
        };
        let b = MemoryGrant {
            level: MemoryLevel::Team,
            team_roles: [RoleId::new("ops")].into_iter().collect(),
        };
        a.merge(&b);
        assert_eq!(a.level, MemoryLevel::Team);
        assert_eq!(a.team_roles.len(), 2);
    }

    #[test]
    fn test_grant_pattern_widens_servers() {
        let mut role = Role::new(RoleId::new("developer"));
        role.grant_pattern(ToolPattern::parse("fs__read"));
        assert!(
            role.allowed_servers
                .allows(&waygate_core::ServerId::new("fs").unwrap())
        );

        role.grant_pattern(ToolPattern::parse("*"));
        assert_eq!(role.allowed_servers, ServerScope::All);
    }

    #[test]
    fn test_deny_wins() {
        let effective = EffectiveRole {
            id: Some(RoleId::new("dev")),
            servers: ServerScope::All,
            allowed_tools: vec![ToolPattern::parse("fs__*")],
            denied_tools: vec![ToolPattern::parse("fs__delete")],
            memory: MemoryGrant::default(),
        };
        assert!(effective.allows_tool("fs__read"));
        assert!(!effective.allows_tool("fs__delete"));
    }
}
