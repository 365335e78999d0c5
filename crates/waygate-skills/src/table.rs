//! The compiled role table and inheritance resolution.

use std::collections::{BTreeMap, HashSet};

use tracing::warn;

use waygate_core::{MemoryLevel, RoleId, ServerScope, ToolPattern};

use crate::error::{SkillError, SkillResult};
use crate::role::{EffectiveRole, MemoryGrant, Role};

/// All compiled roles for one manifest version.
///
/// The table is immutable once handed to the gateway; a manifest reload
/// produces a fresh table that replaces the old one atomically.
#[derive(Debug, Clone, Default)]
pub struct RoleTable {
    roles: BTreeMap<RoleId, Role>,
}

impl RoleTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a role.
    pub fn insert(&mut self, role: Role) {
        self.roles.insert(role.id.clone(), role);
    }

    /// Fetch a role.
    #[must_use]
    pub fn get(&self, id: &RoleId) -> Option<&Role> {
        self.roles.get(id)
    }

    /// Fetch a role mutably, creating an empty one when absent.
    pub fn get_or_insert(&mut self, id: &RoleId) -> &mut Role {
        self.roles
            .entry(id.clone())
            .or_insert_with(|| Role::new(id.clone()))
    }

    /// Whether a role exists.
    #[must_use]
    pub fn contains(&self, id: &RoleId) -> bool {
        self.roles.contains_key(id)
    }

    /// All role ids, sorted.
    #[must_use]
    pub fn role_ids(&self) -> Vec<RoleId> {
        self.roles.keys().cloned().collect()
    }

    /// Declare that `child` inherits from `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`SkillError::RoleNotFound`] when the child role does not
    /// exist. The parent may be declared later.
    pub fn declare_inheritance(&mut self, child: &RoleId, parent: RoleId) -> SkillResult<()> {
        let role = self.roles.get_mut(child).ok_or_else(|| SkillError::RoleNotFound {
            role: child.to_string(),
        })?;
        role.inherits = Some(parent);
        Ok(())
    }

    /// Attach a deny pattern to a role.
    ///
    /// # Errors
    ///
    /// Returns [`SkillError::RoleNotFound`] when the role does not exist.
    pub fn add_denied_pattern(&mut self, id: &RoleId, pattern: ToolPattern) -> SkillResult<()> {
        let role = self.roles.get_mut(id).ok_or_else(|| SkillError::RoleNotFound {
            role: id.to_string(),
        })?;
        if !role.denied_tools.contains(&pattern) {
            role.denied_tools.push(pattern);
        }
        Ok(())
    }

    /// Set a role's system instruction text.
    ///
    /// # Errors
    ///
    /// Returns [`SkillError::RoleNotFound`] when the role does not exist.
    pub fn set_system_instruction(
        &mut self,
        id: &RoleId,
        instruction: impl Into<String>,
    ) -> SkillResult<()> {
        let role = self.roles.get_mut(id).ok_or_else(|| SkillError::RoleNotFound {
            role: id.to_string(),
        })?;
        role.system_instruction = instruction.into();
        Ok(())
    }

    /// Walk the inheritance chain from `start`, oldest ancestor last.
    ///
    /// Returns `None` when the chain contains a cycle; the caller
    /// degrades to an empty effective result.
    fn chain(&self, start: &RoleId) -> Option<Vec<&Role>> {
        let mut visited: HashSet<&RoleId> = HashSet::new();
        let mut chain = Vec::new();
        let mut current = Some(start);
        while let Some(id) = current {
            if !visited.insert(id) {
                warn!(role = %start, at = %id, "inheritance cycle detected; effective chain is empty");
                return None;
            }
            let Some(role) = self.roles.get(id) else {
                // Dangling parent: stop the walk, keep what we have.
                break;
            };
            chain.push(role);
            current = role.inherits.as_ref();
        }
        Some(chain)
    }

    /// Merged server scope across the inheritance chain.
    #[must_use]
    pub fn get_effective_servers(&self, id: &RoleId) -> ServerScope {
        let Some(chain) = self.chain(id) else {
            return ServerScope::empty();
        };
        let mut scope = ServerScope::empty();
        for role in chain {
            scope.merge(&role.allowed_servers);
        }
        scope
    }

    /// Merged allow/deny pattern lists across the inheritance chain.
    #[must_use]
    pub fn get_effective_tool_permissions(&self, id: &RoleId) -> (Vec<ToolPattern>, Vec<ToolPattern>) {
        let Some(chain) = self.chain(id) else {
            return (Vec::new(), Vec::new());
        };
        let mut allowed = Vec::new();
        let mut denied = Vec::new();
        for role in chain {
            for pattern in &role.allowed_tools {
                if !allowed.contains(pattern) {
                    allowed.push(pattern.clone());
                }
            }
            for pattern in &role.denied_tools {
                if !denied.contains(pattern) {
                    denied.push(pattern.clone());
                }
            }
        }
        (allowed, denied)
    }

    /// Aggregated memory grant across the inheritance chain: the
    /// highest level wins, team-role sets merge at equal `team` level.
    #[must_use]
    pub fn get_effective_memory(&self, id: &RoleId) -> MemoryGrant {
        let Some(chain) = self.chain(id) else {
            return MemoryGrant::at_level(MemoryLevel::None);
        };
        let mut grant = MemoryGrant::default();
        for role in chain {
            grant.merge(&role.memory);
        }
        grant
    }

    /// The full flattened view of a role.
    ///
    /// # Errors
    ///
    /// Returns [`SkillError::RoleNotFound`] when the role does not exist.
    pub fn effective(&self, id: &RoleId) -> SkillResult<EffectiveRole> {
        if !self.contains(id) {
            return Err(SkillError::RoleNotFound {
                role: id.to_string(),
            });
        }
        let (allowed_tools, denied_tools) = self.get_effective_tool_permissions(id);
        Ok(EffectiveRole {
            id: Some(id.clone()),
            servers: self.get_effective_servers(id),
            allowed_tools,
            denied_tools,
            memory: self.get_effective_memory(id),
        })
    }
}
