//! Skill manifest input model.
//!
//! Skills are declarative grants: each one names the roles that may use
//! it and the tools those roles gain. The on-disk format (YAML, Markdown
//! frontmatter, JSON) is an external concern; parsers produce this shape.
//! Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

use crate::id::{RoleId, SkillId};

/// The sentinel role meaning "every explicit role in the manifest".
pub const WILDCARD_ROLE: &str = "*";

/// A full skill manifest: the unit the compiler consumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillManifest {
    /// All skills, in declaration order.
    #[serde(default)]
    pub skills: Vec<Skill>,
}

impl SkillManifest {
    /// Build a manifest from a list of skills.
    #[must_use]
    pub fn new(skills: Vec<Skill>) -> Self {
        Self { skills }
    }
}

/// A single declarative skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    /// Unique skill id.
    pub id: SkillId,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Description shown to operators.
    #[serde(default)]
    pub description: String,
    /// Roles that may use this skill. May contain the `*` sentinel.
    #[serde(default)]
    pub allowed_roles: Vec<String>,
    /// Tool-name patterns this skill grants (`server__tool`,
    /// `server__*`, `*`).
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    /// Optional capability grants.
    #[serde(default)]
    pub grants: Option<Grants>,
    /// Optional identity-matching block.
    #[serde(default)]
    pub identity: Option<IdentityBlock>,
}

impl Skill {
    /// Create a minimal skill with id, roles, and tools.
    #[must_use]
    pub fn new(
        id: impl Into<SkillId>,
        allowed_roles: Vec<String>,
        allowed_tools: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: String::new(),
            allowed_roles,
            allowed_tools,
            grants: None,
            identity: None,
        }
    }

    /// Whether the skill applies to every explicit role in the manifest.
    #[must_use]
    pub fn applies_to_all_roles(&self) -> bool {
        self.allowed_roles.iter().any(|r| r == WILDCARD_ROLE)
    }
}

/// Non-tool capabilities granted by a skill.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grants {
    /// Memory access level.
    #[serde(default)]
    pub memory: MemoryLevel,
    /// Roles whose stores are shared when `memory` is `team`.
    #[serde(default)]
    pub memory_team_roles: Vec<RoleId>,
}

/// Memory access levels, totally ordered: `all > team > isolated > none`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLevel {
    /// No memory tools at all.
    #[default]
    None,
    /// The role's own store only.
    Isolated,
    /// The role's store plus the listed team roles' stores.
    Team,
    /// Every role's store.
    All,
}

impl std::fmt::Display for MemoryLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Isolated => f.write_str("isolated"),
            Self::Team => f.write_str("team"),
            Self::All => f.write_str("all"),
        }
    }
}

/// Identity rules carried inside a skill.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityBlock {
    /// Skill-match rules contributed to the resolver.
    #[serde(default)]
    pub skill_matching: Vec<MatchRuleSpec>,
    /// Agent-name prefixes that mark an identity as trusted.
    #[serde(default)]
    pub trusted_prefixes: Vec<String>,
}

/// One declarative identity-match rule, as written in a skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRuleSpec {
    /// The role assigned when this rule matches.
    pub role: RoleId,
    /// Skills that must ALL be declared.
    #[serde(default)]
    pub required_skills: Vec<SkillId>,
    /// Skills of which at least `min_skill_match` must be declared.
    #[serde(default)]
    pub any_skills: Vec<SkillId>,
    /// Minimum number of `any_skills` hits.
    #[serde(default = "default_min_skill_match")]
    pub min_skill_match: usize,
    /// Skills whose presence rejects the rule outright.
    #[serde(default)]
    pub forbidden_skills: Vec<SkillId>,
    /// Optional time/day constraints.
    #[serde(default)]
    pub context: Option<RuleContextSpec>,
    /// Rules are tried in descending priority order.
    #[serde(default)]
    pub priority: i32,
    /// Optional operator-facing description.
    #[serde(default)]
    pub description: Option<String>,
}

fn default_min_skill_match() -> usize {
    1
}

/// Declarative time/day constraints on a match rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleContextSpec {
    /// Allowed days of week (`monday` ... `sunday`), lowercase.
    #[serde(default)]
    pub allowed_days: Option<Vec<String>>,
    /// Allowed wall-clock range, `HH:MM-HH:MM`. End at or before start
    /// means the range crosses midnight.
    #[serde(default)]
    pub allowed_time: Option<String>,
    /// IANA timezone name the context is evaluated in.
    #[serde(default)]
    pub timezone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_level_order() {
        assert!(MemoryLevel::All > MemoryLevel::Team);
        assert!(MemoryLevel::Team > MemoryLevel::Isolated);
        assert!(MemoryLevel::Isolated > MemoryLevel::None);
    }

    #[test]
    fn test_manifest_camel_case() {
        let json = serde_json::json!({
            "skills": [{
                "id": "session",
                "allowedRoles": ["*"],
                "allowedTools": ["session__save"],
                "grants": { "memory": "team", "memoryTeamRoles": ["developer"] }
            }]
        });
        let manifest: SkillManifest = serde_json::from_value(json).unwrap();
        let skill = &manifest.skills[0];
        assert!(skill.applies_to_all_roles());
        assert_eq!(
            skill.grants.as_ref().unwrap().memory,
            MemoryLevel::Team
        );
        assert_eq!(
            skill.grants.as_ref().unwrap().memory_team_roles,
            vec![RoleId::new("developer")]
        );
    }

    #[test]
    fn test_match_rule_defaults() {
        let json = serde_json::json!({ "role": "developer", "anySkills": ["coding"] });
        let rule: MatchRuleSpec = serde_json::from_value(json).unwrap();
        assert_eq!(rule.min_skill_match, 1);
        assert_eq!(rule.priority, 0);
        assert!(rule.forbidden_skills.is_empty());
    }
}
