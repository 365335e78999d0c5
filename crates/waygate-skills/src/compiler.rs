//! The two-pass manifest compiler.

use std::collections::BTreeSet;

use tracing::debug;

use waygate_core::{MemoryLevel, RoleId, SkillManifest, ToolPattern};

use crate::role::MemoryGrant;
use crate::table::RoleTable;

/// Compile a skill manifest into a role table.
///
/// Pass 1 collects the closed set of explicit role ids across every
/// skill's `allowed_roles` (the `*` sentinel is excluded). Pass 2
/// applies each skill to its target roles: tools are unioned into the
/// role's allow set and the skill's memory grant is aggregated under
/// the `all > team > isolated > none` order, with team-role unions at
/// equal `team` level.
#[must_use]
pub fn compile(manifest: &SkillManifest) -> RoleTable {
    // Pass 1: the closed role set R.
    let explicit_roles: BTreeSet<RoleId> = manifest
        .skills
        .iter()
        .flat_map(|skill| skill.allowed_roles.iter())
        .filter(|role| role.as_str() != waygate_core::WILDCARD_ROLE)
        .map(|role| RoleId::new(role.clone()))
        .collect();

    let mut table = RoleTable::new();
    for role in &explicit_roles {
        table.get_or_insert(role);
    }

    // Pass 2: apply each skill to its targets.
    for skill in &manifest.skills {
        let targets: Vec<RoleId> = if skill.applies_to_all_roles() {
            explicit_roles.iter().cloned().collect()
        } else {
            skill
                .allowed_roles
                .iter()
                .map(|role| RoleId::new(role.clone()))
                .collect()
        };

        let grant = skill.grants.as_ref().map(|grants| MemoryGrant {
            level: grants.memory,
            team_roles: grants.memory_team_roles.iter().cloned().collect(),
        });

        for target in targets {
            let role = table.get_or_insert(&target);
            for pattern in &skill.allowed_tools {
                role.grant_pattern(ToolPattern::parse(pattern));
            }
            if let Some(grant) = &grant {
                role.memory.merge(grant);
            }
        }
        debug!(skill = %skill.id, tools = skill.allowed_tools.len(), "applied skill");
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use waygate_core::{Grants, Skill};

    fn manifest(skills: Vec<Skill>) -> SkillManifest {
        SkillManifest::new(skills)
    }

    #[test]
    fn test_wildcard_expansion() {
        // The S1 shape: a `*` skill plus one explicit role.
        let m = manifest(vec![
            Skill::new(
                "session",
                vec!["*".to_string()],
                vec!["session__save".to_string(), "session__load".to_string()],
            ),
            Skill::new(
                "dev",
                vec!["developer".to_string()],
                vec!["fs__read".to_string()],
            ),
        ]);
        let table = compile(&m);

        assert_eq!(table.role_ids(), vec![RoleId::new("developer")]);
        let effective = table.effective(&RoleId::new("developer")).unwrap();
        assert!(effective.allows_tool("session__save"));
        assert!(effective.allows_tool("session__load"));
        assert!(effective.allows_tool("fs__read"));
        assert!(!effective.allows_tool("fs__write"));
    }

    #[test]
    fn test_wildcard_grants_union_of_explicit_roles() {
        let m = manifest(vec![
            Skill::new("everyone", vec!["*".to_string()], vec!["log__write".to_string()]),
            Skill::new("a", vec!["alpha".to_string()], vec!["fs__read".to_string()]),
            Skill::new("b", vec!["beta".to_string()], vec!["git__log".to_string()]),
        ]);
        let table = compile(&m);

        for role in ["alpha", "beta"] {
            let effective = table.effective(&RoleId::new(role)).unwrap();
            assert!(effective.allows_tool("log__write"), "{role} missing shared grant");
        }
        // The sentinel never becomes a role of its own.
        assert!(!table.contains(&RoleId::new("*")));
    }

    #[test]
    fn test_memory_grant_aggregation() {
        let mut isolated = Skill::new("notes", vec!["dev".to_string()], vec![]);
        isolated.grants = Some(Grants {
            memory: MemoryLevel::Isolated,
            memory_team_roles: vec![],
        });
        let mut team = Skill::new("shared-notes", vec!["dev".to_string()], vec![]);
        team.grants = Some(Grants {
            memory: MemoryLevel::Team,
            memory_team_roles: vec![RoleId::new("ops")],
        });

        let table = compile(&manifest(vec![isolated, team]));
        let grant = table.get_effective_memory(&RoleId::new("dev"));
        assert_eq!(grant.level, MemoryLevel::Team);
        assert!(grant.team_roles.contains(&RoleId::new("ops")));
    }

    #[test]
    fn test_equal_team_grants_union() {
        let mut one = Skill::new("one", vec!["dev".to_string()], vec![]);
        one.grants = Some(Grants {
            memory: MemoryLevel::Team,
            memory_team_roles: vec![RoleId::new("ops")],
        });
        let mut two = Skill::new("two", vec!["dev".to_string()], vec![]);
        two.grants = Some(Grants {
            memory: MemoryLevel::Team,
            memory_team_roles: vec![RoleId::new("qa")],
        });

        let table = compile(&manifest(vec![one, two]));
        let grant = table.get_effective_memory(&RoleId::new("dev"));
        assert_eq!(grant.team_roles.len(), 2);
    }

    #[test]
    fn test_compile_is_idempotent() {
        let m = manifest(vec![Skill::new(
            "dev",
            vec!["developer".to_string()],
            vec!["fs__*".to_string()],
        )]);
        let first = compile(&m);
        let second = compile(&m);
        assert_eq!(first.role_ids(), second.role_ids());
        let a = first.effective(&RoleId::new("developer")).unwrap();
        let b = second.effective(&RoleId::new("developer")).unwrap();
        assert_eq!(a.allowed_tools, b.allowed_tools);
    }
}
