//! The prioritized identity resolver.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use waygate_core::{RoleId, SkillId, SkillManifest};

use crate::error::{IdentityError, IdentityResult};
use crate::rule::MatchRule;

/// The identity an agent declares at connect time.
#[derive(Debug, Clone)]
pub struct AgentIdentity {
    /// Agent name (used for trusted-prefix matching).
    pub name: String,
    /// Declared skills.
    pub skills: BTreeSet<SkillId>,
    /// Optional task the session is bound to.
    pub task_id: Option<String>,
}

impl AgentIdentity {
    /// Build an identity from a name and skills.
    #[must_use]
    pub fn new(name: impl Into<String>, skills: impl IntoIterator<Item = SkillId>) -> Self {
        Self {
            name: name.into(),
            skills: skills.into_iter().collect(),
            task_id: None,
        }
    }
}

/// Outcome of a resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The assigned role.
    pub role: RoleId,
    /// Index of the matched rule in evaluation order; `None` when the
    /// default role was used.
    pub matched_rule: Option<usize>,
    /// Skills that satisfied the matched rule.
    pub matched_skills: Vec<SkillId>,
    /// Whether the agent name carried a trusted prefix.
    pub trusted: bool,
    /// When the resolution happened.
    pub resolved_at: DateTime<Utc>,
}

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Role assigned when no rule matches (unless rejecting).
    pub default_role: RoleId,
    /// Reject unmatched identities instead of defaulting.
    pub reject_unknown: bool,
    /// Raise on malformed rule configuration instead of tolerating it.
    pub strict: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_role: RoleId::new("default"),
            reject_unknown: false,
            strict: false,
        }
    }
}

/// Maps declared identities to roles via prioritized match rules.
#[derive(Debug, Default)]
pub struct IdentityResolver {
    /// Rules in evaluation order: descending priority, insertion order
    /// on ties.
    rules: Vec<MatchRule>,
    trusted_prefixes: Vec<String>,
    config: ResolverConfig,
}

impl IdentityResolver {
    /// Create a resolver with the given configuration.
    #[must_use]
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            rules: Vec::new(),
            trusted_prefixes: Vec::new(),
            config,
        }
    }

    /// The rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[MatchRule] {
        &self.rules
    }

    /// Add one compiled rule, keeping the evaluation order sorted.
    ///
    /// # Errors
    ///
    /// Propagates [`IdentityError::InvalidConfig`] in strict mode.
    pub fn add_rule(&mut self, spec: &waygate_core::MatchRuleSpec) -> IdentityResult<()> {
        let rule = MatchRule::compile(spec, self.config.strict)?;
        self.rules.push(rule);
        // Stable sort: ties keep insertion order.
        self.rules.sort_by_key(|rule| std::cmp::Reverse(rule.priority));
        Ok(())
    }

    /// Add a trusted agent-name prefix.
    pub fn add_trusted_prefix(&mut self, prefix: impl Into<String>) {
        let prefix = prefix.into();
        if !self
            .trusted_prefixes
            .iter()
            .any(|p| p.eq_ignore_ascii_case(&prefix))
        {
            self.trusted_prefixes.push(prefix);
        }
    }

    /// Aggregate every skill's identity block: match rules into the
    /// rule list, trusted prefixes into the union.
    ///
    /// # Errors
    ///
    /// Propagates [`IdentityError::InvalidConfig`] in strict mode.
    pub fn load_from_skills(&mut self, manifest: &SkillManifest) -> IdentityResult<()> {
        for skill in &manifest.skills {
            let Some(identity) = &skill.identity else {
                continue;
            };
            for spec in &identity.skill_matching {
                self.add_rule(spec)?;
            }
            for prefix in &identity.trusted_prefixes {
                self.add_trusted_prefix(prefix.clone());
            }
        }
        Ok(())
    }

    /// Whether an agent name carries a trusted prefix
    /// (case-insensitive).
    #[must_use]
    pub fn is_trusted(&self, name: &str) -> bool {
        let lowered = name.to_lowercase();
        self.trusted_prefixes
            .iter()
            .any(|prefix| lowered.starts_with(&prefix.to_lowercase()))
    }

    /// Resolve an identity now.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Rejected`] when no rule matches and the
    /// resolver rejects unknown agents.
    pub fn resolve(&self, identity: &AgentIdentity) -> IdentityResult<Resolution> {
        self.resolve_at(identity, Utc::now())
    }

    /// Resolve an identity at a specific instant (rule contexts are
    /// evaluated against it).
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Rejected`] when no rule matches and the
    /// resolver rejects unknown agents.
    pub fn resolve_at(
        &self,
        identity: &AgentIdentity,
        now: DateTime<Utc>,
    ) -> IdentityResult<Resolution> {
        let trusted = self.is_trusted(&identity.name);

        for (index, rule) in self.rules.iter().enumerate() {
            let Some(matched_skills) = rule.match_skills(&identity.skills) else {
                continue;
            };
            if let Some(context) = &rule.context {
                if !context.passes_at(now) {
                    continue;
                }
            }
            debug!(
                agent = %identity.name,
                role = %rule.role,
                rule = index,
                "identity matched"
            );
            return Ok(Resolution {
                role: rule.role.clone(),
                matched_rule: Some(index),
                matched_skills,
                trusted,
                resolved_at: now,
            });
        }

        if self.config.reject_unknown {
            return Err(IdentityError::Rejected {
                name: identity.name.clone(),
            });
        }
        Ok(Resolution {
            role: self.config.default_role.clone(),
            matched_rule: None,
            matched_skills: Vec::new(),
            trusted,
            resolved_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waygate_core::MatchRuleSpec;

    fn resolver_with(specs: Vec<serde_json::Value>) -> IdentityResolver {
        let mut resolver = IdentityResolver::new(ResolverConfig::default());
        for spec in specs {
            let spec: MatchRuleSpec = serde_json::from_value(spec).unwrap();
            resolver.add_rule(&spec).unwrap();
        }
        resolver
    }

    fn identity(name: &str, skills: &[&str]) -> AgentIdentity {
        AgentIdentity::new(name, skills.iter().map(|s| SkillId::new(*s)))
    }

    #[test]
    fn test_priority_order() {
        // The S5 shape.
        let resolver = resolver_with(vec![
            serde_json::json!({
                "role": "admin",
                "requiredSkills": ["admin_access", "system_management"],
                "priority": 100,
            }),
            serde_json::json!({
                "role": "developer",
                "anySkills": ["coding"],
                "priority": 10,
            }),
        ]);

        let x = resolver
            .resolve(&identity("x", &["admin_access", "system_management", "coding"]))
            .unwrap();
        assert_eq!(x.role, RoleId::new("admin"));
        assert_eq!(x.matched_rule, Some(0));

        let y = resolver.resolve(&identity("y", &["coding"])).unwrap();
        assert_eq!(y.role, RoleId::new("developer"));

        let z = resolver.resolve(&identity("z", &["admin_access"])).unwrap();
        assert_eq!(z.role, RoleId::new("default"));
        assert!(z.matched_rule.is_none());
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let resolver = resolver_with(vec![
            serde_json::json!({"role": "first", "anySkills": ["s"], "priority": 5}),
            serde_json::json!({"role": "second", "anySkills": ["s"], "priority": 5}),
        ]);
        let resolved = resolver.resolve(&identity("a", &["s"])).unwrap();
        assert_eq!(resolved.role, RoleId::new("first"));
    }

    #[test]
    fn test_reject_unknown() {
        let mut resolver = IdentityResolver::new(ResolverConfig {
            default_role: RoleId::new("default"),
            reject_unknown: true,
            strict: false,
        });
        let spec: MatchRuleSpec =
            serde_json::from_value(serde_json::json!({"role": "dev", "requiredSkills": ["coding"]}))
                .unwrap();
        resolver.add_rule(&spec).unwrap();

        assert!(matches!(
            resolver.resolve(&identity("stranger", &[])),
            Err(IdentityError::Rejected { .. })
        ));
    }

    #[test]
    fn test_trust_is_independent() {
        let mut resolver = IdentityResolver::new(ResolverConfig::default());
        resolver.add_trusted_prefix("Corp-");

        let resolved = resolver.resolve(&identity("corp-runner-7", &[])).unwrap();
        assert!(resolved.trusted);
        assert_eq!(resolved.role, RoleId::new("default"));

        let resolved = resolver.resolve(&identity("outsider", &[])).unwrap();
        assert!(!resolved.trusted);
    }

    #[test]
    fn test_load_from_skills() {
        use waygate_core::{IdentityBlock, Skill, SkillManifest};

        let mut skill = Skill::new("ops", vec!["operator".to_string()], vec![]);
        skill.identity = Some(IdentityBlock {
            skill_matching: vec![
                serde_json::from_value(
                    serde_json::json!({"role": "operator", "requiredSkills": ["ops"]}),
                )
                .unwrap(),
            ],
            trusted_prefixes: vec!["ops-".to_string()],
        });
        let manifest = SkillManifest::new(vec![skill]);

        let mut resolver = IdentityResolver::new(ResolverConfig::default());
        resolver.load_from_skills(&manifest).unwrap();
        assert_eq!(resolver.rules().len(), 1);
        assert!(resolver.is_trusted("OPS-bot"));
    }

    #[test]
    fn test_forbidden_precedes_required() {
        let resolver = resolver_with(vec![serde_json::json!({
            "role": "admin",
            "requiredSkills": ["admin_access"],
            "forbiddenSkills": ["sandboxed"],
            "priority": 50,
        })]);
        let resolved = resolver
            .resolve(&identity("a", &["admin_access", "sandboxed"]))
            .unwrap();
        assert_eq!(resolved.role, RoleId::new("default"));
    }
}
