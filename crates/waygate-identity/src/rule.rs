//! Compiled match rules.

use std::collections::BTreeSet;

use waygate_core::{MatchRuleSpec, RoleId, SkillId};

use crate::context::RuleContext;
use crate::error::IdentityResult;

/// One compiled identity-match rule.
#[derive(Debug, Clone)]
pub struct MatchRule {
    /// Role assigned when the rule matches.
    pub role: RoleId,
    /// Skills that must all be declared.
    pub required_skills: Vec<SkillId>,
    /// Skills of which at least `min_skill_match` must be declared.
    pub any_skills: Vec<SkillId>,
    /// Minimum any-skill hits.
    pub min_skill_match: usize,
    /// Skills whose presence rejects the rule outright.
    pub forbidden_skills: Vec<SkillId>,
    /// Optional compiled time/day context.
    pub context: Option<RuleContext>,
    /// Evaluation priority, descending.
    pub priority: i32,
    /// Operator-facing description.
    pub description: Option<String>,
}

impl MatchRule {
    /// Compile a declarative rule spec.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::IdentityError::InvalidConfig`] from context
    /// compilation in strict mode.
    pub fn compile(spec: &MatchRuleSpec, strict: bool) -> IdentityResult<Self> {
        let context = match &spec.context {
            Some(context_spec) => Some(RuleContext::compile(context_spec, strict)?),
            None => None,
        };
        Ok(Self {
            role: spec.role.clone(),
            required_skills: spec.required_skills.clone(),
            any_skills: spec.any_skills.clone(),
            min_skill_match: spec.min_skill_match.max(1),
            forbidden_skills: spec.forbidden_skills.clone(),
            context,
            priority: spec.priority,
            description: spec.description.clone(),
        })
    }

    /// Evaluate the skill gates (not the time context) against a
    /// declared skill set. Returns the matched skills on success.
    ///
    /// Forbidden skills are checked before anything else.
    #[must_use]
    pub fn match_skills(&self, declared: &BTreeSet<SkillId>) -> Option<Vec<SkillId>> {
        if self
            .forbidden_skills
            .iter()
            .any(|skill| declared.contains(skill))
        {
            return None;
        }

        if !self
            .required_skills
            .iter()
            .all(|skill| declared.contains(skill))
        {
            return None;
        }

        let any_hits: Vec<SkillId> = self
            .any_skills
            .iter()
            .filter(|skill| declared.contains(*skill))
            .cloned()
            .collect();
        if !self.any_skills.is_empty() && any_hits.len() < self.min_skill_match {
            return None;
        }

        let mut matched: Vec<SkillId> = self
            .required_skills
            .iter()
            .filter(|skill| declared.contains(*skill))
            .cloned()
            .collect();
        for skill in any_hits {
            if !matched.contains(&skill) {
                matched.push(skill);
            }
        }
        Some(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared(skills: &[&str]) -> BTreeSet<SkillId> {
        skills.iter().map(|s| SkillId::new(*s)).collect()
    }

    fn rule(spec: serde_json::Value) -> MatchRule {
        let spec: MatchRuleSpec = serde_json::from_value(spec).unwrap();
        MatchRule::compile(&spec, true).unwrap()
    }

    #[test]
    fn test_required_all_present() {
        let rule = rule(serde_json::json!({
            "role": "admin",
            "requiredSkills": ["admin_access", "system_management"],
        }));
        assert!(rule.match_skills(&declared(&["admin_access", "system_management"])).is_some());
        assert!(rule.match_skills(&declared(&["admin_access"])).is_none());
    }

    #[test]
    fn test_forbidden_checked_first() {
        let rule = rule(serde_json::json!({
            "role": "admin",
            "requiredSkills": ["admin_access"],
            "forbiddenSkills": ["untrusted"],
        }));
        assert!(rule.match_skills(&declared(&["admin_access", "untrusted"])).is_none());
    }

    #[test]
    fn test_any_skills_threshold() {
        let rule = rule(serde_json::json!({
            "role": "developer",
            "anySkills": ["coding", "review", "testing"],
            "minSkillMatch": 2,
        }));
        assert!(rule.match_skills(&declared(&["coding"])).is_none());
        let matched = rule.match_skills(&declared(&["coding", "testing"])).unwrap();
        assert_eq!(matched.len(), 2);
    }

    #[test]
    fn test_matched_skills_union() {
        let rule = rule(serde_json::json!({
            "role": "developer",
            "requiredSkills": ["coding"],
            "anySkills": ["coding", "review"],
        }));
        let matched = rule.match_skills(&declared(&["coding", "review"])).unwrap();
        assert_eq!(matched.len(), 2);
    }
}
