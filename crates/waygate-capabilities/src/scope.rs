//! Token scopes: `type:level` with a monotone level order.

use serde::{Deserialize, Serialize};

/// Access level inside a scope. Levels are totally ordered;
/// `read-only < write < admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScopeLevel {
    /// Read-only access.
    ReadOnly,
    /// Read and write access.
    Write,
    /// Full control.
    Admin,
}

impl ScopeLevel {
    /// Parse a level name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read-only" => Some(Self::ReadOnly),
            "write" => Some(Self::Write),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScopeLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadOnly => f.write_str("read-only"),
            Self::Write => f.write_str("write"),
            Self::Admin => f.write_str("admin"),
        }
    }
}

/// A token scope: a resource type and an access level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    /// What kind of resource the scope covers (`db`, `fs`, ...).
    pub resource_type: String,
    /// How much access it grants.
    pub level: ScopeLevel,
}

impl Scope {
    /// Build a scope.
    #[must_use]
    pub fn new(resource_type: impl Into<String>, level: ScopeLevel) -> Self {
        Self {
            resource_type: resource_type.into(),
            level,
        }
    }

    /// Parse the `type:level` string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let (resource_type, level) = s.split_once(':')?;
        if resource_type.is_empty() {
            return None;
        }
        Some(Self {
            resource_type: resource_type.to_string(),
            level: ScopeLevel::parse(level)?,
        })
    }

    /// Subset check: same resource type, level no higher than the
    /// other's.
    #[must_use]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.resource_type == other.resource_type && self.level <= other.level
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        let scope = Scope::parse("db:admin").unwrap();
        assert_eq!(scope.resource_type, "db");
        assert_eq!(scope.level, ScopeLevel::Admin);
        assert_eq!(scope.to_string(), "db:admin");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Scope::parse("db").is_none());
        assert!(Scope::parse("db:root").is_none());
        assert!(Scope::parse(":admin").is_none());
    }

    #[test]
    fn test_subset_same_type() {
        let read = Scope::parse("db:read-only").unwrap();
        let admin = Scope::parse("db:admin").unwrap();
        assert!(read.is_subset_of(&admin));
        assert!(read.is_subset_of(&read));
        assert!(!admin.is_subset_of(&read));
    }

    #[test]
    fn test_subset_requires_same_type() {
        let db = Scope::parse("db:read-only").unwrap();
        let fs = Scope::parse("fs:admin").unwrap();
        assert!(!db.is_subset_of(&fs));
    }
}
