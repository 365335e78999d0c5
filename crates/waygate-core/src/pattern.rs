//! Tool and server access patterns.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::id::ServerId;
use crate::name::NAME_SEPARATOR;

/// A pattern over fully-qualified tool names.
///
/// Three forms are recognized, mirroring the skill manifest grammar:
/// exact (`server__tool`), prefix wildcard (`server__*`), and global
/// (`*`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ToolPattern {
    /// Matches every tool.
    Global,
    /// Matches every tool on one server.
    Server(String),
    /// Matches one fully-qualified name exactly.
    Exact(String),
}

impl ToolPattern {
    /// Parse a pattern string from a manifest.
    #[must_use]
    pub fn parse(pattern: &str) -> Self {
        if pattern == "*" {
            return Self::Global;
        }
        if let Some(prefix) = pattern.strip_suffix("__*") {
            return Self::Server(prefix.to_string());
        }
        Self::Exact(pattern.to_string())
    }

    /// Check whether a fully-qualified tool name matches this pattern.
    #[must_use]
    pub fn matches(&self, qualified: &str) -> bool {
        match self {
            Self::Global => true,
            Self::Server(server) => qualified
                .strip_prefix(server.as_str())
                .and_then(|rest| rest.strip_prefix(NAME_SEPARATOR))
                .is_some_and(|rest| !rest.is_empty()),
            Self::Exact(name) => qualified == name,
        }
    }
}

impl From<String> for ToolPattern {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<ToolPattern> for String {
    fn from(p: ToolPattern) -> Self {
        p.to_string()
    }
}

impl std::fmt::Display for ToolPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => f.write_str("*"),
            Self::Server(server) => write!(f, "{server}{NAME_SEPARATOR}*"),
            Self::Exact(name) => f.write_str(name),
        }
    }
}

/// Which backend servers a role may reach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerScope {
    /// Every server, present and future.
    All,
    /// An explicit allow list.
    Listed(HashSet<ServerId>),
}

impl ServerScope {
    /// An empty scope that allows nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::Listed(HashSet::new())
    }

    /// Check whether a server is in scope.
    #[must_use]
    pub fn allows(&self, server: &ServerId) -> bool {
        match self {
            Self::All => true,
            Self::Listed(set) => set.contains(server),
        }
    }

    /// Merge another scope into this one. `All` absorbs everything.
    pub fn merge(&mut self, other: &Self) {
        match (&mut *self, other) {
            (Self::All, _) => {},
            (_, Self::All) => *self = Self::All,
            (Self::Listed(mine), Self::Listed(theirs)) => {
                mine.extend(theirs.iter().cloned());
            },
        }
    }

    /// Whether the scope allows no servers at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::All => false,
            Self::Listed(set) => set.is_empty(),
        }
    }
}

impl Default for ServerScope {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_forms() {
        assert_eq!(ToolPattern::parse("*"), ToolPattern::Global);
        assert_eq!(
            ToolPattern::parse("fs__*"),
            ToolPattern::Server("fs".to_string())
        );
        assert_eq!(
            ToolPattern::parse("fs__read"),
            ToolPattern::Exact("fs__read".to_string())
        );
    }

    #[test]
    fn test_global_matches_everything() {
        assert!(ToolPattern::Global.matches("fs__read"));
        assert!(ToolPattern::Global.matches("git__log"));
    }

    #[test]
    fn test_server_wildcard() {
        let p = ToolPattern::parse("fs__*");
        assert!(p.matches("fs__read"));
        assert!(p.matches("fs__read__file"));
        assert!(!p.matches("git__log"));
        // A server wildcard must not match a different server sharing the
        // prefix string.
        assert!(!p.matches("fsx__read"));
    }

    #[test]
    fn test_exact() {
        let p = ToolPattern::parse("session__save");
        assert!(p.matches("session__save"));
        assert!(!p.matches("session__load"));
    }

    #[test]
    fn test_scope_merge() {
        let a = ServerId::new("a").unwrap();
        let b = ServerId::new("b").unwrap();
        let mut scope = ServerScope::Listed([a.clone()].into_iter().collect());
        scope.merge(&ServerScope::Listed([b.clone()].into_iter().collect()));
        assert!(scope.allows(&a));
        assert!(scope.allows(&b));

        scope.merge(&ServerScope::All);
        assert_eq!(scope, ServerScope::All);
        assert!(scope.allows(&ServerId::new("anything").unwrap()));
    }

    #[test]
    fn test_pattern_serde_round_trip() {
        let p: ToolPattern = serde_json::from_str("\"fs__*\"").unwrap();
        assert_eq!(p, ToolPattern::Server("fs".to_string()));
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"fs__*\"");
    }
}
