//! Qualified tool names.
//!
//! Every backend-sourced tool is presented to clients as
//! `<server-id>__<native-name>`. Native names may themselves contain
//! `__`; the first separator wins when splitting. System tools are
//! unprefixed and never parse as qualified names.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::id::ServerId;

/// Separator between the server prefix and the native tool name.
pub const NAME_SEPARATOR: &str = "__";

/// A fully-qualified tool name: server prefix plus native name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedToolName {
    /// The backend the tool belongs to.
    pub server: ServerId,
    /// The tool's native name on that backend.
    pub tool: String,
}

impl QualifiedToolName {
    /// Build a qualified name from its parts.
    #[must_use]
    pub fn new(server: ServerId, tool: impl Into<String>) -> Self {
        Self {
            server,
            tool: tool.into(),
        }
    }

    /// Parse a `server__tool` string.
    ///
    /// The split happens at the FIRST `__`, so native names containing
    /// `__` survive the round trip.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnqualifiedToolName`] when there is no
    /// separator, and [`CoreError::InvalidServerId`] when the prefix is
    /// not a valid server id.
    pub fn parse(name: &str) -> CoreResult<Self> {
        let Some((prefix, rest)) = name.split_once(NAME_SEPARATOR) else {
            return Err(CoreError::UnqualifiedToolName {
                name: name.to_string(),
            });
        };
        if rest.is_empty() {
            return Err(CoreError::UnqualifiedToolName {
                name: name.to_string(),
            });
        }
        Ok(Self {
            server: ServerId::new(prefix)?,
            tool: rest.to_string(),
        })
    }
}

impl std::fmt::Display for QualifiedToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.server, NAME_SEPARATOR, self.tool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let name = QualifiedToolName::parse("git__log").unwrap();
        assert_eq!(name.server.as_str(), "git");
        assert_eq!(name.tool, "log");
        assert_eq!(name.to_string(), "git__log");
    }

    #[test]
    fn test_first_separator_wins() {
        let name = QualifiedToolName::parse("fs__read__file").unwrap();
        assert_eq!(name.server.as_str(), "fs");
        assert_eq!(name.tool, "read__file");
        assert_eq!(name.to_string(), "fs__read__file");
    }

    #[test]
    fn test_unprefixed_rejected() {
        assert!(QualifiedToolName::parse("set_role").is_err());
        assert!(QualifiedToolName::parse("save_memory").is_err());
    }

    #[test]
    fn test_empty_tool_rejected() {
        assert!(QualifiedToolName::parse("git__").is_err());
    }

    #[test]
    fn test_bad_server_prefix_rejected() {
        assert!(QualifiedToolName::parse("my server__tool").is_err());
    }
}
