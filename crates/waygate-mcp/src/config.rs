//! Backend spawn configuration.
//!
//! A backend is described by a spawn descriptor: command, argv, an
//! environment template, and an optional working directory. Environment
//! values may reference ambient variables as `${NAME}`; references are
//! expanded at spawn time and unresolved names become empty strings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{McpError, McpResult};

/// Spawn descriptor for one backend child process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Executable to run.
    pub command: String,
    /// Arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment template. Values may contain `${NAME}` references.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for the child.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl BackendConfig {
    /// Create a config for a bare command.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
        }
    }

    /// Add arguments.
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add an environment variable (template form).
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Resolve the environment template against the ambient environment.
    #[must_use]
    pub fn resolved_env(&self) -> HashMap<String, String> {
        self.env
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    expand_env_value(v, |name| std::env::var(name).ok()),
                )
            })
            .collect()
    }
}

/// The full backend configuration document: server id → spawn
/// descriptor. Stored on disk as TOML (`servers.toml` style).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendsConfig {
    /// Configured backends, keyed by server id.
    #[serde(default)]
    pub servers: HashMap<String, BackendConfig>,
}

impl BackendsConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::InvalidConfig`] on malformed input.
    pub fn from_toml(content: &str) -> McpResult<Self> {
        toml::from_str(content).map_err(|e| McpError::InvalidConfig {
            reason: e.to_string(),
        })
    }

    /// Load configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> McpResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Save configuration to a file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be serialized or
    /// written.
    pub fn save(&self, path: impl AsRef<Path>) -> McpResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| McpError::InvalidConfig {
            reason: e.to_string(),
        })?;
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Expand `${NAME}` references in a single value using `lookup`.
/// Unresolved references expand to the empty string.
pub fn expand_env_value(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start.saturating_add(2)..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                if let Some(resolved) = lookup(name) {
                    out.push_str(&resolved);
                }
                rest = &after[end.saturating_add(1)..];
            },
            None => {
                // Unterminated reference, keep it literally.
                out.push_str(&rest[start..]);
                rest = "";
            },
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_env(name: &str) -> Option<String> {
        match name {
            "HOME" => Some("/home/agent".to_string()),
            "TOKEN" => Some("tok-123".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_expand_single() {
        assert_eq!(expand_env_value("${HOME}/bin", fake_env), "/home/agent/bin");
    }

    #[test]
    fn test_expand_multiple() {
        assert_eq!(
            expand_env_value("${HOME}:${TOKEN}", fake_env),
            "/home/agent:tok-123"
        );
    }

    #[test]
    fn test_unresolved_becomes_empty() {
        assert_eq!(expand_env_value("x${MISSING}y", fake_env), "xy");
    }

    #[test]
    fn test_no_references() {
        assert_eq!(expand_env_value("plain", fake_env), "plain");
    }

    #[test]
    fn test_unterminated_kept_literal() {
        assert_eq!(expand_env_value("a${OPEN", fake_env), "a${OPEN");
    }

    #[test]
    fn test_backends_document() {
        let doc = r#"
            [servers.git]
            command = "mcp-git"
            args = ["--repo", "."]

            [servers.git.env]
            GIT_TOKEN = "${TOKEN}"
        "#;
        let config = BackendsConfig::from_toml(doc).unwrap();
        let git = &config.servers["git"];
        assert_eq!(git.command, "mcp-git");
        assert_eq!(git.args, vec!["--repo", "."]);
        assert_eq!(git.env["GIT_TOKEN"], "${TOKEN}");
    }

    #[test]
    fn test_malformed_document_rejected() {
        assert!(matches!(
            BackendsConfig::from_toml("servers = 3"),
            Err(McpError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_save_load_round_trip() {
        let mut config = BackendsConfig::default();
        config.servers.insert(
            "git".to_string(),
            BackendConfig::new("mcp-git")
                .with_args(["--repo", "."])
                .with_env("GIT_TOKEN", "${TOKEN}"),
        );

        let path = std::env::temp_dir().join(format!(
            "waygate-backends-{}.toml",
            std::process::id()
        ));
        config.save(&path).unwrap();
        let loaded = BackendsConfig::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        let git = &loaded.servers["git"];
        assert_eq!(git.command, "mcp-git");
        assert_eq!(git.args, vec!["--repo", "."]);
        assert_eq!(git.env["GIT_TOKEN"], "${TOKEN}");
    }
}
