//! Gateway configuration and environment overrides.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use waygate_core::RoleId;
use waygate_mcp::BackendsConfig;
use waygate_quota::Quota;

/// Root directory skills are loaded from (consumed by the external
/// skill parser).
pub const ENV_SKILLS_ROOT: &str = "WAYGATE_SKILLS_ROOT";
/// Path of the backend configuration document.
pub const ENV_SERVERS_CONFIG: &str = "WAYGATE_SERVERS_CONFIG";
/// Truthy values force assigned-identity mode.
pub const ENV_ASSIGNED_IDENTITY: &str = "WAYGATE_ASSIGNED_IDENTITY";
/// Capability ledger secret; 32 random bytes are generated if absent.
pub const ENV_CAPABILITY_SECRET: &str = "WAYGATE_CAPABILITY_SECRET";

/// Static configuration for one gateway instance. Stored on disk as
/// TOML, next to the backend document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Backend spawn descriptors.
    #[serde(default)]
    pub backends: BackendsConfig,
    /// Per-role call quotas.
    #[serde(default)]
    pub quotas: HashMap<RoleId, Quota>,
    /// Role applied before any identity arrives (and the fallback for
    /// unmatched identities).
    #[serde(default = "default_role")]
    pub default_role: RoleId,
    /// The role is derived from identity at connect time; manual
    /// switching is forbidden.
    #[serde(default)]
    pub assigned_identity_mode: bool,
    /// Reject identities no rule matches instead of defaulting.
    #[serde(default)]
    pub reject_unknown: bool,
    /// Raise on malformed identity rule configuration.
    #[serde(default)]
    pub strict_identity: bool,
    /// Start every configured backend eagerly instead of lazily on
    /// first use by a role.
    #[serde(default)]
    pub start_all: bool,
    /// Ring capacity of the audit log.
    #[serde(default = "default_audit_capacity")]
    pub audit_capacity: usize,
    /// Capability secret (UTF-8 key material). Generated when absent.
    #[serde(default)]
    pub capability_secret: Option<String>,
}

fn default_role() -> RoleId {
    RoleId::new("default")
}

fn default_audit_capacity() -> usize {
    10_000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backends: BackendsConfig::default(),
            quotas: HashMap::new(),
            default_role: default_role(),
            assigned_identity_mode: false,
            reject_unknown: false,
            strict_identity: false,
            start_all: false,
            audit_capacity: default_audit_capacity(),
            capability_secret: None,
        }
    }
}

impl GatewayConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GatewayError::Config`] on malformed input.
    pub fn from_toml(doc: &str) -> crate::GatewayResult<Self> {
        toml::from_str(doc).map_err(|e| crate::GatewayError::Config {
            reason: e.to_string(),
        })
    }

    /// Load configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GatewayError::Config`] when the file cannot be
    /// read or parsed.
    pub fn load(path: impl AsRef<std::path::Path>) -> crate::GatewayResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            crate::GatewayError::Config {
                reason: format!("cannot read {}: {e}", path.as_ref().display()),
            }
        })?;
        Self::from_toml(&content)
    }

    /// Apply process-environment overrides: assigned-identity mode and
    /// the capability secret.
    pub fn apply_env(&mut self) {
        if let Ok(value) = std::env::var(ENV_ASSIGNED_IDENTITY) {
            self.assigned_identity_mode = is_truthy(&value);
        }
        if let Ok(secret) = std::env::var(ENV_CAPABILITY_SECRET) {
            if !secret.is_empty() {
                self.capability_secret = Some(secret);
            }
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_parsing() {
        let doc = r#"
            default_role = "guest"
            assigned_identity_mode = true

            [backends.servers.git]
            command = "mcp-git"

            [quotas.developer]
            maxCallsPerMinute = 5
        "#;
        let config = GatewayConfig::from_toml(doc).unwrap();
        assert!(config.backends.servers.contains_key("git"));
        assert_eq!(
            config.quotas[&RoleId::new("developer")].max_calls_per_minute,
            Some(5)
        );
        assert_eq!(config.default_role, RoleId::new("guest"));
        assert!(config.assigned_identity_mode);
        assert_eq!(config.audit_capacity, 10_000);
    }

    #[test]
    fn test_malformed_document_rejected() {
        assert!(matches!(
            GatewayConfig::from_toml("default_role = 7"),
            Err(crate::GatewayError::Config { .. })
        ));
    }

    #[test]
    fn test_truthy_values() {
        assert!(is_truthy("1"));
        assert!(is_truthy("TRUE"));
        assert!(is_truthy("yes"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("off"));
    }
}
