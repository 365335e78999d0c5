//! Virtual server configuration.

use serde::{Deserialize, Serialize};

/// How requests to the upstream API authenticate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AuthSpec {
    /// Bearer token read from an environment variable at call time.
    BearerEnv {
        /// The environment variable holding the token.
        env: String,
    },
    /// Explicit bearer token.
    BearerToken {
        /// The token value.
        token: String,
    },
    /// API key sent in a named header.
    ApiKeyHeader {
        /// The header name.
        header: String,
        /// The key value.
        key: String,
    },
}

/// Configuration for one virtual HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerConfig {
    /// Server name (becomes the tool prefix unless overridden).
    pub name: String,
    /// Base URL requests are issued against.
    pub base_url: String,
    /// URL of the OpenAPI document.
    pub spec_url: String,
    /// Optional authentication.
    #[serde(default)]
    pub auth: Option<AuthSpec>,
    /// Operation-id globs to include (empty means all).
    #[serde(default)]
    pub include: Vec<String>,
    /// Operation-id globs to exclude.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Tool-name prefix override.
    #[serde(default)]
    pub prefix: Option<String>,
}

impl VirtualServerConfig {
    /// Minimal config: name, base URL, and document URL.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        spec_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            spec_url: spec_url.into(),
            auth: None,
            include: Vec::new(),
            exclude: Vec::new(),
            prefix: None,
        }
    }

    /// The effective tool prefix.
    #[must_use]
    pub fn tool_prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or(&self.name)
    }

    /// Whether an operation id passes the include/exclude globs.
    #[must_use]
    pub fn selects(&self, operation_id: &str) -> bool {
        if !self.include.is_empty()
            && !self
                .include
                .iter()
                .any(|glob| waygate_core::glob_match(glob, operation_id))
        {
            return false;
        }
        !self
            .exclude
            .iter()
            .any(|glob| waygate_core::glob_match(glob, operation_id))
    }

    /// Resolve the auth header for a call, if any.
    #[must_use]
    pub fn auth_header(&self) -> Option<(String, String)> {
        match &self.auth {
            Some(AuthSpec::BearerEnv { env }) => {
                let token = std::env::var(env).ok()?;
                Some(("Authorization".to_string(), format!("Bearer {token}")))
            },
            Some(AuthSpec::BearerToken { token }) => {
                Some(("Authorization".to_string(), format!("Bearer {token}")))
            },
            Some(AuthSpec::ApiKeyHeader { header, key }) => Some((header.clone(), key.clone())),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_include_exclude_globs() {
        let mut config = VirtualServerConfig::new("petstore", "https://api", "https://api/spec");
        assert!(config.selects("getPet"));

        config.include = vec!["get*".to_string()];
        assert!(config.selects("getPet"));
        assert!(!config.selects("deletePet"));

        config.exclude = vec!["*Internal".to_string()];
        assert!(!config.selects("getPetInternal"));
        assert!(config.selects("getPet"));
    }

    #[test]
    fn test_prefix_defaults_to_name() {
        let mut config = VirtualServerConfig::new("petstore", "https://api", "https://api/spec");
        assert_eq!(config.tool_prefix(), "petstore");
        config.prefix = Some("pets".to_string());
        assert_eq!(config.tool_prefix(), "pets");
    }

    #[test]
    fn test_explicit_bearer_auth() {
        let mut config = VirtualServerConfig::new("api", "https://api", "https://api/spec");
        config.auth = Some(AuthSpec::BearerToken {
            token: "tok".to_string(),
        });
        let (name, value) = config.auth_header().unwrap();
        assert_eq!(name, "Authorization");
        assert_eq!(value, "Bearer tok");
    }

    #[test]
    fn test_api_key_header_auth() {
        let mut config = VirtualServerConfig::new("api", "https://api", "https://api/spec");
        config.auth = Some(AuthSpec::ApiKeyHeader {
            header: "X-Api-Key".to_string(),
            key: "k".to_string(),
        });
        let (name, value) = config.auth_header().unwrap();
        assert_eq!(name, "X-Api-Key");
        assert_eq!(value, "k");
    }
}
