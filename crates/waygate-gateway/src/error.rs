//! Gateway error types.

use thiserror::Error;

use waygate_mcp::{RpcError, error_codes};

/// Errors surfaced to the client by the facade.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The requested role does not exist.
    #[error("role not found: {role}")]
    RoleNotFound {
        /// The role that was requested.
        role: String,
    },

    /// The client called a method the gateway does not recognize.
    #[error("method not found: {method}")]
    MethodNotFound {
        /// The unknown method.
        method: String,
    },

    /// The request parameters were malformed.
    #[error("invalid params: {reason}")]
    InvalidParams {
        /// What was wrong.
        reason: String,
    },

    /// The configuration document could not be read or parsed.
    #[error("configuration error: {reason}")]
    Config {
        /// What was wrong.
        reason: String,
    },

    /// A gate refused the call. Carries a stable kind for programmatic
    /// handling and a display reason.
    #[error("{reason}")]
    CallDenied {
        /// Stable kind identifier (`tool_not_accessible`,
        /// `rate_limit_exceeded`, `capability_invalid`, ...).
        kind: String,
        /// Short display reason.
        reason: String,
        /// Retry hint for rate-limit denials, in milliseconds.
        retry_after_ms: Option<i64>,
    },

    /// A transport or backend failure.
    #[error(transparent)]
    Upstream(#[from] waygate_mcp::McpError),

    /// Identity resolution failed.
    #[error(transparent)]
    Identity(#[from] waygate_identity::IdentityError),

    /// A capability operation failed outside the gated call path.
    #[error(transparent)]
    Capability(#[from] waygate_capabilities::CapabilityError),

    /// Role compilation or lookup failed.
    #[error(transparent)]
    Skills(#[from] waygate_skills::SkillError),

    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GatewayError {
    /// The stable kind identifier for this error.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::RoleNotFound { .. } => "role_not_found",
            Self::MethodNotFound { .. } => "method_not_found",
            Self::InvalidParams { .. } => "invalid_params",
            Self::Config { .. } => "invalid_config",
            Self::CallDenied { kind, .. } => kind,
            Self::Upstream(waygate_mcp::McpError::UpstreamTimeout { .. }) => "upstream_timeout",
            Self::Upstream(_) => "upstream_disconnected",
            Self::Identity(waygate_identity::IdentityError::InvalidConfig { .. }) => {
                "invalid_identity_config"
            },
            Self::Identity(_) => "identity_rejected",
            Self::Capability(_) => "capability_invalid",
            Self::Skills(_) => "role_not_found",
            Self::Serialization(_) => "invalid_params",
        }
    }

    /// Render as a JSON-RPC error object with the kind (and retry
    /// hint, when present) in `data`.
    #[must_use]
    pub fn to_rpc_error(&self) -> RpcError {
        let code = match self {
            Self::MethodNotFound { .. } => error_codes::METHOD_NOT_FOUND,
            Self::InvalidParams { .. } | Self::Serialization(_) => error_codes::INVALID_PARAMS,
            _ => error_codes::INTERNAL_ERROR,
        };
        let mut data = serde_json::json!({"kind": self.kind()});
        if let Self::CallDenied {
            retry_after_ms: Some(retry),
            ..
        } = self
        {
            data["retryAfterMs"] = serde_json::json!(retry);
        }
        RpcError::new(code, self.to_string()).with_data(data)
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denied_kind_and_retry_hint() {
        let err = GatewayError::CallDenied {
            kind: "rate_limit_exceeded".to_string(),
            reason: "minute window exceeded".to_string(),
            retry_after_ms: Some(1500),
        };
        assert_eq!(err.kind(), "rate_limit_exceeded");
        let rpc = err.to_rpc_error();
        assert_eq!(rpc.data.as_ref().unwrap()["retryAfterMs"], 1500);
        assert_eq!(rpc.data.as_ref().unwrap()["kind"], "rate_limit_exceeded");
    }

    #[test]
    fn test_method_not_found_code() {
        let err = GatewayError::MethodNotFound {
            method: "bogus/x".to_string(),
        };
        assert_eq!(err.to_rpc_error().code, error_codes::METHOD_NOT_FOUND);
    }
}
