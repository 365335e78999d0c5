//! Capability error types.

use thiserror::Error;

/// Errors from issuing, verifying, and attenuating capability tokens.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// The signature does not match the payload, or the wire form is
    /// structurally wrong.
    #[error("invalid signature")]
    InvalidSignature,

    /// The token is past its expiry.
    #[error("token {jti} has expired")]
    Expired {
        /// The expired token's id.
        jti: String,
    },

    /// The token is not yet valid (`nbf` in the future).
    #[error("token {jti} is not yet valid")]
    NotYetValid {
        /// The early token's id.
        jti: String,
    },

    /// The token was revoked.
    #[error("token {jti} has been revoked")]
    Revoked {
        /// The revoked token's id.
        jti: String,
    },

    /// The token's use budget is exhausted.
    #[error("token {jti} has no remaining uses")]
    NoUsesRemaining {
        /// The exhausted token's id.
        jti: String,
    },

    /// The required scope is not a subset of the token's scope.
    #[error("scope {required} is not a subset of {granted}")]
    OutOfScope {
        /// The scope that was required.
        required: String,
        /// The scope the token grants.
        granted: String,
    },

    /// A context constraint (task, tool, server) does not hold.
    #[error("token context mismatch: {reason}")]
    ContextMismatch {
        /// Which constraint failed.
        reason: String,
    },

    /// The parent token forbids attenuation.
    #[error("token {jti} does not allow attenuation")]
    AttenuationNotAllowed {
        /// The parent token's id.
        jti: String,
    },

    /// The configured secret is shorter than 32 bytes (strict mode).
    #[error("capability secret is too short: {len} bytes (32 required)")]
    WeakSecret {
        /// The offending key length.
        len: usize,
    },

    /// Payload serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for capability operations.
pub type CapabilityResult<T> = Result<T, CapabilityError>;
