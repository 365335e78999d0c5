//! Identity error types.

use thiserror::Error;

/// Errors from identity resolution and rule loading.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// No rule matched and the resolver rejects unknown agents.
    #[error("unknown agent: {name}")]
    Rejected {
        /// The agent name that failed to resolve.
        name: String,
    },

    /// A rule carried malformed configuration (strict mode only).
    #[error("invalid identity configuration: {reason}")]
    InvalidConfig {
        /// What was malformed.
        reason: String,
    },
}

/// Result type for identity operations.
pub type IdentityResult<T> = Result<T, IdentityError>;
