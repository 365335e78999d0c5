//! Core error types.

use thiserror::Error;

/// Errors produced by the core vocabulary types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A server id contained characters outside `[A-Za-z0-9-]`.
    #[error("invalid server id: {id}")]
    InvalidServerId {
        /// The offending id.
        id: String,
    },

    /// A tool name had no `__` separator and is not a qualified name.
    #[error("tool name has no server prefix: {name}")]
    UnqualifiedToolName {
        /// The offending name.
        name: String,
    },

    /// A manifest failed structural validation.
    #[error("invalid skill manifest: {reason}")]
    InvalidManifest {
        /// Why the manifest was rejected.
        reason: String,
    },
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
