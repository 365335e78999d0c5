//! OpenAPI adapter error types.

use thiserror::Error;

/// Errors from importing documents and executing synthesized tools.
#[derive(Debug, Error)]
pub enum OpenApiError {
    /// The HTTP transport failed (network, DNS, injected client).
    #[error("http transport error: {0}")]
    Transport(String),

    /// The fetched document is not a usable OpenAPI 3 document.
    #[error("invalid OpenAPI document: {reason}")]
    Document {
        /// Why the document was rejected.
        reason: String,
    },

    /// No synthesized tool has this name.
    #[error("unknown virtual tool: {name}")]
    UnknownTool {
        /// The name that was called.
        name: String,
    },

    /// A required path parameter is missing from the arguments.
    #[error("missing required parameter: {name}")]
    MissingParameter {
        /// The missing parameter.
        name: String,
    },

    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for adapter operations.
pub type OpenApiResult<T> = Result<T, OpenApiError>;
