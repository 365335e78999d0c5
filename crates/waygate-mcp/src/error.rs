//! Multiplexer error types.

use thiserror::Error;

use crate::protocol::RpcError;

/// Errors from backend supervision and request routing.
#[derive(Debug, Error)]
pub enum McpError {
    /// No backend is configured under this name.
    #[error("unknown server: {name}")]
    ServerNotFound {
        /// The server that was requested.
        name: String,
    },

    /// The backend exists but is not in the ready state.
    #[error("server {name} is not ready ({state})")]
    ServerNotReady {
        /// The server that was requested.
        name: String,
        /// Its current lifecycle state.
        state: String,
    },

    /// A `tools/call` named a tool whose prefix matches no backend.
    #[error("no upstream server for this tool: {name}")]
    NoUpstreamForTool {
        /// The fully-qualified tool name.
        name: String,
    },

    /// The child process could not be spawned.
    #[error("failed to spawn server {name}: {source}")]
    SpawnFailed {
        /// The server being started.
        name: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Writing to a child's stdin failed.
    #[error("failed to write to server {name}: {source}")]
    WriteFailed {
        /// The server being written to.
        name: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A method with no natural selector found no ready backend.
    #[error("no ready backend to route {method} to")]
    NoReadyBackend {
        /// The method being routed.
        method: String,
    },

    /// A pending request hit its deadline.
    #[error("request to {server} timed out after {timeout_ms}ms")]
    UpstreamTimeout {
        /// The server the request was sent to.
        server: String,
        /// The deadline that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The backend went away while a request was in flight.
    #[error("server {server} disconnected with requests in flight")]
    UpstreamDisconnected {
        /// The server that disconnected.
        server: String,
    },

    /// The backend answered with a JSON-RPC error object.
    #[error("server {server} returned error {code}: {message}")]
    UpstreamRpc {
        /// The server that answered.
        server: String,
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// A request or response could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading or writing a configuration document failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration document failed to parse.
    #[error("invalid backend configuration: {reason}")]
    InvalidConfig {
        /// Why the document was rejected.
        reason: String,
    },

    /// A core naming error (bad server id, unqualified tool name).
    #[error(transparent)]
    Core(#[from] waygate_core::CoreError),
}

impl McpError {
    /// Build an [`McpError::UpstreamRpc`] from a wire error object.
    #[must_use]
    pub fn from_rpc(server: &str, err: &RpcError) -> Self {
        Self::UpstreamRpc {
            server: server.to_string(),
            code: err.code,
            message: err.message.clone(),
        }
    }
}

/// Result type for multiplexer operations.
pub type McpResult<T> = Result<T, McpError>;
