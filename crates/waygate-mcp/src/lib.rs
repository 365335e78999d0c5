//! Waygate MCP - the multi-server stdio multiplexer.
//!
//! This crate owns the process side of the gateway:
//! - [`BackendSupervisor`] spawns and supervises backend child processes,
//!   frames their stdout into JSON-RPC messages, performs the MCP
//!   initialize handshake, and restarts children that die.
//! - [`RequestRouter`] correlates requests to responses, dispatches
//!   `tools/call` by server prefix, aggregates fan-out `*/list` calls,
//!   and relays backend notifications upward.
//! - [`ToolDispatcher`] is the seam that lets non-process tool sources
//!   (the virtual HTTP adapter) register alongside process backends.
//!
//! Responses from a backend may arrive interleaved; they are matched by
//! correlation id. Requests to the same backend preserve their relative
//! order on the wire because every write goes through that backend's
//! stdin lock.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod config;
mod dispatcher;
mod error;
mod protocol;
mod router;
mod supervisor;
mod types;

pub use config::{BackendConfig, BackendsConfig, expand_env_value};
pub use dispatcher::{DispatcherRegistry, ToolDispatcher};
pub use error::{McpError, McpResult};
pub use protocol::{
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, LATEST_PROTOCOL_VERSION, RpcError,
    RpcFrame, error_codes,
};
pub use router::{RequestRouter, UpstreamEvent};
pub use supervisor::{BackendHealth, BackendState, BackendSupervisor};
pub use types::{ToolDefinition, ToolResult};
