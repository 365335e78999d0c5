//! Prelude module - commonly used types for convenient import.
//!
//! Use `use waygate_mcp::prelude::*;` to import all essential types.

// Errors
pub use crate::{McpError, McpResult};

// Configuration
pub use crate::{BackendConfig, BackendsConfig};

// Supervision
pub use crate::{BackendHealth, BackendState, BackendSupervisor};

// Routing
pub use crate::{RequestRouter, UpstreamEvent};

// Wire types
pub use crate::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RpcError, RpcFrame};

// Dispatch seam
pub use crate::{DispatcherRegistry, ToolDispatcher};

// Tool types
pub use crate::{ToolDefinition, ToolResult};
