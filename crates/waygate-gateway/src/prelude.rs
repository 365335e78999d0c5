//! Prelude module - commonly used types for convenient import.
//!
//! Use `use waygate_gateway::prelude::*;` to import all essential
//! types.

// Errors
pub use crate::{GatewayError, GatewayResult};

// Facade
pub use crate::{Gateway, GatewayBuilder, serve};

// Configuration
pub use crate::GatewayConfig;

// Seams
pub use crate::{InMemoryMemoryStore, MemoryHit, MemoryStore, SubAgentRequest, SubAgentSpawner};
