//! Waygate Gateway - the facade the client talks to.
//!
//! One gateway instance per process. It owns the initialization
//! ordering (skills -> roles -> identity rules -> backends -> default
//! role), the gated `tools/call` pipeline (visibility -> quota ->
//! capability -> dispatch -> audit), the system tools, the single-slot
//! pending reasoning context, and the outbound tools-changed
//! notification.
//!
//! Access, quota, and capability failures are recovered locally: they
//! are audited as denied and returned as structured errors, never
//! forwarded upstream. Transport failures are audited as errors.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod config;
mod error;
mod gateway;
mod memory;
mod serve;
mod subagent;

pub use config::{
    ENV_ASSIGNED_IDENTITY, ENV_CAPABILITY_SECRET, ENV_SERVERS_CONFIG, ENV_SKILLS_ROOT,
    GatewayConfig,
};
pub use error::{GatewayError, GatewayResult};
pub use gateway::{Gateway, GatewayBuilder};
pub use memory::{InMemoryMemoryStore, MemoryHit, MemoryStore};
pub use serve::serve;
pub use subagent::{SubAgentRequest, SubAgentSpawner};
