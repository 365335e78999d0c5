//! Waygate Access - the tool visibility engine.
//!
//! Two maps, one invariant. The engine holds every tool any backend has
//! ever reported (`all_tools`) and the subset the active role may see
//! (`visible_tools`). `check_access` and the visible map always agree:
//! a tool is callable exactly when it is visible, except for the system
//! tools, which are gated by their own injection predicates.
//!
//! Role switches return the added/removed delta so the gateway can emit
//! a single `tools/list_changed` notification per switch.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;
pub mod system;

mod visibility;

pub use visibility::{SystemToolPolicy, ToolVisibility, VisibilityDelta};
