//! Prelude module - commonly used types for convenient import.
//!
//! Use `use waygate_access::prelude::*;` to import all essential types.

// Engine
pub use crate::{SystemToolPolicy, ToolVisibility, VisibilityDelta};

// System tool names
pub use crate::system;
