//! Prelude module - commonly used types for convenient import.
//!
//! Use `use waygate_skills::prelude::*;` to import all essential types.

// Errors
pub use crate::{SkillError, SkillResult};

// Compilation
pub use crate::compile;

// Roles
pub use crate::{EffectiveRole, MemoryGrant, Role, RoleTable};
