//! Prelude module - commonly used types for convenient import.
//!
//! Use `use waygate_core::prelude::*;` to import all essential types.

// Errors
pub use crate::{CoreError, CoreResult};

// Identifiers
pub use crate::{AuditId, RoleId, ServerId, SessionId, SkillId};

// Naming and patterns
pub use crate::{QualifiedToolName, ServerScope, ToolPattern, glob_match};

// Manifest model
pub use crate::{Grants, IdentityBlock, MatchRuleSpec, MemoryLevel, Skill, SkillManifest};

// Decisions
pub use crate::AccessDecision;
