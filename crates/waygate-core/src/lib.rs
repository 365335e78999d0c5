//! Waygate Core - shared vocabulary for the routing gateway.
//!
//! This crate defines the types every other Waygate crate speaks:
//! - Identifiers (sessions, roles, skills, servers, audit entries)
//! - Qualified tool names (`server__tool`) and the splitting rules
//! - Tool and server patterns (`exact`, `server__*`, `*`)
//! - The skill manifest input model (what the external parsers produce)
//! - The normalized access decision returned by the visibility gate
//!
//! It deliberately contains no I/O and no async code.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod decision;
mod error;
mod glob;
mod id;
mod manifest;
mod name;
mod pattern;

pub use decision::AccessDecision;
pub use error::{CoreError, CoreResult};
pub use glob::glob_match;
pub use id::{AuditId, RoleId, ServerId, SessionId, SkillId};
pub use manifest::{
    Grants, IdentityBlock, MatchRuleSpec, MemoryLevel, RuleContextSpec, Skill, SkillManifest,
    WILDCARD_ROLE,
};
pub use name::QualifiedToolName;
pub use pattern::{ServerScope, ToolPattern};
