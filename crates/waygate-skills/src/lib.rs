//! Waygate Skills - the skill-to-role compiler.
//!
//! Roles are never authored directly. They are derived from skills:
//! each skill names the roles that may use it and the tools those
//! roles gain. The compiler runs two passes over a manifest:
//!
//! 1. Collect the closed set of explicit role ids (the `*` sentinel is
//!    not a role).
//! 2. Apply each skill to its listed roles - or to every explicit role
//!    when the skill's roles include `*` - unioning tool grants and
//!    aggregating memory grants.
//!
//! Inheritance is resolved separately, by a visited-set walk over
//! `inherits` edges. A cycle degrades to an empty effective result with
//! a warning, never to infinite recursion, and resolution is idempotent
//! for a given manifest version.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod compiler;
mod error;
mod role;
mod table;

pub use compiler::compile;
pub use error::{SkillError, SkillResult};
pub use role::{EffectiveRole, MemoryGrant, Role};
pub use table::RoleTable;
