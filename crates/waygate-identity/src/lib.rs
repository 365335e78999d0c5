//! Waygate Identity - declared-identity to role resolution.
//!
//! An incoming agent declares a name and a set of skills. The resolver
//! walks its rule list in descending priority order (insertion order
//! breaks ties) and assigns the role of the first rule that passes
//! every gate:
//!
//! 1. No forbidden skill is declared (checked first).
//! 2. Every required skill is declared.
//! 3. At least `min_skill_match` of the any-skills are declared.
//! 4. The rule's day/time context holds in its IANA timezone.
//!
//! Trust is independent of role assignment: the agent name is matched
//! case-insensitively against the configured trusted prefixes.
//!
//! Malformed time or timezone configuration is tolerated by default
//! (the rule simply never matches); strict mode rejects it at load.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod context;
mod error;
mod resolver;
mod rule;

pub use context::{RuleContext, TimeRange};
pub use error::{IdentityError, IdentityResult};
pub use resolver::{AgentIdentity, IdentityResolver, Resolution, ResolverConfig};
pub use rule::MatchRule;
