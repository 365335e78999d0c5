//! Prelude module - commonly used types for convenient import.
//!
//! Use `use waygate_identity::prelude::*;` to import all essential
//! types.

// Errors
pub use crate::{IdentityError, IdentityResult};

// Resolution
pub use crate::{AgentIdentity, IdentityResolver, Resolution, ResolverConfig};

// Rules and context
pub use crate::{MatchRule, RuleContext, TimeRange};
