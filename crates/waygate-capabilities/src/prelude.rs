//! Prelude module - commonly used types for convenient import.
//!
//! Use `use waygate_capabilities::prelude::*;` to import all essential
//! types.

// Errors
pub use crate::{CapabilityError, CapabilityResult};

// Ledger
pub use crate::{AttenuateRequest, CallContext, CapabilityLedger, IssueRequest};

// Scopes and tokens
pub use crate::{LedgerSecret, Scope, ScopeLevel, TokenContext, TokenPayload};
