//! Prelude module - commonly used types for convenient import.
//!
//! Use `use waygate_quota::prelude::*;` to import all essential types.

// Configuration
pub use crate::{Quota, ToolQuota};

// Limiter
pub use crate::{QuotaDecision, QuotaWarning, RateLimiter, WindowKind};
