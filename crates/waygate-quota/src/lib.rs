//! Waygate Quota - per-role and per-tool rate limiting.
//!
//! Each session gets a tracker with three sliding windows (minute,
//! hour, day) held as `{count, reset_at}` pairs; expired windows reset
//! lazily on touch. `check` inspects the active role's quota in window
//! order and denies with a `retry_after_ms` hint; `consume` increments
//! the counters after a call is admitted. Crossing 80% of any window
//! emits a warning event.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod config;
mod limiter;

pub use config::{Quota, ToolQuota};
pub use limiter::{QuotaDecision, QuotaWarning, RateLimiter, WindowKind};
