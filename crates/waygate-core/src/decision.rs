//! Normalized access decisions.
//!
//! The visibility gate never drives control flow with exceptions. Every
//! check returns one of these variants; callers that must propagate an
//! error raise only at the outermost layer.

use serde::{Deserialize, Serialize};

/// Outcome of an access, quota, or capability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AccessDecision {
    /// The call may proceed.
    Allowed,
    /// The call is refused; it must be audited as denied and never
    /// forwarded.
    Denied {
        /// Stable kind identifier for programmatic handling.
        kind: String,
        /// Short display reason.
        reason: String,
    },
    /// The check itself failed; audited as an error.
    Error {
        /// Stable kind identifier for programmatic handling.
        kind: String,
        /// Short display reason.
        reason: String,
    },
}

impl AccessDecision {
    /// A denial with the given kind and reason.
    #[must_use]
    pub fn denied(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Denied {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    /// An error with the given kind and reason.
    #[must_use]
    pub fn error(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Error {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    /// Whether the decision allows the call.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// The stable kind, or `None` for allowed decisions.
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::Allowed => None,
            Self::Denied { kind, .. } | Self::Error { kind, .. } => Some(kind),
        }
    }

    /// The display reason, or `None` for allowed decisions.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Allowed => None,
            Self::Denied { reason, .. } | Self::Error { reason, .. } => Some(reason),
        }
    }
}
