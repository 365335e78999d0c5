//! Audit entry types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use waygate_core::{AuditId, RoleId, SessionId};

/// How a call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    /// The call passed every gate and was dispatched.
    Allowed,
    /// A gate refused the call; it was never forwarded.
    Denied,
    /// The call was admitted but failed downstream.
    Error,
}

impl std::fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allowed => f.write_str("allowed"),
            Self::Denied => f.write_str("denied"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// The kind of reasoning signature a caller attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingKind {
    /// Extended thinking output.
    ExtendedThinking,
    /// Chain-of-thought text.
    ChainOfThought,
    /// Free-form reasoning.
    Reasoning,
}

impl std::fmt::Display for ThinkingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExtendedThinking => f.write_str("extended_thinking"),
            Self::ChainOfThought => f.write_str("chain_of_thought"),
            Self::Reasoning => f.write_str("reasoning"),
        }
    }
}

/// An originator-supplied explanation for a call, stored verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningSignature {
    /// The opaque reasoning text.
    pub text: String,
    /// What kind of reasoning it is.
    pub signature_type: ThinkingKind,
    /// Token count, when the originator knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
    /// Cache metrics, opaque to the gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_metrics: Option<Value>,
}

impl ReasoningSignature {
    /// Build a signature from text and kind.
    #[must_use]
    pub fn new(text: impl Into<String>, signature_type: ThinkingKind) -> Self {
        Self {
            text: text.into(),
            signature_type,
            token_count: None,
            cache_metrics: None,
        }
    }

    /// Attach a token count.
    #[must_use]
    pub fn with_token_count(mut self, count: u64) -> Self {
        self.token_count = Some(count);
        self
    }
}

/// One audited call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Unique entry id.
    pub id: AuditId,
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
    /// The session the call belonged to.
    pub session_id: SessionId,
    /// The active role at call time.
    pub role: RoleId,
    /// The tool that was called (fully-qualified or system name).
    pub tool: String,
    /// The source server (empty for system tools).
    pub server: String,
    /// Sanitized call arguments.
    pub args: Value,
    /// How the call ended.
    pub result: CallOutcome,
    /// Why it was denied or failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Wall-clock duration of allowed calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Optional reasoning signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ReasoningSignature>,
    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl AuditEntry {
    fn base(
        session_id: SessionId,
        role: RoleId,
        tool: impl Into<String>,
        server: impl Into<String>,
        args: Value,
        result: CallOutcome,
    ) -> Self {
        Self {
            id: AuditId::new(),
            timestamp: Utc::now(),
            session_id,
            role,
            tool: tool.into(),
            server: server.into(),
            args,
            result,
            reason: None,
            duration_ms: None,
            thinking: None,
            metadata: Value::Null,
        }
    }

    /// An allowed call with its duration.
    #[must_use]
    pub fn allowed(
        session_id: SessionId,
        role: RoleId,
        tool: impl Into<String>,
        server: impl Into<String>,
        args: Value,
        duration_ms: u64,
    ) -> Self {
        let mut entry = Self::base(session_id, role, tool, server, args, CallOutcome::Allowed);
        entry.duration_ms = Some(duration_ms);
        entry
    }

    /// A denied call with its reason.
    #[must_use]
    pub fn denied(
        session_id: SessionId,
        role: RoleId,
        tool: impl Into<String>,
        server: impl Into<String>,
        args: Value,
        reason: impl Into<String>,
    ) -> Self {
        let mut entry = Self::base(session_id, role, tool, server, args, CallOutcome::Denied);
        entry.reason = Some(reason.into());
        entry
    }

    /// A failed call with its error.
    #[must_use]
    pub fn error(
        session_id: SessionId,
        role: RoleId,
        tool: impl Into<String>,
        server: impl Into<String>,
        args: Value,
        reason: impl Into<String>,
    ) -> Self {
        let mut entry = Self::base(session_id, role, tool, server, args, CallOutcome::Error);
        entry.reason = Some(reason.into());
        entry
    }

    /// Attach a reasoning signature.
    #[must_use]
    pub fn with_thinking(mut self, thinking: ReasoningSignature) -> Self {
        self.thinking = Some(thinking);
        self
    }

    /// Attach metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_wire_shape() {
        let entry = AuditEntry::allowed(
            SessionId::new(),
            RoleId::new("dev"),
            "fs__read",
            "fs",
            serde_json::json!({"path": "/tmp/x"}),
            12,
        );
        let wire = serde_json::to_value(&entry).unwrap();
        assert_eq!(wire["result"], "allowed");
        assert_eq!(wire["durationMs"], 12);
        assert!(wire.get("reason").is_none());
    }

    #[test]
    fn test_denied_carries_reason() {
        let entry = AuditEntry::denied(
            SessionId::new(),
            RoleId::new("dev"),
            "fs__write",
            "fs",
            Value::Null,
            "tool fs__write is not accessible for role dev",
        );
        assert_eq!(entry.result, CallOutcome::Denied);
        assert!(entry.reason.unwrap().contains("fs__write"));
        assert!(entry.duration_ms.is_none());
    }

    #[test]
    fn test_thinking_round_trip() {
        let entry = AuditEntry::allowed(
            SessionId::new(),
            RoleId::new("dev"),
            "git__log",
            "git",
            Value::Null,
            3,
        )
        .with_thinking(
            ReasoningSignature::new("checking recent commits", ThinkingKind::ExtendedThinking)
                .with_token_count(42),
        );
        let wire = serde_json::to_string(&entry).unwrap();
        let parsed: AuditEntry = serde_json::from_str(&wire).unwrap();
        let thinking = parsed.thinking.unwrap();
        assert_eq!(thinking.signature_type, ThinkingKind::ExtendedThinking);
        assert_eq!(thinking.token_count, Some(42));
    }
}
