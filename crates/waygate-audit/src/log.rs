//! The ring-buffer audit log, queries, and statistics.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

use waygate_core::{RoleId, SessionId};

use crate::entry::{AuditEntry, CallOutcome, ThinkingKind};
use crate::sanitize::sanitize_args;

/// Default ring capacity.
const DEFAULT_CAPACITY: usize = 10_000;

/// Anything that accepts audit entries. Deployments plug an external
/// sink here; [`AuditLog`] is the in-memory default.
pub trait AuditSink: Send + Sync {
    /// Record one entry.
    fn record(&self, entry: AuditEntry);
}

/// Filters for querying the log. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    /// Match one session.
    pub session: Option<SessionId>,
    /// Match one role.
    pub role: Option<RoleId>,
    /// Match one tool.
    pub tool: Option<String>,
    /// Match one outcome.
    pub result: Option<CallOutcome>,
    /// Require (or forbid) a reasoning signature.
    pub has_thinking: Option<bool>,
    /// Match one thinking kind.
    pub thinking_kind: Option<ThinkingKind>,
    /// Entries at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Entries before this instant.
    pub until: Option<DateTime<Utc>>,
    /// Cap on returned entries (newest kept).
    pub limit: Option<usize>,
}

impl AuditQuery {
    fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(session) = &self.session {
            if &entry.session_id != session {
                return false;
            }
        }
        if let Some(role) = &self.role {
            if &entry.role != role {
                return false;
            }
        }
        if let Some(tool) = &self.tool {
            if &entry.tool != tool {
                return false;
            }
        }
        if let Some(result) = self.result {
            if entry.result != result {
                return false;
            }
        }
        if let Some(wanted) = self.has_thinking {
            if entry.thinking.is_some() != wanted {
                return false;
            }
        }
        if let Some(kind) = self.thinking_kind {
            match &entry.thinking {
                Some(thinking) if thinking.signature_type == kind => {},
                _ => return false,
            }
        }
        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.timestamp >= until {
                return false;
            }
        }
        true
    }
}

/// Aggregate statistics over the log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    /// Total entries in the ring.
    pub total: usize,
    /// Allowed calls.
    pub allowed: usize,
    /// Denied calls.
    pub denied: usize,
    /// Failed calls.
    pub errors: usize,
    /// Most-called tools, descending.
    pub top_tools: Vec<(String, usize)>,
    /// Most-active roles, descending.
    pub top_roles: Vec<(String, usize)>,
    /// Mean duration of allowed calls in milliseconds.
    pub avg_duration_ms: f64,
    /// Share of entries carrying a reasoning signature.
    pub thinking_coverage: f64,
}

/// The bounded in-memory audit trail.
pub struct AuditLog {
    entries: RwLock<VecDeque<AuditEntry>>,
    capacity: usize,
}

impl AuditLog {
    /// Create a log with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a log with an explicit ring capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    /// Append an entry. Arguments are sanitized here, so callers may
    /// pass them raw. The oldest entry falls off a full ring.
    pub fn append(&self, mut entry: AuditEntry) {
        entry.args = sanitize_args(&entry.args);
        let Ok(mut entries) = self.entries.write() else {
            return;
        };
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Number of entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .read()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Entries matching a query, oldest first. The limit keeps the
    /// newest matches.
    #[must_use]
    pub fn query(&self, query: &AuditQuery) -> Vec<AuditEntry> {
        let Ok(entries) = self.entries.read() else {
            return Vec::new();
        };
        let mut matched: Vec<AuditEntry> = entries
            .iter()
            .filter(|entry| query.matches(entry))
            .cloned()
            .collect();
        if let Some(limit) = query.limit {
            if matched.len() > limit {
                matched.drain(..matched.len().saturating_sub(limit));
            }
        }
        matched
    }

    /// Aggregate statistics over the whole ring.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> AuditStats {
        let entries = self.entries();
        let total = entries.len();

        let mut allowed = 0usize;
        let mut denied = 0usize;
        let mut errors = 0usize;
        let mut with_thinking = 0usize;
        let mut duration_sum: u64 = 0;
        let mut duration_count = 0usize;
        let mut tools: HashMap<String, usize> = HashMap::new();
        let mut roles: HashMap<String, usize> = HashMap::new();

        for entry in &entries {
            match entry.result {
                CallOutcome::Allowed => allowed = allowed.saturating_add(1),
                CallOutcome::Denied => denied = denied.saturating_add(1),
                CallOutcome::Error => errors = errors.saturating_add(1),
            }
            if entry.thinking.is_some() {
                with_thinking = with_thinking.saturating_add(1);
            }
            if let Some(ms) = entry.duration_ms {
                duration_sum = duration_sum.saturating_add(ms);
                duration_count = duration_count.saturating_add(1);
            }
            let tool_count = tools.entry(entry.tool.clone()).or_insert(0);
            *tool_count = tool_count.saturating_add(1);
            let role_count = roles.entry(entry.role.to_string()).or_insert(0);
            *role_count = role_count.saturating_add(1);
        }

        let mut top_tools: Vec<(String, usize)> = tools.into_iter().collect();
        top_tools.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_tools.truncate(10);
        let mut top_roles: Vec<(String, usize)> = roles.into_iter().collect();
        top_roles.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_roles.truncate(10);

        AuditStats {
            total,
            allowed,
            denied,
            errors,
            top_tools,
            top_roles,
            avg_duration_ms: if duration_count == 0 {
                0.0
            } else {
                duration_sum as f64 / duration_count as f64
            },
            thinking_coverage: if total == 0 {
                0.0
            } else {
                with_thinking as f64 / total as f64
            },
        }
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for AuditLog {
    fn record(&self, entry: AuditEntry) {
        self.append(entry);
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
