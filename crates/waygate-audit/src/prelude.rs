//! Prelude module - commonly used types for convenient import.
//!
//! Use `use waygate_audit::prelude::*;` to import all essential types.

// Entries
pub use crate::{AuditEntry, CallOutcome, ReasoningSignature, ThinkingKind};

// Log, queries, sink
pub use crate::{AuditLog, AuditQuery, AuditSink, AuditStats};

// Exports
pub use crate::{csv_export, json_export, thinking_report};

// Sanitization
pub use crate::sanitize_args;
