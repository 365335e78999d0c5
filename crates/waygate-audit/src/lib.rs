//! Waygate Audit - the call trail.
//!
//! Every tool call that reaches the gateway produces exactly one audit
//! entry: allowed calls record their duration, denied calls their
//! reason, failed calls their error. Arguments are sanitized before
//! they are stored - any key whose name smells like a credential is
//! replaced with `[REDACTED]`, recursively.
//!
//! Entries live in a bounded ring buffer (durable storage is a
//! pluggable sink, not this crate's concern) and can be queried,
//! aggregated, and exported as JSON, CSV, or a thinking report.
//!
//! A caller may attach a reasoning signature - its own opaque
//! explanation for the call - which is stored verbatim and never
//! interpreted.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod entry;
mod export;
mod log;
mod sanitize;

pub use entry::{AuditEntry, CallOutcome, ReasoningSignature, ThinkingKind};
pub use export::{csv_export, json_export, thinking_report};
pub use log::{AuditLog, AuditQuery, AuditSink, AuditStats};
pub use sanitize::sanitize_args;
