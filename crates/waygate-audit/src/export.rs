//! Audit exports: JSON, CSV, and the thinking report.

use serde_json::Value;

use crate::entry::AuditEntry;

/// Characters of thinking text preserved in the report preview.
const THINKING_PREVIEW_CHARS: usize = 500;

/// Export entries as a JSON array.
///
/// # Errors
///
/// Returns a serialization error when an entry cannot be encoded.
pub fn json_export(entries: &[AuditEntry]) -> serde_json::Result<String> {
    serde_json::to_string(entries)
}

/// Export entries as CSV with a fixed column order. Every value is
/// quoted; embedded quotes are doubled.
#[must_use]
pub fn csv_export(entries: &[AuditEntry]) -> String {
    let mut out = String::new();
    out.push_str(
        "\"id\",\"timestamp\",\"sessionId\",\"role\",\"tool\",\"server\",\"result\",\"reason\",\"durationMs\",\"hasThinking\",\"thinkingType\",\"thinkingTokens\"\n",
    );
    for entry in entries {
        let row = [
            entry.id.0.to_string(),
            entry.timestamp.to_rfc3339(),
            entry.session_id.0.to_string(),
            entry.role.to_string(),
            entry.tool.clone(),
            entry.server.clone(),
            entry.result.to_string(),
            entry.reason.clone().unwrap_or_default(),
            entry
                .duration_ms
                .map(|ms| ms.to_string())
                .unwrap_or_default(),
            entry.thinking.is_some().to_string(),
            entry
                .thinking
                .as_ref()
                .map(|t| t.signature_type.to_string())
                .unwrap_or_default(),
            entry
                .thinking
                .as_ref()
                .and_then(|t| t.token_count)
                .map(|n| n.to_string())
                .unwrap_or_default(),
        ];
        let quoted: Vec<String> = row
            .iter()
            .map(|value| format!("\"{}\"", value.replace('"', "\"\"")))
            .collect();
        out.push_str(&quoted.join(","));
        out.push('\n');
    }
    out
}

/// Build the thinking report: coverage statistics plus a preview of
/// each reasoning signature, truncated to 500 characters with the
/// original length preserved.
#[must_use]
pub fn thinking_report(entries: &[AuditEntry]) -> Value {
    let total = entries.len();
    let with_thinking: Vec<&AuditEntry> =
        entries.iter().filter(|e| e.thinking.is_some()).collect();

    let mut by_type = serde_json::Map::new();
    for entry in &with_thinking {
        if let Some(thinking) = &entry.thinking {
            let key = thinking.signature_type.to_string();
            let count = by_type.get(&key).and_then(Value::as_u64).unwrap_or(0);
            by_type.insert(key, Value::from(count.saturating_add(1)));
        }
    }

    let previews: Vec<Value> = with_thinking
        .iter()
        .filter_map(|entry| {
            let thinking = entry.thinking.as_ref()?;
            let preview: String = thinking.text.chars().take(THINKING_PREVIEW_CHARS).collect();
            Some(serde_json::json!({
                "id": entry.id.0.to_string(),
                "tool": entry.tool,
                "role": entry.role.to_string(),
                "thinkingType": thinking.signature_type.to_string(),
                "preview": preview,
                "totalLength": thinking.text.chars().count(),
                "tokenCount": thinking.token_count,
            }))
        })
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let coverage = if total == 0 {
        0.0
    } else {
        with_thinking.len() as f64 / total as f64
    };

    serde_json::json!({
        "totalEntries": total,
        "entriesWithThinking": with_thinking.len(),
        "coverageRate": coverage,
        "byType": Value::Object(by_type),
        "entries": previews,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{ReasoningSignature, ThinkingKind};
    use waygate_core::{RoleId, SessionId};

    fn sample_entries() -> Vec<AuditEntry> {
        let session = SessionId::new();
        vec![
            AuditEntry::allowed(
                session.clone(),
                RoleId::new("dev"),
                "fs__read",
                "fs",
                serde_json::json!({"path": "/tmp"}),
                7,
            ),
            AuditEntry::denied(
                session.clone(),
                RoleId::new("dev"),
                "fs__write",
                "fs",
                Value::Null,
                "a \"quoted\" reason",
            ),
            AuditEntry::allowed(session, RoleId::new("ops"), "git__log", "git", Value::Null, 3)
                .with_thinking(
                    ReasoningSignature::new("x".repeat(600), ThinkingKind::ChainOfThought)
                        .with_token_count(9),
                ),
        ]
    }

    #[test]
    fn test_json_round_trip() {
        let entries = sample_entries();
        let json = json_export(&entries).unwrap();
        let parsed: Vec<AuditEntry> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), entries.len());
        assert_eq!(parsed[0].tool, entries[0].tool);
        assert_eq!(parsed[1].reason, entries[1].reason);
        assert_eq!(parsed[2].thinking, entries[2].thinking);
    }

    #[test]
    fn test_csv_shape() {
        let csv = csv_export(&sample_entries());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("\"id\",\"timestamp\""));
        // Embedded quotes doubled.
        assert!(lines[2].contains("a \"\"quoted\"\" reason"));
        // Thinking columns populated on the third entry.
        assert!(lines[3].contains("\"chain_of_thought\""));
        assert!(lines[3].contains("\"true\""));
        assert!(lines[3].contains("\"9\""));
    }

    #[test]
    fn test_thinking_report_truncates_and_preserves_length() {
        let report = thinking_report(&sample_entries());
        assert_eq!(report["totalEntries"], 3);
        assert_eq!(report["entriesWithThinking"], 1);
        let entry = &report["entries"][0];
        assert_eq!(entry["preview"].as_str().unwrap().len(), 500);
        assert_eq!(entry["totalLength"], 600);
        assert_eq!(report["byType"]["chain_of_thought"], 1);
    }

    #[test]
    fn test_thinking_report_empty() {
        let report = thinking_report(&[]);
        assert_eq!(report["totalEntries"], 0);
        assert_eq!(report["coverageRate"], 0.0);
    }
}
