//! Recursive argument redaction.

use serde_json::Value;

/// Key fragments that mark a value as sensitive. Matching is on the
/// lowercased key name, by substring.
const SENSITIVE_KEY_FRAGMENTS: &[&str] = &[
    "password",
    "secret",
    "token",
    "apikey",
    "api_key",
    "credentials",
    "privatekey",
    "private_key",
    "authorization",
    "auth",
];

/// The literal stored in place of a redacted value.
pub(crate) const REDACTED: &str = "[REDACTED]";

/// Sanitize an argument value: every object key whose lowercased name
/// contains a sensitive fragment has its value replaced with
/// `[REDACTED]`, recursively through objects and arrays. The function
/// is idempotent.
#[must_use]
pub fn sanitize_args(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, inner) in map {
                if is_sensitive_key(key) {
                    out.insert(key.clone(), Value::String(REDACTED.to_string()));
                } else {
                    out.insert(key.clone(), sanitize_args(inner));
                }
            }
            Value::Object(out)
        },
        Value::Array(items) => Value::Array(items.iter().map(sanitize_args).collect()),
        other => other.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lowered = key.to_lowercase();
    SENSITIVE_KEY_FRAGMENTS
        .iter()
        .any(|fragment| lowered.contains(fragment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_level_redaction() {
        let args = serde_json::json!({"query": "select 1", "password": "hunter2"});
        let clean = sanitize_args(&args);
        assert_eq!(clean["query"], "select 1");
        assert_eq!(clean["password"], REDACTED);
    }

    #[test]
    fn test_case_insensitive_and_substring() {
        let args = serde_json::json!({
            "apiKey": "k",
            "API_KEY": "k",
            "MyAuthHeader": "k",
            "githubToken": "k",
            "ok": "fine"
        });
        let clean = sanitize_args(&args);
        assert_eq!(clean["apiKey"], REDACTED);
        assert_eq!(clean["API_KEY"], REDACTED);
        assert_eq!(clean["MyAuthHeader"], REDACTED);
        assert_eq!(clean["githubToken"], REDACTED);
        assert_eq!(clean["ok"], "fine");
    }

    #[test]
    fn test_recurses_into_nested_structures() {
        let args = serde_json::json!({
            "config": {
                "credentials": {"user": "u", "pass": "p"},
                "depth": {"secret": "s"}
            },
            "list": [{"privateKey": "pem"}, "plain"]
        });
        let clean = sanitize_args(&args);
        assert_eq!(clean["config"]["credentials"], REDACTED);
        assert_eq!(clean["config"]["depth"]["secret"], REDACTED);
        assert_eq!(clean["list"][0]["privateKey"], REDACTED);
        assert_eq!(clean["list"][1], "plain");
    }

    #[test]
    fn test_idempotent() {
        let args = serde_json::json!({
            "authorization": "Bearer x",
            "nested": {"token": "t", "value": 7}
        });
        let once = sanitize_args(&args);
        let twice = sanitize_args(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_scalars_pass_through() {
        assert_eq!(sanitize_args(&serde_json::json!(42)), serde_json::json!(42));
        assert_eq!(
            sanitize_args(&serde_json::json!("text")),
            serde_json::json!("text")
        );
        assert_eq!(sanitize_args(&Value::Null), Value::Null);
    }
}
