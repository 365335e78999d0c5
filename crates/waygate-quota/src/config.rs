//! Quota configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-tool sub-limits inside a role quota.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolQuota {
    /// Calls per minute for this tool.
    #[serde(default)]
    pub per_minute: Option<u32>,
    /// Calls per hour for this tool.
    #[serde(default)]
    pub per_hour: Option<u32>,
}

/// A role's call quota. Absent fields are unlimited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quota {
    /// Calls per minute.
    #[serde(default)]
    pub max_calls_per_minute: Option<u32>,
    /// Calls per hour.
    #[serde(default)]
    pub max_calls_per_hour: Option<u32>,
    /// Calls per day.
    #[serde(default)]
    pub max_calls_per_day: Option<u32>,
    /// Concurrent calls.
    #[serde(default)]
    pub max_concurrent: Option<u32>,
    /// Per-tool sub-limits, keyed by fully-qualified tool name.
    #[serde(default)]
    pub per_tool: HashMap<String, ToolQuota>,
}

impl Quota {
    /// A quota with only a per-minute limit.
    #[must_use]
    pub fn per_minute(limit: u32) -> Self {
        Self {
            max_calls_per_minute: Some(limit),
            ..Self::default()
        }
    }

    /// Whether the quota constrains anything at all.
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.max_calls_per_minute.is_none()
            && self.max_calls_per_hour.is_none()
            && self.max_calls_per_day.is_none()
            && self.max_concurrent.is_none()
            && self.per_tool.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case_wire_form() {
        let json = serde_json::json!({
            "maxCallsPerMinute": 5,
            "maxConcurrent": 2,
            "perTool": { "db__query": { "perMinute": 1 } }
        });
        let quota: Quota = serde_json::from_value(json).unwrap();
        assert_eq!(quota.max_calls_per_minute, Some(5));
        assert_eq!(quota.max_concurrent, Some(2));
        assert_eq!(quota.per_tool["db__query"].per_minute, Some(1));
        assert!(!quota.is_unlimited());
    }

    #[test]
    fn test_default_is_unlimited() {
        assert!(Quota::default().is_unlimited());
    }
}
