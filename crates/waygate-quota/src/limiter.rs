//! The sliding-window rate limiter.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use tracing::warn;

use waygate_core::RoleId;

use crate::config::{Quota, ToolQuota};

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 3_600_000;
const DAY_MS: i64 = 86_400_000;

/// Which window denied a call or crossed its warning threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    /// The sliding minute window.
    Minute,
    /// The sliding hour window.
    Hour,
    /// The sliding day window.
    Day,
    /// The concurrent-call counter.
    Concurrent,
}

impl std::fmt::Display for WindowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minute => f.write_str("minute"),
            Self::Hour => f.write_str("hour"),
            Self::Day => f.write_str("day"),
            Self::Concurrent => f.write_str("concurrent"),
        }
    }
}

/// Outcome of a quota check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    /// The call fits the quota.
    Allowed,
    /// The call exceeds a window.
    Denied {
        /// The window that denied it.
        window: WindowKind,
        /// When to retry, in milliseconds from now.
        retry_after_ms: i64,
        /// Whether the denial came from a per-tool sub-limit.
        tool_scoped: bool,
    },
}

impl QuotaDecision {
    /// Whether the call was admitted.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// A window crossed 80% utilization.
#[derive(Debug, Clone)]
pub struct QuotaWarning {
    /// The session approaching its limit.
    pub session: String,
    /// The role whose quota applies.
    pub role: RoleId,
    /// The window crossing the threshold.
    pub window: WindowKind,
    /// Calls used in the window.
    pub used: u32,
    /// The window's limit.
    pub limit: u32,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at_ms: i64,
}

impl Window {
    fn fresh(now_ms: i64, span_ms: i64) -> Self {
        Self {
            count: 0,
            reset_at_ms: now_ms.saturating_add(span_ms),
        }
    }

    /// Reset the window if it has expired.
    fn touch(&mut self, now_ms: i64, span_ms: i64) {
        if now_ms >= self.reset_at_ms {
            *self = Self::fresh(now_ms, span_ms);
        }
    }

    fn retry_after(&self, now_ms: i64) -> i64 {
        self.reset_at_ms.saturating_sub(now_ms).max(0)
    }
}

#[derive(Debug)]
struct ToolWindows {
    minute: Window,
    hour: Window,
}

#[derive(Debug)]
struct Tracker {
    minute: Window,
    hour: Window,
    day: Window,
    per_tool: HashMap<String, ToolWindows>,
    concurrent: u32,
}

impl Tracker {
    fn new(now_ms: i64) -> Self {
        Self {
            minute: Window::fresh(now_ms, MINUTE_MS),
            hour: Window::fresh(now_ms, HOUR_MS),
            day: Window::fresh(now_ms, DAY_MS),
            per_tool: HashMap::new(),
            concurrent: 0,
        }
    }

    fn touch(&mut self, now_ms: i64) {
        self.minute.touch(now_ms, MINUTE_MS);
        self.hour.touch(now_ms, HOUR_MS);
        self.day.touch(now_ms, DAY_MS);
        for windows in self.per_tool.values_mut() {
            windows.minute.touch(now_ms, MINUTE_MS);
            windows.hour.touch(now_ms, HOUR_MS);
        }
    }
}

type WarningHandler = Box<dyn Fn(QuotaWarning) + Send + Sync>;

/// Enforces per-role quotas over per-session trackers.
pub struct RateLimiter {
    quotas: HashMap<RoleId, Quota>,
    trackers: Mutex<HashMap<String, Tracker>>,
    on_warning: Option<WarningHandler>,
}

impl RateLimiter {
    /// Create a limiter from per-role quotas. Roles without an entry
    /// are unlimited.
    #[must_use]
    pub fn new(quotas: HashMap<RoleId, Quota>) -> Self {
        Self {
            quotas,
            trackers: Mutex::new(HashMap::new()),
            on_warning: None,
        }
    }

    /// Install a warning handler, replacing the default log line.
    #[must_use]
    pub fn with_warning_handler(
        mut self,
        handler: impl Fn(QuotaWarning) + Send + Sync + 'static,
    ) -> Self {
        self.on_warning = Some(Box::new(handler));
        self
    }

    /// Check whether one more call fits the role's quota.
    #[must_use]
    pub fn check(&self, session: &str, role: &RoleId, tool: &str) -> QuotaDecision {
        self.check_at(session, role, tool, Utc::now().timestamp_millis())
    }

    /// Check with an explicit clock (tests).
    #[must_use]
    pub fn check_at(&self, session: &str, role: &RoleId, tool: &str, now_ms: i64) -> QuotaDecision {
        let Some(quota) = self.quotas.get(role) else {
            return QuotaDecision::Allowed;
        };
        if quota.is_unlimited() {
            return QuotaDecision::Allowed;
        }

        let Ok(mut trackers) = self.trackers.lock() else {
            return QuotaDecision::Allowed;
        };
        let tracker = trackers
            .entry(session.to_string())
            .or_insert_with(|| Tracker::new(now_ms));
        tracker.touch(now_ms);

        // Windows are inspected minute -> hour -> day; the first
        // exceeded one denies.
        let windows = [
            (WindowKind::Minute, quota.max_calls_per_minute, &tracker.minute),
            (WindowKind::Hour, quota.max_calls_per_hour, &tracker.hour),
            (WindowKind::Day, quota.max_calls_per_day, &tracker.day),
        ];
        for (kind, limit, window) in windows {
            if let Some(limit) = limit {
                if window.count >= limit {
                    return QuotaDecision::Denied {
                        window: kind,
                        retry_after_ms: window.retry_after(now_ms),
                        tool_scoped: false,
                    };
                }
            }
        }

        if let Some(tool_quota) = quota.per_tool.get(tool) {
            if let Some(denial) = check_tool(tracker, tool, tool_quota, now_ms) {
                return denial;
            }
        }

        if let Some(max) = quota.max_concurrent {
            if tracker.concurrent >= max {
                return QuotaDecision::Denied {
                    window: WindowKind::Concurrent,
                    retry_after_ms: 0,
                    tool_scoped: false,
                };
            }
        }

        QuotaDecision::Allowed
    }

    /// Record an admitted call: all three windows (and the per-tool
    /// windows when sub-limits apply) are incremented.
    pub fn consume(&self, session: &str, role: &RoleId, tool: &str) {
        self.consume_at(session, role, tool, Utc::now().timestamp_millis());
    }

    /// Consume with an explicit clock (tests).
    pub fn consume_at(&self, session: &str, role: &RoleId, tool: &str, now_ms: i64) {
        let quota = self.quotas.get(role);
        let Ok(mut trackers) = self.trackers.lock() else {
            return;
        };
        let tracker = trackers
            .entry(session.to_string())
            .or_insert_with(|| Tracker::new(now_ms));
        tracker.touch(now_ms);

        tracker.minute.count = tracker.minute.count.saturating_add(1);
        tracker.hour.count = tracker.hour.count.saturating_add(1);
        tracker.day.count = tracker.day.count.saturating_add(1);

        let tool_tracked = quota.is_some_and(|q| q.per_tool.contains_key(tool));
        if tool_tracked {
            let windows = tracker
                .per_tool
                .entry(tool.to_string())
                .or_insert_with(|| ToolWindows {
                    minute: Window::fresh(now_ms, MINUTE_MS),
                    hour: Window::fresh(now_ms, HOUR_MS),
                });
            windows.minute.count = windows.minute.count.saturating_add(1);
            windows.hour.count = windows.hour.count.saturating_add(1);
        }

        let mut warnings = Vec::new();
        if let Some(quota) = quota {
            let checks = [
                (WindowKind::Minute, quota.max_calls_per_minute, tracker.minute.count),
                (WindowKind::Hour, quota.max_calls_per_hour, tracker.hour.count),
                (WindowKind::Day, quota.max_calls_per_day, tracker.day.count),
            ];
            for (kind, limit, used) in checks {
                if let Some(limit) = limit {
                    if crossed_warning_threshold(used, limit) {
                        warnings.push(QuotaWarning {
                            session: session.to_string(),
                            role: role.clone(),
                            window: kind,
                            used,
                            limit,
                        });
                    }
                }
            }
        }
        // Emit outside the tracker lock so handlers may call back in.
        drop(trackers);
        for warning in warnings {
            self.emit_warning(warning);
        }
    }

    /// Record the start of a call for the concurrent counter.
    pub fn start_concurrent(&self, session: &str) {
        if let Ok(mut trackers) = self.trackers.lock() {
            let tracker = trackers
                .entry(session.to_string())
                .or_insert_with(|| Tracker::new(Utc::now().timestamp_millis()));
            tracker.concurrent = tracker.concurrent.saturating_add(1);
        }
    }

    /// Record the end of a call; the counter never goes negative.
    pub fn end_concurrent(&self, session: &str) {
        if let Ok(mut trackers) = self.trackers.lock() {
            if let Some(tracker) = trackers.get_mut(session) {
                tracker.concurrent = tracker.concurrent.saturating_sub(1);
            }
        }
    }

    fn emit_warning(&self, warning: QuotaWarning) {
        match &self.on_warning {
            Some(handler) => handler(warning),
            None => {
                warn!(
                    session = %warning.session,
                    role = %warning.role,
                    window = %warning.window,
                    used = warning.used,
                    limit = warning.limit,
                    "quota window crossed 80% utilization"
                );
            },
        }
    }
}

fn check_tool(
    tracker: &Tracker,
    tool: &str,
    quota: &ToolQuota,
    now_ms: i64,
) -> Option<QuotaDecision> {
    let windows = tracker.per_tool.get(tool)?;
    if let Some(limit) = quota.per_minute {
        if windows.minute.count >= limit {
            return Some(QuotaDecision::Denied {
                window: WindowKind::Minute,
                retry_after_ms: windows.minute.retry_after(now_ms),
                tool_scoped: true,
            });
        }
    }
    if let Some(limit) = quota.per_hour {
        if windows.hour.count >= limit {
            return Some(QuotaDecision::Denied {
                window: WindowKind::Hour,
                retry_after_ms: windows.hour.retry_after(now_ms),
                tool_scoped: true,
            });
        }
    }
    None
}

/// True exactly when `used` crosses the 80% line.
fn crossed_warning_threshold(used: u32, limit: u32) -> bool {
    let threshold = u64::from(limit).saturating_mul(4);
    let scaled = u64::from(used).saturating_mul(5);
    let previous = u64::from(used.saturating_sub(1)).saturating_mul(5);
    scaled >= threshold && previous < threshold
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("roles", &self.quotas.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn limiter(quota: Quota) -> RateLimiter {
        RateLimiter::new([(RoleId::new("dev"), quota)].into_iter().collect())
    }

    const T0: i64 = 1_700_000_000_000;

    #[test]
    fn test_sixth_call_denied() {
        // The S6 shape: five per minute, the sixth denies with a hint.
        let limiter = limiter(Quota::per_minute(5));
        let role = RoleId::new("dev");

        for _ in 0..5 {
            assert!(limiter.check_at("s1", &role, "fs__read", T0).is_allowed());
            limiter.consume_at("s1", &role, "fs__read", T0);
        }
        match limiter.check_at("s1", &role, "fs__read", T0) {
            QuotaDecision::Denied {
                window,
                retry_after_ms,
                ..
            } => {
                assert_eq!(window, WindowKind::Minute);
                assert!(retry_after_ms > 0);
            },
            QuotaDecision::Allowed => panic!("sixth call must be denied"),
        }
    }

    #[test]
    fn test_window_resets() {
        let limiter = limiter(Quota::per_minute(1));
        let role = RoleId::new("dev");
        limiter.consume_at("s1", &role, "t", T0);
        assert!(!limiter.check_at("s1", &role, "t", T0).is_allowed());

        // A minute later the window has rolled over.
        assert!(
            limiter
                .check_at("s1", &role, "t", T0.saturating_add(MINUTE_MS))
                .is_allowed()
        );
    }

    #[test]
    fn test_unconfigured_role_is_unlimited() {
        let limiter = limiter(Quota::per_minute(1));
        let other = RoleId::new("other");
        for _ in 0..100 {
            assert!(limiter.check_at("s1", &other, "t", T0).is_allowed());
            limiter.consume_at("s1", &other, "t", T0);
        }
    }

    #[test]
    fn test_sessions_are_isolated() {
        let limiter = limiter(Quota::per_minute(1));
        let role = RoleId::new("dev");
        limiter.consume_at("a", &role, "t", T0);
        assert!(!limiter.check_at("a", &role, "t", T0).is_allowed());
        assert!(limiter.check_at("b", &role, "t", T0).is_allowed());
    }

    #[test]
    fn test_per_tool_sub_limit() {
        let mut quota = Quota::per_minute(100);
        quota.per_tool.insert(
            "db__query".to_string(),
            ToolQuota {
                per_minute: Some(1),
                per_hour: None,
            },
        );
        let limiter = limiter(quota);
        let role = RoleId::new("dev");

        limiter.consume_at("s1", &role, "db__query", T0);
        match limiter.check_at("s1", &role, "db__query", T0) {
            QuotaDecision::Denied { tool_scoped, .. } => assert!(tool_scoped),
            QuotaDecision::Allowed => panic!("tool sub-limit must deny"),
        }
        // Other tools are unaffected.
        assert!(limiter.check_at("s1", &role, "fs__read", T0).is_allowed());
    }

    #[test]
    fn test_concurrent_counter() {
        let limiter = limiter(Quota {
            max_concurrent: Some(2),
            ..Quota::default()
        });
        let role = RoleId::new("dev");

        limiter.start_concurrent("s1");
        limiter.start_concurrent("s1");
        assert!(!limiter.check_at("s1", &role, "t", T0).is_allowed());

        limiter.end_concurrent("s1");
        assert!(limiter.check_at("s1", &role, "t", T0).is_allowed());

        // Never goes negative.
        limiter.end_concurrent("s1");
        limiter.end_concurrent("s1");
        limiter.end_concurrent("s1");
        assert!(limiter.check_at("s1", &role, "t", T0).is_allowed());
    }

    #[test]
    fn test_warning_at_80_percent() {
        let warnings = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&warnings);
        let limiter = RateLimiter::new(
            [(RoleId::new("dev"), Quota::per_minute(5))].into_iter().collect(),
        )
        .with_warning_handler(move |warning| {
            assert_eq!(warning.window, WindowKind::Minute);
            assert_eq!(warning.limit, 5);
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let role = RoleId::new("dev");

        for _ in 0..5 {
            limiter.consume_at("s1", &role, "t", T0);
        }
        // 4/5 crosses 80% exactly once.
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_threshold_crossing_detector() {
        assert!(crossed_warning_threshold(4, 5));
        assert!(!crossed_warning_threshold(3, 5));
        assert!(!crossed_warning_threshold(5, 5));
        assert!(crossed_warning_threshold(8, 10));
        assert!(!crossed_warning_threshold(9, 10));
    }
}
