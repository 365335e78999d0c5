//! Day and time-of-day rule context.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use tracing::warn;

use waygate_core::RuleContextSpec;

use crate::error::{IdentityError, IdentityResult};

/// A wall-clock range, inclusive of the start and exclusive of the end.
/// An end at or before the start means the range crosses midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Start of the range.
    pub start: NaiveTime,
    /// End of the range (exclusive).
    pub end: NaiveTime,
}

impl TimeRange {
    /// Parse `HH:MM-HH:MM`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let (start, end) = s.split_once('-')?;
        let start = NaiveTime::parse_from_str(start.trim(), "%H:%M").ok()?;
        let end = NaiveTime::parse_from_str(end.trim(), "%H:%M").ok()?;
        Some(Self { start, end })
    }

    /// Whether a wall-clock time (truncated to the minute) falls in the
    /// range.
    #[must_use]
    pub fn contains(&self, time: NaiveTime) -> bool {
        let time = time
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(time);
        if self.end <= self.start {
            // Crosses midnight.
            time >= self.start || time < self.end
        } else {
            time >= self.start && time < self.end
        }
    }
}

/// Compiled time/day context for one rule.
#[derive(Debug, Clone, Default)]
pub struct RuleContext {
    /// Days of week on which the rule may match.
    pub allowed_days: Option<HashSet<Weekday>>,
    /// Wall-clock range in which the rule may match.
    pub allowed_time: Option<TimeRange>,
    /// IANA timezone the context is evaluated in; system-local when
    /// absent.
    pub timezone: Option<Tz>,
    /// The declarative spec failed to parse; the rule never matches.
    malformed: bool,
}

impl RuleContext {
    /// Compile a declarative context.
    ///
    /// In lenient mode a malformed day, time, or timezone yields a
    /// context that never passes (the rule is effectively ignored);
    /// strict mode raises instead.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidConfig`] in strict mode when any
    /// component fails to parse.
    pub fn compile(spec: &RuleContextSpec, strict: bool) -> IdentityResult<Self> {
        let mut context = Self::default();

        if let Some(days) = &spec.allowed_days {
            let mut parsed = HashSet::new();
            for day in days {
                match parse_weekday(day) {
                    Some(weekday) => {
                        parsed.insert(weekday);
                    },
                    None => {
                        if strict {
                            return Err(IdentityError::InvalidConfig {
                                reason: format!("unknown day of week: {day}"),
                            });
                        }
                        warn!(day = %day, "ignoring rule with unknown day of week");
                        context.malformed = true;
                    },
                }
            }
            context.allowed_days = Some(parsed);
        }

        if let Some(time) = &spec.allowed_time {
            match TimeRange::parse(time) {
                Some(range) => context.allowed_time = Some(range),
                None => {
                    if strict {
                        return Err(IdentityError::InvalidConfig {
                            reason: format!("malformed time range: {time}"),
                        });
                    }
                    warn!(time = %time, "ignoring rule with malformed time range");
                    context.malformed = true;
                },
            }
        }

        if let Some(zone) = &spec.timezone {
            match zone.parse::<Tz>() {
                Ok(tz) => context.timezone = Some(tz),
                Err(_) => {
                    if strict {
                        return Err(IdentityError::InvalidConfig {
                            reason: format!("unknown IANA timezone: {zone}"),
                        });
                    }
                    warn!(timezone = %zone, "ignoring rule with unknown timezone");
                    context.malformed = true;
                },
            }
        }

        Ok(context)
    }

    /// Evaluate the context at an instant.
    #[must_use]
    pub fn passes_at(&self, now: DateTime<Utc>) -> bool {
        if self.malformed {
            return false;
        }

        let (weekday, time) = match self.timezone {
            Some(tz) => {
                let local = now.with_timezone(&tz);
                (local.weekday(), local.time())
            },
            None => {
                let local = now.with_timezone(&chrono::Local);
                (local.weekday(), local.time())
            },
        };

        if let Some(days) = &self.allowed_days {
            if !days.contains(&weekday) {
                return false;
            }
        }
        if let Some(range) = &self.allowed_time {
            if !range.contains(time) {
                return false;
            }
        }
        true
    }
}

fn parse_weekday(day: &str) -> Option<Weekday> {
    match day.trim().to_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn spec(
        days: Option<Vec<&str>>,
        time: Option<&str>,
        zone: Option<&str>,
    ) -> RuleContextSpec {
        RuleContextSpec {
            allowed_days: days.map(|d| d.into_iter().map(String::from).collect()),
            allowed_time: time.map(String::from),
            timezone: zone.map(String::from),
        }
    }

    #[test]
    fn test_time_range_parse() {
        let range = TimeRange::parse("09:00-17:30").unwrap();
        assert_eq!(range.start, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(range.end, NaiveTime::from_hms_opt(17, 30, 0).unwrap());
        assert!(TimeRange::parse("9am-5pm").is_none());
        assert!(TimeRange::parse("09:00").is_none());
    }

    #[test]
    fn test_range_start_inclusive_end_exclusive() {
        let range = TimeRange::parse("09:00-17:00").unwrap();
        assert!(range.contains(NaiveTime::from_hms_opt(9, 0, 0).unwrap()));
        assert!(range.contains(NaiveTime::from_hms_opt(16, 59, 0).unwrap()));
        assert!(!range.contains(NaiveTime::from_hms_opt(17, 0, 0).unwrap()));
    }

    #[test]
    fn test_range_crossing_midnight() {
        let range = TimeRange::parse("22:00-06:00").unwrap();
        assert!(range.contains(NaiveTime::from_hms_opt(23, 0, 0).unwrap()));
        assert!(range.contains(NaiveTime::from_hms_opt(2, 0, 0).unwrap()));
        assert!(!range.contains(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
        assert!(range.contains(NaiveTime::from_hms_opt(22, 0, 0).unwrap()));
        assert!(!range.contains(NaiveTime::from_hms_opt(6, 0, 0).unwrap()));
    }

    #[test]
    fn test_context_in_named_zone() {
        // 2026-01-05 14:30 UTC is a Monday, 09:30 in New York.
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 14, 30, 0).unwrap();
        let context = RuleContext::compile(
            &spec(Some(vec!["monday"]), Some("09:00-17:00"), Some("America/New_York")),
            true,
        )
        .unwrap();
        assert!(context.passes_at(now));

        // The same instant is 23:30 in Tokyo: out of range.
        let tokyo = RuleContext::compile(
            &spec(None, Some("09:00-17:00"), Some("Asia/Tokyo")),
            true,
        )
        .unwrap();
        assert!(!tokyo.passes_at(now));
    }

    #[test]
    fn test_day_gate() {
        // A Sunday.
        let now = Utc.with_ymd_and_hms(2026, 1, 4, 12, 0, 0).unwrap();
        let weekdays = RuleContext::compile(
            &spec(Some(vec!["mon", "tue", "wed", "thu", "fri"]), None, Some("UTC")),
            true,
        )
        .unwrap();
        assert!(!weekdays.passes_at(now));
    }

    #[test]
    fn test_lenient_malformed_never_passes() {
        let context =
            RuleContext::compile(&spec(None, Some("not-a-range"), None), false).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();
        assert!(!context.passes_at(now));
    }

    #[test]
    fn test_strict_malformed_raises() {
        assert!(matches!(
            RuleContext::compile(&spec(None, None, Some("Mars/Olympus")), true),
            Err(IdentityError::InvalidConfig { .. })
        ));
        assert!(matches!(
            RuleContext::compile(&spec(Some(vec!["noday"]), None, None), true),
            Err(IdentityError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_empty_context_always_passes() {
        let context = RuleContext::compile(&RuleContextSpec::default(), true).unwrap();
        assert!(context.passes_at(Utc::now()));
    }
}
