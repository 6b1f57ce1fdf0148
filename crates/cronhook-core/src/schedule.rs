//! Schedule-expression parsing and fire-time computation.
//!
//! Two dialects are supported: `repeat` intervals such as `"30s"` or
//! `"2h"`, and cron expressions. The documented cron dialect is the
//! standard 5-field form (minute hour day-of-month month day-of-week);
//! a 6-field form is accepted for compatibility and treated as
//! seconds-precision. 7-field (year) expressions are rejected.

use std::str::FromStr;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::model::ScheduleType;

static REPEAT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\d+)\s*(s|m|h|d)$").expect("repeat pattern"));

/// Minimum repeat interval in seconds
pub const MIN_REPEAT_SECS: u64 = 5;
/// Maximum repeat interval in days
pub const MAX_REPEAT_DAYS: u64 = 30;

/// A parsed schedule, computed once at registration
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Fixed interval between fires
    Repeat { every_ms: u64 },
    /// Wall-clock cron expression, evaluated in the configured zone
    Cron {
        schedule: cron::Schedule,
        expr: String,
    },
}

impl Schedule {
    /// Parse and validate an expression for the given dialect
    pub fn parse(expr: &str, schedule_type: ScheduleType) -> Result<Self> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(Error::invalid_schedule("schedule must not be empty"));
        }
        match schedule_type {
            ScheduleType::Repeat => Self::parse_repeat(expr),
            ScheduleType::Cron => Self::parse_cron(expr),
        }
    }

    /// Validate without keeping the parsed form
    pub fn validate(expr: &str, schedule_type: ScheduleType) -> Result<()> {
        Self::parse(expr, schedule_type).map(|_| ())
    }

    fn parse_repeat(expr: &str) -> Result<Self> {
        let captures = REPEAT_RE.captures(expr).ok_or_else(|| {
            Error::invalid_schedule(format!(
                "invalid repeat expression '{expr}' (expected e.g. 30s, 5m, 2h, 1d)"
            ))
        })?;

        let value: u64 = captures[1].parse().map_err(|_| {
            Error::invalid_schedule(format!("repeat value out of range in '{expr}'"))
        })?;
        if value == 0 {
            return Err(Error::invalid_schedule("repeat interval must be positive"));
        }

        let unit = captures[2].to_ascii_lowercase();
        let per_unit_ms: u64 = match unit.as_str() {
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            "d" => 86_400_000,
            _ => unreachable!("pattern restricts units"),
        };

        if unit == "s" && value < MIN_REPEAT_SECS {
            return Err(Error::invalid_schedule(format!(
                "Minimum interval is {MIN_REPEAT_SECS} seconds"
            )));
        }
        if unit == "d" && value > MAX_REPEAT_DAYS {
            return Err(Error::invalid_schedule(format!(
                "Maximum interval is {MAX_REPEAT_DAYS} days"
            )));
        }

        let every_ms = value.checked_mul(per_unit_ms).ok_or_else(|| {
            Error::invalid_schedule(format!("repeat interval overflows in '{expr}'"))
        })?;

        Ok(Schedule::Repeat { every_ms })
    }

    fn parse_cron(expr: &str) -> Result<Self> {
        let fields = expr.split_whitespace().count();
        // The cron crate wants a seconds field; the documented dialect
        // does not carry one.
        let normalized = match fields {
            5 => format!("0 {expr}"),
            6 => expr.to_string(),
            other => {
                return Err(Error::invalid_schedule(format!(
                    "cron expression must have 5 or 6 fields, got {other}"
                )))
            }
        };

        let schedule = cron::Schedule::from_str(&normalized)
            .map_err(|e| Error::invalid_schedule(format!("invalid cron expression: {e}")))?;

        Ok(Schedule::Cron {
            schedule,
            expr: expr.to_string(),
        })
    }

    /// First fire instant strictly after `from`, or None when the
    /// expression has no future matches
    pub fn next_after(&self, from: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Repeat { every_ms } => {
                Some(from + ChronoDuration::milliseconds(*every_ms as i64))
            }
            Schedule::Cron { schedule, .. } => schedule
                .after(&from.with_timezone(&tz))
                .next()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }

    /// First `count` fire instants after now
    pub fn upcoming(&self, count: usize, tz: Tz) -> Vec<DateTime<Utc>> {
        let now = Utc::now();
        match self {
            Schedule::Repeat { every_ms } => (1..=count as i64)
                .map(|i| now + ChronoDuration::milliseconds(*every_ms as i64 * i))
                .collect(),
            Schedule::Cron { schedule, .. } => schedule
                .after(&now.with_timezone(&tz))
                .take(count)
                .map(|dt| dt.with_timezone(&Utc))
                .collect(),
        }
    }

    /// Interval length for repeat schedules
    pub fn interval_ms(&self) -> Option<u64> {
        match self {
            Schedule::Repeat { every_ms } => Some(*every_ms),
            Schedule::Cron { .. } => None,
        }
    }

    /// Best-effort human description
    pub fn describe(&self) -> String {
        match self {
            Schedule::Repeat { every_ms } => describe_interval(*every_ms),
            Schedule::Cron { expr, .. } => describe_cron(expr),
        }
    }
}

fn describe_interval(every_ms: u64) -> String {
    let (value, unit) = if every_ms % 86_400_000 == 0 {
        (every_ms / 86_400_000, "day")
    } else if every_ms % 3_600_000 == 0 {
        (every_ms / 3_600_000, "hour")
    } else if every_ms % 60_000 == 0 {
        (every_ms / 60_000, "minute")
    } else {
        (every_ms / 1_000, "second")
    };
    if value == 1 {
        format!("every {unit}")
    } else {
        format!("every {value} {unit}s")
    }
}

fn describe_cron(expr: &str) -> String {
    static DAILY_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^(\d{1,2}) (\d{1,2}) \* \* \*$").expect("daily pattern"));

    match expr {
        "* * * * *" => "every minute".to_string(),
        "0 * * * *" => "every hour".to_string(),
        _ => match DAILY_RE.captures(expr) {
            Some(caps) => format!("daily at {:0>2}:{:0>2}", &caps[2], &caps[1]),
            None => format!("cron: {expr}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_repeat_units() {
        assert_eq!(
            Schedule::parse("5s", ScheduleType::Repeat)
                .unwrap()
                .interval_ms(),
            Some(5_000)
        );
        assert_eq!(
            Schedule::parse("2m", ScheduleType::Repeat)
                .unwrap()
                .interval_ms(),
            Some(120_000)
        );
        assert_eq!(
            Schedule::parse("1h", ScheduleType::Repeat)
                .unwrap()
                .interval_ms(),
            Some(3_600_000)
        );
        assert_eq!(
            Schedule::parse("30D", ScheduleType::Repeat)
                .unwrap()
                .interval_ms(),
            Some(30 * 86_400_000)
        );
    }

    #[test]
    fn test_repeat_rejects_too_fast() {
        let err = Schedule::parse("3s", ScheduleType::Repeat).unwrap_err();
        assert!(err.to_string().contains("Minimum interval is 5 seconds"));
    }

    #[test]
    fn test_repeat_bounds() {
        assert!(Schedule::parse("0m", ScheduleType::Repeat).is_err());
        assert!(Schedule::parse("31d", ScheduleType::Repeat).is_err());
        assert!(Schedule::parse("99999999999999999999s", ScheduleType::Repeat).is_err());
        assert!(Schedule::parse("5x", ScheduleType::Repeat).is_err());
        assert!(Schedule::parse("", ScheduleType::Repeat).is_err());
    }

    #[test]
    fn test_repeat_upcoming_deltas() {
        let schedule = Schedule::parse("5s", ScheduleType::Repeat).unwrap();
        let upcoming = schedule.upcoming(5, Tz::UTC);
        assert_eq!(upcoming.len(), 5);
        for pair in upcoming.windows(2) {
            assert_eq!((pair[1] - pair[0]).num_milliseconds(), 5_000);
        }
    }

    #[test]
    fn test_cron_five_field_next() {
        let schedule = Schedule::parse("0 * * * *", ScheduleType::Cron).unwrap();
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 12, 59, 30).unwrap();
        let next = schedule.next_after(from, Tz::UTC).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap());
    }

    #[test]
    fn test_cron_six_field_seconds_precision() {
        let schedule = Schedule::parse("*/15 * * * * *", ScheduleType::Cron).unwrap();
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 1).unwrap();
        let next = schedule.next_after(from, Tz::UTC).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 15).unwrap());
    }

    #[test]
    fn test_cron_rejects_seven_fields() {
        assert!(Schedule::parse("0 0 0 * * * 2024", ScheduleType::Cron).is_err());
        assert!(Schedule::parse("not a cron", ScheduleType::Cron).is_err());
    }

    #[test]
    fn test_cron_zone_evaluation() {
        // 09:00 in New York is 14:00 UTC on 2024-03-01 (EST, UTC-5)
        let schedule = Schedule::parse("0 9 * * *", ScheduleType::Cron).unwrap();
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let next = schedule
            .next_after(from, chrono_tz::America::New_York)
            .unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap());
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            Schedule::parse("5s", ScheduleType::Repeat).unwrap().describe(),
            "every 5 seconds"
        );
        assert_eq!(
            Schedule::parse("1h", ScheduleType::Repeat).unwrap().describe(),
            "every hour"
        );
        assert_eq!(
            Schedule::parse("0 * * * *", ScheduleType::Cron).unwrap().describe(),
            "every hour"
        );
        assert_eq!(
            Schedule::parse("30 7 * * *", ScheduleType::Cron).unwrap().describe(),
            "daily at 07:30"
        );
        assert_eq!(
            Schedule::parse("*/5 2 * * 1", ScheduleType::Cron).unwrap().describe(),
            "cron: */5 2 * * 1"
        );
    }

    #[test]
    fn test_upcoming_cron_count() {
        let schedule = Schedule::parse("* * * * *", ScheduleType::Cron).unwrap();
        let upcoming = schedule.upcoming(3, Tz::UTC);
        assert_eq!(upcoming.len(), 3);
        for pair in upcoming.windows(2) {
            assert_eq!((pair[1] - pair[0]).num_seconds(), 60);
        }
    }
}
