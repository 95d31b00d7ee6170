//! Recurrence rules for maintenance tasks.

use crate::error::WsError;
use chrono::{Duration, NaiveDateTime};
use std::fmt;
use std::str::FromStr;

/// Longest interval a task may use: one year.
const MAX_MINUTES: u32 = 60 * 24 * 366;
const MAX_HOURS: u32 = 24 * 366;

/// How often a task recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Hourly,
    Daily,
    Weekly,
    EveryMinutes(u32),
    EveryHours(u32),
}

impl Schedule {
    /// Parse a stored schedule. Unknown or malformed text falls back to daily;
    /// use `str::parse` to reject it instead.
    pub fn parse(text: &str) -> Self {
        text.parse().unwrap_or_else(|_| {
            tracing::debug!(schedule = text, "unrecognised schedule, using daily");
            Schedule::Daily
        })
    }

    /// `every_<N>_minutes` or `every_<N>_hours` with N between 1 and one year.
    fn parse_interval(text: &str) -> Option<Self> {
        let rest = text.strip_prefix("every_")?;
        let (count, unit) = rest.split_once('_')?;
        let count: u32 = count.parse().ok().filter(|n| *n > 0)?;
        match unit {
            "minutes" if count <= MAX_MINUTES => Some(Schedule::EveryMinutes(count)),
            "hours" if count <= MAX_HOURS => Some(Schedule::EveryHours(count)),
            _ => None,
        }
    }

    pub fn interval(self) -> Duration {
        match self {
            Schedule::Hourly => Duration::hours(1),
            Schedule::Daily => Duration::days(1),
            Schedule::Weekly => Duration::weeks(1),
            Schedule::EveryMinutes(n) => Duration::minutes(i64::from(n)),
            Schedule::EveryHours(n) => Duration::hours(i64::from(n)),
        }
    }

    /// One interval after `now`, saturating at the latest representable time.
    pub fn next_run(self, now: NaiveDateTime) -> NaiveDateTime {
        now.checked_add_signed(self.interval()).unwrap_or(NaiveDateTime::MAX)
    }
}

impl FromStr for Schedule {
    type Err = WsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let parsed = match text {
            "hourly" => Some(Schedule::Hourly),
            "daily" => Some(Schedule::Daily),
            "weekly" => Some(Schedule::Weekly),
            _ => Self::parse_interval(text),
        };
        parsed.ok_or_else(|| WsError::InvalidValue { field: "schedule", value: s.to_string() })
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Hourly => f.write_str("hourly"),
            Schedule::Daily => f.write_str("daily"),
            Schedule::Weekly => f.write_str("weekly"),
            Schedule::EveryMinutes(n) => write!(f, "every_{n}_minutes"),
            Schedule::EveryHours(n) => write!(f, "every_{n}_hours"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .expect("valid date")
    }

    #[test]
    fn keywords_and_intervals() {
        assert_eq!(Schedule::parse("daily").next_run(noon()), noon() + Duration::hours(24));
        assert_eq!(Schedule::parse("every_5_minutes").next_run(noon()), noon() + Duration::minutes(5));
        assert_eq!(Schedule::parse("every_3_hours"), Schedule::EveryHours(3));
        assert_eq!(Schedule::parse("weekly").interval(), Duration::days(7));
    }

    #[test]
    fn unknown_schedules_fall_back_to_daily() {
        for text in ["monthly", "every_x_minutes", "every_5_days", "every_0_hours", "every_5", ""] {
            assert_eq!(Schedule::parse(text), Schedule::Daily, "{text}");
        }
    }

    #[test]
    fn oversized_intervals_are_rejected() {
        assert!("every_4294967295_hours".parse::<Schedule>().is_err());
        assert!("every_600000_minutes".parse::<Schedule>().is_err());
        assert_eq!("every_8784_hours".parse::<Schedule>().ok(), Some(Schedule::EveryHours(8784)));
        assert_eq!(Schedule::parse("every_4294967295_hours").next_run(noon()), noon() + Duration::days(1));
    }

    #[test]
    fn next_run_saturates_instead_of_overflowing() {
        let late = NaiveDateTime::MAX - Duration::minutes(1);
        assert_eq!(Schedule::Weekly.next_run(late), NaiveDateTime::MAX);
    }

    #[test]
    fn display_matches_parse() {
        for schedule in [Schedule::Hourly, Schedule::EveryMinutes(15), Schedule::EveryHours(2)] {
            assert_eq!(Schedule::parse(&schedule.to_string()), schedule);
        }
    }
}
