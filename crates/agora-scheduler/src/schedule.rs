//! Workflow schedules.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::cron::CronExpr;
use crate::error::{Result, ScheduleError};

/// Naive formats accepted for one-off schedules, interpreted as UTC.
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// When a workflow runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Run once at the given instant.
    Once(DateTime<Utc>),
    /// Run whenever the cron expression matches.
    Recurring(CronExpr),
}

impl Schedule {
    /// Parse a schedule expression.
    ///
    /// The expression is tried as a cron expression first. Anything else
    /// must be a timestamp strictly after `now`.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleError::Unparseable` if the expression is neither,
    /// `ScheduleError::NotInFuture` for a past timestamp, and
    /// `ScheduleError::NeverFires` for a cron expression with no upcoming
    /// match.
    pub fn parse(expression: &str, now: DateTime<Utc>) -> Result<Self> {
        let expression = expression.trim();

        let cron_error = match CronExpr::parse(expression) {
            Ok(cron) => {
                if cron.next_at_or_after(now).is_none() {
                    tracing::debug!(expression = %cron, "Cron expression never fires");
                    return Err(ScheduleError::NeverFires(cron.to_string()));
                }
                return Ok(Self::Recurring(cron));
            }
            Err(e) => e,
        };

        let at = parse_timestamp(expression).ok_or_else(|| ScheduleError::Unparseable {
            expression: expression.to_string(),
            reason: cron_error.to_string(),
        })?;

        if at <= now {
            tracing::debug!(%at, %now, "One-off schedule is not in the future");
            return Err(ScheduleError::NotInFuture { at });
        }

        Ok(Self::Once(at))
    }

    /// Returns true for cron schedules.
    #[must_use]
    pub const fn is_recurring(&self) -> bool {
        matches!(self, Self::Recurring(_))
    }

    /// The first execution time for a schedule created at `now`.
    ///
    /// A cron schedule created on one of its own matching minutes fires at
    /// `now`.
    #[must_use]
    pub fn first_execution(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Once(at) => Some(*at),
            Self::Recurring(cron) => cron.next_at_or_after(now),
        }
    }

    /// The execution following one that was due at `previous`.
    ///
    /// One-off schedules have no next execution.
    #[must_use]
    pub fn next_after(&self, previous: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Once(_) => None,
            Self::Recurring(cron) => cron.next_after(previous),
        }
    }
}

fn parse_timestamp(expression: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(expression) {
        return Some(at.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(expression, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(expression, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        // A Thursday.
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    #[test]
    fn future_timestamp_is_one_off() {
        let schedule = Schedule::parse("2099-01-01T00:00:00Z", now()).unwrap();
        let at = Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(schedule, Schedule::Once(at));
        assert!(!schedule.is_recurring());
        assert_eq!(schedule.first_execution(now()), Some(at));
        assert_eq!(schedule.next_after(at), None);
    }

    #[test]
    fn past_timestamp_is_rejected() {
        let result = Schedule::parse("2020-01-01T00:00:00Z", now());
        assert!(matches!(result, Err(ScheduleError::NotInFuture { .. })));

        let exactly_now = Schedule::parse("2026-01-15T10:00:00Z", now());
        assert!(matches!(exactly_now, Err(ScheduleError::NotInFuture { .. })));
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let schedule = Schedule::parse("2026-02-01 08:30", now()).unwrap();
        assert_eq!(
            schedule,
            Schedule::Once(Utc.with_ymd_and_hms(2026, 2, 1, 8, 30, 0).unwrap())
        );

        let date_only = Schedule::parse("2026-03-01", now()).unwrap();
        assert_eq!(
            date_only,
            Schedule::Once(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn offsets_are_normalized() {
        let schedule = Schedule::parse("2026-02-01T10:00:00+02:00", now()).unwrap();
        assert_eq!(
            schedule,
            Schedule::Once(Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn cron_is_recurring() {
        let schedule = Schedule::parse("0 9 * * 1", now()).unwrap();
        assert!(schedule.is_recurring());
        assert_eq!(
            schedule.first_execution(now()),
            Some(Utc.with_ymd_and_hms(2026, 1, 19, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn cron_created_on_a_match_fires_immediately() {
        let monday_nine = Utc.with_ymd_and_hms(2026, 1, 19, 9, 0, 0).unwrap();
        let schedule = Schedule::parse("0 9 * * 1", monday_nine).unwrap();
        assert_eq!(schedule.first_execution(monday_nine), Some(monday_nine));
        assert_eq!(
            schedule.next_after(monday_nine),
            Some(Utc.with_ymd_and_hms(2026, 1, 26, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn recurring_next_follows_previous_due_time() {
        let schedule = Schedule::parse("0 9 * * *", now()).unwrap();
        let due = Utc.with_ymd_and_hms(2026, 1, 16, 9, 0, 0).unwrap();
        assert_eq!(
            schedule.next_after(due),
            Some(Utc.with_ymd_and_hms(2026, 1, 17, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn garbage_is_unparseable() {
        let result = Schedule::parse("every tuesday", now());
        assert!(matches!(result, Err(ScheduleError::Unparseable { .. })));
    }

    #[test]
    fn impossible_cron_never_fires() {
        let result = Schedule::parse("0 0 31 2 *", now());
        assert!(matches!(result, Err(ScheduleError::NeverFires(_))));
    }
}
