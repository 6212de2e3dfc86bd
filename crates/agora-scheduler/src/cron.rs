//! Five-field cron expressions.
//!
//! Fields are `minute hour day-of-month month day-of-week`, all in UTC. Each
//! field accepts `*`, single values, ranges `a-b`, steps `*/n` and `a-b/n`,
//! and comma-separated lists of those. Months and weekdays also accept
//! three-letter names; weekday `7` is Sunday.
//!
//! When both day-of-month and day-of-week are restricted, a day matches if
//! either field matches.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone, Timelike, Utc};

use crate::error::{Result, ScheduleError};

/// How far ahead `next_after` searches before giving up.
const SEARCH_DAYS: u64 = 5 * 366;

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// A set of allowed values for one field, as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet(u64);

impl FieldSet {
    const fn contains(self, value: u32) -> bool {
        value < 64 && self.0 & (1 << value) != 0
    }

    fn values(self) -> impl Iterator<Item = u32> {
        (0..64).filter(move |v| self.contains(*v))
    }
}

/// Bounds and aliases of one cron field.
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    /// Offset added to a name's index to get its value.
    name_base: u32,
}

const MINUTE: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
    name_base: 0,
};
const HOUR: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
    name_base: 0,
};
const DAY_OF_MONTH: FieldSpec = FieldSpec {
    name: "day-of-month",
    min: 1,
    max: 31,
    names: &[],
    name_base: 0,
};
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: &MONTH_NAMES,
    name_base: 1,
};
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: &WEEKDAY_NAMES,
    name_base: 0,
};

impl FieldSpec {
    fn value(&self, token: &str) -> Result<u32> {
        let lower = token.to_ascii_lowercase();
        let named = self
            .names
            .iter()
            .zip(self.name_base..)
            .find_map(|(name, value)| (*name == lower).then_some(value));
        if let Some(value) = named {
            return Ok(value);
        }

        let value: u32 = token.parse().map_err(|_| {
            ScheduleError::InvalidCron(format!("invalid {} value '{token}'", self.name))
        })?;
        if value < self.min || value > self.max {
            return Err(ScheduleError::InvalidCron(format!(
                "{} value {value} out of range {}-{}",
                self.name, self.min, self.max
            )));
        }
        Ok(value)
    }

    fn parse(&self, field: &str) -> Result<FieldSet> {
        let mut bits = 0u64;

        for part in field.split(',') {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => {
                    let step: u32 = step.parse().map_err(|_| {
                        ScheduleError::InvalidCron(format!("invalid {} step '{step}'", self.name))
                    })?;
                    if step == 0 {
                        return Err(ScheduleError::InvalidCron(format!(
                            "{} step cannot be zero",
                            self.name
                        )));
                    }
                    (range, Some(step))
                }
                None => (part, None),
            };

            let (lo, hi) = if range == "*" {
                (self.min, self.max)
            } else if let Some((lo, hi)) = range.split_once('-') {
                let (lo, hi) = (self.value(lo)?, self.value(hi)?);
                if lo > hi {
                    return Err(ScheduleError::InvalidCron(format!(
                        "{} range {lo}-{hi} is reversed",
                        self.name
                    )));
                }
                (lo, hi)
            } else {
                let value = self.value(range)?;
                // `5/15` means "from 5 to the end, every 15".
                (value, if step.is_some() { self.max } else { value })
            };

            let step = step.unwrap_or(1);
            let mut v = lo;
            while v <= hi {
                bits |= 1 << v;
                v += step;
            }
        }

        Ok(FieldSet(bits))
    }
}

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronExpr {
    /// Parse a five-field cron expression.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleError::InvalidCron` if the field count is wrong or any
    /// field is malformed.
    pub fn parse(expr: &str) -> Result<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields.as_slice() else {
            return Err(ScheduleError::InvalidCron(format!(
                "expected 5 fields, got {}",
                fields.len()
            )));
        };

        let mut days_of_week = DAY_OF_WEEK.parse(dow)?;
        if days_of_week.contains(7) {
            days_of_week = FieldSet((days_of_week.0 & !(1 << 7)) | 1);
        }

        Ok(Self {
            source: fields.join(" "),
            minutes: MINUTE.parse(minute)?,
            hours: HOUR.parse(hour)?,
            days_of_month: DAY_OF_MONTH.parse(dom)?,
            months: MONTH.parse(month)?,
            days_of_week,
            dom_restricted: !dom.starts_with('*'),
            dow_restricted: !dow.starts_with('*'),
        })
    }

    /// The normalized source expression.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        if !self.months.contains(date.month()) {
            return false;
        }

        let dom = self.days_of_month.contains(date.day());
        let dow = self
            .days_of_week
            .contains(date.weekday().num_days_from_sunday());

        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }

    /// The first matching minute strictly after `after`.
    ///
    /// Returns `None` if nothing matches within the next five years.
    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.with_second(0)?.with_nanosecond(0)? + chrono::Duration::minutes(1);
        let start_date = start.date_naive();

        for offset in 0..SEARCH_DAYS {
            let date = start_date.checked_add_days(Days::new(offset))?;
            if !self.day_matches(date) {
                continue;
            }

            let first_day = offset == 0;
            for hour in self.hours.values() {
                if first_day && hour < start.hour() {
                    continue;
                }
                for minute in self.minutes.values() {
                    if first_day && hour == start.hour() && minute < start.minute() {
                        continue;
                    }
                    let naive = date.and_hms_opt(hour, minute, 0)?;
                    return Some(Utc.from_utc_datetime(&naive));
                }
            }
        }

        None
    }

    /// The first matching minute at or after `at`.
    ///
    /// `at` itself qualifies only when it falls exactly on a matching minute.
    #[must_use]
    pub fn next_at_or_after(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.next_after(at - chrono::Duration::minutes(1)) {
            Some(candidate) if candidate >= at => Some(candidate),
            _ => self.next_after(at),
        }
    }
}

impl FromStr for CronExpr {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
