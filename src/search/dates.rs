//! Relative date keywords.
//!
//! Date criteria accept literal dates (`2024-03-01`, `2024-03-01 10:30`,
//! `2024-03-01 10:30:00`), period keywords and signed offsets from now:
//!
//! | Input | Meaning |
//! |-------|---------|
//! | `NOW` | the reference time |
//! | `TODAY` | midnight of the reference day |
//! | `BEGINMONTH` / `BEGINYEAR` | first day of the current month / year |
//! | `LASTMONDAY` / `LASTSUNDAY` | most recent such day strictly before today |
//! | `-7DAY`, `+2WEEK`, `-1MONTH`, ... | offset in MINUTE, HOUR, DAY, WEEK, MONTH or YEAR |

use std::sync::LazyLock;

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, TimeDelta};
use regex::Regex;

static RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([+-]\d+)\s*(MINUTE|HOUR|DAY|WEEK|MONTH|YEAR)S?$").unwrap()
});

const LITERAL_FORMATS: [(&str, DatePrecision); 2] = [
    ("%Y-%m-%d %H:%M:%S", DatePrecision::Second),
    ("%Y-%m-%d %H:%M", DatePrecision::Minute),
];

/// Granularity the caller expressed; equality compares at this granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePrecision {
    Day,
    Minute,
    Second,
}

/// A date criterion value resolved against the reference time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDate {
    pub at: NaiveDateTime,
    pub precision: DatePrecision,
}

impl ResolvedDate {
    fn new(at: NaiveDateTime, precision: DatePrecision) -> Self {
        Self { at, precision }
    }

    fn day(date: NaiveDate) -> Self {
        Self::new(date.and_time(chrono::NaiveTime::MIN), DatePrecision::Day)
    }

    /// `YYYY-MM-DD`
    pub fn date_literal(&self) -> String {
        self.at.format("%Y-%m-%d").to_string()
    }

    /// `YYYY-MM-DD HH:MM`
    pub fn minute_literal(&self) -> String {
        self.at.format("%Y-%m-%d %H:%M").to_string()
    }

    /// `YYYY-MM-DD HH:MM:SS`
    pub fn datetime_literal(&self) -> String {
        self.at.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// Resolve a literal date, keyword or relative offset. `None` when the
/// input is not a date at all.
pub fn resolve_date(input: &str, now: NaiveDateTime) -> Option<ResolvedDate> {
    let input = input.trim();
    let today = now.date();

    match input.to_ascii_uppercase().as_str() {
        "NOW" => return Some(ResolvedDate::new(now, DatePrecision::Second)),
        "TODAY" => return Some(ResolvedDate::day(today)),
        "BEGINMONTH" => return today.with_day(1).map(ResolvedDate::day),
        "BEGINYEAR" => return NaiveDate::from_ymd_opt(today.year(), 1, 1).map(ResolvedDate::day),
        "LASTMONDAY" => {
            let back = match today.weekday().num_days_from_monday() {
                0 => 7,
                n => n,
            };
            return today
                .checked_sub_signed(TimeDelta::try_days(i64::from(back))?)
                .map(ResolvedDate::day);
        }
        "LASTSUNDAY" => {
            let back = match today.weekday().num_days_from_sunday() {
                0 => 7,
                n => n,
            };
            return today
                .checked_sub_signed(TimeDelta::try_days(i64::from(back))?)
                .map(ResolvedDate::day);
        }
        _ => {}
    }

    if let Some(caps) = RELATIVE.captures(input) {
        let amount: i64 = caps[1].parse().ok()?;
        return shift(now, amount, &caps[2].to_ascii_uppercase());
    }

    for (format, precision) in LITERAL_FORMATS {
        if let Ok(at) = NaiveDateTime::parse_from_str(input, format) {
            return Some(ResolvedDate::new(at, precision));
        }
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .map(ResolvedDate::day)
}

fn shift(now: NaiveDateTime, amount: i64, unit: &str) -> Option<ResolvedDate> {
    let (at, precision) = match unit {
        "MINUTE" => (
            now.checked_add_signed(TimeDelta::try_minutes(amount)?)?,
            DatePrecision::Second,
        ),
        "HOUR" => (
            now.checked_add_signed(TimeDelta::try_hours(amount)?)?,
            DatePrecision::Second,
        ),
        "DAY" => (
            now.checked_add_signed(TimeDelta::try_days(amount)?)?,
            DatePrecision::Day,
        ),
        "WEEK" => (
            now.checked_add_signed(TimeDelta::try_weeks(amount)?)?,
            DatePrecision::Day,
        ),
        "MONTH" => (add_months(now, amount)?, DatePrecision::Day),
        "YEAR" => (add_months(now, amount.checked_mul(12)?)?, DatePrecision::Day),
        _ => return None,
    };
    Some(ResolvedDate::new(at, precision))
}

fn add_months(at: NaiveDateTime, months: i64) -> Option<NaiveDateTime> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        at.checked_add_months(magnitude)
    } else {
        at.checked_sub_months(magnitude)
    }
}
