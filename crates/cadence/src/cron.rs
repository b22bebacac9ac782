//! Six-field cron expression parsing and next-occurrence computation.
//!
//! The accepted grammar per field is `*`, `?`, single values, comma-lists,
//! inclusive ranges (`a-b`), and steps (`*/n`, `a-b/n`, `a/n`). Month and
//! day-of-week fields also accept three-letter names (`JAN`..`DEC`,
//! `SUN`..`SAT`, case-insensitive); Sunday is both `0` and `7`.
//!
//! Day-of-month and day-of-week combine the classic cron way: when BOTH
//! fields are restricted, a day matches if EITHER field matches (OR); when
//! at most one is restricted, the restricted field alone decides. `?` is a
//! synonym for `*`. No `L`/`W`/`#` extensions.
//!
//! All computation is in UTC; there is no timezone or DST handling.

use std::fmt;

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};

use crate::error::{ParseError, SchedulerError};

/// How far past the input instant `next_after` searches before concluding the
/// expression is unsatisfiable. Four years covers every leap-day schedule.
const SEARCH_HORIZON_DAYS: u64 = 4 * 366;

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Allowed values for one cron field, as a bitmask over the field's range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet {
    bits: u64,
}

impl FieldSet {
    fn contains(&self, value: u32) -> bool {
        value < 64 && self.bits & (1 << value) != 0
    }
}

/// Static description of one cron field: its name, bounds, and value names.
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    /// Offset that maps the first name onto a numeric value (1 for months).
    name_base: u32,
}

const SECONDS: FieldSpec = FieldSpec {
    name: "seconds",
    min: 0,
    max: 59,
    names: &[],
    name_base: 0,
};
const MINUTES: FieldSpec = FieldSpec {
    name: "minutes",
    min: 0,
    max: 59,
    names: &[],
    name_base: 0,
};
const HOURS: FieldSpec = FieldSpec {
    name: "hours",
    min: 0,
    max: 23,
    names: &[],
    name_base: 0,
};
const DAYS_OF_MONTH: FieldSpec = FieldSpec {
    name: "day-of-month",
    min: 1,
    max: 31,
    names: &[],
    name_base: 0,
};
const MONTHS: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: &MONTH_NAMES,
    name_base: 1,
};
const DAYS_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: &DAY_NAMES,
    name_base: 0,
};

/// A parsed six-field cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpression {
    seconds: FieldSet,
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
    /// Whether day-of-month was anything other than `*`/`?`.
    dom_restricted: bool,
    /// Whether day-of-week was anything other than `*`/`?`.
    dow_restricted: bool,
    source: String,
}

impl CronExpression {
    /// Parse a six-field expression (`sec min hour dom month dow`).
    pub fn parse(expr: &str) -> Result<Self, ParseError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.is_empty() {
            return Err(ParseError::Empty);
        }
        if fields.len() != 6 {
            return Err(ParseError::FieldCount(fields.len()));
        }

        let (seconds, _) = parse_field(fields[0], &SECONDS)?;
        let (minutes, _) = parse_field(fields[1], &MINUTES)?;
        let (hours, _) = parse_field(fields[2], &HOURS)?;
        let (days_of_month, dom_restricted) = parse_field(fields[3], &DAYS_OF_MONTH)?;
        let (months, _) = parse_field(fields[4], &MONTHS)?;
        let (mut days_of_week, dow_restricted) = parse_field(fields[5], &DAYS_OF_WEEK)?;

        // Fold Sunday-as-7 onto Sunday-as-0.
        if days_of_week.contains(7) {
            days_of_week.bits |= 1;
            days_of_week.bits &= !(1 << 7);
        }

        Ok(Self {
            seconds,
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            dom_restricted,
            dow_restricted,
            source: fields.join(" "),
        })
    }

    /// The first instant strictly after `after` that satisfies the
    /// expression, at whole-second granularity.
    ///
    /// Fails with [`SchedulerError::UnsatisfiableSchedule`] when no such
    /// instant exists within the search horizon.
    pub fn next_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, SchedulerError> {
        let start = after.naive_utc().with_nanosecond(0).unwrap_or(after.naive_utc());
        let mut t = start + chrono::Duration::seconds(1);
        let horizon = start + chrono::Duration::days(SEARCH_HORIZON_DAYS as i64);

        loop {
            if t > horizon {
                return Err(SchedulerError::UnsatisfiableSchedule(self.source.clone()));
            }

            if !self.months.contains(t.month()) {
                t = self.first_of_next_month(t)?;
                continue;
            }
            if !self.day_matches(t.date()) {
                t = self.start_of_next_day(t)?;
                continue;
            }
            if !self.hours.contains(t.hour()) {
                t = truncate_to_hour(t) + chrono::Duration::hours(1);
                continue;
            }
            if !self.minutes.contains(t.minute()) {
                t = truncate_to_minute(t) + chrono::Duration::minutes(1);
                continue;
            }
            if !self.seconds.contains(t.second()) {
                t += chrono::Duration::seconds(1);
                continue;
            }

            return Ok(Utc.from_utc_datetime(&t));
        }
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.days_of_month.contains(date.day());
        let dow = self
            .days_of_week
            .contains(date.weekday().num_days_from_sunday());
        // Classic cron: OR when both fields are restricted.
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }

    fn first_of_next_month(&self, t: NaiveDateTime) -> Result<NaiveDateTime, SchedulerError> {
        let (year, month) = if t.month() == 12 {
            (t.year() + 1, 1)
        } else {
            (t.year(), t.month() + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| SchedulerError::UnsatisfiableSchedule(self.source.clone()))
    }

    fn start_of_next_day(&self, t: NaiveDateTime) -> Result<NaiveDateTime, SchedulerError> {
        t.date()
            .checked_add_days(Days::new(1))
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| SchedulerError::UnsatisfiableSchedule(self.source.clone()))
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for CronExpression {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn truncate_to_hour(t: NaiveDateTime) -> NaiveDateTime {
    t.with_minute(0).and_then(|t| t.with_second(0)).unwrap_or(t)
}

fn truncate_to_minute(t: NaiveDateTime) -> NaiveDateTime {
    t.with_second(0).unwrap_or(t)
}

/// Parse one field into its allowed-value set. The second element is whether
/// the field was restricted (anything other than `*` or `?`).
fn parse_field(text: &str, spec: &FieldSpec) -> Result<(FieldSet, bool), ParseError> {
    if text == "*" || text == "?" {
        return Ok((full_set(spec), false));
    }

    let mut bits = 0u64;
    for part in text.split(',') {
        if part.is_empty() {
            return Err(invalid(spec, text, "empty list element"));
        }
        bits |= parse_part(part, spec, text)?;
    }
    Ok((FieldSet { bits }, true))
}

fn full_set(spec: &FieldSpec) -> FieldSet {
    let mut bits = 0u64;
    for v in spec.min..=spec.max {
        bits |= 1 << v;
    }
    FieldSet { bits }
}

/// Parse a single comma-separated element: `v`, `a-b`, `*/n`, `a/n`, `a-b/n`.
fn parse_part(part: &str, spec: &FieldSpec, whole: &str) -> Result<u64, ParseError> {
    let (range, step) = match part.split_once('/') {
        Some((range, step_text)) => {
            let step: u32 = step_text
                .parse()
                .map_err(|_| invalid(spec, whole, format!("bad step {step_text:?}")))?;
            if step == 0 {
                return Err(invalid(spec, whole, "step must be at least 1"));
            }
            (range, step)
        }
        None => (part, 1),
    };

    let (lo, hi) = if range == "*" || range == "?" {
        (spec.min, spec.max)
    } else if let Some((a, b)) = range.split_once('-') {
        (parse_value(a, spec, whole)?, parse_value(b, spec, whole)?)
    } else {
        let v = parse_value(range, spec, whole)?;
        // `a/n` means "from a to max, stepping by n" (Vixie convention).
        if part.contains('/') { (v, spec.max) } else { (v, v) }
    };

    if lo > hi {
        return Err(invalid(spec, whole, format!("inverted range {lo}-{hi}")));
    }

    let mut bits = 0u64;
    let mut v = lo;
    while v <= hi {
        bits |= 1 << v;
        v += step;
    }
    Ok(bits)
}

fn parse_value(text: &str, spec: &FieldSpec, whole: &str) -> Result<u32, ParseError> {
    let value = if let Ok(n) = text.parse::<u32>() {
        n
    } else if let Some(pos) = spec
        .names
        .iter()
        .position(|n| n.eq_ignore_ascii_case(text))
    {
        pos as u32 + spec.name_base
    } else {
        return Err(invalid(spec, whole, format!("unrecognized value {text:?}")));
    };

    if value < spec.min || value > spec.max {
        return Err(invalid(
            spec,
            whole,
            format!("value {value} out of range {}-{}", spec.min, spec.max),
        ));
    }
    Ok(value)
}

fn invalid(spec: &FieldSpec, text: &str, reason: impl Into<String>) -> ParseError {
    ParseError::InvalidField {
        field: spec.name,
        text: text.to_string(),
        reason: reason.into(),
    }
}
