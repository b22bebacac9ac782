//! Trigger types and the trigger spec grammar.
//!
//! A trigger computes when a task fires next. The string grammar is:
//! `fixedRate:<ms>`, `fixedDelay:<ms>`, or `cron:<6-field-expression>`.

use std::fmt;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};

use crate::cron::CronExpression;
use crate::error::{ParseError, SchedulerError};

/// When a task fires relative to its previous run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Next fire is the previous *scheduled start* plus the interval,
    /// independent of how long the run took. When the computed time is
    /// already in the past (the run overran the interval), the trigger
    /// fires immediately once and re-anchors there; overdue windows are
    /// never burst-fired.
    FixedRate(Duration),

    /// Next fire is the previous run's *completion* plus the interval, so
    /// it only advances once the callback has returned.
    FixedDelay(Duration),

    /// Next fire is the expression's next occurrence after "now",
    /// independent of prior run duration.
    Cron(CronExpression),
}

impl Trigger {
    /// Fixed-rate trigger with the given interval.
    pub fn fixed_rate(interval: StdDuration) -> Self {
        Self::FixedRate(from_std(interval))
    }

    /// Fixed-delay trigger with the given interval.
    pub fn fixed_delay(interval: StdDuration) -> Self {
        Self::FixedDelay(from_std(interval))
    }

    /// Cron trigger from a six-field expression.
    pub fn cron(expr: &str) -> Result<Self, ParseError> {
        Ok(Self::Cron(CronExpression::parse(expr)?))
    }

    /// Parse a trigger spec string.
    pub fn parse(spec: &str) -> Result<Self, ParseError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(ParseError::Empty);
        }
        let (kind, rest) = spec
            .split_once(':')
            .ok_or_else(|| ParseError::UnknownKind(spec.to_string()))?;

        if kind.eq_ignore_ascii_case("fixedRate") {
            Ok(Self::FixedRate(parse_interval(rest)?))
        } else if kind.eq_ignore_ascii_case("fixedDelay") {
            Ok(Self::FixedDelay(parse_interval(rest)?))
        } else if kind.eq_ignore_ascii_case("cron") {
            Self::cron(rest.trim())
        } else {
            Err(ParseError::UnknownKind(kind.to_string()))
        }
    }

    /// The first fire time for a newly registered task.
    ///
    /// Interval triggers fire immediately on registration; cron triggers
    /// fire at the expression's next occurrence. Registration fails here
    /// when a cron expression is unsatisfiable.
    pub fn initial_fire_time(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, SchedulerError> {
        match self {
            Self::FixedRate(_) | Self::FixedDelay(_) => Ok(now),
            Self::Cron(expr) => expr.next_after(now),
        }
    }

    /// The next fire time after a run.
    ///
    /// `last_scheduled_start` is when the previous firing was scheduled to
    /// begin, `last_completion` is when its callback returned.
    pub fn next_fire_time(
        &self,
        last_scheduled_start: DateTime<Utc>,
        last_completion: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, SchedulerError> {
        match self {
            Self::FixedRate(interval) => {
                let next = last_scheduled_start + *interval;
                // Catch-up skip: one immediate fire, re-anchored at "now".
                Ok(if next < now { now } else { next })
            }
            Self::FixedDelay(interval) => Ok(last_completion + *interval),
            Self::Cron(expr) => expr.next_after(now),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FixedRate(i) => write!(f, "fixedRate:{}", i.num_milliseconds()),
            Self::FixedDelay(i) => write!(f, "fixedDelay:{}", i.num_milliseconds()),
            Self::Cron(expr) => write!(f, "cron:{expr}"),
        }
    }
}

impl std::str::FromStr for Trigger {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_interval(text: &str) -> Result<Duration, ParseError> {
    let ms: i64 = text
        .trim()
        .parse()
        .map_err(|_| ParseError::InvalidInterval(text.trim().to_string()))?;
    if ms <= 0 {
        return Err(ParseError::InvalidInterval(text.trim().to_string()));
    }
    Ok(Duration::milliseconds(ms))
}

fn from_std(interval: StdDuration) -> Duration {
    Duration::from_std(interval).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_case::test_case;

    fn utc(h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, mi, s).unwrap()
    }

    #[test]
    fn parses_fixed_rate_spec() {
        let trigger = Trigger::parse("fixedRate:5000").unwrap();
        assert_eq!(trigger, Trigger::FixedRate(Duration::milliseconds(5000)));
    }

    #[test]
    fn parses_fixed_delay_spec() {
        let trigger = Trigger::parse("fixedDelay:250").unwrap();
        assert_eq!(trigger, Trigger::FixedDelay(Duration::milliseconds(250)));
    }

    #[test]
    fn parses_cron_spec() {
        let trigger = Trigger::parse("cron:0 15 10 15 * ?").unwrap();
        assert!(matches!(trigger, Trigger::Cron(_)));
    }

    #[test_case("" => matches ParseError::Empty ; "empty")]
    #[test_case("   " => matches ParseError::Empty ; "blank")]
    #[test_case("fixedRate" => matches ParseError::UnknownKind(_) ; "missing colon")]
    #[test_case("every:5000" => matches ParseError::UnknownKind(_) ; "unknown kind")]
    #[test_case("fixedRate:abc" => matches ParseError::InvalidInterval(_) ; "non numeric")]
    #[test_case("fixedRate:0" => matches ParseError::InvalidInterval(_) ; "zero")]
    #[test_case("fixedDelay:-5" => matches ParseError::InvalidInterval(_) ; "negative")]
    #[test_case("cron:* * *" => matches ParseError::FieldCount(3) ; "short cron")]
    fn rejects_bad_specs(spec: &str) -> ParseError {
        Trigger::parse(spec).unwrap_err()
    }

    #[test]
    fn display_round_trips() {
        for spec in ["fixedRate:5000", "fixedDelay:250", "cron:0 15 10 15 * ?"] {
            let trigger = Trigger::parse(spec).unwrap();
            assert_eq!(trigger.to_string(), spec);
            assert_eq!(Trigger::parse(&trigger.to_string()).unwrap(), trigger);
        }
    }

    #[test]
    fn interval_triggers_fire_immediately_on_registration() {
        let now = utc(12, 0, 0);
        let rate = Trigger::parse("fixedRate:1000").unwrap();
        let delay = Trigger::parse("fixedDelay:1000").unwrap();
        assert_eq!(rate.initial_fire_time(now).unwrap(), now);
        assert_eq!(delay.initial_fire_time(now).unwrap(), now);
    }

    #[test]
    fn fixed_rate_next_is_anchored_to_start() {
        let trigger = Trigger::parse("fixedRate:1000").unwrap();
        let start = utc(12, 0, 0);
        let completion = utc(12, 0, 0) + Duration::milliseconds(300);
        let now = completion;
        let next = trigger.next_fire_time(start, completion, now).unwrap();
        assert_eq!(next, start + Duration::milliseconds(1000));
    }

    #[test]
    fn fixed_rate_overrun_fires_immediately_once() {
        let trigger = Trigger::parse("fixedRate:1000").unwrap();
        let start = utc(12, 0, 0);
        // The run took 2.5 intervals; next computed time is in the past.
        let now = start + Duration::milliseconds(2500);
        let next = trigger.next_fire_time(start, now, now).unwrap();
        assert_eq!(next, now);
    }

    #[test]
    fn fixed_delay_next_is_anchored_to_completion() {
        let trigger = Trigger::parse("fixedDelay:1000").unwrap();
        let start = utc(12, 0, 0);
        let completion = start + Duration::milliseconds(2500);
        let next = trigger.next_fire_time(start, completion, completion).unwrap();
        assert_eq!(next, completion + Duration::milliseconds(1000));
    }

    #[test]
    fn cron_next_ignores_prior_run_duration() {
        let trigger = Trigger::parse("cron:0 * * * * *").unwrap();
        let start = utc(12, 0, 0);
        let now = utc(12, 3, 30);
        let next = trigger.next_fire_time(start, now, now).unwrap();
        assert_eq!(next, utc(12, 4, 0));
    }

    #[test]
    fn unsatisfiable_cron_surfaces_at_registration() {
        let trigger = Trigger::parse("cron:0 0 0 30 2 *").unwrap();
        let err = trigger.initial_fire_time(utc(0, 0, 0)).unwrap_err();
        assert!(matches!(err, SchedulerError::UnsatisfiableSchedule(_)));
    }
}
