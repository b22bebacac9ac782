//! Property tests for trigger parsing and cron evaluation.

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use proptest::prelude::*;

use cadence::{CronExpression, Trigger};

fn arb_instant() -> impl Strategy<Value = DateTime<Utc>> {
    // 2020-01-01 through ~2030, with sub-second noise so inputs rarely land
    // on a whole second.
    (1_577_836_800i64..1_893_456_000, 0u32..1_000_000_000)
        .prop_map(|(secs, nanos)| Utc.timestamp_opt(secs, nanos).unwrap())
}

/// Brute-force oracle for expressions restricted only in the seconds field.
fn next_matching_second(after: DateTime<Utc>, second: u32) -> DateTime<Utc> {
    let mut candidate = after
        .with_nanosecond(0)
        .unwrap()
        .checked_add_signed(Duration::seconds(1))
        .unwrap();
    while candidate.second() != second {
        candidate += Duration::seconds(1);
    }
    candidate
}

proptest! {
    #[test]
    fn seconds_restricted_cron_matches_brute_force(
        second in 0u32..60,
        after in arb_instant(),
    ) {
        let expr = CronExpression::parse(&format!("{second} * * * * *")).unwrap();
        let next = expr.next_after(after).unwrap();
        prop_assert_eq!(next, next_matching_second(after, second));
    }

    #[test]
    fn cron_successors_strictly_increase(
        expr in prop::sample::select(vec![
            "0 * * * * *",
            "*/7 * * * * *",
            "30 15 * * * *",
            "0 0 10 * * MON-FRI",
            "0 15 10 15 * ?",
            "0 0 0 29 2 *",
        ]),
        after in arb_instant(),
    ) {
        let expr = CronExpression::parse(expr).unwrap();
        let mut cursor = after;
        for _ in 0..5 {
            let next = expr.next_after(cursor).unwrap();
            prop_assert!(next > cursor);
            prop_assert_eq!(next.nanosecond(), 0);
            cursor = next;
        }
    }

    #[test]
    fn cron_display_parse_round_trip(
        source in prop::sample::select(vec![
            "*/5 0-29 1,13 * * *",
            "0 15 10 15 * ?",
            "0 0 12 ? JAN,JUL SUN",
            "10/15 * * 1-7 * *",
        ]),
        after in arb_instant(),
    ) {
        let expr = CronExpression::parse(source).unwrap();
        let reparsed = CronExpression::parse(&expr.to_string()).unwrap();
        prop_assert_eq!(
            expr.next_after(after).unwrap(),
            reparsed.next_after(after).unwrap()
        );
    }

    #[test]
    fn interval_spec_round_trip(
        kind in prop::sample::select(vec!["fixedRate", "fixedDelay"]),
        millis in 1u64..86_400_000,
    ) {
        let trigger = Trigger::parse(&format!("{kind}:{millis}")).unwrap();
        let reparsed = Trigger::parse(&trigger.to_string()).unwrap();
        prop_assert_eq!(trigger, reparsed);
    }

    #[test]
    fn fixed_rate_next_is_anchored_or_clamped(
        millis in 1i64..3_600_000,
        last_start in arb_instant(),
        lateness in 0i64..7_200_000,
    ) {
        let trigger = Trigger::fixed_rate(std::time::Duration::from_millis(millis as u64));
        let now = last_start + Duration::milliseconds(lateness);
        let next = trigger.next_fire_time(last_start, now, now).unwrap();

        let anchored = last_start + Duration::milliseconds(millis);
        if anchored >= now {
            // On schedule: the successor keeps the fixed cadence.
            prop_assert_eq!(next, anchored);
        } else {
            // Behind schedule: one immediate catch-up, never a burst.
            prop_assert_eq!(next, now);
        }
        prop_assert!(next >= now);
    }

    #[test]
    fn fixed_delay_next_measures_from_completion(
        millis in 1i64..3_600_000,
        last_start in arb_instant(),
        run_length in 0i64..7_200_000,
    ) {
        let trigger = Trigger::fixed_delay(std::time::Duration::from_millis(millis as u64));
        let completion = last_start + Duration::milliseconds(run_length);
        let next = trigger.next_fire_time(last_start, completion, completion).unwrap();
        prop_assert_eq!(next, completion + Duration::milliseconds(millis));
    }
}
