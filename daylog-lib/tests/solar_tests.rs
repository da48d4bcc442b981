//! Sunrise equation checks against known almanac times

use chrono::{Duration, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use daylog_lib::error::AcqError;
use daylog_lib::solar::{Location, NoaaCalculator, SolarCalculator};
use proptest::prelude::*;

fn within(actual: NaiveDateTime, expected: NaiveDateTime, minutes: i64) -> bool {
    (actual - expected).num_minutes().abs() <= minutes
}

fn at(date: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
    date.and_hms_opt(h, m, 0).unwrap()
}

#[test]
fn test_greenwich_equinox() {
    let date = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
    let greenwich = Location::new(51.4769, 0.0).unwrap();
    let window = NoaaCalculator::new(Utc).compute(date, &greenwich).unwrap();

    assert!(within(window.sunrise, at(date, 6, 2), 5), "sunrise {}", window.sunrise);
    assert!(within(window.sunset, at(date, 18, 12), 5), "sunset {}", window.sunset);
    assert_eq!(window.next_sunrise.date(), date.succ_opt().unwrap());
}

#[test]
fn test_observer_site_in_local_wall_clock() {
    let date = NaiveDate::from_ymd_opt(2023, 6, 21).unwrap();
    let site = Location::parse("34.0181", "-5.0078").unwrap();
    let utc_plus_one = FixedOffset::east_opt(3600).unwrap();
    let window = NoaaCalculator::new(utc_plus_one).compute(date, &site).unwrap();

    assert!(within(window.sunrise, at(date, 6, 9), 5), "sunrise {}", window.sunrise);
    assert!(within(window.sunset, at(date, 20, 34), 5), "sunset {}", window.sunset);

    let margin = Duration::minutes(5);
    assert!(window.contains(at(date, 12, 0), margin));
    assert!(!window.contains(at(date, 4, 0), margin));
    assert!(!window.contains(at(date, 22, 0), margin));
}

#[test]
fn test_polar_day_has_no_window() {
    let date = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
    let svalbard = Location::new(78.22, 15.65).unwrap();
    let result = NoaaCalculator::new(Utc).compute(date, &svalbard);
    assert!(matches!(result, Err(AcqError::NoSunEvent { .. })));
}

#[test]
fn test_parse_rejects_garbage() {
    assert!(matches!(
        Location::parse("north", "-5.0"),
        Err(AcqError::Configuration(_))
    ));
    assert!(Location::parse("34.0", "200").is_err());
}

proptest! {
    #[test]
    fn window_is_ordered(
        latitude in -60.0f64..60.0,
        longitude in -180.0f64..180.0,
        offset in 0i64..3650,
    ) {
        let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + Duration::days(offset);
        let location = Location::new(latitude, longitude).unwrap();
        let window = NoaaCalculator::new(Utc).compute(date, &location).unwrap();

        prop_assert!(window.sunrise < window.sunset);
        prop_assert!(window.sunset < window.next_sunrise);
        // Consecutive sunrises are about a day apart
        let gap = (window.next_sunrise - window.sunrise).num_minutes();
        prop_assert!((1430..=1450).contains(&gap), "gap {} min", gap);
    }

    #[test]
    fn next_wake_is_never_in_the_past(
        minute_of_day in 0i64..1440,
        offset in 0i64..365,
    ) {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(offset);
        let site = Location::parse("34.0181", "-5.0078").unwrap();
        let window = NoaaCalculator::new(Utc).compute(date, &site).unwrap();
        let margin = Duration::minutes(5);

        let now = date.and_hms_opt(0, 0, 0).unwrap() + Duration::minutes(minute_of_day);
        let wake = window.next_wake(now, margin);
        if !window.contains(now, margin) {
            prop_assert!(wake > now);
        }
        prop_assert!(wake == window.active_from(margin) || wake == window.next_sunrise - margin);
    }
}
