//! Property tests for conversion and the display window

use chrono::{Duration, NaiveDate};
use daylog_lib::display::{DisplayPoint, SlidingDisplayWindow};
use daylog_lib::sample::{Aggregation, Channel, Reading, Sample, calibrate_voltage, round3};
use proptest::prelude::*;

proptest! {
    #[test]
    fn calibrated_voltage_is_rounded_product(raw in 0.0f64..10.0, factor in 0.5f64..50.0) {
        let volts = calibrate_voltage(raw, factor);
        prop_assert!((volts - raw * factor).abs() <= 0.0005 + 1e-9);
        prop_assert_eq!(round3(volts), volts);
    }

    #[test]
    fn readings_are_three_decimals(current in 0.0f64..20.0, raw_voltage in 0.0f64..3.0) {
        let at = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let samples = [
            Sample { channel: Channel::Current, raw_value: current, timestamp: at },
            Sample { channel: Channel::Voltage, raw_value: raw_voltage, timestamp: at },
        ];
        let reading = Reading::from_samples(&samples, 18.22);
        prop_assert_eq!(reading.current_a, round3(current));
        prop_assert_eq!(reading.voltage_v, calibrate_voltage(raw_voltage, 18.22));

        let record = Aggregation::Last.apply(&[reading]).unwrap();
        prop_assert_eq!(record.current_amperes, reading.current_a);
        prop_assert_eq!(record.timestamp, at);
    }

    #[test]
    fn display_window_keeps_newest(capacity in 1usize..100, pushes in 0usize..300) {
        let base = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(6, 0, 0).unwrap();
        let mut window = SlidingDisplayWindow::new(capacity);
        for i in 0..pushes {
            window.push(DisplayPoint {
                timestamp: base + Duration::seconds(i as i64 * 5),
                current: i as f64,
                voltage: 27.0,
            });
            prop_assert!(window.len() <= capacity);
        }
        prop_assert_eq!(window.len(), pushes.min(capacity));
        if pushes > 0 {
            prop_assert_eq!(window.latest().unwrap().current, (pushes - 1) as f64);
            let oldest = window.iter().next().unwrap().current;
            prop_assert_eq!(oldest, pushes.saturating_sub(capacity) as f64);
        }
    }
}
