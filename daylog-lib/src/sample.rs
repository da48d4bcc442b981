use chrono::NaiveDateTime;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Serialize, Serializer};
use std::fmt;
use strum_macros::Display;

use crate::constants::ROW_TIMESTAMP_FORMAT;

/// Analog input channels wired on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Channel {
    /// Shunt output, already in amperes
    #[strum(to_string = "AIN0")]
    Current = 0,
    /// Divider output, scaled by the calibration factor
    #[strum(to_string = "AIN1")]
    Voltage = 1,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Current, Channel::Voltage];

    /// Register name understood by the LJM driver
    pub fn register_name(&self) -> String {
        self.to_string()
    }
}

/// One raw read from one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub channel: Channel,
    pub raw_value: f64,
    pub timestamp: NaiveDateTime,
}

/// Round to three decimals, the resolution everything is stored at.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Scale a raw AIN1 value to volts.
pub fn calibrate_voltage(raw: f64, factor: f64) -> f64 {
    round3(raw * factor)
}

/// Both channels converted to physical units at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub timestamp: NaiveDateTime,
    pub current_a: f64,
    pub voltage_v: f64,
}

impl Reading {
    pub fn from_samples(samples: &[Sample; 2], calibration_factor: f64) -> Self {
        let mut current_a = 0.0;
        let mut voltage_v = 0.0;
        for sample in samples {
            match sample.channel {
                Channel::Current => current_a = round3(sample.raw_value),
                Channel::Voltage => voltage_v = calibrate_voltage(sample.raw_value, calibration_factor),
            }
        }
        Self {
            timestamp: samples[0].timestamp,
            current_a,
            voltage_v,
        }
    }
}

/// The persisted unit: one row per completed batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AggregatedRecord {
    #[serde(rename = "Timestamp", serialize_with = "serialize_timestamp")]
    pub timestamp: NaiveDateTime,
    #[serde(rename = "Current (Amperes)")]
    pub current_amperes: f64,
    #[serde(rename = "Voltage (Volts)")]
    pub voltage_volts: f64,
}

impl AggregatedRecord {
    pub fn timestamp_string(&self) -> String {
        self.timestamp.format(ROW_TIMESTAMP_FORMAT).to_string()
    }
}

impl From<Reading> for AggregatedRecord {
    fn from(reading: Reading) -> Self {
        Self {
            timestamp: reading.timestamp,
            current_amperes: reading.current_a,
            voltage_volts: reading.voltage_v,
        }
    }
}

impl fmt::Display for AggregatedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:.3} A, {:.3} V",
            self.timestamp.format("%H:%M:%S"),
            self.current_amperes,
            self.voltage_volts
        )
    }
}

fn serialize_timestamp<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&ts.format(ROW_TIMESTAMP_FORMAT))
}

/// How the reads of one batch collapse into a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum Aggregation {
    /// Keep the final read of the batch
    #[default]
    #[strum(to_string = "last")]
    Last,
    #[strum(to_string = "mean")]
    Mean,
    #[strum(to_string = "min")]
    Min,
    #[strum(to_string = "max")]
    Max,
}

impl Aggregation {
    /// Collapse a batch. Returns `None` for an empty batch.
    pub fn apply(&self, readings: &[Reading]) -> Option<AggregatedRecord> {
        let last = readings.last()?;
        let (current_amperes, voltage_volts) = match self {
            Aggregation::Last => (last.current_a, last.voltage_v),
            Aggregation::Mean => {
                let n = readings.len() as f64;
                (
                    round3(readings.iter().map(|r| r.current_a).sum::<f64>() / n),
                    round3(readings.iter().map(|r| r.voltage_v).sum::<f64>() / n),
                )
            }
            Aggregation::Min => (
                readings.iter().map(|r| r.current_a).fold(f64::INFINITY, f64::min),
                readings.iter().map(|r| r.voltage_v).fold(f64::INFINITY, f64::min),
            ),
            Aggregation::Max => (
                readings.iter().map(|r| r.current_a).fold(f64::NEG_INFINITY, f64::max),
                readings.iter().map(|r| r.voltage_v).fold(f64::NEG_INFINITY, f64::max),
            ),
        };
        Some(AggregatedRecord {
            timestamp: last.timestamp,
            current_amperes,
            voltage_volts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(sec: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(12, 0, sec).unwrap()
    }

    fn reading(sec: u32, current_a: f64, voltage_v: f64) -> Reading {
        Reading {
            timestamp: at(sec),
            current_a,
            voltage_v,
        }
    }

    #[test]
    fn test_channel_names() {
        assert_eq!(Channel::Current.register_name(), "AIN0");
        assert_eq!(Channel::Voltage.register_name(), "AIN1");
        assert_eq!(Channel::try_from(1u8).unwrap(), Channel::Voltage);
        assert!(Channel::try_from(2u8).is_err());
    }

    #[test]
    fn test_reading_from_samples() {
        let samples = [
            Sample {
                channel: Channel::Current,
                raw_value: 1.23449,
                timestamp: at(0),
            },
            Sample {
                channel: Channel::Voltage,
                raw_value: 1.5,
                timestamp: at(0),
            },
        ];
        let reading = Reading::from_samples(&samples, 18.22);
        assert_eq!(reading.current_a, 1.234);
        assert_eq!(reading.voltage_v, 27.33);
    }

    #[test]
    fn test_aggregation_last_keeps_final_read() {
        let batch = [reading(0, 1.0, 20.0), reading(5, 2.0, 22.0), reading(10, 1.5, 21.0)];
        let record = Aggregation::Last.apply(&batch).unwrap();
        assert_eq!(record.timestamp, at(10));
        assert_eq!(record.current_amperes, 1.5);
        assert_eq!(record.voltage_volts, 21.0);
    }

    #[test]
    fn test_aggregation_alternatives() {
        let batch = [reading(0, 1.0, 20.0), reading(5, 2.0, 22.0), reading(10, 1.5, 21.0)];
        let mean = Aggregation::Mean.apply(&batch).unwrap();
        assert_eq!(mean.current_amperes, 1.5);
        assert_eq!(mean.voltage_volts, 21.0);
        let min = Aggregation::Min.apply(&batch).unwrap();
        assert_eq!((min.current_amperes, min.voltage_volts), (1.0, 20.0));
        let max = Aggregation::Max.apply(&batch).unwrap();
        assert_eq!((max.current_amperes, max.voltage_volts), (2.0, 22.0));
        assert_eq!(max.timestamp, at(10));
    }

    #[test]
    fn test_aggregation_empty_batch() {
        assert!(Aggregation::Last.apply(&[]).is_none());
    }

    #[test]
    fn test_record_display() {
        let record = AggregatedRecord::from(reading(7, 1.234, 27.33));
        assert_eq!(record.to_string(), "12:00:07: 1.234 A, 27.330 V");
        assert_eq!(record.timestamp_string(), "2024-06-01 12:00:07.000000");
    }
}
