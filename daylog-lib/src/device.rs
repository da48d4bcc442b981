use chrono::{NaiveDateTime, Timelike};
use std::fmt;
use tracing::info;

use crate::constants::LJM_ANY;
use crate::error::AcqError;
use crate::sample::{Channel, Sample};

/// Which device the driver should open. `"ANY"` matches the first one found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSelector {
    pub device_type: String,
    pub connection_type: String,
    pub identifier: String,
}

impl DeviceSelector {
    pub fn any() -> Self {
        Self {
            device_type: LJM_ANY.to_string(),
            connection_type: LJM_ANY.to_string(),
            identifier: LJM_ANY.to_string(),
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }
}

impl Default for DeviceSelector {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.device_type, self.connection_type, self.identifier)
    }
}

/// An open handle to the measurement device.
pub trait DeviceReader: Send {
    /// Read one analog channel, in the channel's raw unit.
    fn read_channel(&mut self, channel: Channel) -> Result<f64, AcqError>;

    /// Human-readable identification for logs.
    fn describe(&self) -> String;

    /// Release the handle. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), AcqError>;

    /// Read every wired channel, stamping the samples with `at`.
    fn read_all(&mut self, at: NaiveDateTime) -> Result<[Sample; 2], AcqError> {
        let [first, second] = Channel::ALL;
        Ok([
            Sample {
                channel: first,
                raw_value: self.read_channel(first)?,
                timestamp: at,
            },
            Sample {
                channel: second,
                raw_value: self.read_channel(second)?,
                timestamp: at,
            },
        ])
    }
}

/// Opens device handles; one handle per session.
pub trait DeviceOpener: Send + Sync {
    fn open(&self, selector: &DeviceSelector) -> Result<Box<dyn DeviceReader>, AcqError>;
}

/// Stand-in device producing a smooth daylight-shaped curve.
///
/// Current follows a half sine between 06:00 and 20:00 peaking at
/// `peak_current_a`; the AIN1 value is chosen so that the calibrated voltage
/// hovers around 27 V.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    peak_current_a: f64,
    reads: u64,
    closed: bool,
}

impl SimulatedDevice {
    pub fn new(peak_current_a: f64) -> Self {
        Self {
            peak_current_a,
            reads: 0,
            closed: false,
        }
    }

    fn daylight_fraction() -> f64 {
        let now = chrono::Local::now().naive_local();
        let hours = now.hour() as f64 + now.minute() as f64 / 60.0 + now.second() as f64 / 3600.0;
        ((hours - 6.0) / 14.0).clamp(0.0, 1.0)
    }
}

impl DeviceReader for SimulatedDevice {
    fn read_channel(&mut self, channel: Channel) -> Result<f64, AcqError> {
        if self.closed {
            return Err(AcqError::DeviceRead {
                channel,
                reason: "device closed".to_string(),
            });
        }
        self.reads += 1;
        let sun = (Self::daylight_fraction() * std::f64::consts::PI).sin();
        // Small deterministic ripple so the chart is not a flat line
        let ripple = ((self.reads as f64) * 0.7).sin() * 0.01;
        Ok(match channel {
            Channel::Current => (self.peak_current_a * sun + ripple).max(0.0),
            Channel::Voltage => 1.40 + 0.12 * sun + ripple,
        })
    }

    fn describe(&self) -> String {
        format!("simulated device (peak {:.2} A)", self.peak_current_a)
    }

    fn close(&mut self) -> Result<(), AcqError> {
        self.closed = true;
        Ok(())
    }
}

/// Opener handing out [`SimulatedDevice`]s.
#[derive(Debug, Clone)]
pub struct SimulatedOpener {
    pub peak_current_a: f64,
}

impl Default for SimulatedOpener {
    fn default() -> Self {
        Self { peak_current_a: 2.5 }
    }
}

impl DeviceOpener for SimulatedOpener {
    fn open(&self, selector: &DeviceSelector) -> Result<Box<dyn DeviceReader>, AcqError> {
        info!(%selector, "Opening simulated device");
        Ok(Box::new(SimulatedDevice::new(self.peak_current_a)))
    }
}
