use chrono::Duration as TimeDelta;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::*;
use crate::device::DeviceSelector;
use crate::display::AxisRanges;
use crate::error::AcqError;
use crate::sample::Aggregation;
use crate::solar::Location;

/// Exponential backoff: `initial`, doubled per step, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Backoff {
    /// Delay before attempt `step` (0-based).
    pub fn delay(&self, step: u32) -> Duration {
        let factor = 1u32.checked_shl(step.min(16)).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

/// Bounded retry of device opening at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

/// Everything the scheduler needs to run a deployment.
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    pub location: Location,
    pub calibration_factor: f64,
    pub batch_size: usize,
    pub read_interval: Duration,
    pub margin: TimeDelta,
    pub display_capacity: usize,
    pub axis_ranges: AxisRanges,
    pub aggregation: Aggregation,
    pub output_dir: PathBuf,
    pub session_prefix: String,
    pub device: DeviceSelector,
    pub max_consecutive_failures: u32,
    pub failure_backoff: Backoff,
    pub device_open_retry: RetryPolicy,
}

impl AcquisitionConfig {
    /// One record per minute (12 reads, 5 s apart), 80-point live view.
    pub fn standard() -> Result<Self, AcqError> {
        Ok(Self {
            location: Location::parse(OBSERVER_LATITUDE, OBSERVER_LONGITUDE)?,
            calibration_factor: CALIBRATION_FACTOR,
            batch_size: BATCH_SIZE,
            read_interval: Duration::from_secs(READ_INTERVAL_SECS),
            margin: TimeDelta::minutes(WINDOW_MARGIN_MINUTES),
            display_capacity: DISPLAY_POINTS,
            axis_ranges: AxisRanges::default(),
            aggregation: Aggregation::default(),
            output_dir: PathBuf::from("."),
            session_prefix: SESSION_PREFIX.to_string(),
            device: DeviceSelector::any(),
            max_consecutive_failures: MAX_CONSECUTIVE_FAILURES,
            failure_backoff: Backoff {
                initial: Duration::from_secs(READ_INTERVAL_SECS),
                max: Duration::from_secs(MAX_FAILURE_BACKOFF_SECS),
            },
            device_open_retry: RetryPolicy {
                max_attempts: DEVICE_OPEN_ATTEMPTS,
                backoff: Backoff {
                    initial: Duration::from_secs(DEVICE_OPEN_BACKOFF_SECS),
                    max: Duration::from_secs(MAX_DEVICE_OPEN_BACKOFF_SECS),
                },
            },
        })
    }

    /// One record every 30 s (10 reads, 3 s apart), 90-point live view.
    pub fn fast() -> Result<Self, AcqError> {
        Ok(Self::standard()?
            .with_batch(FAST_BATCH_SIZE, Duration::from_secs(FAST_READ_INTERVAL_SECS))
            .with_display_capacity(FAST_DISPLAY_POINTS))
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn with_batch(mut self, batch_size: usize, read_interval: Duration) -> Self {
        self.batch_size = batch_size;
        self.read_interval = read_interval;
        self
    }

    pub fn with_display_capacity(mut self, points: usize) -> Self {
        self.display_capacity = points;
        self
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn with_session_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.session_prefix = prefix.into();
        self
    }

    pub fn with_device(mut self, selector: DeviceSelector) -> Self {
        self.device = selector;
        self
    }

    pub fn with_failure_policy(mut self, max_consecutive_failures: u32, backoff: Backoff) -> Self {
        self.max_consecutive_failures = max_consecutive_failures;
        self.failure_backoff = backoff;
        self
    }

    pub fn with_device_open_retry(mut self, retry: RetryPolicy) -> Self {
        self.device_open_retry = retry;
        self
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), AcqError> {
        Location::new(self.location.latitude, self.location.longitude)?;
        if !self.calibration_factor.is_finite() || self.calibration_factor <= 0.0 {
            return Err(AcqError::Configuration(format!(
                "calibration factor must be positive, got {}",
                self.calibration_factor
            )));
        }
        if self.batch_size == 0 {
            return Err(AcqError::Configuration("batch size must be at least 1".to_string()));
        }
        if self.display_capacity == 0 {
            return Err(AcqError::Configuration(
                "display window must hold at least 1 point".to_string(),
            ));
        }
        if self.margin < TimeDelta::zero() {
            return Err(AcqError::Configuration("window margin must not be negative".to_string()));
        }
        if self.session_prefix.is_empty()
            || !self
                .session_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(AcqError::Configuration(format!(
                "session prefix {:?} must be non-empty ASCII letters, digits or '_'",
                self.session_prefix
            )));
        }
        if self.max_consecutive_failures == 0 {
            return Err(AcqError::Configuration(
                "max consecutive failures must be at least 1".to_string(),
            ));
        }
        let backoff = self.failure_backoff;
        if backoff.max < Duration::from_secs(1) || backoff.initial > backoff.max {
            return Err(AcqError::Configuration(format!(
                "failure backoff must satisfy initial <= max and max >= 1s, got {:?}..{:?}",
                backoff.initial, backoff.max
            )));
        }
        if self.device_open_retry.max_attempts == 0 {
            return Err(AcqError::Configuration(
                "device open attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
