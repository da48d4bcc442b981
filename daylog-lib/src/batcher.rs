use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::AcquisitionConfig;
use crate::device::DeviceReader;
use crate::display::{AxisRanges, ChartSink, DisplayPoint, SlidingDisplayWindow};
use crate::error::AcqError;
use crate::sample::{AggregatedRecord, Aggregation, Reading};

/// Turns `batch_size` spaced reads into one record, feeding the live view
/// after every read.
#[derive(Debug, Clone)]
pub struct SampleBatcher {
    batch_size: usize,
    read_interval: Duration,
    calibration_factor: f64,
    aggregation: Aggregation,
    ranges: AxisRanges,
    window: SlidingDisplayWindow,
}

impl SampleBatcher {
    pub fn new(
        batch_size: usize,
        read_interval: Duration,
        calibration_factor: f64,
        display_capacity: usize,
    ) -> Self {
        Self {
            batch_size,
            read_interval,
            calibration_factor,
            aggregation: Aggregation::default(),
            ranges: AxisRanges::default(),
            window: SlidingDisplayWindow::new(display_capacity),
        }
    }

    pub fn from_config(config: &AcquisitionConfig) -> Self {
        Self::new(
            config.batch_size,
            config.read_interval,
            config.calibration_factor,
            config.display_capacity,
        )
        .with_aggregation(config.aggregation)
        .with_ranges(config.axis_ranges)
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn with_ranges(mut self, ranges: AxisRanges) -> Self {
        self.ranges = ranges;
        self
    }

    pub fn window(&self) -> &SlidingDisplayWindow {
        &self.window
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Perform one batch.
    ///
    /// Any failed read discards the whole batch: the error is returned and
    /// nothing is aggregated. Points already shown on the live view stay
    /// there. Cancellation during a wait returns [`AcqError::Cancelled`].
    pub async fn collect_batch(
        &mut self,
        device: &mut dyn DeviceReader,
        chart: &mut dyn ChartSink,
        clock: &dyn Clock,
        cancel: &CancellationToken,
    ) -> Result<AggregatedRecord, AcqError> {
        let mut readings = Vec::with_capacity(self.batch_size);

        for i in 0..self.batch_size {
            if cancel.is_cancelled() {
                return Err(AcqError::Cancelled);
            }
            let samples = device.read_all(clock.now())?;
            let reading = Reading::from_samples(&samples, self.calibration_factor);
            debug!(
                read = i + 1,
                of = self.batch_size,
                current = reading.current_a,
                voltage = reading.voltage_v,
                "Sample"
            );

            self.window.push(DisplayPoint::from(reading));
            if let Err(e) = chart.refresh(&self.window, &self.ranges) {
                warn!("Live view refresh failed: {e}");
            }
            readings.push(reading);

            tokio::select! {
                _ = cancel.cancelled() => return Err(AcqError::Cancelled),
                _ = tokio::time::sleep(self.read_interval) => {}
            }
        }

        self.aggregation
            .apply(&readings)
            .ok_or_else(|| AcqError::Configuration("batch size must be at least 1".to_string()))
    }
}
