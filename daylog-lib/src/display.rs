//! Live display side channel.
//!
//! The batcher pushes every individual reading into a bounded
//! [`SlidingDisplayWindow`] and hands it to a [`ChartSink`]. Sinks are
//! best-effort observers: an error from `refresh` is logged by the caller and
//! never interrupts acquisition.

use chrono::NaiveDateTime;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tracing::debug;

use crate::constants::{CURRENT_AXIS_MIN, VOLTAGE_AXIS_MAX, VOLTAGE_AXIS_MIN};
use crate::error::AcqError;
use crate::sample::Reading;
use crate::session::SessionId;

/// One plotted point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayPoint {
    pub timestamp: NaiveDateTime,
    pub current: f64,
    pub voltage: f64,
}

impl From<Reading> for DisplayPoint {
    fn from(reading: Reading) -> Self {
        Self {
            timestamp: reading.timestamp,
            current: reading.current_a,
            voltage: reading.voltage_v,
        }
    }
}

/// The most recent `capacity` points, oldest first.
#[derive(Debug, Clone)]
pub struct SlidingDisplayWindow {
    points: VecDeque<DisplayPoint>,
    capacity: usize,
}

impl SlidingDisplayWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a point, evicting the oldest once over capacity.
    pub fn push(&mut self, point: DisplayPoint) {
        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &DisplayPoint> {
        self.points.iter()
    }

    pub fn latest(&self) -> Option<&DisplayPoint> {
        self.points.back()
    }

    pub fn snapshot(&self) -> Vec<DisplayPoint> {
        self.points.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}

/// Y-axis bounds; `max: None` lets the renderer follow the data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisRange {
    pub min: f64,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisRanges {
    pub current: AxisRange,
    pub voltage: AxisRange,
}

impl Default for AxisRanges {
    fn default() -> Self {
        Self {
            current: AxisRange {
                min: CURRENT_AXIS_MIN,
                max: None,
            },
            voltage: AxisRange {
                min: VOLTAGE_AXIS_MIN,
                max: Some(VOLTAGE_AXIS_MAX),
            },
        }
    }
}

/// Receives the display window after every read.
pub trait ChartSink: Send {
    /// A session opened; the surface should start empty.
    fn begin(&mut self, _session: &SessionId) {}

    fn refresh(&mut self, window: &SlidingDisplayWindow, ranges: &AxisRanges) -> Result<(), AcqError>;

    /// The session closed; the surface can be torn down.
    fn end(&mut self) {}
}

/// Headless sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullChart;

impl ChartSink for NullChart {
    fn refresh(&mut self, _window: &SlidingDisplayWindow, _ranges: &AxisRanges) -> Result<(), AcqError> {
        Ok(())
    }
}

/// Traces the newest point at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogChart;

impl ChartSink for LogChart {
    fn begin(&mut self, session: &SessionId) {
        debug!(%session, "Live view opened");
    }

    fn refresh(&mut self, window: &SlidingDisplayWindow, _ranges: &AxisRanges) -> Result<(), AcqError> {
        if let Some(point) = window.latest() {
            debug!(
                time = %point.timestamp.format("%H:%M:%S"),
                current = point.current,
                voltage = point.voltage,
                points = window.len(),
                "Live view"
            );
        }
        Ok(())
    }

    fn end(&mut self) {
        debug!("Live view closed");
    }
}

/// Messages sent to an out-of-task renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartEvent {
    SessionStarted(SessionId),
    Frame {
        points: Vec<DisplayPoint>,
        ranges: AxisRanges,
    },
    SessionEnded,
}

/// Forwards frames over a bounded channel without ever waiting.
///
/// When the renderer lags the frame is dropped; the next read produces a
/// fresher one anyway.
#[derive(Debug, Clone)]
pub struct ChannelChart {
    tx: mpsc::Sender<ChartEvent>,
}

impl ChannelChart {
    pub fn new(tx: mpsc::Sender<ChartEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink and the receiving end for the renderer.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<ChartEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx), rx)
    }

    fn send(&self, event: ChartEvent) -> Result<(), AcqError> {
        self.tx
            .try_send(event)
            .map_err(|e| AcqError::Display(format!("chart channel: {e}")))
    }
}

impl ChartSink for ChannelChart {
    fn begin(&mut self, session: &SessionId) {
        if let Err(e) = self.send(ChartEvent::SessionStarted(session.clone())) {
            debug!("Dropping session start for chart: {e}");
        }
    }

    fn refresh(&mut self, window: &SlidingDisplayWindow, ranges: &AxisRanges) -> Result<(), AcqError> {
        self.send(ChartEvent::Frame {
            points: window.snapshot(),
            ranges: *ranges,
        })
    }

    fn end(&mut self) {
        if let Err(e) = self.send(ChartEvent::SessionEnded) {
            debug!("Dropping session end for chart: {e}");
        }
    }
}
