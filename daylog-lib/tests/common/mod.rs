//! Common test utilities: scripted devices, a recording chart, a fixed solar
//! calculator and a clock driven by tokio's paused time.

// Shared across test files; not every item is used in each one
#![allow(dead_code)]

use chrono::{Duration as TimeDelta, NaiveDate, NaiveDateTime};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use daylog_lib::clock::Clock;
pub use daylog_lib::config::{AcquisitionConfig, Backoff, RetryPolicy};
pub use daylog_lib::device::{DeviceOpener, DeviceReader, DeviceSelector};
pub use daylog_lib::display::{AxisRanges, ChartSink, SlidingDisplayWindow};
pub use daylog_lib::error::AcqError;
pub use daylog_lib::sample::Channel;
pub use daylog_lib::session::SessionId;
pub use daylog_lib::solar::{DaylightWindow, Location, SolarCalculator};

pub fn at(date: NaiveDate, h: u32, m: u32, s: u32) -> NaiveDateTime {
    date.and_hms_opt(h, m, s).unwrap()
}

pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

/// Wall clock anchored at `base`, advancing with tokio's (possibly paused) time.
pub struct PausedClock {
    base: NaiveDateTime,
    start: tokio::time::Instant,
}

impl PausedClock {
    /// Must be created inside a runtime.
    pub fn starting_at(base: NaiveDateTime) -> Arc<Self> {
        Arc::new(Self {
            base,
            start: tokio::time::Instant::now(),
        })
    }
}

impl Clock for PausedClock {
    fn now(&self) -> NaiveDateTime {
        let elapsed = TimeDelta::from_std(self.start.elapsed()).unwrap();
        self.base + elapsed
    }
}

/// Solar calculator returning the same hours every day.
pub struct FixedSolar {
    pub sunrise: (u32, u32),
    pub sunset: (u32, u32),
}

impl FixedSolar {
    pub fn eight_to_six() -> Self {
        Self {
            sunrise: (8, 0),
            sunset: (18, 0),
        }
    }

    pub fn eight_to_nine() -> Self {
        Self {
            sunrise: (8, 0),
            sunset: (9, 0),
        }
    }
}

impl SolarCalculator for FixedSolar {
    fn compute(&self, date: NaiveDate, _location: &Location) -> Result<DaylightWindow, AcqError> {
        let next = date.succ_opt().unwrap();
        DaylightWindow::new(
            at(date, self.sunrise.0, self.sunrise.1, 0),
            at(date, self.sunset.0, self.sunset.1, 0),
            at(next, self.sunrise.0, self.sunrise.1, 0),
        )
    }
}

/// Counters and failure plan shared between an opener and its devices.
#[derive(Default)]
pub struct Script {
    /// Opens that fail before the first one succeeds
    pub open_failures: AtomicU32,
    /// 1-based open numbers whose device fails every read
    pub failing_opens: Mutex<HashSet<u32>>,
    /// Global read numbers (0-based) that fail
    pub failing_reads: Mutex<HashSet<usize>>,
    pub opens: AtomicU32,
    pub closes: AtomicU32,
    pub reads: AtomicUsize,
}

impl Script {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

/// Device whose current is `0.1 * (read + 1)` A and whose raw voltage is 1.5.
pub struct ScriptedDevice {
    script: Arc<Script>,
    always_fail: bool,
    closed: bool,
}

impl ScriptedDevice {
    pub fn new(script: Arc<Script>) -> Self {
        Self {
            script,
            always_fail: false,
            closed: false,
        }
    }
}

impl DeviceReader for ScriptedDevice {
    fn read_channel(&mut self, channel: Channel) -> Result<f64, AcqError> {
        if channel == Channel::Voltage {
            return Ok(1.5);
        }
        let n = self.script.reads.fetch_add(1, Ordering::SeqCst);
        if self.closed || self.always_fail || self.script.failing_reads.lock().unwrap().contains(&n) {
            return Err(AcqError::DeviceRead {
                channel,
                reason: format!("scripted failure at read {n}"),
            });
        }
        Ok(0.1 * (n + 1) as f64)
    }

    fn describe(&self) -> String {
        "scripted device".to_string()
    }

    fn close(&mut self) -> Result<(), AcqError> {
        if !self.closed {
            self.closed = true;
            self.script.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

pub struct ScriptedOpener {
    pub script: Arc<Script>,
}

impl DeviceOpener for ScriptedOpener {
    fn open(&self, _selector: &DeviceSelector) -> Result<Box<dyn DeviceReader>, AcqError> {
        let remaining = self.script.open_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.script.open_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AcqError::DeviceUnavailable("scripted open failure".to_string()));
        }
        let number = self.script.opens.fetch_add(1, Ordering::SeqCst) + 1;
        let mut device = ScriptedDevice::new(self.script.clone());
        device.always_fail = self.script.failing_opens.lock().unwrap().contains(&number);
        Ok(Box::new(device))
    }
}

/// What a [`RecordingChart`] saw.
#[derive(Debug, Default)]
pub struct ChartLog {
    pub begins: Vec<String>,
    pub refreshes: usize,
    pub max_points: usize,
    pub ends: usize,
}

/// Chart sink that records calls and can be told to fail every refresh.
pub struct RecordingChart {
    pub log: Arc<Mutex<ChartLog>>,
    pub fail: bool,
}

impl RecordingChart {
    pub fn new() -> (Self, Arc<Mutex<ChartLog>>) {
        let log = Arc::new(Mutex::new(ChartLog::default()));
        (
            Self {
                log: log.clone(),
                fail: false,
            },
            log,
        )
    }

    pub fn failing() -> (Self, Arc<Mutex<ChartLog>>) {
        let (mut chart, log) = Self::new();
        chart.fail = true;
        (chart, log)
    }
}

impl ChartSink for RecordingChart {
    fn begin(&mut self, session: &SessionId) {
        self.log.lock().unwrap().begins.push(session.to_string());
    }

    fn refresh(&mut self, window: &SlidingDisplayWindow, _ranges: &AxisRanges) -> Result<(), AcqError> {
        let mut log = self.log.lock().unwrap();
        log.refreshes += 1;
        log.max_points = log.max_points.max(window.len());
        if self.fail {
            return Err(AcqError::Display("scripted chart failure".to_string()));
        }
        Ok(())
    }

    fn end(&mut self) {
        self.log.lock().unwrap().ends += 1;
    }
}

/// Standard config writing into `dir`, with quick retries.
pub fn test_config(dir: &std::path::Path) -> AcquisitionConfig {
    AcquisitionConfig::standard()
        .unwrap()
        .with_output_dir(dir)
        .with_device_open_retry(RetryPolicy {
            max_attempts: 3,
            backoff: Backoff {
                initial: Duration::from_secs(1),
                max: Duration::from_secs(1),
            },
        })
}

/// Route library logs to the test harness; `RUST_LOG=debug` shows them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
