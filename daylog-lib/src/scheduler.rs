//! The ACTIVE/DORMANT acquisition loop.
//!
//! One cycle per calendar day: compute the daylight window, run sessions
//! while the clock is inside it (margin included on both ends), then compute
//! how long to sleep until the next window opens. `run` repeats cycles in a
//! plain loop until cancelled.

use chrono::{Duration as TimeDelta, NaiveDateTime};
use std::sync::Arc;
use std::time::Duration;
use strum_macros::Display;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::AcquisitionConfig;
use crate::device::{DeviceOpener, DeviceReader};
use crate::display::{ChartSink, NullChart};
use crate::error::AcqError;
use crate::session::{Session, SessionOutcome, SessionSummary};
use crate::solar::{DaylightWindow, SolarCalculator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SchedulerState {
    #[strum(to_string = "ACTIVE")]
    Active,
    #[strum(to_string = "DORMANT")]
    Dormant,
}

impl SchedulerState {
    /// State implied by the clock relative to the day's window.
    pub fn at(now: NaiveDateTime, window: &DaylightWindow, margin: TimeDelta) -> Self {
        if window.contains(now, margin) {
            SchedulerState::Active
        } else {
            SchedulerState::Dormant
        }
    }
}

/// Outcome of one ACTIVE→DORMANT cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub window: DaylightWindow,
    pub sessions: Vec<SessionSummary>,
    /// When the scheduler went DORMANT
    pub ended_at: NaiveDateTime,
    /// When the next window opens
    pub wake_at: NaiveDateTime,
    /// `wake_at - ended_at`, zero if already past
    pub delay: Duration,
    pub cancelled: bool,
}

impl CycleReport {
    pub fn total_records(&self) -> usize {
        self.sessions.iter().map(|s| s.records).sum()
    }
}

pub struct AcquisitionScheduler {
    config: AcquisitionConfig,
    opener: Box<dyn DeviceOpener>,
    solar: Box<dyn SolarCalculator>,
    clock: Arc<dyn Clock>,
    chart: Box<dyn ChartSink>,
    cancel: CancellationToken,
    state: SchedulerState,
}

impl AcquisitionScheduler {
    pub fn new(
        config: AcquisitionConfig,
        opener: Box<dyn DeviceOpener>,
        solar: Box<dyn SolarCalculator>,
    ) -> Result<Self, AcqError> {
        config.validate()?;
        Ok(Self {
            config,
            opener,
            solar,
            clock: Arc::new(SystemClock),
            chart: Box::new(NullChart),
            cancel: CancellationToken::new(),
            state: SchedulerState::Dormant,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_chart(mut self, chart: Box<dyn ChartSink>) -> Self {
        self.chart = chart;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Token that stops the scheduler at its next suspension point.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run forever: one cycle per day, sleeping between windows.
    ///
    /// Returns `Ok(())` once cancelled; fatal errors (device unavailable after
    /// retries, storage failure, bad configuration) are returned as-is.
    pub async fn run(&mut self) -> Result<(), AcqError> {
        loop {
            let report = self.run_cycle().await?;
            if report.cancelled {
                break;
            }
            info!(
                wake_at = %report.wake_at,
                delay_secs = report.delay.as_secs(),
                "Data collection paused until {}",
                report.wake_at.format("%Y-%m-%d %H:%M:%S")
            );
            if !pause(&self.cancel, report.delay).await {
                break;
            }
        }
        info!("Scheduler stopped");
        Ok(())
    }

    /// Run one cycle: sessions while the window is open, then report the
    /// dormant delay without sleeping it.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, AcqError> {
        let margin = self.config.margin;
        let started = self.clock.now();
        let window = self.solar.compute(started.date(), &self.config.location)?;
        info!(%window, "Daylight window for {}", started.date());

        self.state = SchedulerState::at(started, &window, margin);
        info!(state = %self.state, "Scheduler state at {}", started.format("%H:%M:%S"));

        let mut sessions = Vec::new();
        let mut cancelled = false;
        while self.state == SchedulerState::Active {
            let summary = match self.run_session(&window).await {
                Ok(summary) => summary,
                Err(AcqError::Cancelled) => {
                    info!("Cancelled before a session could start");
                    cancelled = true;
                    break;
                }
                Err(e) => return Err(e),
            };
            let outcome = summary.outcome;
            sessions.push(summary);

            match outcome {
                SessionOutcome::Cancelled => {
                    cancelled = true;
                    break;
                }
                SessionOutcome::WindowClosed => break,
                SessionOutcome::Aborted => {
                    let backoff = self.config.failure_backoff.max;
                    warn!(
                        backoff_secs = backoff.as_secs(),
                        "Session aborted, restarting after backoff"
                    );
                    if !pause(&self.cancel, backoff).await {
                        cancelled = true;
                        break;
                    }
                    if !window.contains(self.clock.now(), margin) {
                        break;
                    }
                }
            }
        }

        self.state = SchedulerState::Dormant;
        let ended_at = self.clock.now();
        let wake_at = window.next_wake(ended_at, margin);
        let delay = (wake_at - ended_at).to_std().unwrap_or(Duration::ZERO);
        info!(state = %self.state, "Scheduler state at {}", ended_at.format("%H:%M:%S"));

        Ok(CycleReport {
            window,
            sessions,
            ended_at,
            wake_at,
            delay,
            cancelled,
        })
    }

    /// Open a session, collect batches until the window closes, tear down.
    async fn run_session(&mut self, window: &DaylightWindow) -> Result<SessionSummary, AcqError> {
        let margin = self.config.margin;
        let device = self.open_device().await?;
        let mut session = Session::open(&self.config, self.clock.now(), device)?;
        self.chart.begin(session.id());

        let mut consecutive_failures = 0u32;
        let mut outcome = SessionOutcome::WindowClosed;
        let mut fatal = None;

        while window.contains(self.clock.now(), margin) {
            let batch = session
                .collect_batch(self.chart.as_mut(), self.clock.as_ref(), &self.cancel)
                .await;
            match batch {
                Ok(record) => {
                    consecutive_failures = 0;
                    if let Err(e) = session.record(record) {
                        error!(session = %session.id(), "Storing record failed: {e}");
                        fatal = Some(e);
                        break;
                    }
                    debug!(%record, "Record stored");
                }
                Err(AcqError::Cancelled) => {
                    info!("Cancellation requested, ending session");
                    outcome = SessionOutcome::Cancelled;
                    break;
                }
                Err(e) if e.is_transient() => {
                    consecutive_failures += 1;
                    warn!(
                        failures = consecutive_failures,
                        max = self.config.max_consecutive_failures,
                        "An error occurred, batch discarded: {e}"
                    );
                    if consecutive_failures >= self.config.max_consecutive_failures {
                        error!(
                            "{}",
                            AcqError::SessionAborted {
                                consecutive_failures
                            }
                        );
                        outcome = SessionOutcome::Aborted;
                        break;
                    }
                    let backoff = self.config.failure_backoff.delay(consecutive_failures - 1);
                    if !pause(&self.cancel, backoff).await {
                        outcome = SessionOutcome::Cancelled;
                        break;
                    }
                }
                Err(e) => {
                    fatal = Some(e);
                    break;
                }
            }
        }

        self.chart.end();
        let summary = session.finish(&self.config, outcome);
        match fatal {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// Open the device, retrying with backoff.
    async fn open_device(&mut self) -> Result<Box<dyn DeviceReader>, AcqError> {
        let retry = self.config.device_open_retry;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.opener.open(&self.config.device) {
                Ok(device) => return Ok(device),
                Err(e) if attempt < retry.max_attempts => {
                    let backoff = retry.backoff.delay(attempt - 1);
                    warn!(
                        attempt,
                        max_attempts = retry.max_attempts,
                        backoff_secs = backoff.as_secs(),
                        "Opening device failed: {e}"
                    );
                    if !pause(&self.cancel, backoff).await {
                        return Err(AcqError::Cancelled);
                    }
                }
                Err(e) => {
                    error!(attempt, "Giving up on opening the device: {e}");
                    return Err(e);
                }
            }
        }
    }
}

/// Sleep unless cancelled first. Returns `false` on cancellation.
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
