use crate::sample::Channel;
use chrono::NaiveDate;
use std::io;
use thiserror::Error;

/// The primary error type for the `daylog-lib` library.
#[derive(Error, Debug)]
pub enum AcqError {
    #[error("Measurement device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Read of {channel} failed: {reason}")]
    DeviceRead { channel: Channel, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Export error: {0}")]
    Export(#[from] csv::Error),

    #[error("Display error: {0}")]
    Display(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("No {kind} on {date} at this latitude (polar day or night)")]
    NoSunEvent { date: NaiveDate, kind: &'static str },

    #[error("Session aborted after {consecutive_failures} consecutive failed batches")]
    SessionAborted { consecutive_failures: u32 },

    #[error("Operation cancelled")]
    Cancelled,
}

impl AcqError {
    /// Errors that only cost the current batch.
    pub fn is_transient(&self) -> bool {
        matches!(self, AcqError::DeviceRead { .. })
    }
}
