use chrono::NaiveDateTime;
use std::fmt;
use std::path::{Path, PathBuf};
use strum_macros::Display;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::batcher::SampleBatcher;
use crate::clock::Clock;
use crate::config::AcquisitionConfig;
use crate::constants::SESSION_TIMESTAMP_FORMAT;
use crate::device::DeviceReader;
use crate::display::ChartSink;
use crate::error::AcqError;
use crate::export::{export_path, write_export};
use crate::sample::AggregatedRecord;
use crate::store::{SessionStore, db_path};

/// Name shared by a session's table, database file and export file:
/// `<prefix>_<YYYY_MM_DD__HH_MM_SS>`, with `_2`, `_3`, ... appended when a
/// session started in the same second already left files behind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn from_start(prefix: &str, started_at: NaiveDateTime) -> Self {
        Self(format!("{}_{}", prefix, started_at.format(SESSION_TIMESTAMP_FORMAT)))
    }

    /// First name for a session started at `started_at` whose database and
    /// export do not exist yet in `dir`.
    pub fn unused_in(dir: &Path, prefix: &str, started_at: NaiveDateTime) -> Self {
        let base = Self::from_start(prefix, started_at);
        let mut id = base.clone();
        let mut n = 1u32;
        while db_path(dir, &id).exists() || export_path(dir, &id).exists() {
            n += 1;
            id = Self(format!("{}_{}", base.0, n));
        }
        if n > 1 {
            warn!(session = %id, "Session name {base} already taken");
        }
        id
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionOutcome {
    /// The daylight window closed
    #[strum(to_string = "window closed")]
    WindowClosed,
    /// Too many consecutive failed batches
    #[strum(to_string = "aborted")]
    Aborted,
    /// Shutdown was requested
    #[strum(to_string = "cancelled")]
    Cancelled,
}

/// What a finished session left behind.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub started_at: NaiveDateTime,
    pub records: usize,
    pub failed_batches: u64,
    pub db_path: PathBuf,
    pub export_path: Option<PathBuf>,
    pub outcome: SessionOutcome,
}

/// One ACTIVE period: the open device, the open store, the records kept for
/// export and the batcher with its display window.
pub struct Session {
    id: SessionId,
    started_at: NaiveDateTime,
    device: Box<dyn DeviceReader>,
    store: SessionStore,
    records: Vec<AggregatedRecord>,
    batcher: SampleBatcher,
    failed_batches: u64,
}

impl Session {
    /// Take ownership of an opened device and open the session's store.
    ///
    /// On store failure the device is closed before the error is returned.
    pub fn open(
        config: &AcquisitionConfig,
        started_at: NaiveDateTime,
        mut device: Box<dyn DeviceReader>,
    ) -> Result<Self, AcqError> {
        let id = SessionId::unused_in(&config.output_dir, &config.session_prefix, started_at);
        let store = match SessionStore::open(&config.output_dir, &id) {
            Ok(store) => store,
            Err(e) => {
                if let Err(close_err) = device.close() {
                    warn!("Closing device after store failure: {close_err}");
                }
                return Err(e);
            }
        };
        info!(session = %id, device = %device.describe(), "Data collection in progress");

        Ok(Self {
            id,
            started_at,
            device,
            store,
            records: Vec::new(),
            batcher: SampleBatcher::from_config(config),
            failed_batches: 0,
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn records(&self) -> &[AggregatedRecord] {
        &self.records
    }

    pub fn batcher(&self) -> &SampleBatcher {
        &self.batcher
    }

    /// Run one batch on this session's device.
    pub async fn collect_batch(
        &mut self,
        chart: &mut dyn ChartSink,
        clock: &dyn Clock,
        cancel: &CancellationToken,
    ) -> Result<AggregatedRecord, AcqError> {
        let result = self
            .batcher
            .collect_batch(self.device.as_mut(), chart, clock, cancel)
            .await;
        if matches!(result, Err(AcqError::DeviceRead { .. })) {
            self.failed_batches += 1;
        }
        result
    }

    /// Persist a record, then keep it for the export.
    pub fn record(&mut self, record: AggregatedRecord) -> Result<(), AcqError> {
        self.store.append(&record)?;
        self.records.push(record);
        Ok(())
    }

    /// Close device and store, then write the export.
    ///
    /// Close and export failures are logged; the summary says whether an
    /// export exists.
    pub fn finish(mut self, config: &AcquisitionConfig, outcome: SessionOutcome) -> SessionSummary {
        if let Err(e) = self.device.close() {
            warn!(session = %self.id, "Closing device failed: {e}");
        }
        let db_path = self.store.path().to_path_buf();
        if let Err(e) = self.store.close() {
            error!(session = %self.id, "Closing store failed: {e}");
        }

        let export_path = match write_export(&config.output_dir, &self.id, &self.records) {
            Ok(path) => Some(path),
            Err(e) => {
                error!(session = %self.id, "Export failed, rows remain in {}: {e}", db_path.display());
                None
            }
        };

        info!(
            session = %self.id,
            records = self.records.len(),
            failed_batches = self.failed_batches,
            %outcome,
            "Data collection complete"
        );

        SessionSummary {
            id: self.id,
            started_at: self.started_at,
            records: self.records.len(),
            failed_batches: self.failed_batches,
            db_path,
            export_path,
            outcome,
        }
    }
}
