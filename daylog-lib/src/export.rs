use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::AcqError;
use crate::sample::AggregatedRecord;
use crate::session::SessionId;

/// Column headers of the export file.
pub const EXPORT_HEADERS: [&str; 3] = ["Timestamp", "Current (Amperes)", "Voltage (Volts)"];

/// Path of the export artifact for a session.
pub fn export_path(dir: &Path, session: &SessionId) -> PathBuf {
    dir.join(format!("{}.csv", session.as_str()))
}

/// Write the whole session to `<dir>/<session>.csv`.
///
/// The file is created fresh; an existing export is never appended to or
/// overwritten.
pub fn write_export(dir: &Path, session: &SessionId, records: &[AggregatedRecord]) -> Result<PathBuf, AcqError> {
    std::fs::create_dir_all(dir)?;
    let path = export_path(dir, session);
    let file = OpenOptions::new().write(true).create_new(true).open(&path)?;

    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    wtr.write_record(EXPORT_HEADERS)?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;

    info!(path = %path.display(), rows = records.len(), "Session exported");
    Ok(path)
}
