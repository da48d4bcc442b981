use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::AcqError;
use crate::sample::AggregatedRecord;
use crate::session::SessionId;

/// A row as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub id: i64,
    pub timestamp: String,
    pub current_amperes: f64,
    pub voltage_volts: f64,
}

/// Path of the SQLite file for a session.
pub fn db_path(dir: &Path, session: &SessionId) -> PathBuf {
    dir.join(format!("{}.db", session.as_str()))
}

/// Append-only SQLite table holding one session's records.
///
/// Every append is its own committed transaction with `synchronous = FULL`,
/// so a row is on disk before `append` returns.
pub struct SessionStore {
    conn: Connection,
    table: String,
    path: PathBuf,
    appended: u64,
}

impl SessionStore {
    /// Create `<dir>/<session>.db` with a table named after the session.
    ///
    /// Fails if that table already exists; a session never writes into
    /// another session's rows.
    pub fn open(dir: &Path, session: &SessionId) -> Result<Self, AcqError> {
        std::fs::create_dir_all(dir)?;
        let path = db_path(dir, session);
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "synchronous", "FULL")?;

        // The table name is the session id, restricted to [A-Za-z0-9_]
        let table = session.as_str().to_string();
        conn.execute_batch(&format!(
            "CREATE TABLE \"{table}\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                current_amperes REAL NOT NULL,
                voltage_volts REAL NOT NULL
            );"
        ))?;
        info!(path = %path.display(), "Session store opened");

        Ok(Self {
            conn,
            table,
            path,
            appended: 0,
        })
    }

    /// Durably write one record; returns its row id.
    pub fn append(&mut self, record: &AggregatedRecord) -> Result<i64, AcqError> {
        self.conn.execute(
            &format!(
                "INSERT INTO \"{}\" (timestamp, current_amperes, voltage_volts) VALUES (?1, ?2, ?3)",
                self.table
            ),
            params![record.timestamp_string(), record.current_amperes, record.voltage_volts],
        )?;
        self.appended += 1;
        let id = self.conn.last_insert_rowid();
        debug!(id, %record, "Row stored");
        Ok(id)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Rows appended through this handle.
    pub fn appended(&self) -> u64 {
        self.appended
    }

    pub fn row_count(&self) -> Result<u64, AcqError> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM \"{}\"", self.table), [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn rows(&self) -> Result<Vec<StoredRow>, AcqError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, timestamp, current_amperes, voltage_volts FROM \"{}\" ORDER BY id",
            self.table
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(StoredRow {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                current_amperes: row.get(2)?,
                voltage_volts: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn close(self) -> Result<(), AcqError> {
        let path = self.path;
        self.conn.close().map_err(|(_, e)| AcqError::Storage(e))?;
        info!(path = %path.display(), rows = self.appended, "Session store closed");
        Ok(())
    }
}
