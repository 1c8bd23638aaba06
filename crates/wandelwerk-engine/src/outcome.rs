// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Outcome log: append-only SQLite record of every conversion request.
//
// Schema:
//   outcomes(
//     id              INTEGER PRIMARY KEY AUTOINCREMENT,
//     timestamp       TEXT    NOT NULL,   -- RFC 3339
//     request_id      TEXT    NOT NULL,
//     source          TEXT    NOT NULL,   -- format extension, e.g. "pdf"
//     target          TEXT    NOT NULL,
//     operation       TEXT    NOT NULL,   -- e.g. "convert", "merge"
//     outcome         TEXT    NOT NULL,   -- completed | rejected | failed
//     failure_kind    TEXT,               -- e.g. "timeout"
//     duration_ms     INTEGER NOT NULL,
//     input_sha256    TEXT    NOT NULL,   -- SHA-256 hex over all inputs
//     artifact_bytes  INTEGER
//   )

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};
use wandelwerk_core::error::{FailureKind, WandelwerkError};
use wandelwerk_core::types::{ConversionRequest, Format, InputFile, Operation, RequestId};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS outcomes (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp       TEXT    NOT NULL,
    request_id      TEXT    NOT NULL,
    source          TEXT    NOT NULL,
    target          TEXT    NOT NULL,
    operation       TEXT    NOT NULL,
    outcome         TEXT    NOT NULL,
    failure_kind    TEXT,
    duration_ms     INTEGER NOT NULL,
    input_sha256    TEXT    NOT NULL,
    artifact_bytes  INTEGER
);";

const SELECT_COLUMNS: &str = "SELECT id, timestamp, request_id, source, target, operation, \
     outcome, failure_kind, duration_ms, input_sha256, artifact_bytes FROM outcomes";

/// Convert a `rusqlite::Error` into a `WandelwerkError::Database`.
fn db_err(e: rusqlite::Error) -> WandelwerkError {
    WandelwerkError::Database(e.to_string())
}

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Artifact produced and fully handed to the caller.
    Completed,
    /// Refused during validation; nothing ran.
    Rejected,
    /// A capability failed, timed out, or the download was abandoned.
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What gets recorded for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeRecord {
    pub request_id: RequestId,
    pub source: Format,
    pub target: Format,
    pub operation: Operation,
    pub outcome: Outcome,
    pub failure_kind: Option<FailureKind>,
    pub duration_ms: u64,
    pub input_sha256: String,
    pub artifact_bytes: Option<u64>,
}

/// A stored row, read back for inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeEntry {
    pub id: i64,
    pub timestamp: String,
    pub request_id: String,
    pub source: String,
    pub target: String,
    pub operation: String,
    pub outcome: String,
    pub failure_kind: Option<String>,
    pub duration_ms: i64,
    pub input_sha256: String,
    pub artifact_bytes: Option<i64>,
}

/// Destination for request outcomes, injected into the conversion service.
pub trait OutcomeSink: Send + Sync {
    fn record(&self, record: &OutcomeRecord) -> Result<(), WandelwerkError>;
}

/// SHA-256 over every input in order. Each input is length-prefixed so
/// `["ab", "c"]` and `["a", "bc"]` hash differently.
pub fn inputs_digest(inputs: &[InputFile]) -> String {
    let mut hasher = Sha256::new();
    for input in inputs {
        hasher.update((input.bytes.len() as u64).to_le_bytes());
        hasher.update(&input.bytes);
    }
    hex::encode(hasher.finalize())
}

/// An outcome that will be written once the request's fate is known.
///
/// Created when a request is received so the recorded duration covers
/// validation, execution and delivery.
pub struct PendingOutcome {
    sink: Arc<dyn OutcomeSink>,
    request_id: RequestId,
    source: Format,
    target: Format,
    operation: Operation,
    input_sha256: String,
    started: Instant,
}

impl PendingOutcome {
    pub fn new(sink: Arc<dyn OutcomeSink>, request: &ConversionRequest) -> Self {
        Self {
            sink,
            request_id: request.id,
            source: request.source,
            target: request.target,
            operation: request.operation,
            input_sha256: inputs_digest(&request.inputs),
            started: Instant::now(),
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Write the outcome on the blocking pool and wait for it. A sink
    /// failure is logged and otherwise ignored.
    pub async fn finish(
        self,
        outcome: Outcome,
        failure_kind: Option<FailureKind>,
        artifact_bytes: Option<u64>,
    ) {
        let (sink, record) = self.into_record(outcome, failure_kind, artifact_bytes);
        let request_id = record.request_id;
        if let Err(err) = tokio::task::spawn_blocking(move || write(sink.as_ref(), &record)).await {
            warn!(%request_id, %err, "Outcome writer did not finish");
        }
    }

    /// Write the outcome without waiting, for callers that cannot await
    /// (`Drop`). Inside a runtime the write goes to the blocking pool;
    /// outside one it happens inline.
    pub fn finish_detached(
        self,
        outcome: Outcome,
        failure_kind: Option<FailureKind>,
        artifact_bytes: Option<u64>,
    ) {
        let (sink, record) = self.into_record(outcome, failure_kind, artifact_bytes);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || write(sink.as_ref(), &record));
            }
            Err(_) => write(sink.as_ref(), &record),
        }
    }

    fn into_record(
        self,
        outcome: Outcome,
        failure_kind: Option<FailureKind>,
        artifact_bytes: Option<u64>,
    ) -> (Arc<dyn OutcomeSink>, OutcomeRecord) {
        let record = OutcomeRecord {
            request_id: self.request_id,
            source: self.source,
            target: self.target,
            operation: self.operation,
            outcome,
            failure_kind,
            duration_ms: self.started.elapsed().as_millis() as u64,
            input_sha256: self.input_sha256,
            artifact_bytes,
        };
        (self.sink, record)
    }
}

fn write(sink: &dyn OutcomeSink, record: &OutcomeRecord) {
    if let Err(err) = sink.record(record) {
        warn!(request_id = %record.request_id, %err, "Failed to record outcome");
    }
}

/// Append-only outcome log backed by a SQLite database.
///
/// The connection sits behind a mutex; it is the only state requests share
/// besides the capability registry.
pub struct OutcomeLog {
    conn: Mutex<Connection>,
}

impl OutcomeLog {
    /// Open (or create) the outcome database at `path`.
    ///
    /// The `outcomes` table is created automatically if it does not already
    /// exist. WAL mode is enabled for better concurrent-read performance.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WandelwerkError> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!("outcome log opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory outcome database (useful for tests).
    pub fn open_in_memory() -> Result<Self, WandelwerkError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!("in-memory outcome log opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, WandelwerkError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| WandelwerkError::Database("outcome log lock poisoned".into()))?;
        f(&conn).map_err(db_err)
    }

    /// Retrieve the most recent `limit` entries, ordered newest-first.
    pub fn recent_entries(&self, limit: u32) -> Result<Vec<OutcomeEntry>, WandelwerkError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT ?1"))?;
            let rows = stmt.query_map(params![limit], entry_from_row)?;
            rows.collect()
        })
    }

    /// Retrieve all entries with the given outcome, oldest first.
    pub fn entries_for_outcome(
        &self,
        outcome: Outcome,
    ) -> Result<Vec<OutcomeEntry>, WandelwerkError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("{SELECT_COLUMNS} WHERE outcome = ?1 ORDER BY id ASC"))?;
            let rows = stmt.query_map(params![outcome.as_str()], entry_from_row)?;
            rows.collect()
        })
    }

    /// Return the total number of entries in the outcome log.
    pub fn count(&self) -> Result<u64, WandelwerkError> {
        self.with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM outcomes", [], |row| row.get(0)))
    }
}

impl OutcomeSink for OutcomeLog {
    #[instrument(skip_all, fields(request_id = %record.request_id, outcome = %record.outcome))]
    fn record(&self, record: &OutcomeRecord) -> Result<(), WandelwerkError> {
        let timestamp = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO outcomes (timestamp, request_id, source, target, operation, outcome,
                                       failure_kind, duration_ms, input_sha256, artifact_bytes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    timestamp,
                    record.request_id.to_string(),
                    record.source.extension(),
                    record.target.extension(),
                    record.operation.as_str(),
                    record.outcome.as_str(),
                    record.failure_kind.map(|kind| kind.as_str()),
                    record.duration_ms as i64,
                    record.input_sha256,
                    record.artifact_bytes.map(|bytes| bytes as i64),
                ],
            )
        })?;

        debug!("outcome recorded");
        Ok(())
    }
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutcomeEntry> {
    Ok(OutcomeEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        request_id: row.get(2)?,
        source: row.get(3)?,
        target: row.get(4)?,
        operation: row.get(5)?,
        outcome: row.get(6)?,
        failure_kind: row.get(7)?,
        duration_ms: row.get(8)?,
        input_sha256: row.get(9)?,
        artifact_bytes: row.get(10)?,
    })
}
