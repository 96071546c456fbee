// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SQLite journal for pending print jobs.
//
// Every mutation of the in-memory pending store is mirrored here so queued
// jobs survive a process restart.  Reads happen once, when the pool
// initializes.  After that a single `JournalWriter` on the blocking pool
// applies mutations in the order the store made them, so no SQLite call
// runs on a runtime worker or under the store lock.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use thermopool_core::error::{PoolError, Result};
use thermopool_core::types::{JobId, PendingJob, PrinterId};
use thermopool_core::PrintRow;

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS pending_jobs (
        id TEXT PRIMARY KEY,
        printer TEXT NOT NULL,
        printer_epoch INTEGER NOT NULL DEFAULT 0,
        rows TEXT NOT NULL,
        metadata TEXT NOT NULL,
        created_at TEXT NOT NULL,
        retry_count INTEGER NOT NULL DEFAULT 0,
        last_error TEXT,
        seq INTEGER NOT NULL
    )
"#;

/// Mirror of the pending job store.  Blocking; use from the blocking pool
/// or through [`JournalWriter`].
pub struct JobJournal {
    conn: Connection,
}

impl JobJournal {
    /// Open (or create) the journal database at the given path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| PoolError::Journal(format!("open: {e}")))?;

        // WAL survives unclean shutdowns more gracefully.
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| PoolError::Journal(format!("WAL pragma: {e}")))?;

        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| PoolError::Journal(format!("create table: {e}")))?;

        info!("pending job journal opened");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| PoolError::Journal(format!("open in-memory: {e}")))?;
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| PoolError::Journal(format!("create table: {e}")))?;
        debug!("in-memory journal opened");
        Ok(Self { conn })
    }

    /// Insert or overwrite a job.  `seq` preserves enqueue order across
    /// restarts.
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub fn upsert(&self, job: &PendingJob, seq: u64) -> Result<()> {
        let rows_json = serde_json::to_string(&job.rows)
            .map_err(|e| PoolError::Journal(format!("serialize rows: {e}")))?;

        self.conn
            .execute(
                "INSERT OR REPLACE INTO pending_jobs
                 (id, printer, printer_epoch, rows, metadata, created_at, retry_count, last_error, seq)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    job.id.to_string(),
                    job.printer.as_str(),
                    job.printer_epoch as i64,
                    rows_json,
                    job.metadata,
                    job.created_at.to_rfc3339(),
                    job.retry_count,
                    job.last_error,
                    seq as i64,
                ],
            )
            .map_err(|e| PoolError::Journal(format!("upsert job: {e}")))?;

        debug!(job_id = %job.id, seq, "job journaled");
        Ok(())
    }

    /// Delete a job.  Deleting an absent job is not an error.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub fn delete(&self, job_id: &JobId) -> Result<()> {
        self.conn
            .execute("DELETE FROM pending_jobs WHERE id = ?1", params![job_id.to_string()])
            .map_err(|e| PoolError::Journal(format!("delete job: {e}")))?;
        Ok(())
    }

    /// Every journaled job with its sequence number, oldest first.
    #[instrument(skip(self))]
    pub fn load_all(&self) -> Result<Vec<(PendingJob, u64)>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, printer, printer_epoch, rows, metadata, created_at,
                        retry_count, last_error, seq
                 FROM pending_jobs ORDER BY seq ASC",
            )
            .map_err(|e| PoolError::Journal(format!("prepare load_all: {e}")))?;

        let jobs = stmt
            .query_map([], row_to_pending_job)
            .map_err(|e| PoolError::Journal(format!("query load_all: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| PoolError::Journal(format!("collect rows: {e}")))?;

        debug!(count = jobs.len(), "journal loaded");
        Ok(jobs)
    }
}

enum JournalOp {
    Upsert(Box<PendingJob>, u64),
    Delete(JobId),
    Flush(oneshot::Sender<()>),
}

/// Owns a journal on a blocking task and applies queued mutations in order.
pub struct JournalWriter {
    ops: mpsc::UnboundedSender<JournalOp>,
    task: JoinHandle<()>,
}

impl JournalWriter {
    /// Move `journal` onto the blocking pool of the current runtime.
    pub fn spawn(journal: JobJournal) -> Result<Self> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| PoolError::RuntimeUnavailable(e.to_string()))?;
        let (ops, rx) = mpsc::unbounded_channel();
        let task = handle.spawn_blocking(move || drain(journal, rx));
        Ok(Self { ops, task })
    }

    pub fn upsert(&self, job: &PendingJob, seq: u64) {
        self.submit(JournalOp::Upsert(Box::new(job.clone()), seq));
    }

    pub fn delete(&self, job_id: &JobId) {
        self.submit(JournalOp::Delete(*job_id));
    }

    /// Resolves once every mutation queued before the call has been written.
    pub fn flush(&self) -> oneshot::Receiver<()> {
        let (done, rx) = oneshot::channel();
        self.submit(JournalOp::Flush(done));
        rx
    }

    fn submit(&self, op: JournalOp) {
        if self.ops.send(op).is_err() {
            warn!("journal writer gone; mutation not persisted");
        }
    }

    /// Write out everything queued, then stop.
    pub async fn close(self) {
        drop(self.ops);
        if let Err(e) = self.task.await {
            warn!(error = %e, "journal writer ended abnormally");
        }
    }
}

fn drain(journal: JobJournal, mut ops: mpsc::UnboundedReceiver<JournalOp>) {
    while let Some(op) = ops.blocking_recv() {
        match op {
            JournalOp::Upsert(job, seq) => {
                if let Err(e) = journal.upsert(&job, seq) {
                    warn!(job_id = %job.id, error = %e, "journal write failed; job kept in memory");
                }
            }
            JournalOp::Delete(job_id) => {
                if let Err(e) = journal.delete(&job_id) {
                    warn!(job_id = %job_id, error = %e, "journal delete failed");
                }
            }
            JournalOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("journal writer stopped");
}

/// Column indices must match the SELECT order in `load_all`.
fn row_to_pending_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<(PendingJob, u64)> {
    let id_str: String = row.get(0)?;
    let printer: String = row.get(1)?;
    let printer_epoch = row.get::<_, i64>(2)? as u64;
    let rows_json: String = row.get(3)?;
    let metadata: String = row.get(4)?;
    let created_at_str: String = row.get(5)?;
    let retry_count = row.get::<_, i64>(6)? as u32;
    let last_error: Option<String> = row.get(7)?;
    let seq = row.get::<_, i64>(8)? as u64;

    let uuid = uuid::Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let rows: Vec<PrintRow> = serde_json::from_str(&rows_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    // Metadata stays an opaque blob; it is only parsed when presented.
    let job = PendingJob {
        id: JobId(uuid),
        printer: PrinterId::new(printer),
        printer_epoch,
        rows,
        metadata,
        created_at,
        retry_count,
        last_error,
    };
    Ok((job, seq))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(printer: &str) -> PendingJob {
        PendingJob::new(
            printer.into(),
            1,
            vec![PrintRow::text("Total 9.50"), PrintRow::Cut],
            r#"{"type":"RECEIPT"}"#.into(),
        )
    }

    #[test]
    fn upsert_and_load_in_sequence_order() {
        let journal = JobJournal::open_in_memory().expect("open");
        let first = job("10.0.0.5");
        let second = job("10.0.0.6");
        journal.upsert(&second, 2).expect("upsert");
        journal.upsert(&first, 1).expect("upsert");

        let loaded = journal.load_all().expect("load");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].0.id, first.id);
        assert_eq!(loaded[1].0, second);
    }

    #[test]
    fn upsert_overwrites_existing_row() {
        let journal = JobJournal::open_in_memory().expect("open");
        let mut pending = job("10.0.0.5");
        journal.upsert(&pending, 1).expect("upsert");

        pending.printer = "10.0.0.6".into();
        pending.retry_count = 1;
        pending.last_error = Some("connection refused".into());
        journal.upsert(&pending, 1).expect("upsert again");

        let loaded = journal.load_all().expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].0.printer.as_str(), "10.0.0.6");
        assert_eq!(loaded[0].0.retry_count, 1);
        assert_eq!(loaded[0].0.last_error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn delete_is_idempotent() {
        let journal = JobJournal::open_in_memory().expect("open");
        let pending = job("10.0.0.5");
        journal.upsert(&pending, 1).expect("upsert");
        journal.delete(&pending.id).expect("delete");
        journal.delete(&pending.id).expect("delete again");
        assert!(journal.load_all().expect("load").is_empty());
    }

    #[test]
    fn malformed_metadata_is_kept_verbatim() {
        let journal = JobJournal::open_in_memory().expect("open");
        let mut pending = job("10.0.0.5");
        pending.metadata = "{not json".into();
        journal.upsert(&pending, 7).expect("upsert");

        let loaded = journal.load_all().expect("load");
        assert_eq!(loaded[0].0.metadata, "{not json");
        assert_eq!(loaded[0].1, 7);
    }

    #[test]
    fn file_journal_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pending.db");
        let pending = job("10.0.0.5");
        {
            let journal = JobJournal::open(&path).expect("open");
            journal.upsert(&pending, 1).expect("upsert");
        }
        let journal = JobJournal::open(&path).expect("reopen");
        let loaded = journal.load_all().expect("load");
        assert_eq!(loaded[0].0, pending);
    }

    #[tokio::test]
    async fn writer_applies_mutations_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pending.db");
        let kept = job("10.0.0.5");
        let dropped = job("10.0.0.6");

        let writer = JournalWriter::spawn(JobJournal::open(&path).expect("open")).expect("spawn");
        writer.upsert(&dropped, 1);
        writer.upsert(&kept, 2);
        writer.delete(&dropped.id);
        writer.flush().await.expect("flush");
        writer.close().await;

        let loaded = JobJournal::open(&path).expect("reopen").load_all().expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].0, kept);
    }
}
