// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pending job store.
//
// Holds jobs that failed immediate delivery, indexed by job id and by owning
// printer.  Both indices and the in-flight set are updated under a single
// lock so no reader ever sees them disagree.  Journal mutations are queued to
// the writer under that lock, so they land in the same order.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, instrument, warn};

use thermopool_core::error::{PoolError, Result};
use thermopool_core::types::{JobId, PendingJob, PrinterId};

use crate::journal::{JobJournal, JournalWriter};

/// Epoch given to jobs restored from the journal.  Registry epochs start at
/// 1, so restored jobs belong to no registration until adopted.
pub const RESTORED_EPOCH: u64 = 0;

struct Entry {
    job: PendingJob,
    seq: u64,
}

struct InFlight {
    printer: PrinterId,
    cancelled: bool,
}

#[derive(Default)]
struct StoreInner {
    next_seq: u64,
    jobs: HashMap<JobId, Entry>,
    /// Per-printer FIFO of queued job ids.
    by_printer: HashMap<PrinterId, Vec<JobId>>,
    in_flight: HashMap<JobId, InFlight>,
    journal: Option<JournalWriter>,
}

impl StoreInner {
    fn journal_upsert(&self, job: &PendingJob, seq: u64) {
        if let Some(journal) = &self.journal {
            journal.upsert(job, seq);
        }
    }

    fn journal_delete(&self, job_id: &JobId) {
        if let Some(journal) = &self.journal {
            journal.delete(job_id);
        }
    }

    fn enqueue(&mut self, job: PendingJob) {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.journal_upsert(&job, seq);
        self.by_printer
            .entry(job.printer.clone())
            .or_default()
            .push(job.id);
        self.jobs.insert(job.id, Entry { job, seq });
    }

    fn unindex(&mut self, printer: &PrinterId, job_id: &JobId) {
        if let Some(ids) = self.by_printer.get_mut(printer) {
            ids.retain(|id| id != job_id);
            if ids.is_empty() {
                self.by_printer.remove(printer);
            }
        }
    }

    fn take(&mut self, job_id: &JobId) -> Option<PendingJob> {
        let entry = self.jobs.remove(job_id)?;
        self.unindex(&entry.job.printer, job_id);
        Some(entry.job)
    }
}

/// In-memory pending job store with optional write-through journal.
#[derive(Default)]
pub struct PendingStore {
    inner: Mutex<StoreInner>,
}

impl PendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreInner>> {
        self.inner.lock().map_err(|_| PoolError::Poisoned("pending store"))
    }

    /// Attach a journal and load whatever it holds.  Restored jobs get
    /// [`RESTORED_EPOCH`]; jobs already in memory are written to the journal.
    /// Blocking; needs a tokio runtime for the writer that takes over the
    /// journal afterwards.  Returns the number of jobs restored.
    pub fn attach_journal(&self, journal: JobJournal) -> Result<usize> {
        let restored = journal.load_all()?;
        let mut inner = self.lock()?;

        let mut resident: Vec<(&PendingJob, u64)> =
            inner.jobs.values().map(|e| (&e.job, e.seq)).collect();
        resident.sort_by_key(|(_, seq)| *seq);
        for (job, seq) in resident {
            journal.upsert(job, seq)?;
        }

        let mut count = 0;
        for (mut job, seq) in restored {
            if inner.jobs.contains_key(&job.id) {
                continue;
            }
            job.printer_epoch = RESTORED_EPOCH;
            inner.next_seq = inner.next_seq.max(seq);
            inner
                .by_printer
                .entry(job.printer.clone())
                .or_default()
                .push(job.id);
            inner.jobs.insert(job.id, Entry { job, seq });
            count += 1;
        }
        // Journal order is seq order, but resident jobs may interleave.
        let StoreInner { jobs, by_printer, .. } = &mut *inner;
        for ids in by_printer.values_mut() {
            ids.sort_by_key(|id| jobs.get(id).map(|e| e.seq).unwrap_or(u64::MAX));
        }
        inner.journal = Some(JournalWriter::spawn(journal)?);

        info!(restored = count, "pending jobs restored from journal");
        Ok(count)
    }

    /// Detach the journal, waiting for queued writes to land.  Later
    /// mutations stay in memory only.
    pub async fn close_journal(&self) -> Result<()> {
        let writer = self.lock()?.journal.take();
        if let Some(writer) = writer {
            writer.close().await;
        }
        Ok(())
    }

    /// Queue a job at the back of its printer's FIFO.
    #[instrument(skip(self, job), fields(job_id = %job.id, printer = %job.printer))]
    pub fn insert(&self, job: PendingJob) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.jobs.contains_key(&job.id) || inner.in_flight.contains_key(&job.id) {
            return Err(PoolError::JobBusy(job.id));
        }
        debug!(job_id = %job.id, printer = %job.printer, "job queued");
        inner.enqueue(job);
        Ok(())
    }

    /// Take a queued job out for re-dispatch.  It stays out of both indices
    /// until `checkin` or `complete`.
    pub fn checkout(&self, job_id: &JobId) -> Result<PendingJob> {
        let mut inner = self.lock()?;
        if inner.in_flight.contains_key(job_id) {
            return Err(PoolError::JobBusy(*job_id));
        }
        let job = inner.take(job_id).ok_or(PoolError::JobNotFound(*job_id))?;
        inner.in_flight.insert(
            *job_id,
            InFlight {
                printer: job.printer.clone(),
                cancelled: false,
            },
        );
        Ok(job)
    }

    /// Record that a checked-out job is now bound for `printer`, so deleting
    /// that printer's jobs also cancels this one.
    pub fn retarget(&self, job_id: &JobId, printer: &PrinterId) -> Result<()> {
        let mut inner = self.lock()?;
        let flight = inner
            .in_flight
            .get_mut(job_id)
            .ok_or(PoolError::JobNotFound(*job_id))?;
        flight.printer = printer.clone();
        Ok(())
    }

    /// Return a checked-out job after a failed attempt.  The job goes to the
    /// back of its (possibly new) printer's queue.  Returns false when the
    /// job was deleted while in flight; it is then dropped.
    pub fn checkin(&self, job: PendingJob) -> Result<bool> {
        let mut inner = self.lock()?;
        let cancelled = inner
            .in_flight
            .remove(&job.id)
            .is_some_and(|flight| flight.cancelled);
        if cancelled {
            inner.journal_delete(&job.id);
            debug!(job_id = %job.id, "cancelled while in flight; dropped");
            return Ok(false);
        }
        inner.enqueue(job);
        Ok(true)
    }

    /// Forget a checked-out job after successful delivery.
    pub fn complete(&self, job_id: &JobId) -> Result<()> {
        let mut inner = self.lock()?;
        inner.in_flight.remove(job_id);
        inner.journal_delete(job_id);
        Ok(())
    }

    /// Delete a job.  An in-flight job is marked so its re-queue is skipped.
    /// Returns false only when the id is unknown.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub fn remove(&self, job_id: &JobId) -> Result<bool> {
        let mut inner = self.lock()?;
        if inner.take(job_id).is_some() {
            inner.journal_delete(job_id);
            return Ok(true);
        }
        match inner.in_flight.get_mut(job_id) {
            Some(flight) => {
                flight.cancelled = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Delete every job owned by a printer, whatever its epoch, including
    /// ones in flight.  Returns how many were affected.
    #[instrument(skip(self), fields(printer = %printer))]
    pub fn remove_all_for(&self, printer: &PrinterId) -> Result<usize> {
        let mut inner = self.lock()?;
        let ids = inner.by_printer.remove(printer).unwrap_or_default();
        for id in &ids {
            inner.jobs.remove(id);
            inner.journal_delete(id);
        }
        let mut count = ids.len();
        for flight in inner.in_flight.values_mut() {
            if flight.printer == *printer && !flight.cancelled {
                flight.cancelled = true;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Re-tag restored jobs for a printer with its fresh registration epoch.
    pub fn adopt_restored(&self, printer: &PrinterId, epoch: u64) -> Result<usize> {
        let mut inner = self.lock()?;
        let ids = inner.by_printer.get(printer).cloned().unwrap_or_default();
        let mut adopted = Vec::new();
        for id in ids {
            let Some(entry) = inner.jobs.get_mut(&id) else {
                continue;
            };
            if entry.job.printer_epoch == RESTORED_EPOCH {
                entry.job.printer_epoch = epoch;
                adopted.push((entry.job.clone(), entry.seq));
            }
        }
        for (job, seq) in &adopted {
            inner.journal_upsert(job, *seq);
        }
        if !adopted.is_empty() {
            debug!(printer = %printer, epoch, count = adopted.len(), "restored jobs adopted");
        }
        Ok(adopted.len())
    }

    /// Every queued job, oldest first.
    pub fn list(&self) -> Result<Vec<PendingJob>> {
        let inner = self.lock()?;
        let mut entries: Vec<&Entry> = inner.jobs.values().collect();
        entries.sort_by_key(|e| e.seq);
        Ok(entries.into_iter().map(|e| e.job.clone()).collect())
    }

    /// Queued jobs for one registration of a printer, in FIFO order.
    pub fn list_for(&self, printer: &PrinterId, epoch: u64) -> Result<Vec<PendingJob>> {
        let inner = self.lock()?;
        let Some(ids) = inner.by_printer.get(printer) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| inner.jobs.get(id))
            .filter(|e| e.job.printer_epoch == epoch)
            .map(|e| e.job.clone())
            .collect())
    }

    pub fn get(&self, job_id: &JobId) -> Result<Option<PendingJob>> {
        Ok(self.lock()?.jobs.get(job_id).map(|e| e.job.clone()))
    }

    pub fn is_in_flight(&self, job_id: &JobId) -> bool {
        self.lock()
            .map(|inner| inner.in_flight.contains_key(job_id))
            .unwrap_or(false)
    }

    /// Number of queued jobs.
    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
