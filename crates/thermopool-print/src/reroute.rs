// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Reroute and retry of queued jobs.
//
// A job is checked out of the store for the duration of one re-dispatch.  On
// success it is forgotten; on failure it goes back to the store under its
// (possibly new) owner with the retry count bumped.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use thermopool_core::error::Result;
use thermopool_core::types::{JobId, PendingJob, PrinterId};

use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::prober::Prober;
use crate::registry::Registry;
use crate::store::PendingStore;
use crate::transport::OutboundJob;

/// Tally of one queue sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub delivered: usize,
    pub requeued: usize,
    /// Jobs deleted or taken by someone else before their turn.
    pub skipped: usize,
}

impl SweepReport {
    fn tally(&mut self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Delivered => self.delivered += 1,
            DispatchOutcome::Queued { .. } => self.requeued += 1,
            DispatchOutcome::Rejected { .. } => self.skipped += 1,
        }
    }

    pub fn attempted(&self) -> usize {
        self.delivered + self.requeued
    }
}

pub struct RerouteService {
    registry: Arc<Registry>,
    store: Arc<PendingStore>,
    dispatcher: Arc<Dispatcher>,
    prober: Arc<Prober>,
}

impl RerouteService {
    pub fn new(
        registry: Arc<Registry>,
        store: Arc<PendingStore>,
        dispatcher: Arc<Dispatcher>,
        prober: Arc<Prober>,
    ) -> Self {
        Self {
            registry,
            store,
            dispatcher,
            prober,
        }
    }

    /// Move one job to `target` and try it there.  An unregistered target is
    /// added (and probed) first.
    pub async fn reroute_job(&self, job_id: &JobId, target: &PrinterId) -> DispatchOutcome {
        let mut job = match self.store.checkout(job_id) {
            Ok(job) => job,
            Err(e) => {
                debug!(job_id = %job_id, error = %e, "reroute refused");
                return DispatchOutcome::rejected(e);
            }
        };
        let epoch = match self.ensure_registered(target).await {
            Ok(epoch) => epoch,
            Err(e) => {
                warn!(printer = %target, error = %e, "reroute target unavailable");
                if let Err(store_err) = self.store.checkin(job) {
                    warn!(job_id = %job_id, error = %store_err, "could not return job to queue");
                }
                return DispatchOutcome::rejected(e);
            }
        };
        info!(job_id = %job_id, from = %job.printer, to = %target, "rerouting job");
        self.bind(&mut job, target, epoch);
        self.redispatch(job).await
    }

    /// Reroute every job of `source`'s current registration to `target`,
    /// one at a time, oldest first.
    pub async fn reroute_all_for_printer(
        &self,
        source: &PrinterId,
        target: &PrinterId,
    ) -> Result<SweepReport> {
        let ids = self.queued_ids(source)?;
        if ids.is_empty() {
            return Ok(SweepReport::default());
        }
        let epoch = self.ensure_registered(target).await?;
        info!(from = %source, to = %target, jobs = ids.len(), "rerouting printer queue");
        Ok(self.sweep(ids, target, epoch).await)
    }

    /// Re-send every job of a printer's current registration to itself.
    pub async fn retry_all_for_printer(&self, printer: &PrinterId) -> Result<SweepReport> {
        let Some(epoch) = self.registry.epoch(printer) else {
            return Ok(SweepReport::default());
        };
        let ids = self.queued_ids(printer)?;
        if ids.is_empty() {
            return Ok(SweepReport::default());
        }
        info!(printer = %printer, jobs = ids.len(), "retrying printer queue");
        Ok(self.sweep(ids, printer, epoch).await)
    }

    fn queued_ids(&self, printer: &PrinterId) -> Result<Vec<JobId>> {
        let Some(epoch) = self.registry.epoch(printer) else {
            return Ok(Vec::new());
        };
        Ok(self
            .store
            .list_for(printer, epoch)?
            .into_iter()
            .map(|job| job.id)
            .collect())
    }

    async fn ensure_registered(&self, printer: &PrinterId) -> Result<u64> {
        let registration = self.dispatcher.enroll(printer)?;
        if registration.created {
            self.prober.probe(printer).await;
        }
        Ok(registration.epoch)
    }

    async fn sweep(&self, ids: Vec<JobId>, target: &PrinterId, epoch: u64) -> SweepReport {
        let mut report = SweepReport::default();
        for id in ids {
            let mut job = match self.store.checkout(&id) {
                Ok(job) => job,
                Err(e) => {
                    debug!(job_id = %id, error = %e, "skipping job in sweep");
                    report.skipped += 1;
                    continue;
                }
            };
            self.bind(&mut job, target, epoch);
            let outcome = self.redispatch(job).await;
            report.tally(&outcome);
        }
        info!(
            printer = %target,
            delivered = report.delivered,
            requeued = report.requeued,
            skipped = report.skipped,
            "sweep finished"
        );
        report
    }

    /// Hand a checked-out job to `target`.
    fn bind(&self, job: &mut PendingJob, target: &PrinterId, epoch: u64) {
        job.printer = target.clone();
        job.printer_epoch = epoch;
        if let Err(e) = self.store.retarget(&job.id, target) {
            warn!(job_id = %job.id, error = %e, "in-flight owner not updated");
        }
    }

    /// Send a checked-out job to its owner.
    async fn redispatch(&self, mut job: PendingJob) -> DispatchOutcome {
        let outbound = OutboundJob {
            job_id: Some(job.id),
            rows: job.rows.clone(),
            metadata: job.metadata.clone(),
        };
        let printer = job.printer.clone();
        let job_id = job.id;

        match self.dispatcher.deliver(&printer, &outbound).await {
            Ok(()) => {
                if let Err(e) = self.store.complete(&job_id) {
                    warn!(job_id = %job_id, error = %e, "delivered job not cleared");
                }
                info!(job_id = %job_id, printer = %printer, "queued job delivered");
                DispatchOutcome::Delivered
            }
            Err(e) => {
                let reason = e.to_string();
                job.retry_count += 1;
                job.last_error = Some(reason.clone());
                let retry_count = job.retry_count;
                let requeued = self.store.checkin(job);
                self.dispatcher.mark_unreachable(&printer);
                match requeued {
                    Ok(true) => DispatchOutcome::Queued {
                        job_id,
                        retry_count,
                        reason,
                    },
                    Ok(false) => DispatchOutcome::rejected(format!(
                        "job {job_id} was deleted while in flight"
                    )),
                    Err(e) => {
                        warn!(job_id = %job_id, error = %e, "failed job could not be re-queued");
                        DispatchOutcome::rejected(e)
                    }
                }
            }
        }
    }
}
