// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job dispatcher.
//
// Attempts immediate delivery and falls back to the pending store.  On
// failure the side effects land in a fixed order before the caller sees the
// outcome: job stored, printer marked unreachable, event published.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use thermopool_core::error::Result;
use thermopool_core::types::{JobId, PendingJob, PrinterId};
use thermopool_core::{JobMetadata, PrintRow};

use crate::events::{EventPublisher, PoolEvent};
use crate::link::DeviceLink;
use crate::registry::{Registration, Registry};
use crate::store::PendingStore;
use crate::transport::OutboundJob;

/// Settle delay for jobs whose metadata does not parse.
const DEFAULT_SETTLE: Duration = Duration::from_millis(500);

/// What happened to a job handed to the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all_fields = "camelCase")]
pub enum DispatchOutcome {
    /// The transport accepted the job.
    Delivered,
    /// Delivery failed; the job is waiting in the pending store.
    Queued {
        job_id: JobId,
        retry_count: u32,
        reason: String,
    },
    /// Nothing was sent and nothing was queued.
    Rejected { reason: String },
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    pub fn queued_job(&self) -> Option<JobId> {
        match self {
            Self::Queued { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }

    pub(crate) fn rejected(reason: impl ToString) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
        }
    }
}

pub struct Dispatcher {
    registry: Arc<Registry>,
    store: Arc<PendingStore>,
    events: EventPublisher,
    link: DeviceLink,
    settle_after_print: bool,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        store: Arc<PendingStore>,
        events: EventPublisher,
        link: DeviceLink,
        settle_after_print: bool,
    ) -> Self {
        Self {
            registry,
            store,
            events,
            link,
            settle_after_print,
        }
    }

    /// Register an identity, handing it any jobs restored from the journal.
    pub fn enroll(&self, printer: &PrinterId) -> Result<Registration> {
        let registration = self.registry.register(printer)?;
        if registration.created {
            self.store.adopt_restored(printer, registration.epoch)?;
        }
        Ok(registration)
    }

    /// Deliver a new job, queueing it on failure.  Unknown identities are
    /// registered first.
    pub async fn submit(
        &self,
        printer: &PrinterId,
        rows: Vec<PrintRow>,
        metadata: String,
    ) -> DispatchOutcome {
        let registration = match self.enroll(printer) {
            Ok(registration) => registration,
            Err(e) => {
                warn!(printer = %printer, error = %e, "cannot register printer for submit");
                return DispatchOutcome::rejected(e);
            }
        };

        let job = OutboundJob {
            job_id: None,
            rows,
            metadata,
        };
        let reason = match self.deliver(printer, &job).await {
            Ok(()) => return DispatchOutcome::Delivered,
            Err(e) => e.to_string(),
        };

        let mut pending = PendingJob::new(
            printer.clone(),
            registration.epoch,
            job.rows,
            job.metadata,
        );
        pending.last_error = Some(reason.clone());
        let job_id = pending.id;
        if let Err(e) = self.store.insert(pending) {
            warn!(printer = %printer, error = %e, "failed job could not be queued");
            self.mark_unreachable(printer);
            return DispatchOutcome::rejected(e);
        }
        info!(printer = %printer, job_id = %job_id, reason = %reason, "delivery failed; job queued");
        self.mark_unreachable(printer);
        DispatchOutcome::Queued {
            job_id,
            retry_count: 0,
            reason,
        }
    }

    /// One delivery attempt under the printer's session lock.  Publishes
    /// `PrePrintCheck` first; on success marks the printer reachable and
    /// waits out the job type's settle delay before releasing the session.
    pub async fn deliver(&self, printer: &PrinterId, job: &OutboundJob) -> Result<()> {
        self.events.publish(PoolEvent::PrePrintCheck {
            printer: printer.clone(),
            job_id: job.job_id,
        });

        let session = self.registry.session(printer)?;
        let _guard = session.lock().await;

        self.link.send(printer, job).await?;
        if let Err(e) = self.registry.set_reachable(printer, true) {
            warn!(printer = %printer, error = %e, "could not mark printer reachable");
        }
        debug!(printer = %printer, "job delivered");

        if self.settle_after_print {
            let delay = JobMetadata::parse(&job.metadata)
                .map(|meta| meta.kind.settle_delay())
                .unwrap_or(DEFAULT_SETTLE);
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    /// Flag a printer unreachable and tell subscribers.
    pub fn mark_unreachable(&self, printer: &PrinterId) {
        if let Err(e) = self.registry.set_reachable(printer, false) {
            warn!(printer = %printer, error = %e, "could not mark printer unreachable");
        }
        self.events.publish(PoolEvent::PrinterUnreachable {
            printer: printer.clone(),
        });
    }
}
