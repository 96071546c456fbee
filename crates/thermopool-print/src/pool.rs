// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The printer pool.
//
// Explicitly constructed, explicitly shut down.  Public operations never
// fail outward: they degrade to `false`, an empty list, or a
// `DispatchOutcome::Rejected`, and log the underlying `PoolError`.  The
// `try_*` variants keep the error for callers that want it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc};
use tracing::{info, instrument, warn};

use thermopool_core::config::PoolConfig;
use thermopool_core::error::{PoolError, Result};
use thermopool_core::types::{JobId, PendingJob, PrinterId, PrinterStatus, QueuedJob};
use thermopool_core::{JobKind, JobMetadata, PrintRow};

use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::events::{EventPublisher, PoolEvent, Subscription};
use crate::journal::JobJournal;
use crate::link::DeviceLink;
use crate::monitor::Monitor;
use crate::prober::Prober;
use crate::registry::Registry;
use crate::reroute::{RerouteService, SweepReport};
use crate::store::PendingStore;
use crate::transport::PrinterTransport;

enum Lifecycle {
    Idle,
    Running { monitor: Option<Monitor> },
    ShutDown,
}

pub struct PrinterPool {
    config: PoolConfig,
    registry: Arc<Registry>,
    store: Arc<PendingStore>,
    events: EventPublisher,
    link: DeviceLink,
    prober: Arc<Prober>,
    dispatcher: Arc<Dispatcher>,
    reroute: RerouteService,
    lifecycle: Mutex<Lifecycle>,
    closed: AtomicBool,
}

impl PrinterPool {
    pub fn new(config: PoolConfig, transport: Arc<dyn PrinterTransport>) -> Self {
        let registry = Arc::new(Registry::new());
        let store = Arc::new(PendingStore::new());
        let events = EventPublisher::new();
        let link = DeviceLink::new(transport, &config);
        let prober = Arc::new(Prober::new(Arc::clone(&registry), link.clone()));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            events.clone(),
            link.clone(),
            config.settle_after_print,
        ));
        let reroute = RerouteService::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            Arc::clone(&dispatcher),
            Arc::clone(&prober),
        );
        Self {
            config,
            registry,
            store,
            events,
            link,
            prober,
            dispatcher,
            reroute,
            lifecycle: Mutex::new(Lifecycle::Idle),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::ShutDown);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Set up background resources: the journal (restoring queued jobs) and
    /// the reachability monitor.  Idempotent; a failed attempt may be
    /// retried.
    pub async fn initialize(&self) -> bool {
        match self.try_initialize().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "pool initialization failed");
                false
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn try_initialize(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        match *lifecycle {
            Lifecycle::Running { .. } => return Ok(()),
            Lifecycle::ShutDown => return Err(PoolError::ShutDown),
            Lifecycle::Idle => {}
        }
        self.config.validate()?;
        tokio::runtime::Handle::try_current()
            .map_err(|e| PoolError::RuntimeUnavailable(e.to_string()))?;

        if let Some(path) = self.config.journal_path.clone() {
            let store = Arc::clone(&self.store);
            let restored = tokio::task::spawn_blocking(move || {
                let journal = JobJournal::open(&path)?;
                store.attach_journal(journal)
            })
            .await
            .map_err(|e| PoolError::Journal(format!("journal task: {e}")))??;

            // Printers registered before the journal was attached.
            for printer in self.registry.identities()? {
                if let Some(epoch) = self.registry.epoch(&printer) {
                    self.store.adopt_restored(&printer, epoch)?;
                }
            }
            info!(restored, "pending jobs restored");
        }

        let monitor = self.config.monitor_interval().map(|interval| {
            Monitor::spawn(
                Arc::clone(&self.registry),
                Arc::clone(&self.prober),
                self.events.clone(),
                interval,
            )
        });
        *lifecycle = Lifecycle::Running { monitor };
        info!("printer pool initialized");
        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        matches!(*self.lifecycle.lock().await, Lifecycle::Running { .. })
    }

    /// Stop background work, drop every subscriber and refuse further
    /// operations.  Queued jobs stay in the journal.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let previous = std::mem::replace(&mut *self.lifecycle.lock().await, Lifecycle::ShutDown);
        if let Lifecycle::Running {
            monitor: Some(monitor),
        } = previous
        {
            monitor.stop().await;
        }
        self.events.clear();
        self.link.close();
        if let Err(e) = self.store.close_journal().await {
            warn!(error = %e, "journal not closed cleanly");
        }
        info!("printer pool shut down");
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Register a printer and probe it.  True only if the probe succeeded;
    /// the printer stays registered either way.
    pub async fn add_printer(&self, printer: impl Into<PrinterId>) -> bool {
        let printer = printer.into();
        if let Err(e) = self.ensure_open().and_then(|()| self.dispatcher.enroll(&printer)) {
            warn!(printer = %printer, error = %e, "add printer failed");
            return false;
        }
        self.prober.probe(&printer).await
    }

    /// Deregister a printer.  Its queued jobs stay addressable by job id.
    pub fn remove_printer(&self, printer: impl Into<PrinterId>) -> bool {
        let printer = printer.into();
        match self.ensure_open().and_then(|()| self.registry.remove(&printer)) {
            Ok(removed) => removed,
            Err(e) => {
                warn!(printer = %printer, error = %e, "remove printer failed");
                false
            }
        }
    }

    /// Snapshot of every registered printer, in registration order.
    pub fn list_status(&self) -> Vec<PrinterStatus> {
        match self.ensure_open().and_then(|()| self.registry.list_status()) {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "list status failed");
                Vec::new()
            }
        }
    }

    // ------------------------------------------------------------------
    // Prober
    // ------------------------------------------------------------------

    pub async fn probe(&self, printer: impl Into<PrinterId>) -> bool {
        if self.ensure_open().is_err() {
            return false;
        }
        self.prober.probe(&printer.into()).await
    }

    /// Probe, and on success flush the printer's own queue back to it.
    /// Returns the probe result.
    pub async fn reconnect(&self, printer: impl Into<PrinterId>) -> bool {
        let printer = printer.into();
        if self.ensure_open().is_err() || !self.prober.probe(&printer).await {
            return false;
        }
        if let Err(e) = self.reroute.retry_all_for_printer(&printer).await {
            warn!(printer = %printer, error = %e, "queue flush after reconnect failed");
        }
        true
    }

    // ------------------------------------------------------------------
    // Dispatcher
    // ------------------------------------------------------------------

    /// Print a job, queueing it if the printer cannot take it now.
    pub async fn submit(
        &self,
        printer: impl Into<PrinterId>,
        rows: Vec<PrintRow>,
        metadata: &JobMetadata,
    ) -> DispatchOutcome {
        match metadata.to_blob() {
            Ok(blob) => self.submit_blob(printer, rows, blob).await,
            Err(e) => DispatchOutcome::rejected(e),
        }
    }

    /// Like `submit`, with a pre-serialized metadata blob that is passed
    /// through unvalidated.
    pub async fn submit_blob(
        &self,
        printer: impl Into<PrinterId>,
        rows: Vec<PrintRow>,
        metadata: String,
    ) -> DispatchOutcome {
        if let Err(e) = self.ensure_open() {
            return DispatchOutcome::rejected(e);
        }
        self.dispatcher.submit(&printer.into(), rows, metadata).await
    }

    /// Kick the cash drawer attached to a printer.
    pub async fn open_cash_drawer(&self, printer: impl Into<PrinterId>) -> DispatchOutcome {
        let metadata = JobMetadata::new(JobKind::OpenDrawer);
        self.submit(printer, vec![PrintRow::Cashbox], &metadata).await
    }

    // ------------------------------------------------------------------
    // Pending job store
    // ------------------------------------------------------------------

    /// Every queued job.  Empty if any job's metadata does not parse.
    pub fn pending_jobs(&self) -> Vec<QueuedJob> {
        self.try_pending_jobs().unwrap_or_else(|e| {
            warn!(error = %e, "pending job listing failed");
            Vec::new()
        })
    }

    pub fn try_pending_jobs(&self) -> Result<Vec<QueuedJob>> {
        self.ensure_open()?;
        self.materialize(self.store.list()?)
    }

    /// Queued jobs of a printer's current registration.  Empty if any of
    /// them has malformed metadata.
    pub fn pending_jobs_for_printer(&self, printer: impl Into<PrinterId>) -> Vec<QueuedJob> {
        let printer = printer.into();
        self.try_pending_jobs_for_printer(&printer)
            .unwrap_or_else(|e| {
                warn!(printer = %printer, error = %e, "pending job listing failed");
                Vec::new()
            })
    }

    pub fn try_pending_jobs_for_printer(&self, printer: &PrinterId) -> Result<Vec<QueuedJob>> {
        self.ensure_open()?;
        let Some(epoch) = self.registry.epoch(printer) else {
            return Ok(Vec::new());
        };
        self.materialize(self.store.list_for(printer, epoch)?)
    }

    fn materialize(&self, jobs: Vec<PendingJob>) -> Result<Vec<QueuedJob>> {
        jobs.iter()
            .map(|job| QueuedJob::materialize(job, self.registry.display_name(&job.printer)))
            .collect()
    }

    /// Delete one job.  True if it was queued or in flight.
    pub fn delete_pending_job(&self, job_id: &JobId) -> bool {
        match self.ensure_open().and_then(|()| self.store.remove(job_id)) {
            Ok(removed) => removed,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "delete pending job failed");
                false
            }
        }
    }

    /// Delete every job owned by a printer.  True even when there were none.
    pub fn delete_pending_jobs_for_printer(&self, printer: impl Into<PrinterId>) -> bool {
        let printer = printer.into();
        match self.ensure_open().and_then(|()| self.store.remove_all_for(&printer)) {
            Ok(count) => {
                info!(printer = %printer, count, "pending jobs deleted");
                true
            }
            Err(e) => {
                warn!(printer = %printer, error = %e, "delete pending jobs failed");
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Reroute / retry
    // ------------------------------------------------------------------

    pub async fn reroute_job(
        &self,
        job_id: &JobId,
        target: impl Into<PrinterId>,
    ) -> DispatchOutcome {
        if let Err(e) = self.ensure_open() {
            return DispatchOutcome::rejected(e);
        }
        self.reroute.reroute_job(job_id, &target.into()).await
    }

    /// Reroute a printer's whole queue.  True means the sweep ran, not that
    /// every job printed.
    pub async fn reroute_all_for_printer(
        &self,
        source: impl Into<PrinterId>,
        target: impl Into<PrinterId>,
    ) -> bool {
        let (source, target) = (source.into(), target.into());
        sweep_ran(
            match self.ensure_open() {
                Ok(()) => self.reroute.reroute_all_for_printer(&source, &target).await,
                Err(e) => Err(e),
            },
            &source,
        )
    }

    /// Re-send a printer's queue to itself.  True means the sweep ran.
    pub async fn retry_all_for_printer(&self, printer: impl Into<PrinterId>) -> bool {
        let printer = printer.into();
        sweep_ran(
            match self.ensure_open() {
                Ok(()) => self.reroute.retry_all_for_printer(&printer).await,
                Err(e) => Err(e),
            },
            &printer,
        )
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Register a callback for pool events.  Callbacks run on the task that
    /// raised the event and must not block.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&PoolEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(callback)
    }

    /// Receive pool events on a channel.  The channel closes on shutdown.
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<PoolEvent>) {
        self.events.channel()
    }
}

fn sweep_ran(result: Result<SweepReport>, printer: &PrinterId) -> bool {
    match result {
        Ok(_) => true,
        Err(e) => {
            warn!(printer = %printer, error = %e, "queue sweep failed");
            false
        }
    }
}
