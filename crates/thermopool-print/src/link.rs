// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded access to the transport.
//
// Every transport call takes a permit from the shared I/O semaphore and runs
// under a timeout, so one hanging device degrades to a failed attempt instead
// of stalling the pool.  Callers hold the printer's session lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::debug;

use thermopool_core::config::PoolConfig;
use thermopool_core::error::{PoolError, Result};
use thermopool_core::types::PrinterId;

use crate::transport::{OutboundJob, PrinterTransport};

#[derive(Clone)]
pub struct DeviceLink {
    transport: Arc<dyn PrinterTransport>,
    limiter: Arc<Semaphore>,
    probe_timeout: Duration,
    send_timeout: Duration,
}

impl DeviceLink {
    pub fn new(transport: Arc<dyn PrinterTransport>, config: &PoolConfig) -> Self {
        Self {
            transport,
            limiter: Arc::new(Semaphore::new(config.max_concurrent_io.max(1))),
            probe_timeout: config.probe_timeout(),
            send_timeout: config.send_timeout(),
        }
    }

    /// One bounded connectivity attempt.
    pub async fn connect(&self, printer: &PrinterId) -> Result<Option<String>> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| PoolError::ShutDown)?;
        debug!(printer = %printer, "probing");
        tokio::time::timeout(self.probe_timeout, self.transport.connect(printer))
            .await
            .map_err(|_| PoolError::Timeout {
                printer: printer.clone(),
                operation: "probe",
                millis: self.probe_timeout.as_millis() as u64,
            })?
    }

    /// One bounded delivery attempt.
    pub async fn send(&self, printer: &PrinterId, job: &OutboundJob) -> Result<()> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| PoolError::ShutDown)?;
        debug!(printer = %printer, rows = job.rows.len(), "sending job");
        tokio::time::timeout(self.send_timeout, self.transport.send(printer, job))
            .await
            .map_err(|_| PoolError::Timeout {
                printer: printer.clone(),
                operation: "send",
                millis: self.send_timeout.as_millis() as u64,
            })?
    }

    /// Refuse new transport work.  In-flight calls finish.
    pub fn close(&self) {
        self.limiter.close();
    }
}
