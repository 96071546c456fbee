// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Reachability prober.

use std::sync::Arc;

use tracing::{info, warn};

use thermopool_core::error::{PoolError, Result};
use thermopool_core::types::PrinterId;

use crate::link::DeviceLink;
use crate::registry::Registry;

/// Outcome of one probe against a registered printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReport {
    pub reachable: bool,
    /// Reachability recorded before this probe.
    pub was_reachable: bool,
}

impl ProbeReport {
    /// The printer went from reachable to unreachable.
    pub fn went_down(&self) -> bool {
        self.was_reachable && !self.reachable
    }
}

pub struct Prober {
    registry: Arc<Registry>,
    link: DeviceLink,
}

impl Prober {
    pub fn new(registry: Arc<Registry>, link: DeviceLink) -> Self {
        Self { registry, link }
    }

    /// One connectivity attempt.  False for unregistered identities.
    pub async fn probe(&self, printer: &PrinterId) -> bool {
        match self.probe_report(printer).await {
            Ok(report) => report.reachable,
            Err(e) => {
                warn!(printer = %printer, error = %e, "probe skipped");
                false
            }
        }
    }

    /// Probe and report the transition.
    pub async fn probe_report(&self, printer: &PrinterId) -> Result<ProbeReport> {
        if !self.registry.contains(printer) {
            return Err(PoolError::PrinterNotFound(printer.clone()));
        }
        let session = self.registry.session(printer)?;
        let _guard = session.lock().await;

        let (reachable, learned) = match self.link.connect(printer).await {
            Ok(name) => (true, name),
            Err(e) => {
                info!(printer = %printer, error = %e, "printer unreachable");
                (false, None)
            }
        };

        // Removed while we waited on the session: nothing to record.
        let was_reachable = self
            .registry
            .record_probe(printer, reachable, learned)?
            .ok_or_else(|| PoolError::PrinterNotFound(printer.clone()))?;
        Ok(ProbeReport {
            reachable,
            was_reachable,
        })
    }
}
