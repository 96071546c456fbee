// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Transport seam between the pool and physical devices.
//
// The pool treats "talk to printer X" as a single asynchronous operation that
// either succeeds or fails.  Socket/Bluetooth/USB sessions and byte-level
// rendering live behind this trait.

use async_trait::async_trait;

use thermopool_core::error::Result;
use thermopool_core::types::{JobId, PrinterId};
use thermopool_core::PrintRow;

/// Everything a transport needs to deliver one job.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundJob {
    /// Pending-job id when re-dispatching a queued job.
    pub job_id: Option<JobId>,
    pub rows: Vec<PrintRow>,
    /// Opaque metadata blob, passed through untouched.
    pub metadata: String,
}

/// A connection to one or more printers.
///
/// Implementations must be safe to call concurrently for different
/// identities.  The pool serializes calls for the same identity and bounds
/// each call with a timeout, so implementations need not do either.
#[async_trait]
pub trait PrinterTransport: Send + Sync {
    /// One connectivity attempt.  On success may report a display name
    /// learned from the device.
    async fn connect(&self, printer: &PrinterId) -> Result<Option<String>>;

    /// Deliver a job.
    async fn send(&self, printer: &PrinterId, job: &OutboundJob) -> Result<()>;
}

// ============================================================================
// Scripted transport for tests
// ============================================================================

pub mod mock {
    use std::collections::{HashMap, HashSet};
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;

    use super::*;
    use thermopool_core::error::PoolError;

    #[derive(Debug, Default)]
    struct Script {
        reachable: HashSet<PrinterId>,
        reject_sends: HashSet<PrinterId>,
        names: HashMap<PrinterId, String>,
        delays: HashMap<PrinterId, Duration>,
        delivered: Vec<(PrinterId, OutboundJob)>,
        connects: Vec<PrinterId>,
    }

    /// In-memory transport whose behaviour is set per printer.
    ///
    /// Printers are unreachable until `set_reachable(.., true)`.  A reachable
    /// printer accepts every job unless `reject_sends` was set for it.
    #[derive(Debug, Default)]
    pub struct ScriptedTransport {
        script: Mutex<Script>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_reachable(&self, printer: &str, reachable: bool) {
            let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
            if reachable {
                script.reachable.insert(printer.into());
            } else {
                script.reachable.remove(&PrinterId::from(printer));
            }
        }

        /// Accept connects but fail every send (e.g. paper out mid-job).
        pub fn reject_sends(&self, printer: &str, reject: bool) {
            let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
            if reject {
                script.reject_sends.insert(printer.into());
            } else {
                script.reject_sends.remove(&PrinterId::from(printer));
            }
        }

        pub fn set_name(&self, printer: &str, name: &str) {
            let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
            script.names.insert(printer.into(), name.to_string());
        }

        /// Make every call for this printer take `delay` before answering.
        pub fn set_delay(&self, printer: &str, delay: Duration) {
            let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
            script.delays.insert(printer.into(), delay);
        }

        /// Jobs accepted so far, in delivery order.
        pub fn delivered(&self) -> Vec<(PrinterId, OutboundJob)> {
            self.script.lock().unwrap_or_else(PoisonError::into_inner).delivered.clone()
        }

        pub fn delivered_to(&self, printer: &str) -> Vec<OutboundJob> {
            let printer = PrinterId::from(printer);
            self.delivered()
                .into_iter()
                .filter(|(p, _)| *p == printer)
                .map(|(_, job)| job)
                .collect()
        }

        /// Number of connect attempts made for a printer.
        pub fn connect_count(&self, printer: &str) -> usize {
            let printer = PrinterId::from(printer);
            let script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
            script.connects.iter().filter(|p| **p == printer).count()
        }

        fn delay_for(&self, printer: &PrinterId) -> Option<Duration> {
            self.script.lock().unwrap_or_else(PoisonError::into_inner).delays.get(printer).copied()
        }
    }

    #[async_trait]
    impl PrinterTransport for ScriptedTransport {
        async fn connect(&self, printer: &PrinterId) -> Result<Option<String>> {
            if let Some(delay) = self.delay_for(printer) {
                tokio::time::sleep(delay).await;
            }
            let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
            script.connects.push(printer.clone());
            if script.reachable.contains(printer) {
                Ok(script.names.get(printer).cloned())
            } else {
                Err(PoolError::transport(printer, "connection refused"))
            }
        }

        async fn send(&self, printer: &PrinterId, job: &OutboundJob) -> Result<()> {
            if let Some(delay) = self.delay_for(printer) {
                tokio::time::sleep(delay).await;
            }
            let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
            if !script.reachable.contains(printer) {
                return Err(PoolError::transport(printer, "connection refused"));
            }
            if script.reject_sends.contains(printer) {
                return Err(PoolError::transport(printer, "connection reset mid-send"));
            }
            script.delivered.push((printer.clone(), job.clone()));
            Ok(())
        }
    }
}
