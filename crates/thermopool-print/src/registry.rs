// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer registry.
//
// The authoritative set of known printers and their last observed
// reachability.  Each identity also owns a session lock that serializes every
// transport operation against it (probe, send, settle).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use thermopool_core::error::{PoolError, Result};
use thermopool_core::types::{PrinterId, PrinterStatus};

/// Serializes transport work for one identity.
pub type SessionLock = Arc<tokio::sync::Mutex<()>>;

struct Record {
    display_name: String,
    reachable: bool,
    last_probe: Option<DateTime<Utc>>,
    epoch: u64,
}

#[derive(Default)]
struct RegistryInner {
    next_epoch: u64,
    /// Registration order, for stable listings.
    order: Vec<PrinterId>,
    printers: HashMap<PrinterId, Record>,
    /// Session locks outlive registrations so a removal never races a
    /// dispatch holding the old lock.
    sessions: HashMap<PrinterId, SessionLock>,
}

/// Result of `Registry::register`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub epoch: u64,
    /// False when the identity was already registered.
    pub created: bool,
}

#[derive(Default)]
pub struct Registry {
    inner: Mutex<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, RegistryInner>> {
        self.inner.lock().map_err(|_| PoolError::Poisoned("registry"))
    }

    /// Register an identity.  Idempotent: an existing entry keeps its state
    /// and epoch.  Blank identities are refused.
    pub fn register(&self, printer: &PrinterId) -> Result<Registration> {
        if printer.is_blank() {
            return Err(PoolError::InvalidPrinter(printer.to_string()));
        }
        let mut inner = self.lock()?;
        if let Some(record) = inner.printers.get(printer) {
            return Ok(Registration {
                epoch: record.epoch,
                created: false,
            });
        }
        inner.next_epoch += 1;
        let epoch = inner.next_epoch;
        inner.order.push(printer.clone());
        inner.printers.insert(
            printer.clone(),
            Record {
                display_name: String::new(),
                reachable: false,
                last_probe: None,
                epoch,
            },
        );
        info!(printer = %printer, epoch, "printer registered");
        Ok(Registration {
            epoch,
            created: true,
        })
    }

    /// Drop an identity.  Returns false if it was not registered.
    pub fn remove(&self, printer: &PrinterId) -> Result<bool> {
        let mut inner = self.lock()?;
        if inner.printers.remove(printer).is_none() {
            return Ok(false);
        }
        inner.order.retain(|p| p != printer);
        info!(printer = %printer, "printer removed");
        Ok(true)
    }

    pub fn contains(&self, printer: &PrinterId) -> bool {
        self.lock()
            .map(|inner| inner.printers.contains_key(printer))
            .unwrap_or(false)
    }

    /// Current registration epoch, or `None` if unregistered.
    pub fn epoch(&self, printer: &PrinterId) -> Option<u64> {
        self.lock().ok()?.printers.get(printer).map(|r| r.epoch)
    }

    pub fn is_reachable(&self, printer: &PrinterId) -> bool {
        self.lock()
            .ok()
            .and_then(|inner| inner.printers.get(printer).map(|r| r.reachable))
            .unwrap_or(false)
    }

    /// Record the outcome of a probe.  A learned name replaces the current
    /// one; a successful probe without one falls back to `PrinterName_<id>`
    /// if no name is known yet.  Returns the previous reachability, or
    /// `None` when the identity is not registered.
    pub fn record_probe(
        &self,
        printer: &PrinterId,
        reachable: bool,
        learned_name: Option<String>,
    ) -> Result<Option<bool>> {
        let mut inner = self.lock()?;
        let Some(record) = inner.printers.get_mut(printer) else {
            return Ok(None);
        };
        let previous = record.reachable;
        record.reachable = reachable;
        record.last_probe = Some(Utc::now());
        if reachable {
            match learned_name.filter(|n| !n.trim().is_empty()) {
                Some(name) => record.display_name = name,
                None if record.display_name.is_empty() => {
                    record.display_name = printer.fallback_name();
                }
                None => {}
            }
        }
        debug!(printer = %printer, reachable, "probe recorded");
        Ok(Some(previous))
    }

    /// Set reachability without touching the probe timestamp (dispatch
    /// outcomes).  Returns the previous value, or `None` if unregistered.
    pub fn set_reachable(&self, printer: &PrinterId, reachable: bool) -> Result<Option<bool>> {
        let mut inner = self.lock()?;
        Ok(inner.printers.get_mut(printer).map(|record| {
            let previous = record.reachable;
            record.reachable = reachable;
            previous
        }))
    }

    pub fn display_name(&self, printer: &PrinterId) -> String {
        self.lock()
            .ok()
            .and_then(|inner| inner.printers.get(printer).map(|r| r.display_name.clone()))
            .unwrap_or_default()
    }

    /// Registered identities in registration order.
    pub fn identities(&self) -> Result<Vec<PrinterId>> {
        Ok(self.lock()?.order.clone())
    }

    /// Snapshot of every entry, in registration order.
    pub fn list_status(&self) -> Result<Vec<PrinterStatus>> {
        let inner = self.lock()?;
        Ok(inner
            .order
            .iter()
            .filter_map(|id| {
                inner.printers.get(id).map(|r| PrinterStatus {
                    printer: id.clone(),
                    is_reachable: r.reachable,
                    printer_name: r.display_name.clone(),
                    last_probe: r.last_probe,
                })
            })
            .collect())
    }

    /// Session lock for an identity, created on first use.
    pub fn session(&self, printer: &PrinterId) -> Result<SessionLock> {
        let mut inner = self.lock()?;
        Ok(Arc::clone(inner.sessions.entry(printer.clone()).or_default()))
    }
}
