// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Automatic reconnect policy.
//
// Listens for `PrinterUnreachable` and runs one backoff loop per printer.
// Each attempt calls `PrinterPool::reconnect`, which flushes the printer's
// queue once it answers again.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use thermopool_core::config::ReconnectConfig;
use thermopool_core::types::PrinterId;
use thermopool_print::retry::{RetryDecision, should_retry};
use thermopool_print::{PoolEvent, PrinterPool, Subscription};

type Active = Arc<Mutex<HashSet<PrinterId>>>;

pub struct Reconnector {
    subscription: Subscription,
    task: JoinHandle<()>,
}

impl Reconnector {
    /// Subscribe to `pool` and start reacting to unreachable printers.
    pub fn spawn(pool: Arc<PrinterPool>, config: ReconnectConfig) -> Self {
        let (subscription, events) = pool.subscribe_channel();
        let task = tokio::spawn(run(pool, config, events));
        Self { subscription, task }
    }

    /// Stop listening and abort any loop still waiting out its backoff.
    pub async fn stop(self) {
        self.subscription.unsubscribe();
        if let Err(e) = self.task.await {
            warn!(error = %e, "reconnect task ended abnormally");
        }
    }
}

async fn run(
    pool: Arc<PrinterPool>,
    config: ReconnectConfig,
    mut events: UnboundedReceiver<PoolEvent>,
) {
    let active: Active = Arc::default();
    let mut loops = JoinSet::new();

    // Ends when the subscription is dropped or the pool shuts down.
    while let Some(event) = events.recv().await {
        while loops.try_join_next().is_some() {}

        let PoolEvent::PrinterUnreachable { printer } = event else {
            continue;
        };
        if !claim(&active, &printer) {
            debug!(printer = %printer, "reconnect already scheduled");
            continue;
        }
        info!(printer = %printer, "printer unreachable, scheduling reconnect");
        loops.spawn(reconnect_loop(
            Arc::clone(&pool),
            config.clone(),
            printer,
            Arc::clone(&active),
        ));
    }

    loops.shutdown().await;
    debug!("reconnect policy stopped");
}

async fn reconnect_loop(
    pool: Arc<PrinterPool>,
    config: ReconnectConfig,
    printer: PrinterId,
    active: Active,
) {
    let mut attempt = 0;
    loop {
        let delay = match should_retry(attempt, &config) {
            RetryDecision::RetryAfter(delay) => delay,
            RetryDecision::Exhausted => {
                warn!(printer = %printer, attempts = attempt, "giving up on reconnect");
                break;
            }
        };
        tokio::time::sleep(delay).await;

        // A flush that fails again leaves the printer unreachable; keep going.
        if pool.reconnect(printer.clone()).await && is_reachable(&pool, &printer) {
            info!(printer = %printer, attempt, "printer reconnected");
            break;
        }
        attempt += 1;
    }
    release(&active, &printer);
}

fn is_reachable(pool: &PrinterPool, printer: &PrinterId) -> bool {
    pool.list_status()
        .iter()
        .any(|s| &s.printer == printer && s.is_reachable)
}

fn claim(active: &Active, printer: &PrinterId) -> bool {
    active
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(printer.clone())
}

fn release(active: &Active, printer: &PrinterId) {
    active
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(printer);
}
