// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Background reachability monitor.
//
// Re-probes every registered printer at a fixed interval.  Printers are
// probed concurrently; a slow one only holds its own session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::events::{EventPublisher, PoolEvent};
use crate::prober::Prober;
use crate::registry::Registry;

/// Handle to a running monitor loop.
pub struct Monitor {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl Monitor {
    /// Start the loop on the current runtime.  The first sweep runs after
    /// one full interval.
    pub fn spawn(
        registry: Arc<Registry>,
        prober: Arc<Prober>,
        events: EventPublisher,
        interval: Duration,
    ) -> Self {
        let shutdown = Arc::new(Notify::new());
        let signal = Arc::clone(&shutdown);
        let task = tokio::spawn(async move {
            Self::run(registry, prober, events, interval, signal).await;
        });
        info!(interval_secs = interval.as_secs(), "reachability monitor started");
        Self { shutdown, task }
    }

    async fn run(
        registry: Arc<Registry>,
        prober: Arc<Prober>,
        events: EventPublisher,
        interval: Duration,
        shutdown: Arc<Notify>,
    ) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    debug!("monitor received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    Self::sweep(&registry, &prober, &events).await;
                }
            }
        }
    }

    async fn sweep(registry: &Registry, prober: &Arc<Prober>, events: &EventPublisher) {
        let printers = match registry.identities() {
            Ok(printers) => printers,
            Err(e) => {
                warn!(error = %e, "monitor could not list printers");
                return;
            }
        };
        let mut probes = JoinSet::new();
        for printer in printers {
            let prober = Arc::clone(prober);
            probes.spawn(async move {
                let report = prober.probe_report(&printer).await;
                (printer, report)
            });
        }
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((printer, Ok(report))) if report.went_down() => {
                    info!(printer = %printer, "printer dropped off");
                    events.publish(PoolEvent::PrinterUnreachable { printer });
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "probe task failed"),
            }
        }
    }

    /// Stop the loop and wait for the in-progress sweep to finish.
    pub async fn stop(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.task.await {
            warn!(error = %e, "monitor task ended abnormally");
        }
        info!("reachability monitor stopped");
    }
}
