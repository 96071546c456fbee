// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer: builds and initialises the printer pool from the
// loaded config, registers the configured printers and owns the reconnect
// policy.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use thermopool_core::AppConfig;
use thermopool_core::error::Result;
use thermopool_core::types::PrinterStatus;
use thermopool_print::{PrinterPool, PrinterTransport};
use tracing::{error, info, warn};

use super::data_dir;
use super::reconnect::Reconnector;

/// Shared handles for the running daemon.  Cheap to clone.
#[derive(Clone)]
pub struct AppServices {
    pool: Arc<PrinterPool>,
    config: Arc<Mutex<AppConfig>>,
    data_dir: PathBuf,
}

impl AppServices {
    /// Start services in `dir` with an already loaded `config`.
    ///
    /// Initialises the pool with a journal in the data directory unless the
    /// config names one, and registers every configured printer.  If the
    /// journal cannot be opened the pool falls back to an in-memory queue.
    pub async fn start(
        dir: PathBuf,
        config: AppConfig,
        transport: Arc<dyn PrinterTransport>,
    ) -> Result<Self> {
        info!(path = %dir.display(), "initialising app services");

        let mut pool_config = config.pool.clone();
        if pool_config.journal_path.is_none() {
            pool_config.journal_path = Some(data_dir::journal_path(&dir));
        }

        let pool = PrinterPool::new(pool_config.clone(), Arc::clone(&transport));
        let pool = match pool.try_initialize().await {
            Ok(()) => pool,
            Err(e) => {
                error!(error = %e, "persistent queue unavailable, using in-memory fallback");
                pool.shutdown().await;
                pool_config.journal_path = None;
                let fallback = PrinterPool::new(pool_config, transport);
                fallback.try_initialize().await?;
                fallback
            }
        };

        let services = Self {
            pool: Arc::new(pool),
            config: Arc::new(Mutex::new(config)),
            data_dir: dir,
        };
        services.register_configured().await;
        info!("app services initialised");
        Ok(services)
    }

    async fn register_configured(&self) {
        let printers = self.config().printers;
        for printer in printers {
            if self.pool.add_printer(printer.as_str()).await {
                info!(printer = %printer, "printer online");
            } else {
                warn!(printer = %printer, "printer registered but not reachable");
            }
        }
    }

    pub fn pool(&self) -> &Arc<PrinterPool> {
        &self.pool
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Snapshot of the current config.
    pub fn config(&self) -> AppConfig {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Register a printer now and remember it for the next start.
    pub async fn add_printer(&self, printer: &str) -> Result<bool> {
        let reachable = self.pool.add_printer(printer).await;
        let snapshot = {
            let mut config = self.config.lock().unwrap_or_else(PoisonError::into_inner);
            if config.printers.iter().any(|p| p == printer) {
                return Ok(reachable);
            }
            config.printers.push(printer.to_string());
            config.clone()
        };
        snapshot.save(&data_dir::config_path(&self.data_dir))?;
        Ok(reachable)
    }

    /// Start the automatic reconnect policy if the config enables it.
    pub fn start_reconnect(&self) -> Option<Reconnector> {
        let config = self.config();
        if !config.auto_reconnect {
            info!("automatic reconnect disabled");
            return None;
        }
        Some(Reconnector::spawn(Arc::clone(&self.pool), config.reconnect))
    }

    pub fn status(&self) -> Vec<PrinterStatus> {
        self.pool.list_status()
    }

    /// Printer status as a JSON array, for the log.
    pub fn status_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.status())?)
    }

    pub async fn shutdown(&self, reconnector: Option<Reconnector>) {
        if let Some(reconnector) = reconnector {
            reconnector.stop().await;
        }
        let pending = self.pool.pending_jobs().len();
        self.pool.shutdown().await;
        info!(pending, "app services stopped");
    }
}
