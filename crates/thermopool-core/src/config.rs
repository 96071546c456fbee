// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pool and application configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, Result};

/// Settings for one `PrinterPool`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound for a single connectivity probe.
    pub probe_timeout_ms: u64,
    /// Upper bound for a single job transmission.
    pub send_timeout_ms: u64,
    /// Maximum number of probes/sends in flight across all printers.
    pub max_concurrent_io: usize,
    /// Re-probe every registered printer at this interval (seconds).
    /// Disabled when unset.
    pub monitor_interval_secs: Option<u64>,
    /// Pause after each successful print according to the job type.
    pub settle_after_print: bool,
    /// Port used for identities that do not carry one.
    pub default_port: u16,
    /// SQLite journal mirroring the pending job store.  In-memory only when
    /// unset.
    pub journal_path: Option<PathBuf>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 3_000,
            send_timeout_ms: 10_000,
            max_concurrent_io: 8,
            monitor_interval_secs: None,
            settle_after_print: true,
            default_port: 9100,
            journal_path: None,
        }
    }
}

impl PoolConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn monitor_interval(&self) -> Option<Duration> {
        self.monitor_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Reject settings that would make the pool unusable.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_io == 0 {
            return Err(PoolError::Config("max_concurrent_io must be at least 1".into()));
        }
        if self.probe_timeout_ms == 0 || self.send_timeout_ms == 0 {
            return Err(PoolError::Config("timeouts must be non-zero".into()));
        }
        Ok(())
    }
}

/// Backoff used by the binary's automatic reconnect policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 2_000,
            max_delay_ms: 120_000,
        }
    }
}

/// Persistent settings for the `thermopool` binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pool: PoolConfig,
    /// Printers registered at start-up.
    pub printers: Vec<String>,
    /// Try to reconnect automatically when a printer drops off.
    pub auto_reconnect: bool,
    pub reconnect: ReconnectConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            printers: Vec::new(),
            auto_reconnect: true,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from a JSON file.  A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(data) => {
                let config: Self = serde_json::from_str(&data)?;
                config.pool.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(PoolError::Io(e)),
        }
    }

    /// Write as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
