// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the printer pool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PoolError, Result};
use crate::metadata::JobMetadata;
use crate::row::PrintRow;

/// Address-like key identifying one printer endpoint (e.g. `10.0.0.5` or
/// `10.0.0.5:9100`).  Immutable once a printer is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrinterId(String);

impl PrinterId {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Empty after trimming; such an identity can never address a device.
    pub fn is_blank(&self) -> bool {
        self.0.is_empty()
    }

    /// Display name given to a printer whose transport never reported one.
    pub fn fallback_name(&self) -> String {
        format!("PrinterName_{}", self.0)
    }
}

impl From<&str> for PrinterId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PrinterId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl std::fmt::Display for PrinterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a pending print job, stable across retries and
/// reroutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Snapshot of one registry entry, as returned by `list_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterStatus {
    #[serde(rename = "printerIp")]
    pub printer: PrinterId,
    pub is_reachable: bool,
    pub printer_name: String,
    /// When the last connectivity probe completed (successfully or not).
    pub last_probe: Option<DateTime<Utc>>,
}

/// A print job that failed immediate delivery and is held for retry.
///
/// The metadata is kept as the opaque serialized blob it arrived as; it is
/// only parsed when the queue is read for presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingJob {
    pub id: JobId,
    /// Owning printer.  Changes on reroute.
    pub printer: PrinterId,
    /// Registration epoch of `printer` when the job was queued.
    pub printer_epoch: u64,
    pub rows: Vec<PrintRow>,
    pub metadata: String,
    pub created_at: DateTime<Utc>,
    /// Number of re-dispatch attempts so far.
    pub retry_count: u32,
    /// Reason the most recent dispatch failed.
    pub last_error: Option<String>,
}

impl PendingJob {
    pub fn new(printer: PrinterId, printer_epoch: u64, rows: Vec<PrintRow>, metadata: String) -> Self {
        Self {
            id: JobId::new(),
            printer,
            printer_epoch,
            rows,
            metadata,
            created_at: Utc::now(),
            retry_count: 0,
            last_error: None,
        }
    }

    /// Parse the metadata blob into its structured form.
    pub fn parsed_metadata(&self) -> Result<JobMetadata> {
        JobMetadata::parse(&self.metadata).map_err(|reason| PoolError::MalformedMetadata {
            job_id: self.id,
            reason,
        })
    }
}

/// A queued job as presented to callers, with metadata materialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedJob {
    pub job_id: JobId,
    #[serde(rename = "printerIp")]
    pub printer: PrinterId,
    pub printer_name: String,
    pub metadata: JobMetadata,
    pub rows: Vec<PrintRow>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl QueuedJob {
    /// Build the presentation view of a pending job.  Fails if the job's
    /// metadata blob does not parse.
    pub fn materialize(job: &PendingJob, printer_name: String) -> Result<Self> {
        Ok(Self {
            job_id: job.id,
            printer: job.printer.clone(),
            printer_name,
            metadata: job.parsed_metadata()?,
            rows: job.rows.clone(),
            retry_count: job.retry_count,
            created_at: job.created_at,
            last_error: job.last_error.clone(),
        })
    }
}
