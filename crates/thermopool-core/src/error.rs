// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error type for the printer pool.

use thiserror::Error;

use crate::types::{JobId, PrinterId};

/// Top-level error type for all pool operations.
///
/// Nothing here is fatal to the pool: the `PrinterPool` facade turns every
/// variant into a `false` / empty / `Rejected` result after logging it.
#[derive(Debug, Error)]
pub enum PoolError {
    // -- Transport --
    #[error("transport error for {printer}: {detail}")]
    Transport { printer: PrinterId, detail: String },

    #[error("{operation} on {printer} timed out after {millis}ms")]
    Timeout {
        printer: PrinterId,
        operation: &'static str,
        millis: u64,
    },

    #[error("row encoding failed: {0}")]
    Encoding(String),

    // -- Lookup --
    #[error("invalid printer identity {0:?}")]
    InvalidPrinter(String),

    #[error("printer {0} is not registered")]
    PrinterNotFound(PrinterId),

    #[error("job {0} not found")]
    JobNotFound(JobId),

    #[error("job {0} is already queued or in flight")]
    JobBusy(JobId),

    // -- Pending job data --
    #[error("malformed metadata for job {job_id}: {reason}")]
    MalformedMetadata { job_id: JobId, reason: String },

    // -- Lifecycle / resources --
    #[error("no async runtime available: {0}")]
    RuntimeUnavailable(String),

    #[error("printer pool has been shut down")]
    ShutDown,

    #[error("internal lock poisoned: {0}")]
    Poisoned(&'static str),

    // -- Storage / persistence --
    #[error("journal error: {0}")]
    Journal(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PoolError {
    /// Convenience constructor for transport failures.
    pub fn transport(printer: &PrinterId, detail: impl Into<String>) -> Self {
        Self::Transport {
            printer: printer.clone(),
            detail: detail.into(),
        }
    }

    /// Whether this error came from talking to a device (as opposed to a
    /// lookup or bookkeeping failure inside the pool).
    pub fn is_device_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Timeout { .. } | Self::Encoding(_) | Self::Io(_)
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PoolError>;
