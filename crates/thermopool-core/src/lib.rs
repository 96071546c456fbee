// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// thermopool core: types, errors and configuration shared by the pool and
// the binary.  Nothing in this crate performs I/O beyond config file access.

pub mod config;
pub mod error;
pub mod metadata;
pub mod row;
pub mod types;

pub use config::{AppConfig, PoolConfig, ReconnectConfig};
pub use error::PoolError;
pub use metadata::{JobKind, JobMetadata};
pub use row::PrintRow;
pub use types::*;
