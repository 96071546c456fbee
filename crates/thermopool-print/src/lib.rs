// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// thermopool-print: a pool of network receipt printers with a pending-job
// queue, reroute/retry and reachability events.

pub mod dispatcher;
pub mod escpos;
pub mod events;
pub mod journal;
pub mod link;
pub mod monitor;
pub mod pool;
pub mod prober;
pub mod raw_tcp;
pub mod registry;
pub mod reroute;
pub mod retry;
pub mod store;
pub mod transport;

pub use dispatcher::DispatchOutcome;
pub use events::{PoolEvent, Subscription};
pub use pool::PrinterPool;
pub use reroute::SweepReport;
pub use transport::{OutboundJob, PrinterTransport};
