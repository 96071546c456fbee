// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raw TCP transport (JetDirect, port 9100).
//
// Open a socket and write the encoded job.  Most network receipt printers
// accept ESC/POS this way.  A probe is a connect followed by an immediate
// close; the printer reports no name.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};

use thermopool_core::error::{PoolError, Result};
use thermopool_core::types::PrinterId;

use crate::escpos::RowEncoder;
use crate::transport::{OutboundJob, PrinterTransport};

/// Default raw TCP port (HP JetDirect).
pub const RAW_PORT: u16 = 9100;

const CHUNK_SIZE: usize = 8192;

pub struct RawTcpTransport {
    encoder: Arc<dyn RowEncoder>,
    default_port: u16,
}

impl RawTcpTransport {
    pub fn new(encoder: Arc<dyn RowEncoder>, default_port: u16) -> Self {
        Self {
            encoder,
            default_port,
        }
    }

    /// `10.0.0.5` becomes `10.0.0.5:<default_port>`; an explicit port wins.
    fn address(&self, printer: &PrinterId) -> String {
        let raw = printer.as_str();
        if raw.parse::<SocketAddr>().is_ok() {
            return raw.to_string();
        }
        // Bare IPv6 literal.
        if raw.parse::<std::net::Ipv6Addr>().is_ok() {
            return format!("[{raw}]:{}", self.default_port);
        }
        match raw.rsplit_once(':') {
            Some((_, port)) if port.parse::<u16>().is_ok() => raw.to_string(),
            _ => format!("{raw}:{}", self.default_port),
        }
    }

    async fn open(&self, printer: &PrinterId) -> Result<TcpStream> {
        let addr = self.address(printer);
        debug!(addr = %addr, "connecting via raw TCP");
        TcpStream::connect(&addr)
            .await
            .map_err(|e| PoolError::transport(printer, format!("connect {addr}: {e}")))
    }
}

#[async_trait]
impl PrinterTransport for RawTcpTransport {
    async fn connect(&self, printer: &PrinterId) -> Result<Option<String>> {
        let mut stream = self.open(printer).await?;
        // Best effort; the connect already answered the question.
        let _ = stream.shutdown().await;
        Ok(None)
    }

    async fn send(&self, printer: &PrinterId, job: &OutboundJob) -> Result<()> {
        let bytes = self.encoder.encode(&job.rows)?;
        let mut stream = self.open(printer).await?;

        let mut sent = 0;
        for chunk in bytes.chunks(CHUNK_SIZE) {
            stream.write_all(chunk).await.map_err(|e| {
                PoolError::transport(printer, format!("send failed at byte {sent}: {e}"))
            })?;
            sent += chunk.len();
            debug!(sent, total = bytes.len(), "raw TCP progress");
        }

        stream
            .flush()
            .await
            .map_err(|e| PoolError::transport(printer, format!("flush: {e}")))?;
        stream
            .shutdown()
            .await
            .map_err(|e| PoolError::transport(printer, format!("shutdown: {e}")))?;

        info!(printer = %printer, total = bytes.len(), "raw TCP job sent");
        Ok(())
    }
}
