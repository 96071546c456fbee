// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Thermopool: receipt printer pool daemon
//
// Entry point. Initialises logging, brings up the printer pool over raw TCP,
// registers the configured printers and runs until Ctrl-C.

mod services;

use std::process::ExitCode;
use std::sync::Arc;

use thermopool_print::escpos::EscPosEncoder;
use thermopool_print::raw_tcp::RawTcpTransport;

use services::app_services::AppServices;
use services::data_dir;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("thermopool starting");

    let dir = data_dir::data_dir();
    let config = match thermopool_core::AppConfig::load(&data_dir::config_path(&dir)) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "could not load config");
            return ExitCode::FAILURE;
        }
    };
    let transport = Arc::new(RawTcpTransport::new(
        Arc::new(EscPosEncoder::default()),
        config.pool.default_port,
    ));

    let svc = match AppServices::start(dir, config, transport).await {
        Ok(svc) => svc,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    match svc.status_json() {
        Ok(status) => tracing::info!(%status, "printer status"),
        Err(e) => tracing::warn!(error = %e, "could not render printer status"),
    }
    let queued = svc.pool().pending_jobs().len();
    if queued > 0 {
        tracing::info!(queued, data_dir = %svc.data_dir().display(), "restored queued jobs");
    }

    let reconnector = svc.start_reconnect();

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "could not listen for Ctrl-C");
    }
    tracing::info!("shutting down");
    svc.shutdown(reconnector).await;
    ExitCode::SUCCESS
}
