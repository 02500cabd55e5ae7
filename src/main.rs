// ===============================
// src/main.rs
// ===============================
/*
 # mock mode (no credentials needed)
 MIRROR_MODE=mock cargo run

 # ledger size & reconciliation activity
 curl -s localhost:9898/metrics | egrep '^(ledger_open_positions|reconciliations_total|orphans_closed_total)'
*/
/*
=============================================================================
Project : trade_mirror — source-to-destination trade mirroring engine in Rust
Module  : main.rs
Version : 0.1.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
License : MIT (see LICENSE)

Summary : Mirrors fills from a streaming source venue (OANDA v20) onto a
          request/response destination venue (DXtrade), scaled by account
          balance, with periodic and reactive reconciliation, session
          keep-alive, restart backoff, Prometheus metrics and a JSONL journal.
=============================================================================
*/
mod backoff;
mod config;
mod domain;
mod dxtrade;
mod feed;            // mock source venue
mod gateway;         // venue traits + paper destination
mod gateway_dxtrade; // real DXtrade REST
mod gateway_oanda;   // real OANDA v20 REST + transaction stream
mod ledger;
mod metrics;
mod mirror;
mod oanda;
mod reconcile;
mod recorder;
mod session;
mod supervisor;
mod translator;
#[cfg(test)]
mod testkit;

use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::MarketMode;
use crate::domain::Event;
use crate::gateway::{DestinationGateway, SourceGateway};
use crate::mirror::Mirror;

/// How long the recorder gets to drain and flush before the process exits.
const JOURNAL_DRAIN: Duration = Duration::from_secs(2);

/// stdout + append-only log file (no ANSI in the file).
fn init_logging(log_file: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (file_layer, file_err) = match OpenOptions::new().create(true).append(true).open(log_file) {
        Ok(f) => (Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(f))), None),
        Err(e) => (None, Some(e)),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    if let Some(e) = file_err {
        warn!(%log_file, error = %e, "log file unavailable, logging to stdout only");
    }
}

#[tokio::main]
async fn main() {
    // ---- Load config ----
    let args = match config::load() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("config error: {e}");
            std::process::exit(1);
        }
    };

    // ---- Logging ----
    init_logging(&args.log_file);

    info!(
        mode = %args.mode.as_str(),
        lot_size = args.lot_size,
        ping_after_s = args.session.ping_after.as_secs(),
        reconcile_after_s = args.session.reconcile_after.as_secs(),
        retry_base_ms = args.retry.base.as_millis() as u64,
        retry_max_ms = args.retry.max.as_millis() as u64,
        record_file = ?args.record_file,
        "startup config"
    );

    // ---- Metrics ----
    metrics::init();
    if args.metrics_port != 0 {
        metrics::serve_metrics(args.metrics_port);
    }

    // ---- Venues ----
    let (source, dest): (Arc<dyn SourceGateway>, Box<dyn DestinationGateway>) =
        match (&args.mode, args.oanda.clone(), args.dxtrade.clone()) {
            (MarketMode::Practice | MarketMode::Live, Some(oanda), Some(dx)) => (
                Arc::new(gateway_oanda::OandaSource::new(oanda)) as Arc<dyn SourceGateway>,
                Box::new(gateway_dxtrade::DxTradeDestination::new(dx)) as Box<dyn DestinationGateway>,
            ),
            _ => (
                Arc::new(feed::MockSource::new(feed::MOCK_SOURCE_BALANCE, args.mock_fill_every)) as Arc<dyn SourceGateway>,
                Box::new(gateway::PaperVenue::new(feed::MOCK_DEST_BALANCE)) as Box<dyn DestinationGateway>,
            ),
        };

    let mut mirror = Mirror::new(source, dest, args.lot_size);

    // ---- Recorder (optional) ----
    let mut recorder_task = None;
    if let Some(path) = args.record_file.clone() {
        let (rec_tx, rec_rx) = mpsc::channel::<Event>(1024);
        recorder_task = Some(tokio::spawn(recorder::run(rec_rx, path)));
        mirror = mirror.with_journal(rec_tx);
    }

    // ---- Shutdown ----
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            let _ = stop_tx.send(true);
        }
    });

    // ---- Session supervisor (background) ----
    let session_task = tokio::spawn(session::run(mirror.clone(), args.session.clone(), stop_rx.clone()));

    // ---- Stream supervisor (foreground) ----
    let code = match supervisor::run(mirror, args.retry.clone(), stop_rx).await {
        Ok(()) => {
            info!("stopped");
            0
        }
        Err(fatal) => {
            error!(severity = "critical", error = %fatal, "terminating");
            fatal.exit_code()
        }
    };

    // ---- Journal flush before exit ----
    recorder::finish(session_task, recorder_task, JOURNAL_DRAIN).await;
    if code != 0 {
        std::process::exit(code);
    }
}
