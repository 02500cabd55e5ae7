// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Source events --------
pub static SOURCE_EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("source_events_total", "source transactions by class (open|close|unexpected)"),
        &["class"],
    )
    .unwrap()
});

// -------- Mirroring --------
pub static MIRROR_OPENS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("mirror_opens_total", "positions opened on destination").unwrap());

pub static MIRROR_CLOSES: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("mirror_closes_total", "positions closed on destination").unwrap());

pub static LEDGER_OPEN: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("ledger_open_positions", "entries in the mirror ledger").unwrap());

// -------- Reconciliation --------
pub static RECONCILIATIONS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("reconciliations_total", "reconciliation passes").unwrap());

pub static ORPHANS_CLOSED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("orphans_closed_total", "orphan destination positions closed").unwrap());

pub static ORPHAN_CLOSE_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("orphan_close_failures_total", "orphan closes the destination refused").unwrap()
});

// -------- Sessions / stream health --------
pub static STREAM_RESTARTS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("stream_restarts_total", "source stream reconnect cycles").unwrap());

pub static STREAM_CONNECTED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("stream_connected", "1 while consuming the source transaction stream").unwrap()
});

pub static SESSION_RELOGINS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("session_relogins_total", "destination re-logins after a failed ping").unwrap()
});

pub static SESSION_HEALTHY: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("session_healthy", "1 if the last background ping (or re-login) succeeded").unwrap()
});

// -------- Journal --------
pub static JOURNAL_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("journal_dropped_total", "journal events dropped because the recorder lagged").unwrap()
});

pub fn init() {
    for m in [
        REGISTRY.register(Box::new(SOURCE_EVENTS.clone())),
        REGISTRY.register(Box::new(MIRROR_OPENS.clone())),
        REGISTRY.register(Box::new(MIRROR_CLOSES.clone())),
        REGISTRY.register(Box::new(LEDGER_OPEN.clone())),
        REGISTRY.register(Box::new(RECONCILIATIONS.clone())),
        REGISTRY.register(Box::new(ORPHANS_CLOSED.clone())),
        REGISTRY.register(Box::new(ORPHAN_CLOSE_FAILURES.clone())),
        REGISTRY.register(Box::new(STREAM_RESTARTS.clone())),
        REGISTRY.register(Box::new(STREAM_CONNECTED.clone())),
        REGISTRY.register(Box::new(SESSION_RELOGINS.clone())),
        REGISTRY.register(Box::new(SESSION_HEALTHY.clone())),
        REGISTRY.register(Box::new(JOURNAL_DROPPED.clone())),
    ] {
        if let Err(e) = m {
            tracing::warn!(error = %e, "metric registration failed");
        }
    }
    SESSION_HEALTHY.set(1);
}

// Encode all metrics in Prometheus text format
fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Serve one HTTP request (GET / or /metrics), minimal HTTP/1.1 responder
fn handle_client(mut stream: TcpStream) {
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// Dedicated OS thread, keeps the Tokio runtime clean
pub fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(%addr, error = %e, "metrics bind failed, exporter disabled");
                return;
            }
        };
        tracing::info!("metrics listening on http://{addr}/ (and /metrics)");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => tracing::warn!(error = %e, "metrics accept error"),
            }
        }
    });
}
