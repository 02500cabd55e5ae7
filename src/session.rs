// ===============================
// src/session.rs (background keep-alive + periodic reconciliation)
// ===============================
use tokio::sync::watch;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::metrics::SESSION_HEALTHY;
use crate::mirror::Mirror;
use crate::supervisor::stop_requested;

#[derive(Debug, Clone)]
pub struct SessionCfg {
    pub check_every: Duration,
    pub ping_after: Duration,
    pub reconcile_after: Duration,
}

impl Default for SessionCfg {
    fn default() -> Self {
        Self {
            check_every: Duration::from_secs(60),
            ping_after: Duration::from_secs(10 * 60),
            reconcile_after: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub pinged: bool,
    pub reconciled: bool,
}

pub struct SessionSupervisor {
    mirror: Mirror,
    cfg: SessionCfg,
    last_ping: Instant,
    last_reconcile: Instant,
    healthy: bool,
}

impl SessionSupervisor {
    pub fn new(mirror: Mirror, cfg: SessionCfg, now: Instant) -> Self {
        Self { mirror, cfg, last_ping: now, last_reconcile: now, healthy: true }
    }

    pub fn is_healthy(&self) -> bool { self.healthy }

    /// One check. `now` is passed in so tests can drive the clock.
    pub async fn on_tick(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();

        if now.saturating_duration_since(self.last_ping) > self.cfg.ping_after {
            debug!("background ping");
            self.healthy = self.mirror.keep_alive().await;
            SESSION_HEALTHY.set(self.healthy as i64);
            self.last_ping = now;
            report.pinged = true;
        }

        // sesi mati -> tunda rekonsiliasi sampai ping berikutnya sukses
        if self.healthy && now.saturating_duration_since(self.last_reconcile) > self.cfg.reconcile_after {
            debug!("background reconciliation");
            if let Err(e) = self.mirror.reconcile().await {
                error!(error = %e, "background reconciliation failed");
            }
            self.last_reconcile = now;
            report.reconciled = true;
        }
        report
    }
}

pub async fn run(mirror: Mirror, cfg: SessionCfg, mut stop: watch::Receiver<bool>) {
    let mut tick = interval(cfg.check_every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick.tick().await; // first tick fires immediately

    let mut sup = SessionSupervisor::new(mirror, cfg, Instant::now());
    info!("session supervisor started");
    loop {
        tokio::select! {
            _ = stop_requested(&mut stop) => {
                info!("session supervisor stopped");
                return;
            }
            _ = tick.tick() => {
                let was_healthy = sup.is_healthy();
                let report = sup.on_tick(Instant::now()).await;
                if report.pinged && sup.is_healthy() != was_healthy {
                    info!(healthy = sup.is_healthy(), "destination session health changed");
                }
            }
        }
    }
}
