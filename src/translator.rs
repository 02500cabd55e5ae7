// ===============================
// src/translator.rs (source fill -> mirrored open/close)
// ===============================
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::domain::{Event, FillClass, Position, Side, SourceEvent};
use crate::metrics::{MIRROR_CLOSES, MIRROR_OPENS, SOURCE_EVENTS};
use crate::mirror::{revive_session, Mirror, MirrorError, MirrorState};

/// `|units| * dest / source`, rounded to the nearest lot (half away from zero).
/// `None` when the balances cannot be used for scaling.
pub fn mirrored_size(units: f64, dest_balance: f64, source_balance: f64, lot: u64) -> Option<u64> {
    if !(source_balance.is_finite() && source_balance > 0.0) || !dest_balance.is_finite() || dest_balance < 0.0 {
        return None;
    }
    let raw = units.abs() * dest_balance / source_balance;
    let lot = lot.max(1) as f64;
    Some(((raw / lot).round() * lot) as u64)
}

impl Mirror {
    /// One source event. Errors other than `SessionLost` mean "restart the stream".
    pub async fn on_event(&self, ev: &SourceEvent) -> Result<(), MirrorError> {
        if !ev.is_fill() {
            SOURCE_EVENTS.with_label_values(&["unexpected"]).inc();
            error!(
                severity = "critical",
                symbol = %ev.instrument, kind = %ev.kind, reason = %ev.reason,
                "unexpected transaction"
            );
            return Ok(());
        }

        let mut st = self.lock().await;
        revive_session(st.dest.as_mut()).await.map_err(MirrorError::SessionLost)?;

        match ev.class() {
            FillClass::Open => {
                SOURCE_EVENTS.with_label_values(&["open"]).inc();
                self.mirror_open(&mut st, ev).await
            }
            FillClass::Close => {
                SOURCE_EVENTS.with_label_values(&["close"]).inc();
                self.mirror_close(&mut st, ev).await
            }
            FillClass::Unexpected => {
                SOURCE_EVENTS.with_label_values(&["unexpected"]).inc();
                error!(
                    severity = "critical",
                    symbol = %ev.instrument, kind = %ev.kind, reason = %ev.reason,
                    "unexpected transaction"
                );
                Ok(())
            }
        }
    }

    async fn mirror_open(&self, st: &mut MirrorState, ev: &SourceEvent) -> Result<(), MirrorError> {
        let symbol = ev.symbol();
        let Some(side) = Side::from_units(ev.units) else {
            debug!(%symbol, "zero-unit fill, nothing to mirror");
            return Ok(());
        };

        // saldo diambil baru setiap event
        let dest_balance = st.dest.balance().await?;
        let source_balance = self.source.balance().await?;
        let size = match mirrored_size(ev.units, dest_balance, source_balance, self.lot_size) {
            Some(0) => {
                warn!(%symbol, units = ev.units, dest_balance, source_balance, "mirrored size rounds to zero lots, skipped");
                return Ok(());
            }
            Some(size) => size,
            None => {
                warn!(%symbol, dest_balance, source_balance, "balances unusable for sizing, skipped");
                return Ok(());
            }
        };

        info!(%symbol, %side, base_size = ev.units.abs(), size, "opening");
        let reference = st.dest.open(&symbol, side, size).await?;
        let position = Position { size, side, reference };
        if let Some(prev) = st.ledger.upsert(symbol.clone(), position.clone()) {
            warn!(%symbol, lost_reference = %prev.reference, "ledger already held this symbol, entry overwritten");
        }
        MIRROR_OPENS.inc();
        self.record(Event::Opened { ts: Utc::now(), symbol, position, source_units: ev.units });
        st.ledger.log_listing();
        Ok(())
    }

    async fn mirror_close(&self, st: &mut MirrorState, ev: &SourceEvent) -> Result<(), MirrorError> {
        let symbol = ev.symbol();
        let Some(position) = st.ledger.get(&symbol).cloned() else {
            error!(%symbol, reason = %ev.reason, "close notification for a symbol not in the ledger, starting reconciliation");
            self.record(Event::Untracked { ts: Utc::now(), symbol, reason: ev.reason.clone() });
            if let Err(e) = self.reconcile_locked(st).await {
                error!(error = %e, "reconciliation after untracked close failed");
            }
            return Ok(());
        };

        info!(%symbol, side = %position.side, size = position.size, "closing");
        st.dest.close(&symbol, position.side, position.size, &position.reference).await?;
        st.ledger.remove(&symbol);
        MIRROR_CLOSES.inc();
        self.record(Event::Closed { ts: Utc::now(), symbol, position, reason: ev.reason.clone() });
        st.ledger.log_listing();
        Ok(())
    }
}
