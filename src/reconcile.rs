// ===============================
// src/reconcile.rs
// ===============================
//
// Ledger = f(source snapshot, destination snapshot).
// - destination snapshot says what exists
// - source snapshot says what should exist
// - destination positions without a {symbol, side} match on source are orphans
//
use ahash::AHashSet as HashSet;
use chrono::Utc;
use tracing::{error, info};

use crate::domain::{DestinationPosition, Event, SourcePosition};
use crate::gateway::{GatewayError, SourceGateway};
use crate::ledger::Ledger;
use crate::metrics::{ORPHANS_CLOSED, ORPHAN_CLOSE_FAILURES};
use crate::mirror::MirrorState;

#[derive(Debug, Default)]
pub struct ReconcilePlan {
    pub ledger: Ledger,
    pub orphans: Vec<DestinationPosition>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub confirmed: usize,
    pub orphans: usize,
    pub close_failures: usize,
}

/// Pure part: no I/O.
pub fn plan(source: &[SourcePosition], dest: Vec<DestinationPosition>) -> ReconcilePlan {
    let wanted: HashSet<(&str, _)> = source.iter().map(|p| (p.symbol.as_str(), p.side)).collect();
    let mut out = ReconcilePlan::default();
    for d in dest {
        if wanted.contains(&(d.symbol.as_str(), d.side)) {
            out.ledger.upsert(d.symbol.clone(), d.to_position());
        } else {
            out.orphans.push(d);
        }
    }
    out
}

/// Fetch both snapshots, close orphans (best effort), swap the ledger.
/// On a snapshot error the ledger is left untouched.
pub async fn run(
    source: &dyn SourceGateway,
    st: &mut MirrorState,
    mut record: impl FnMut(Event),
) -> Result<ReconcileReport, GatewayError> {
    let src = source.open_positions().await?;
    let dst = st.dest.open_positions().await?;
    let ReconcilePlan { ledger, orphans } = plan(&src, dst);

    let mut report = ReconcileReport { confirmed: ledger.len(), orphans: orphans.len(), close_failures: 0 };
    for o in orphans {
        info!(symbol = %o.symbol, side = %o.side, size = o.quantity, "found orphan destination position, closing");
        let ok = match st.dest.close(&o.symbol, o.side, o.quantity, &o.reference).await {
            Ok(()) => {
                ORPHANS_CLOSED.inc();
                true
            }
            Err(e) => {
                error!(symbol = %o.symbol, error = %e, "orphan close failed");
                ORPHAN_CLOSE_FAILURES.inc();
                report.close_failures += 1;
                false
            }
        };
        record(Event::OrphanClosed { ts: Utc::now(), position: o, ok });
    }

    st.ledger.replace(ledger);
    record(Event::Reconciled { ts: Utc::now(), confirmed: report.confirmed, orphans: report.orphans });
    Ok(report)
}
