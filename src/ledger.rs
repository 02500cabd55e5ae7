// ===============================
// src/ledger.rs (mirrored positions, keyed by symbol)
// ===============================
use ahash::AHashMap as HashMap;
use tracing::info;

use crate::domain::Position;
use crate::metrics::LEDGER_OPEN;

/// What the destination venue is believed to hold. At most one entry per symbol.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    open: HashMap<String, Position>,
}

impl Ledger {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, symbol: &str) -> Option<&Position> { self.open.get(symbol) }

    #[cfg(test)]
    pub fn contains(&self, symbol: &str) -> bool { self.open.contains_key(symbol) }

    /// Insert or overwrite. Returns the entry that was replaced, if any.
    pub fn upsert(&mut self, symbol: String, pos: Position) -> Option<Position> {
        let prev = self.open.insert(symbol, pos);
        LEDGER_OPEN.set(self.open.len() as i64);
        prev
    }

    pub fn remove(&mut self, symbol: &str) -> Option<Position> {
        let prev = self.open.remove(symbol);
        LEDGER_OPEN.set(self.open.len() as i64);
        prev
    }

    /// Wholesale swap, used by reconciliation.
    pub fn replace(&mut self, rebuilt: Ledger) {
        self.open = rebuilt.open;
        LEDGER_OPEN.set(self.open.len() as i64);
    }

    pub fn len(&self) -> usize { self.open.len() }

    pub fn is_empty(&self) -> bool { self.open.is_empty() }

    /// Sorted copy, stable for listing and comparisons.
    pub fn snapshot(&self) -> Vec<(String, Position)> {
        let mut out: Vec<(String, Position)> =
            self.open.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn log_listing(&self) {
        if self.is_empty() {
            info!("current open trades: (none)");
            return;
        }
        info!(count = self.open.len(), "current open trades:");
        for (symbol, p) in self.snapshot() {
            info!(%symbol, size = p.size, side = %p.side, reference = %p.reference, "  open trade");
        }
    }
}
