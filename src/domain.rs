// ===============================
// src/domain.rs
// ===============================
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ORDER_FILL: &str = "ORDER_FILL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side { Long, Short }

impl Side {
    /// Arah dari tanda units: positif -> Long, negatif -> Short, nol -> tidak ada aksi.
    pub fn from_units(units: f64) -> Option<Side> {
        if units > 0.0 {
            Some(Side::Long)
        } else if units < 0.0 {
            Some(Side::Short)
        } else {
            None
        }
    }

    pub fn opposite(&self) -> Side {
        match self { Side::Long => Side::Short, Side::Short => Side::Long }
    }

    /// Order side label used by the venues ("BUY"/"SELL").
    pub fn order_side(&self) -> &'static str {
        match self { Side::Long => "BUY", Side::Short => "SELL" }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.order_side())
    }
}

/// One mirrored position as the destination venue knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position { pub size: u64, pub side: Side, pub reference: String }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEvent {
    pub kind: String,
    pub reason: String,
    pub instrument: String,
    pub units: f64,
    pub time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillClass { Open, Close, Unexpected }

impl SourceEvent {
    pub fn fill(reason: &str, instrument: &str, units: f64) -> Self {
        Self {
            kind: ORDER_FILL.to_string(),
            reason: reason.to_string(),
            instrument: instrument.to_string(),
            units,
            time: Some(Utc::now()),
        }
    }

    pub fn is_fill(&self) -> bool { self.kind == ORDER_FILL }

    pub fn class(&self) -> FillClass {
        match self.reason.as_str() {
            "MARKET_ORDER" => FillClass::Open,
            "MARKET_ORDER_TRADE_CLOSE"
            | "TAKE_PROFIT_ORDER"
            | "STOP_LOSS_ORDER"
            | "MARKET_IF_TOUCHED_ORDER" => FillClass::Close,
            _ => FillClass::Unexpected,
        }
    }

    pub fn symbol(&self) -> String { normalize_symbol(&self.instrument) }
}

/// "EUR_USD" -> "EURUSD"
pub fn normalize_symbol(instrument: &str) -> String {
    instrument.replace('_', "")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourcePosition { pub symbol: String, pub side: Side }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationPosition {
    pub symbol: String,
    pub side: Side,
    pub quantity: u64,
    pub reference: String,
}

impl DestinationPosition {
    pub fn to_position(&self) -> Position {
        Position { size: self.quantity, side: self.side, reference: self.reference.clone() }
    }
}

// Journal records (RECORD_FILE)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Opened { ts: DateTime<Utc>, symbol: String, position: Position, source_units: f64 },
    Closed { ts: DateTime<Utc>, symbol: String, position: Position, reason: String },
    OrphanClosed { ts: DateTime<Utc>, position: DestinationPosition, ok: bool },
    Untracked { ts: DateTime<Utc>, symbol: String, reason: String },
    Reconciled { ts: DateTime<Utc>, confirmed: usize, orphans: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_partition_into_open_and_close() {
        assert_eq!(SourceEvent::fill("MARKET_ORDER", "EUR_USD", 1.0).class(), FillClass::Open);
        for r in ["MARKET_ORDER_TRADE_CLOSE", "TAKE_PROFIT_ORDER", "STOP_LOSS_ORDER", "MARKET_IF_TOUCHED_ORDER"] {
            assert_eq!(SourceEvent::fill(r, "EUR_USD", 1.0).class(), FillClass::Close, "{r}");
        }
        assert_eq!(SourceEvent::fill("LIMIT_ORDER", "EUR_USD", 1.0).class(), FillClass::Unexpected);
    }

    #[test]
    fn units_sign_maps_to_side() {
        assert_eq!(Side::from_units(10_000.0), Some(Side::Long));
        assert_eq!(Side::from_units(-5.0), Some(Side::Short));
        assert_eq!(Side::from_units(0.0), None);
        assert_eq!(Side::Long.opposite(), Side::Short);
    }

    #[test]
    fn instrument_is_normalized() {
        let ev = SourceEvent::fill("MARKET_ORDER", "GBP_JPY", 1.0);
        assert_eq!(ev.symbol(), "GBPJPY");
        assert!(ev.is_fill());
    }
}
