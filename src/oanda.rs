// ===============================
// src/oanda.rs
// ===============================
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::{normalize_symbol, Side, SourceEvent, SourcePosition};
use crate::gateway::GatewayError;

// ---- Minimal v20 REST models ----
#[derive(Debug, Deserialize)]
pub struct AccountSummaryResponse {
    pub account: AccountSummary,
}

#[derive(Debug, Deserialize)]
pub struct AccountSummary {
    pub balance: String, // decimal as string
}

#[derive(Debug, Deserialize)]
pub struct OpenPositionsResponse {
    #[serde(default)]
    pub positions: Vec<OandaPosition>,
}

#[derive(Debug, Deserialize)]
pub struct OandaPosition {
    pub instrument: String,
    pub long: PositionSide,
}

#[derive(Debug, Deserialize)]
pub struct PositionSide {
    pub units: String,
}

impl OandaPosition {
    /// Long kalau sisi long punya units, selain itu Short (sisi short tidak perlu dibaca).
    pub fn to_source(&self) -> SourcePosition {
        let long_units = self.long.units.parse::<f64>().unwrap_or(0.0);
        let side = if long_units != 0.0 { Side::Long } else { Side::Short };
        SourcePosition { symbol: normalize_symbol(&self.instrument), side }
    }
}

// ---- Transaction stream ----
#[derive(Debug, Deserialize)]
pub struct Transaction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub instrument: Option<String>,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
}

pub const HEARTBEAT: &str = "HEARTBEAT";

pub fn parse_balance(rsp: &AccountSummaryResponse) -> Result<f64, GatewayError> {
    rsp.account
        .balance
        .parse::<f64>()
        .map_err(|_| GatewayError::Payload(format!("balance {:?}", rsp.account.balance)))
}

/// One line of the transactions stream. `None` for blank lines and heartbeats.
pub fn parse_stream_line(line: &[u8]) -> Option<Result<SourceEvent, GatewayError>> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let tx: Transaction = match serde_json::from_str(text) {
        Ok(t) => t,
        Err(e) => return Some(Err(GatewayError::Decode(e))),
    };
    if tx.kind == HEARTBEAT {
        tracing::trace!("oanda stream heartbeat");
        return None;
    }
    let units = tx
        .units
        .as_deref()
        .and_then(|u| u.parse::<f64>().ok())
        .unwrap_or(0.0);
    let time = tx
        .time
        .as_deref()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc));
    Some(Ok(SourceEvent {
        kind: tx.kind,
        reason: tx.reason.unwrap_or_default(),
        instrument: tx.instrument.unwrap_or_default(),
        units,
        time,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FillClass;

    #[test]
    fn heartbeat_and_blank_lines_are_dropped() {
        assert!(parse_stream_line(b"\n").is_none());
        assert!(parse_stream_line(br#"{"type":"HEARTBEAT","lastTransactionID":"6","time":"2024-05-01T10:00:00.000000000Z"}"#).is_none());
    }

    #[test]
    fn order_fill_line_becomes_source_event() {
        let line = br#"{"type":"ORDER_FILL","reason":"STOP_LOSS_ORDER","instrument":"EUR_USD","units":"-10000","time":"2024-05-01T10:00:00.123456789Z","id":"42"}"#;
        let ev = parse_stream_line(line).unwrap().unwrap();
        assert!(ev.is_fill());
        assert_eq!(ev.class(), FillClass::Close);
        assert_eq!(ev.symbol(), "EURUSD");
        assert_eq!(ev.units, -10_000.0);
        assert!(ev.time.is_some());
    }

    #[test]
    fn other_transactions_pass_through_unclassified() {
        let line = br#"{"type":"DAILY_FINANCING","time":"2024-05-01T21:00:00.000000000Z"}"#;
        let ev = parse_stream_line(line).unwrap().unwrap();
        assert!(!ev.is_fill());
        assert_eq!(ev.units, 0.0);
    }

    #[test]
    fn garbage_line_is_a_decode_error() {
        assert!(matches!(parse_stream_line(b"{not json"), Some(Err(GatewayError::Decode(_)))));
    }

    #[test]
    fn position_side_follows_long_units() {
        let p: OandaPosition = serde_json::from_str(
            r#"{"instrument":"USD_JPY","long":{"units":"0"},"short":{"units":"-2000"}}"#,
        )
        .unwrap();
        assert_eq!(p.to_source(), SourcePosition { symbol: "USDJPY".into(), side: Side::Short });

        let s: AccountSummaryResponse =
            serde_json::from_str(r#"{"account":{"balance":"100000.0000"}}"#).unwrap();
        assert_eq!(parse_balance(&s).unwrap(), 100_000.0);
    }
}
