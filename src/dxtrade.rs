// ===============================
// src/dxtrade.rs
// ===============================
use serde::{Deserialize, Serialize};

use crate::domain::{DestinationPosition, Side};
use crate::gateway::GatewayError;

// ---- Minimal DXtrade REST models ----
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub domain: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub session_token: String,
}

#[derive(Debug, Deserialize)]
pub struct MetricsResponse {
    #[serde(default)]
    pub metrics: Vec<AccountMetrics>,
}

#[derive(Debug, Deserialize)]
pub struct AccountMetrics {
    pub balance: f64,
}

#[derive(Debug, Deserialize)]
pub struct PositionsResponse {
    #[serde(default)]
    pub positions: Vec<DxPosition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DxPosition {
    pub symbol: String,
    pub quantity: f64,
    pub side: String, // BUY | SELL
    pub position_code: String,
}

impl DxPosition {
    pub fn to_destination(&self) -> Result<DestinationPosition, GatewayError> {
        let side = match self.side.as_str() {
            "BUY" => Side::Long,
            "SELL" => Side::Short,
            other => return Err(GatewayError::Payload(format!("position side {other:?}"))),
        };
        Ok(DestinationPosition {
            symbol: self.symbol.clone(),
            side,
            quantity: self.quantity.abs().round() as u64,
            reference: self.position_code.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest<'a> {
    pub account: &'a str,
    pub order_code: String,
    #[serde(rename = "type")]
    pub order_type: &'static str,
    pub instrument: &'a str,
    pub quantity: u64,
    pub position_effect: &'static str, // OPEN | CLOSE
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_code: Option<&'a str>,
    pub side: &'static str,
    pub tif: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    #[serde(default)]
    pub order_id: serde_json::Value,
}

impl OrderResponse {
    pub fn order_id(&self) -> Option<String> {
        match &self.order_id {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
