// ===============================
// src/gateway_dxtrade.rs
// ===============================
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Duration;
use tracing::{info, warn};

use crate::config::DxTradeCfg;
use crate::domain::{DestinationPosition, Side};
use crate::dxtrade::{LoginRequest, LoginResponse, MetricsResponse, OrderRequest, OrderResponse, PositionsResponse};
use crate::gateway::{check_status, DestinationGateway, GatewayError};

const VENUE: &str = "dxtrade";
const REST_TIMEOUT: Duration = Duration::from_secs(30);

/// DXtrade REST session. Token is refreshed by `login()`.
pub struct DxTradeDestination {
    http: reqwest::Client,
    cfg: DxTradeCfg,
    token: Option<String>,
}

impl DxTradeDestination {
    pub fn new(cfg: DxTradeCfg) -> Self {
        Self { http: reqwest::Client::new(), cfg, token: None }
    }

    fn account_code(&self) -> String {
        format!("{}:{}", self.cfg.domain, self.cfg.account)
    }

    fn url(&self, tail: &str) -> String {
        format!("{}/{}", self.cfg.base_url.as_str().trim_end_matches('/'), tail)
    }

    fn auth(&self) -> Result<String, GatewayError> {
        self.token
            .as_ref()
            .map(|t| format!("DXAPI {t}"))
            .ok_or(GatewayError::NoSession)
    }

    async fn get_json<T: DeserializeOwned>(&self, tail: &str) -> Result<T, GatewayError> {
        let rsp = self
            .http
            .get(self.url(tail))
            .header("Authorization", self.auth()?)
            .timeout(REST_TIMEOUT)
            .send()
            .await?;
        Ok(check_status(VENUE, rsp).await?.json::<T>().await?)
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(&self, tail: &str, body: &B) -> Result<T, GatewayError> {
        let rsp = self
            .http
            .post(self.url(tail))
            .header("Authorization", self.auth()?)
            .timeout(REST_TIMEOUT)
            .json(body)
            .send()
            .await?;
        Ok(check_status(VENUE, rsp).await?.json::<T>().await?)
    }

    async fn place(&self, order: &OrderRequest<'_>) -> Result<OrderResponse, GatewayError> {
        let tail = format!("accounts/{}/orders", self.account_code());
        self.post_json(&tail, order).await
    }
}

fn order_code() -> String {
    format!("MIRROR-{}-{}", Utc::now().timestamp_millis(), rand::thread_rng().gen::<u32>())
}

#[async_trait]
impl DestinationGateway for DxTradeDestination {
    async fn login(&mut self) -> Result<(), GatewayError> {
        let body = LoginRequest {
            username: &self.cfg.username,
            domain: &self.cfg.domain,
            password: &self.cfg.password,
        };
        let rsp = self
            .http
            .post(self.url("login"))
            .timeout(REST_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        let rsp: LoginResponse = check_status(VENUE, rsp).await?.json().await?;
        self.token = Some(rsp.session_token);
        info!(account = %self.account_code(), "dxtrade session opened");
        Ok(())
    }

    async fn ping(&self) -> Result<(), GatewayError> {
        let rsp = self
            .http
            .post(self.url("ping"))
            .header("Authorization", self.auth()?)
            .timeout(REST_TIMEOUT)
            .send()
            .await?;
        check_status(VENUE, rsp).await?;
        Ok(())
    }

    async fn balance(&self) -> Result<f64, GatewayError> {
        let rsp: MetricsResponse = self
            .get_json(&format!("accounts/{}/metrics", self.account_code()))
            .await?;
        rsp.metrics
            .first()
            .map(|m| m.balance)
            .ok_or_else(|| GatewayError::Payload("metrics without account entry".into()))
    }

    async fn open_positions(&self) -> Result<Vec<DestinationPosition>, GatewayError> {
        let rsp: PositionsResponse = self
            .get_json(&format!("accounts/{}/positions", self.account_code()))
            .await?;
        rsp.positions.iter().map(|p| p.to_destination()).collect()
    }

    async fn open(&mut self, symbol: &str, side: Side, size: u64) -> Result<String, GatewayError> {
        let account = self.account_code();
        let order = OrderRequest {
            account: &account,
            order_code: order_code(),
            order_type: "MARKET",
            instrument: symbol,
            quantity: size,
            position_effect: "OPEN",
            position_code: None,
            side: side.order_side(),
            tif: "GTC",
        };
        let rsp = self.place(&order).await?;

        // positionCode dibutuhkan untuk close; satu posisi per simbol
        let held = self.open_positions().await?;
        if let Some(p) = held.into_iter().find(|p| p.symbol == symbol && p.side == side) {
            return Ok(p.reference);
        }
        match rsp.order_id() {
            Some(id) => {
                warn!(%symbol, order_id = %id, "position not visible yet, keeping order id as reference");
                Ok(id)
            }
            None => Err(GatewayError::Payload(format!("open {symbol}: no order id"))),
        }
    }

    async fn close(&mut self, symbol: &str, side: Side, size: u64, reference: &str) -> Result<(), GatewayError> {
        let account = self.account_code();
        let order = OrderRequest {
            account: &account,
            order_code: order_code(),
            order_type: "MARKET",
            instrument: symbol,
            quantity: size,
            position_effect: "CLOSE",
            position_code: Some(reference),
            side: side.opposite().order_side(),
            tif: "GTC",
        };
        self.place(&order).await?;
        Ok(())
    }
}
