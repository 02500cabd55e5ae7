// ===============================
// src/gateway_oanda.rs
// ===============================
use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};
use serde::de::DeserializeOwned;
use tokio::time::{timeout, Duration};

use crate::config::OandaCfg;
use crate::domain::SourcePosition;
use crate::gateway::{check_status, EventStream, GatewayError, SourceGateway};
use crate::oanda::{parse_balance, parse_stream_line, AccountSummaryResponse, OpenPositionsResponse};

const VENUE: &str = "oanda";
const REST_TIMEOUT: Duration = Duration::from_secs(30);
/// OANDA sends a heartbeat every 5s; three missed ones means the link is dead.
const STREAM_IDLE: Duration = Duration::from_secs(15);

/// OANDA v20: REST snapshots + chunked transactions stream.
pub struct OandaSource {
    http: reqwest::Client,
    cfg: OandaCfg,
}

impl OandaSource {
    pub fn new(cfg: OandaCfg) -> Self {
        Self { http: reqwest::Client::new(), cfg }
    }

    fn account_url(&self, base: &url::Url, tail: &str) -> String {
        format!(
            "{}/v3/accounts/{}/{}",
            base.as_str().trim_end_matches('/'),
            self.cfg.account_id,
            tail
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, tail: &str) -> Result<T, GatewayError> {
        let rsp = self
            .http
            .get(self.account_url(&self.cfg.rest_url, tail))
            .bearer_auth(&self.cfg.access_token)
            .timeout(REST_TIMEOUT)
            .send()
            .await?;
        let rsp = check_status(VENUE, rsp).await?;
        Ok(rsp.json::<T>().await?)
    }
}

#[async_trait]
impl SourceGateway for OandaSource {
    async fn balance(&self) -> Result<f64, GatewayError> {
        let rsp: AccountSummaryResponse = self.get_json("summary").await?;
        parse_balance(&rsp)
    }

    async fn open_positions(&self) -> Result<Vec<SourcePosition>, GatewayError> {
        let rsp: OpenPositionsResponse = self.get_json("openPositions").await?;
        Ok(rsp.positions.iter().map(|p| p.to_source()).collect())
    }

    async fn stream_events(&self) -> Result<EventStream, GatewayError> {
        let url = self.account_url(&self.cfg.stream_url, "transactions/stream");
        tracing::info!(%url, "connecting oanda transaction stream");
        // tanpa request timeout; stream yang diam dijaga oleh STREAM_IDLE
        let rsp = self
            .http
            .get(url)
            .bearer_auth(&self.cfg.access_token)
            .send()
            .await?;
        let rsp = check_status(VENUE, rsp).await?;
        Ok(line_events(rsp.bytes_stream(), STREAM_IDLE))
    }
}

/// Pops one `\n`-terminated line off the front of `buf`.
fn take_line(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let nl = buf.iter().position(|b| *b == b'\n')?;
    Some(buf.drain(..=nl).collect())
}

/// Newline-delimited transactions over a chunked body. Lines may span chunks.
/// No chunk (heartbeats included) for `idle` yields `GatewayError::Idle`.
fn line_events<S, B>(body: S, idle: Duration) -> EventStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let body = body.boxed();
    stream::unfold((body, Vec::<u8>::new()), move |(mut body, mut buf)| async move {
        loop {
            while let Some(line) = take_line(&mut buf) {
                if let Some(item) = parse_stream_line(&line) {
                    return Some((item, (body, buf)));
                }
            }
            match timeout(idle, body.next()).await {
                Ok(Some(Ok(chunk))) => buf.extend_from_slice(chunk.as_ref()),
                Ok(Some(Err(e))) => return Some((Err(GatewayError::Http(e)), (body, buf))),
                Ok(None) => return None,
                Err(_) => return Some((Err(GatewayError::Idle(idle)), (body, buf))),
            }
        }
    })
    .boxed()
}
