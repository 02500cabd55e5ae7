// ===============================
// src/gateway.rs (venue seams + paper destination)
// ===============================
use ahash::AHashMap as HashMap;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;
use tracing::info;

use crate::domain::{DestinationPosition, Side, SourceEvent, SourcePosition};

/// Live transaction feed. `None` = transport ended the stream.
pub type EventStream = BoxStream<'static, Result<SourceEvent, GatewayError>>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("http transport: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{venue} returned {status}: {body}")]
    Status { venue: &'static str, status: u16, body: String },
    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("malformed payload: {0}")]
    Payload(String),
    #[error("stream silent for {0:?}")]
    Idle(std::time::Duration),
    #[error("no active session")]
    NoSession,
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Non-2xx -> `GatewayError::Status` carrying the body.
pub(crate) async fn check_status(
    venue: &'static str,
    rsp: reqwest::Response,
) -> Result<reqwest::Response, GatewayError> {
    if rsp.status().is_success() {
        return Ok(rsp);
    }
    let status = rsp.status().as_u16();
    let body = rsp.text().await.unwrap_or_default();
    Err(GatewayError::Status { venue, status, body })
}

/// Venue we copy from: streams fills, answers snapshots.
#[async_trait]
pub trait SourceGateway: Send + Sync {
    async fn balance(&self) -> Result<f64, GatewayError>;
    async fn open_positions(&self) -> Result<Vec<SourcePosition>, GatewayError>;
    async fn stream_events(&self) -> Result<EventStream, GatewayError>;
}

/// Venue we copy into: request/response order entry plus a session.
#[async_trait]
pub trait DestinationGateway: Send + Sync {
    async fn login(&mut self) -> Result<(), GatewayError>;
    async fn ping(&self) -> Result<(), GatewayError>;
    async fn balance(&self) -> Result<f64, GatewayError>;
    async fn open_positions(&self) -> Result<Vec<DestinationPosition>, GatewayError>;
    /// Returns the venue reference needed to close the position later.
    async fn open(&mut self, symbol: &str, side: Side, size: u64) -> Result<String, GatewayError>;
    async fn close(&mut self, symbol: &str, side: Side, size: u64, reference: &str) -> Result<(), GatewayError>;
}

/// In-memory destination for MIRROR_MODE=mock.
pub struct PaperVenue {
    balance: f64,
    logged_in: bool,
    seq: u64,
    book: HashMap<String, DestinationPosition>,
}

impl PaperVenue {
    pub fn new(balance: f64) -> Self {
        Self { balance, logged_in: false, seq: 0, book: HashMap::new() }
    }
}

#[async_trait]
impl DestinationGateway for PaperVenue {
    async fn login(&mut self) -> Result<(), GatewayError> {
        self.logged_in = true;
        info!("paper venue: session opened");
        Ok(())
    }

    async fn ping(&self) -> Result<(), GatewayError> {
        if self.logged_in { Ok(()) } else { Err(GatewayError::NoSession) }
    }

    async fn balance(&self) -> Result<f64, GatewayError> { Ok(self.balance) }

    async fn open_positions(&self) -> Result<Vec<DestinationPosition>, GatewayError> {
        Ok(self.book.values().cloned().collect())
    }

    async fn open(&mut self, symbol: &str, side: Side, size: u64) -> Result<String, GatewayError> {
        if !self.logged_in {
            return Err(GatewayError::NoSession);
        }
        self.seq += 1;
        let reference = format!("PAPER-{}", self.seq);
        self.book.insert(
            symbol.to_string(),
            DestinationPosition { symbol: symbol.to_string(), side, quantity: size, reference: reference.clone() },
        );
        Ok(reference)
    }

    async fn close(&mut self, symbol: &str, _side: Side, _size: u64, reference: &str) -> Result<(), GatewayError> {
        match self.book.get(symbol) {
            Some(p) if p.reference == reference => {
                self.book.remove(symbol);
                Ok(())
            }
            _ => Err(GatewayError::Rejected(format!("no position {reference} for {symbol}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn paper_venue_round_trips_a_position() {
        let mut v = PaperVenue::new(25_000.0);
        assert!(v.ping().await.is_err());
        v.login().await.unwrap();
        v.ping().await.unwrap();

        let r = v.open("EURUSD", Side::Long, 3000).await.unwrap();
        let open = v.open_positions().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].reference, r);

        assert!(v.close("EURUSD", Side::Long, 3000, "bogus").await.is_err());
        v.close("EURUSD", Side::Long, 3000, &r).await.unwrap();
        assert!(v.open_positions().await.unwrap().is_empty());
    }
}
