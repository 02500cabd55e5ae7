// ===============================
// src/feed.rs
// ===============================
//
// Mock source venue (MIRROR_MODE=mock):
// - emits a random open or close fill every `every`
// - keeps its own position book so open_positions() agrees with the stream
//
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ahash::AHashMap as HashMap;
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use rand::Rng;
use tokio::time::sleep;

use crate::domain::{Side, SourceEvent, SourcePosition};
use crate::gateway::{EventStream, GatewayError, SourceGateway};

const INSTRUMENTS: [&str; 5] = ["EUR_USD", "GBP_USD", "USD_JPY", "AUD_USD", "USD_CAD"];
const CLOSE_REASONS: [&str; 4] = [
    "MARKET_ORDER_TRADE_CLOSE",
    "TAKE_PROFIT_ORDER",
    "STOP_LOSS_ORDER",
    "MARKET_IF_TOUCHED_ORDER",
];

/// Mock account sizes; the 1:4 ratio still mirrors every mock fill to at least one lot.
pub const MOCK_SOURCE_BALANCE: f64 = 100_000.0;
pub const MOCK_DEST_BALANCE: f64 = 25_000.0;

pub struct MockSource {
    balance: f64,
    every: Duration,
    book: Arc<Mutex<HashMap<String, Side>>>,
}

impl MockSource {
    pub fn new(balance: f64, every: Duration) -> Self {
        Self { balance, every, book: Arc::new(Mutex::new(HashMap::new())) }
    }
}

/// Next random fill; flips the book for the chosen instrument.
fn next_fill(book: &Mutex<HashMap<String, Side>>) -> SourceEvent {
    let mut rng = rand::thread_rng();
    let instrument = INSTRUMENTS[rng.gen_range(0..INSTRUMENTS.len())];
    let mut book = match book.lock() {
        Ok(b) => b,
        Err(poisoned) => poisoned.into_inner(),
    };
    match book.remove(instrument) {
        Some(side) => {
            let reason = CLOSE_REASONS[rng.gen_range(0..CLOSE_REASONS.len())];
            // units berlawanan arah dengan posisi yang ditutup
            let units = match side { Side::Long => -1.0, Side::Short => 1.0 };
            SourceEvent::fill(reason, instrument, units)
        }
        None => {
            // minimal 2 lot: 2000 * 25k/100k = 500 -> dibulatkan ke 1000
            let lots: i64 = rng.gen_range(2..=20);
            let units = if rng.gen_bool(0.5) { lots * 1000 } else { -lots * 1000 };
            if let Some(side) = Side::from_units(units as f64) {
                book.insert(instrument.to_string(), side);
            }
            SourceEvent::fill("MARKET_ORDER", instrument, units as f64)
        }
    }
}

#[async_trait]
impl SourceGateway for MockSource {
    async fn balance(&self) -> Result<f64, GatewayError> { Ok(self.balance) }

    async fn open_positions(&self) -> Result<Vec<SourcePosition>, GatewayError> {
        let book = match self.book.lock() {
            Ok(b) => b,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(book
            .iter()
            .map(|(i, s)| SourcePosition { symbol: crate::domain::normalize_symbol(i), side: *s })
            .collect())
    }

    async fn stream_events(&self) -> Result<EventStream, GatewayError> {
        let book = self.book.clone();
        let every = self.every;
        let s = stream::unfold(book, move |book| async move {
            sleep(every).await;
            let ev = next_fill(&book);
            Some((Ok(ev), book))
        });
        Ok(s.boxed())
    }
}
