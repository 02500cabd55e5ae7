// ===============================
// src/testkit.rs (scripted venues for tests)
// ===============================
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use ahash::AHashMap as HashMap;
use async_trait::async_trait;
use futures_util::{stream, StreamExt};

use crate::domain::{DestinationPosition, Side, SourceEvent, SourcePosition};
use crate::gateway::{DestinationGateway, EventStream, GatewayError, SourceGateway};

pub fn spos(symbol: &str, side: Side) -> SourcePosition {
    SourcePosition { symbol: symbol.to_string(), side }
}

pub fn dpos(symbol: &str, side: Side, quantity: u64, reference: &str) -> DestinationPosition {
    DestinationPosition { symbol: symbol.to_string(), side, quantity, reference: reference.to_string() }
}

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

// ---- source ----
#[derive(Default)]
struct SourceBook {
    balance: f64,
    positions: Vec<SourcePosition>,
    streams: VecDeque<Vec<Result<SourceEvent, GatewayError>>>,
    fail_positions: bool,
    position_calls: usize,
    stream_calls: usize,
}

#[derive(Clone, Default)]
pub struct FakeSource {
    inner: Arc<Mutex<SourceBook>>,
}

impl FakeSource {
    pub fn new(balance: f64) -> Self {
        let s = Self::default();
        guard(&s.inner).balance = balance;
        s
    }

    pub fn with_positions(self, positions: Vec<SourcePosition>) -> Self {
        self.set_positions(positions);
        self
    }

    /// Each call to `stream_events` hands out the next script; when empty the stream never yields.
    pub fn with_stream(self, events: Vec<SourceEvent>) -> Self {
        self.with_script(events.into_iter().map(Ok).collect())
    }

    /// Like `with_stream`, but items may be transport errors.
    pub fn with_script(self, items: Vec<Result<SourceEvent, GatewayError>>) -> Self {
        guard(&self.inner).streams.push_back(items);
        self
    }

    pub fn set_positions(&self, positions: Vec<SourcePosition>) {
        guard(&self.inner).positions = positions;
    }

    pub fn fail_positions(&self, fail: bool) {
        guard(&self.inner).fail_positions = fail;
    }

    pub fn position_calls(&self) -> usize { guard(&self.inner).position_calls }

    pub fn stream_calls(&self) -> usize { guard(&self.inner).stream_calls }

    pub fn handle(&self) -> Arc<dyn SourceGateway> { Arc::new(self.clone()) }
}

#[async_trait]
impl SourceGateway for FakeSource {
    async fn balance(&self) -> Result<f64, GatewayError> { Ok(guard(&self.inner).balance) }

    async fn open_positions(&self) -> Result<Vec<SourcePosition>, GatewayError> {
        let mut b = guard(&self.inner);
        b.position_calls += 1;
        if b.fail_positions {
            return Err(GatewayError::Rejected("positions unavailable".into()));
        }
        Ok(b.positions.clone())
    }

    async fn stream_events(&self) -> Result<EventStream, GatewayError> {
        let mut b = guard(&self.inner);
        b.stream_calls += 1;
        Ok(match b.streams.pop_front() {
            Some(items) => stream::iter(items).boxed(),
            None => stream::pending().boxed(),
        })
    }
}

// ---- destination ----
struct DestBook {
    balance: f64,
    logged_in: bool,
    ping_ok: bool,
    login_ok: bool,
    logins_allowed: Option<usize>,
    fail_opens: bool,
    fail_closes: bool,
    closes_to_fail: usize,
    seq: u64,
    positions: HashMap<String, DestinationPosition>,
    opens: Vec<(String, Side, u64)>,
    closes: Vec<String>,
    logins: usize,
    pings: usize,
}

#[derive(Clone)]
pub struct FakeDestination {
    inner: Arc<Mutex<DestBook>>,
}

impl FakeDestination {
    pub fn new(balance: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DestBook {
                balance,
                logged_in: false,
                ping_ok: true,
                login_ok: true,
                logins_allowed: None,
                fail_opens: false,
                fail_closes: false,
                closes_to_fail: 0,
                seq: 0,
                positions: HashMap::new(),
                opens: Vec::new(),
                closes: Vec::new(),
                logins: 0,
                pings: 0,
            })),
        }
    }

    pub fn logged_in(self) -> Self {
        guard(&self.inner).logged_in = true;
        self
    }

    pub fn with_position(self, p: DestinationPosition) -> Self {
        self.add_position(p);
        self
    }

    pub fn add_position(&self, p: DestinationPosition) {
        guard(&self.inner).positions.insert(p.symbol.clone(), p);
    }

    pub fn set_ping_ok(&self, ok: bool) { guard(&self.inner).ping_ok = ok; }
    pub fn set_login_ok(&self, ok: bool) { guard(&self.inner).login_ok = ok; }
    /// First `n` logins succeed, the rest are refused.
    pub fn fail_logins_after(&self, n: usize) { guard(&self.inner).logins_allowed = Some(n); }
    pub fn fail_opens(&self, fail: bool) { guard(&self.inner).fail_opens = fail; }
    pub fn fail_closes(&self, fail: bool) { guard(&self.inner).fail_closes = fail; }
    /// Refuse only the next `n` closes.
    pub fn fail_next_closes(&self, n: usize) { guard(&self.inner).closes_to_fail = n; }

    pub fn opens(&self) -> Vec<(String, Side, u64)> { guard(&self.inner).opens.clone() }
    pub fn closes(&self) -> Vec<String> { guard(&self.inner).closes.clone() }
    pub fn logins(&self) -> usize { guard(&self.inner).logins }
    pub fn pings(&self) -> usize { guard(&self.inner).pings }

    pub fn book(&self) -> Vec<DestinationPosition> {
        guard(&self.inner).positions.values().cloned().collect()
    }

    pub fn boxed(&self) -> Box<dyn DestinationGateway> { Box::new(self.clone()) }
}

#[async_trait]
impl DestinationGateway for FakeDestination {
    async fn login(&mut self) -> Result<(), GatewayError> {
        let mut b = guard(&self.inner);
        b.logins += 1;
        let exhausted = b.logins_allowed.map_or(false, |n| b.logins > n);
        if !b.login_ok || exhausted {
            return Err(GatewayError::Rejected("login refused".into()));
        }
        b.logged_in = true;
        Ok(())
    }

    async fn ping(&self) -> Result<(), GatewayError> {
        let mut b = guard(&self.inner);
        b.pings += 1;
        if b.ping_ok && b.logged_in { Ok(()) } else { Err(GatewayError::NoSession) }
    }

    async fn balance(&self) -> Result<f64, GatewayError> { Ok(guard(&self.inner).balance) }

    async fn open_positions(&self) -> Result<Vec<DestinationPosition>, GatewayError> {
        Ok(self.book())
    }

    async fn open(&mut self, symbol: &str, side: Side, size: u64) -> Result<String, GatewayError> {
        let reference = {
            let mut b = guard(&self.inner);
            if b.fail_opens {
                return Err(GatewayError::Rejected("open refused".into()));
            }
            b.seq += 1;
            format!("REF-{}", b.seq)
        };
        // let other tasks run mid-call
        tokio::task::yield_now().await;
        let mut b = guard(&self.inner);
        b.opens.push((symbol.to_string(), side, size));
        b.positions.insert(symbol.to_string(), dpos(symbol, side, size, &reference));
        Ok(reference)
    }

    async fn close(&mut self, symbol: &str, _side: Side, _size: u64, reference: &str) -> Result<(), GatewayError> {
        {
            let mut b = guard(&self.inner);
            if b.closes_to_fail > 0 {
                b.closes_to_fail -= 1;
                return Err(GatewayError::Rejected("close refused".into()));
            }
            if b.fail_closes {
                return Err(GatewayError::Rejected("close refused".into()));
            }
        }
        tokio::task::yield_now().await;
        let mut b = guard(&self.inner);
        b.closes.push(reference.to_string());
        if b.positions.get(symbol).map(|p| p.reference.as_str()) == Some(reference) {
            b.positions.remove(symbol);
        }
        Ok(())
    }
}
