// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : trade_mirror — source-to-destination trade mirroring engine in Rust
Module  : config.rs
Version : 0.1.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
License : MIT (see LICENSE)

Summary : Mirrors fills from a streaming source venue (OANDA v20) onto a
          request/response destination venue (DXtrade), scaled by account
          balance, with periodic and reactive reconciliation, session
          keep-alive, restart backoff, Prometheus metrics and a JSONL journal.
=============================================================================
*/
use std::env;
use std::str::FromStr;

use dotenvy::dotenv;
use thiserror::Error;
use tokio::time::Duration;
use url::Url;

use crate::backoff::RetryConfig;
use crate::session::SessionCfg;

/// Mode venue: mock (in-memory) / practice / live
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MarketMode {
    Mock,
    Practice,
    Live,
}

impl MarketMode {
    pub fn parse(s: &str) -> Option<MarketMode> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Some(MarketMode::Mock),
            "practice" | "demo" => Some(MarketMode::Practice),
            "live" => Some(MarketMode::Live),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketMode::Mock => "mock",
            MarketMode::Practice => "practice",
            MarketMode::Live => "live",
        }
    }

    // Endpoint default per mode
    pub fn default_oanda_rest(&self) -> &'static str {
        match self {
            MarketMode::Live => "https://api-fxtrade.oanda.com",
            _ => "https://api-fxpractice.oanda.com",
        }
    }

    pub fn default_oanda_stream(&self) -> &'static str {
        match self {
            MarketMode::Live => "https://stream-fxtrade.oanda.com",
            _ => "https://stream-fxpractice.oanda.com",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required in {1} mode")]
    Missing(&'static str, &'static str),
    #[error("{key}: bad url {value:?}: {source}")]
    BadUrl { key: &'static str, value: String, source: url::ParseError },
    #[error("MIRROR_MODE: unknown mode {0:?} (mock|practice|live)")]
    BadMode(String),
}

#[derive(Clone, Debug)]
pub struct OandaCfg {
    pub account_id: String,
    pub access_token: String,
    pub rest_url: Url,
    pub stream_url: Url,
}

#[derive(Clone, Debug)]
pub struct DxTradeCfg {
    pub base_url: Url,
    pub account: String,
    pub username: String,
    pub password: String,
    pub domain: String,
}

#[derive(Clone, Debug)]
pub struct Args {
    pub mode: MarketMode,
    // venues (None in mock mode)
    pub oanda: Option<OandaCfg>,
    pub dxtrade: Option<DxTradeCfg>,

    // engine
    pub lot_size: u64,
    pub session: SessionCfg,
    pub retry: RetryConfig,
    pub mock_fill_every: Duration,

    // files/metrics
    pub log_file: String,
    pub record_file: Option<String>,
    pub metrics_port: u16,
}

fn var_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

fn required(key: &'static str, mode: &MarketMode) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key, mode.as_str()))
}

fn url_var(key: &'static str, default: &str) -> Result<Url, ConfigError> {
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    Url::parse(&value).map_err(|source| ConfigError::BadUrl { key, value, source })
}

fn load_oanda(mode: &MarketMode) -> Result<OandaCfg, ConfigError> {
    Ok(OandaCfg {
        account_id: required("OANDA_ACCOUNT_ID", mode)?,
        access_token: required("OANDA_ACCESS_TOKEN", mode)?,
        rest_url: url_var("OANDA_REST_URL", mode.default_oanda_rest())?,
        stream_url: url_var("OANDA_STREAM_URL", mode.default_oanda_stream())?,
    })
}

fn load_dxtrade(mode: &MarketMode) -> Result<DxTradeCfg, ConfigError> {
    let base = required("DXTRADE_URL", mode)?;
    let base_url = Url::parse(&base).map_err(|source| ConfigError::BadUrl { key: "DXTRADE_URL", value: base, source })?;
    let account = required("DXTRADE_ACCOUNT", mode)?;
    // login FTMO memakai nomor akun sebagai username
    let username = env::var("DXTRADE_USERNAME").unwrap_or_else(|_| account.clone());
    Ok(DxTradeCfg {
        base_url,
        account,
        username,
        password: required("DXTRADE_PASSWORD", mode)?,
        domain: env::var("DXTRADE_DOMAIN").unwrap_or_else(|_| "default".to_string()),
    })
}

pub fn load() -> Result<Args, ConfigError> {
    // .env opsional
    let _ = dotenv();
    from_env()
}

/// Reads the process environment only (no .env).
pub fn from_env() -> Result<Args, ConfigError> {
    let mode_raw = env::var("MIRROR_MODE").unwrap_or_else(|_| "mock".to_string());
    let mode = MarketMode::parse(&mode_raw).ok_or(ConfigError::BadMode(mode_raw))?;

    let (oanda, dxtrade) = match mode {
        MarketMode::Mock => (None, None),
        MarketMode::Practice | MarketMode::Live => (Some(load_oanda(&mode)?), Some(load_dxtrade(&mode)?)),
    };

    let session = SessionCfg {
        check_every: Duration::from_secs(var_or::<u64>("CHECK_INTERVAL_SECS", 60).max(1)),
        ping_after: Duration::from_secs(var_or::<u64>("PING_IDLE_MINS", 10) * 60),
        reconcile_after: Duration::from_secs(var_or::<u64>("RECONCILE_MINS", 60) * 60),
    };
    let retry = RetryConfig {
        base: Duration::from_millis(var_or::<u64>("RETRY_BASE_MS", 1_000)),
        max: Duration::from_millis(var_or::<u64>("RETRY_MAX_MS", 60_000)),
        jitter: var_or::<f64>("RETRY_JITTER", 0.2),
        stable_after: Duration::from_secs(var_or::<u64>("RETRY_STABLE_SECS", 300)),
    };

    Ok(Args {
        mode,
        oanda,
        dxtrade,
        lot_size: var_or::<u64>("LOT_SIZE", 1000).max(1),
        session,
        retry,
        mock_fill_every: Duration::from_secs(var_or::<u64>("MOCK_FILL_SECS", 5).max(1)),
        log_file: env::var("LOG_FILE").unwrap_or_else(|_| "TradeCopier.log".to_string()),
        record_file: env::var("RECORD_FILE").ok().filter(|p| !p.trim().is_empty()),
        metrics_port: var_or::<u16>("METRICS_PORT", 9898),
    })
}
