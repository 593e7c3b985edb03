//! Market-data provider boundary.
//!
//! The engine only ever sees these traits. `HttpMarketSource` talks to a
//! JSON gateway with timeout + exponential-backoff retry; the in-memory
//! `StaticMarketSource` backs tests and deterministic replays.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::market::board;
use crate::models::{EtfHoldings, Holding, Quote};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 200;
const MAX_BACKOFF_MS: u64 = 2_000;
const REQUEST_TIMEOUT_SECS: u64 = 10;

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn quote(&self, code: &str) -> Result<Quote>;

    /// Batch fetch; missing securities are skipped, not errors.
    async fn quotes(&self, codes: &[String]) -> Result<Vec<Quote>> {
        let mut out = Vec::with_capacity(codes.len());
        for code in codes {
            match self.quote(code).await {
                Ok(q) => out.push(q),
                Err(e) => debug!(code, error = %e, "quote unavailable in batch"),
            }
        }
        Ok(out)
    }
}

#[async_trait]
pub trait HoldingsProvider: Send + Sync {
    async fn top_holdings(&self, etf_code: &str) -> Result<EtfHoldings>;
}

/// Daily OHLC bar from the historical source.
#[derive(Debug, Clone, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub close: f64,
    pub prev_close: f64,
    pub volume: f64,
    pub amount: f64,
}

/// Historical-data boundary used by the backtest driver.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    async fn daily_bars(&self, code: &str, start: NaiveDate, end: NaiveDate)
        -> Result<Vec<DailyBar>>;

    /// Quarterly (or better) holdings snapshots per ETF inside the range,
    /// keyed by snapshot date.
    async fn holdings_snapshots(
        &self,
        etf_codes: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, Vec<EtfHoldings>>>;
}

// ===== HTTP source =====

/// Wire shape of a gateway quote. The gateway reports raw fields only; the
/// limit flags are derived locally from the board rules.
#[derive(Debug, Deserialize)]
struct WireQuote {
    code: String,
    name: String,
    price: f64,
    prev_close: f64,
    change_pct: f64,
    volume: f64,
    amount: f64,
    timestamp: chrono::NaiveDateTime,
    #[serde(default)]
    limit_time: Option<chrono::NaiveDateTime>,
    #[serde(default)]
    seal_amount: f64,
    #[serde(default)]
    open_count: u32,
    #[serde(default)]
    is_first_limit: Option<bool>,
}

impl WireQuote {
    fn into_quote(self) -> Quote {
        let mut quote = Quote {
            code: board::normalize_code(&self.code),
            name: self.name,
            price: self.price,
            prev_close: self.prev_close,
            change_pct: self.change_pct,
            volume: self.volume,
            amount: self.amount,
            timestamp: self.timestamp,
            is_limit_up: false,
            is_limit_down: false,
            limit_time: self.limit_time,
            seal_amount: self.seal_amount,
            open_count: self.open_count,
            is_first_limit: self.is_first_limit.unwrap_or(true),
        };
        board::derive_limit_flags(&mut quote);
        quote
    }
}

#[derive(Debug, Deserialize)]
struct WireHoldings {
    etf_code: String,
    etf_name: String,
    as_of: NaiveDate,
    holdings: Vec<WireHolding>,
}

#[derive(Debug, Deserialize)]
struct WireHolding {
    stock_code: String,
    stock_name: String,
    weight: f64,
    rank: u32,
}

pub struct HttpMarketSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpMarketSource {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent("etfarb-backend/0.4")
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// GET with exponential backoff on transient failures (connect errors,
    /// timeouts, 5xx). Non-retryable statuses fail immediately.
    async fn get_with_retry(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut backoff = INITIAL_BACKOFF_MS;

        for attempt in 1..=MAX_RETRIES {
            let mut request = self.client.get(&url).query(query);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if response.status().is_server_error() => {
                    warn!(%url, status = %response.status(), attempt, "server error, retrying");
                }
                Ok(response) => {
                    bail!("request to {} failed with status {}", url, response.status());
                }
                Err(e) if attempt < MAX_RETRIES => {
                    warn!(%url, attempt, error = %e, "transient request failure, retrying");
                }
                Err(e) => return Err(e).with_context(|| format!("request to {} failed", url)),
            }

            sleep(Duration::from_millis(backoff)).await;
            backoff = (backoff * 2).min(MAX_BACKOFF_MS);
        }

        bail!("request to {} exhausted {} attempts", url, MAX_RETRIES)
    }
}

#[async_trait]
impl QuoteProvider for HttpMarketSource {
    async fn quote(&self, code: &str) -> Result<Quote> {
        let response = self
            .get_with_retry("/quote", &[("code", code.to_string())])
            .await?;
        let wire: WireQuote = response.json().await.context("failed to parse quote")?;
        Ok(wire.into_quote())
    }

    async fn quotes(&self, codes: &[String]) -> Result<Vec<Quote>> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .get_with_retry("/quotes", &[("codes", codes.join(","))])
            .await?;
        let wire: Vec<WireQuote> = response.json().await.context("failed to parse quotes")?;
        Ok(wire.into_iter().map(WireQuote::into_quote).collect())
    }
}

#[async_trait]
impl HoldingsProvider for HttpMarketSource {
    async fn top_holdings(&self, etf_code: &str) -> Result<EtfHoldings> {
        let response = self
            .get_with_retry("/etf/holdings", &[("code", etf_code.to_string())])
            .await?;
        let wire: WireHoldings = response.json().await.context("failed to parse holdings")?;
        let holdings = wire
            .holdings
            .into_iter()
            .map(|h| Holding {
                stock_code: board::normalize_code(&h.stock_code),
                stock_name: h.stock_name,
                etf_code: wire.etf_code.clone(),
                weight: h.weight,
                rank: h.rank,
                as_of: wire.as_of,
            })
            .collect();
        Ok(EtfHoldings {
            etf_code: wire.etf_code,
            etf_name: wire.etf_name,
            as_of: wire.as_of,
            holdings,
        })
    }
}

// ===== In-memory source =====

/// Deterministic in-memory market source for tests, demos and replays.
#[derive(Default)]
pub struct StaticMarketSource {
    quotes: RwLock<HashMap<String, Quote>>,
    holdings: RwLock<HashMap<String, EtfHoldings>>,
}

impl StaticMarketSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put_quote(&self, mut quote: Quote) {
        board::derive_limit_flags(&mut quote);
        self.quotes.write().insert(quote.code.clone(), quote);
    }

    /// Insert a quote exactly as given, limit flags included.
    pub fn put_quote_raw(&self, quote: Quote) {
        self.quotes.write().insert(quote.code.clone(), quote);
    }

    pub fn put_holdings(&self, holdings: EtfHoldings) {
        self.holdings
            .write()
            .insert(holdings.etf_code.clone(), holdings);
    }

    pub fn clear(&self) {
        self.quotes.write().clear();
        self.holdings.write().clear();
    }
}

#[async_trait]
impl QuoteProvider for StaticMarketSource {
    async fn quote(&self, code: &str) -> Result<Quote> {
        self.quotes
            .read()
            .get(code)
            .cloned()
            .with_context(|| format!("no quote for {}", code))
    }
}

#[async_trait]
impl HoldingsProvider for StaticMarketSource {
    async fn top_holdings(&self, etf_code: &str) -> Result<EtfHoldings> {
        self.holdings
            .read()
            .get(etf_code)
            .cloned()
            .with_context(|| format!("no holdings for {}", etf_code))
    }
}
