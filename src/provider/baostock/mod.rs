//! Baostock provider.
//!
//! Baostock serves daily history as CSV rows of
//! `date,open,high,low,close,volume,amount,pctChg` with volume already
//! in shares and amount in yuan. The upstream itself speaks a custom
//! TCP protocol through its Python SDK, so this adapter talks to an
//! HTTP gateway in front of it; the gateway base URL is supplied at
//! construction. Daily history only, no realtime.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use tracing::debug;

use crate::errors::QuoteError;
use crate::models::{DailyBar, StockSymbol};
use crate::provider::{build_client, get_text, Pacing, ProviderCapabilities, QuoteProvider};

const PROVIDER_ID: &str = "BAOSTOCK";
const ROW_FIELDS: usize = 8;

pub struct BaostockProvider {
    client: Client,
    base_url: String,
}

impl BaostockProvider {
    /// `base_url` points at a gateway exposing
    /// `query_history_k_data_plus` results as CSV.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: build_client(Duration::from_secs(10)),
            base_url: base_url.into(),
        }
    }

    fn parse_rows(body: &str) -> Result<Vec<DailyBar>, QuoteError> {
        let mut bars = Vec::new();
        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("date,") {
                continue;
            }
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() < ROW_FIELDS {
                return Err(QuoteError::Parse {
                    provider: PROVIDER_ID.to_string(),
                    message: format!("row has {} fields, expected {}", fields.len(), ROW_FIELDS),
                });
            }
            let date = NaiveDate::parse_from_str(fields[0], "%Y-%m-%d").map_err(|_| {
                QuoteError::Parse {
                    provider: PROVIDER_ID.to_string(),
                    message: format!("bad date '{}'", fields[0]),
                }
            })?;
            bars.push(DailyBar {
                date,
                open: parse_field(fields[1])?,
                high: parse_field(fields[2])?,
                low: parse_field(fields[3])?,
                close: parse_field(fields[4])?,
                volume: parse_field(fields[5])?,
                amount: parse_field(fields[6])?,
                pct_change: parse_field(fields[7])?,
            });
        }
        if bars.is_empty() {
            return Err(QuoteError::Parse {
                provider: PROVIDER_ID.to_string(),
                message: "no data rows".to_string(),
            });
        }
        Ok(bars)
    }
}

fn parse_field(raw: &str) -> Result<Decimal, QuoteError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        // suspended days leave numeric columns blank
        return Ok(Decimal::ZERO);
    }
    trimmed.parse::<Decimal>().map_err(|_| QuoteError::Parse {
        provider: PROVIDER_ID.to_string(),
        message: format!("unparsable number '{}'", raw),
    })
}

#[async_trait]
impl QuoteProvider for BaostockProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u16 {
        30
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_realtime: false,
            supports_daily: true,
            supports_batch: false,
            supports_fundamentals: false,
            max_batch_size: 1,
            daily_is_synthesized: false,
            explicit_only: false,
        }
    }

    fn pacing(&self) -> Pacing {
        Pacing {
            min_delay: Duration::from_millis(300),
            max_delay: Duration::from_millis(900),
            ..Pacing::default()
        }
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(45)
    }

    async fn fetch_daily_series(
        &self,
        symbol: &StockSymbol,
        lookback_days: u32,
    ) -> Result<Vec<DailyBar>, QuoteError> {
        let end = Utc::now().date_naive();
        let start = end - ChronoDuration::days(i64::from(lookback_days) * 2);
        let url = format!(
            "{}/history?code={}&start_date={}&end_date={}&frequency=d&adjustflag=2",
            self.base_url,
            symbol.baostock(),
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        );
        let body = get_text(&self.client, PROVIDER_ID, &url, None).await?;
        let bars = Self::parse_rows(&body)?;
        debug!("Baostock returned {} bars for {}", bars.len(), symbol);
        Ok(bars)
    }
}
