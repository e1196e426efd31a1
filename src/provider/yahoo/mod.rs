//! Yahoo Finance chart provider.
//!
//! Fallback source reached with `.SS`/`.SZ` suffixed symbols. One v8
//! chart request serves both operations: the realtime snapshot comes
//! from the chart meta block and the daily series from the parallel
//! timestamp/indicator arrays, which may contain nulls on half-traded
//! days.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::errors::QuoteError;
use crate::models::{derive_pct_changes, DailyBar, Metric, RealtimeQuote, StockSymbol};
use crate::provider::{build_client, get_text, Pacing, ProviderCapabilities, QuoteProvider};

const PROVIDER_ID: &str = "YAHOO";
const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Vec<ChartResult>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    regular_market_price: Option<f64>,
    #[serde(default)]
    chart_previous_close: Option<f64>,
    #[serde(default)]
    regular_market_day_high: Option<f64>,
    #[serde(default)]
    regular_market_day_low: Option<f64>,
    #[serde(default)]
    regular_market_volume: Option<f64>,
    #[serde(default)]
    long_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteArrays>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteArrays {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

fn to_decimal(value: Option<f64>) -> Decimal {
    value
        .and_then(|v| Decimal::try_from(v).ok())
        .unwrap_or_default()
}

pub struct YahooProvider {
    client: Client,
}

impl Default for YahooProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl YahooProvider {
    pub fn new() -> Self {
        Self {
            client: build_client(Duration::from_secs(10)),
        }
    }

    fn parse_chart(body: &str) -> Result<ChartResult, QuoteError> {
        let envelope: ChartEnvelope =
            serde_json::from_str(body).map_err(|e| QuoteError::Parse {
                provider: PROVIDER_ID.to_string(),
                message: format!("bad chart envelope: {}", e),
            })?;
        if let Some(error) = envelope.chart.error {
            return Err(QuoteError::Parse {
                provider: PROVIDER_ID.to_string(),
                message: format!("chart error {}: {}", error.code, error.description),
            });
        }
        envelope
            .chart
            .result
            .into_iter()
            .next()
            .ok_or_else(|| QuoteError::Parse {
                provider: PROVIDER_ID.to_string(),
                message: "empty chart result".to_string(),
            })
    }

    fn quote_from_chart(result: &ChartResult, symbol: &StockSymbol) -> RealtimeQuote {
        let meta = &result.meta;
        let price = to_decimal(meta.regular_market_price);
        let pre_close = to_decimal(meta.chart_previous_close);
        let change_pct = if pre_close > Decimal::ZERO {
            (price - pre_close) / pre_close * Decimal::from(100)
        } else {
            Decimal::ZERO
        };
        // the meta block has no open; take the day's first open bar
        let open = result
            .indicators
            .quote
            .first()
            .and_then(|q| q.open.iter().flatten().next().copied());
        RealtimeQuote {
            symbol: symbol.code().to_string(),
            name: meta.long_name.clone().unwrap_or_default(),
            price,
            change_pct,
            open: to_decimal(open),
            pre_close,
            high: to_decimal(meta.regular_market_day_high),
            low: to_decimal(meta.regular_market_day_low),
            volume: to_decimal(meta.regular_market_volume),
            amount: Decimal::ZERO,
            turnover_rate: Metric::unreported(),
            volume_ratio: Metric::unreported(),
            pe_ratio: Metric::unreported(),
            pb_ratio: Metric::unreported(),
            captured_at: Utc::now(),
        }
    }

    fn series_from_chart(result: &ChartResult) -> Result<Vec<DailyBar>, QuoteError> {
        let arrays = result
            .indicators
            .quote
            .first()
            .ok_or_else(|| QuoteError::Parse {
                provider: PROVIDER_ID.to_string(),
                message: "chart result without quote arrays".to_string(),
            })?;

        let mut bars = Vec::with_capacity(result.timestamp.len());
        for (i, ts) in result.timestamp.iter().enumerate() {
            let close = arrays.close.get(i).copied().flatten();
            // null close means no trade that day
            let close = match close {
                Some(close) => close,
                None => continue,
            };
            let date = match DateTime::from_timestamp(*ts, 0) {
                Some(dt) => dt.date_naive(),
                None => continue,
            };
            bars.push(DailyBar {
                date,
                open: to_decimal(arrays.open.get(i).copied().flatten()),
                high: to_decimal(arrays.high.get(i).copied().flatten()),
                low: to_decimal(arrays.low.get(i).copied().flatten()),
                close: to_decimal(Some(close)),
                volume: to_decimal(arrays.volume.get(i).copied().flatten()),
                amount: Decimal::ZERO,
                pct_change: Decimal::ZERO,
            });
        }
        derive_pct_changes(&mut bars);
        Ok(bars)
    }

    async fn fetch_chart(
        &self,
        symbol: &StockSymbol,
        range_days: u32,
    ) -> Result<ChartResult, QuoteError> {
        let url = format!(
            "{}/{}?interval=1d&range={}d",
            CHART_URL,
            symbol.yahoo(),
            range_days.max(1)
        );
        let body = get_text(&self.client, PROVIDER_ID, &url, None).await?;
        Self::parse_chart(&body)
    }
}

#[async_trait]
impl QuoteProvider for YahooProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u16 {
        40
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_realtime: true,
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
            max_delay: Duration::from_millis(1000),
            ..Pacing::default()
        }
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(45)
    }

    async fn fetch_realtime(&self, symbol: &StockSymbol) -> Result<RealtimeQuote, QuoteError> {
        let result = self.fetch_chart(symbol, 1).await?;
        Ok(Self::quote_from_chart(&result, symbol))
    }

    async fn fetch_daily_series(
        &self,
        symbol: &StockSymbol,
        lookback_days: u32,
    ) -> Result<Vec<DailyBar>, QuoteError> {
        let result = self.fetch_chart(symbol, lookback_days).await?;
        let bars = Self::series_from_chart(&result)?;
        debug!("Yahoo returned {} bars for {}", bars.len(), symbol);
        Ok(bars)
    }
}
