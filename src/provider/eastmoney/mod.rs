//! EastMoney (push2) provider.
//!
//! The stock/get endpoint answers a flat JSON object of `fNN` fields.
//! With `fltt=2` prices arrive as plain decimals; fields the upstream
//! cannot supply arrive as the string `"-"`. Unknown symbols answer
//! `data: null`. History comes from the push2his kline endpoint as
//! comma-joined strings, one per trading day.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::errors::QuoteError;
use crate::models::{DailyBar, Fundamentals, Metric, RealtimeQuote, StockSymbol};
use crate::provider::{build_client, get_text, Pacing, ProviderCapabilities, QuoteProvider};

const PROVIDER_ID: &str = "EASTMONEY";
const QUOTE_URL: &str = "https://push2.eastmoney.com/api/qt/stock/get";
const KLINE_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get";

const QUOTE_FIELDS: &str = "f43,f44,f45,f46,f47,f48,f50,f57,f58,f60,f162,f167,f168";
const KLINE_FIELDS: &str = "f51,f52,f53,f54,f55,f56,f57,f58,f59";

#[derive(Debug, Deserialize)]
struct QuoteEnvelope {
    data: Option<QuoteData>,
}

/// Raw push2 quote object. Numeric fields stay as `Value` because the
/// upstream substitutes `"-"` for anything it cannot report.
#[derive(Debug, Default, Deserialize)]
struct QuoteData {
    /// Latest price
    #[serde(default)]
    f43: Value,
    /// Day high
    #[serde(default)]
    f44: Value,
    /// Day low
    #[serde(default)]
    f45: Value,
    /// Open
    #[serde(default)]
    f46: Value,
    /// Volume, lots of 100 shares
    #[serde(default)]
    f47: Value,
    /// Amount, yuan
    #[serde(default)]
    f48: Value,
    /// Volume ratio
    #[serde(default)]
    f50: Value,
    /// Display name
    #[serde(default)]
    f58: Value,
    /// Previous close
    #[serde(default)]
    f60: Value,
    /// PE (TTM)
    #[serde(default)]
    f162: Value,
    /// PB
    #[serde(default)]
    f167: Value,
    /// Turnover rate
    #[serde(default)]
    f168: Value,
}

#[derive(Debug, Deserialize)]
struct KlineEnvelope {
    data: Option<KlineData>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    #[serde(default)]
    klines: Vec<String>,
}

/// Coerce a push2 value: a number, a numeric string, or the `"-"`
/// placeholder for unreported.
fn decimal_field(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse::<Decimal>().ok(),
        Value::String(s) if s != "-" && !s.is_empty() => s.parse::<Decimal>().ok(),
        _ => None,
    }
}

pub struct EastmoneyProvider {
    client: Client,
}

impl Default for EastmoneyProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EastmoneyProvider {
    pub fn new() -> Self {
        Self {
            client: build_client(Duration::from_secs(10)),
        }
    }

    fn quote_from_data(data: &QuoteData, symbol: &StockSymbol) -> RealtimeQuote {
        let price = decimal_field(&data.f43).unwrap_or_default();
        let pre_close = decimal_field(&data.f60).unwrap_or_default();
        let change_pct = if pre_close > Decimal::ZERO {
            (price - pre_close) / pre_close * Decimal::from(100)
        } else {
            Decimal::ZERO
        };
        RealtimeQuote {
            symbol: symbol.code().to_string(),
            name: data.f58.as_str().unwrap_or_default().to_string(),
            price,
            change_pct,
            open: decimal_field(&data.f46).unwrap_or_default(),
            pre_close,
            high: decimal_field(&data.f44).unwrap_or_default(),
            low: decimal_field(&data.f45).unwrap_or_default(),
            volume: decimal_field(&data.f47).unwrap_or_default() * Decimal::from(100),
            amount: decimal_field(&data.f48).unwrap_or_default(),
            turnover_rate: Metric::from(decimal_field(&data.f168)),
            volume_ratio: Metric::from(decimal_field(&data.f50)),
            pe_ratio: Metric::from(decimal_field(&data.f162)),
            pb_ratio: Metric::from(decimal_field(&data.f167)),
            captured_at: Utc::now(),
        }
    }

    fn parse_quote(body: &str, symbol: &StockSymbol) -> Result<RealtimeQuote, QuoteError> {
        let envelope: QuoteEnvelope =
            serde_json::from_str(body).map_err(|e| QuoteError::Parse {
                provider: PROVIDER_ID.to_string(),
                message: format!("bad quote envelope: {}", e),
            })?;
        let data = envelope.data.ok_or_else(|| QuoteError::Parse {
            provider: PROVIDER_ID.to_string(),
            message: format!("no data for {}", symbol),
        })?;
        Ok(Self::quote_from_data(&data, symbol))
    }

    fn parse_kline(body: &str) -> Result<Vec<DailyBar>, QuoteError> {
        let envelope: KlineEnvelope =
            serde_json::from_str(body).map_err(|e| QuoteError::Parse {
                provider: PROVIDER_ID.to_string(),
                message: format!("bad kline envelope: {}", e),
            })?;
        let data = envelope.data.ok_or_else(|| QuoteError::Parse {
            provider: PROVIDER_ID.to_string(),
            message: "no kline data".to_string(),
        })?;

        let mut bars = Vec::with_capacity(data.klines.len());
        for line in &data.klines {
            // date,open,close,high,low,volume,amount,amplitude,pct
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() < 9 {
                return Err(QuoteError::Parse {
                    provider: PROVIDER_ID.to_string(),
                    message: format!("kline row has {} fields", fields.len()),
                });
            }
            let date =
                NaiveDate::parse_from_str(fields[0], "%Y-%m-%d").map_err(|_| {
                    QuoteError::Parse {
                        provider: PROVIDER_ID.to_string(),
                        message: format!("bad kline date '{}'", fields[0]),
                    }
                })?;
            bars.push(DailyBar {
                date,
                open: parse_number(fields[1])?,
                close: parse_number(fields[2])?,
                high: parse_number(fields[3])?,
                low: parse_number(fields[4])?,
                volume: parse_number(fields[5])? * Decimal::from(100),
                amount: parse_number(fields[6])?,
                pct_change: parse_number(fields[8])?,
            });
        }
        Ok(bars)
    }
}

fn parse_number(raw: &str) -> Result<Decimal, QuoteError> {
    raw.trim().parse::<Decimal>().map_err(|_| QuoteError::Parse {
        provider: PROVIDER_ID.to_string(),
        message: format!("unparsable kline number '{}'", raw),
    })
}

#[async_trait]
impl QuoteProvider for EastmoneyProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u16 {
        10
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_realtime: true,
            supports_daily: true,
            supports_batch: false,
            supports_fundamentals: true,
            max_batch_size: 1,
            daily_is_synthesized: false,
            explicit_only: false,
        }
    }

    fn pacing(&self) -> Pacing {
        Pacing {
            min_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(700),
            ..Pacing::default()
        }
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn fetch_realtime(&self, symbol: &StockSymbol) -> Result<RealtimeQuote, QuoteError> {
        let url = format!(
            "{}?secid={}&fields={}&fltt=2&invt=2",
            QUOTE_URL,
            symbol.eastmoney_secid(),
            QUOTE_FIELDS
        );
        let body = get_text(&self.client, PROVIDER_ID, &url, None).await?;
        Self::parse_quote(&body, symbol)
    }

    async fn fetch_daily_series(
        &self,
        symbol: &StockSymbol,
        lookback_days: u32,
    ) -> Result<Vec<DailyBar>, QuoteError> {
        let url = format!(
            "{}?secid={}&klt=101&fqt=1&lmt={}&end=20500101&fields1=f1,f2,f3&fields2={}",
            KLINE_URL,
            symbol.eastmoney_secid(),
            lookback_days,
            KLINE_FIELDS
        );
        let body = get_text(&self.client, PROVIDER_ID, &url, None).await?;
        let bars = Self::parse_kline(&body)?;
        debug!("EastMoney returned {} bars for {}", bars.len(), symbol);
        Ok(bars)
    }

    async fn fetch_fundamentals(&self, symbol: &StockSymbol) -> Result<Fundamentals, QuoteError> {
        let quote = self.fetch_realtime(symbol).await?;
        Ok(Fundamentals {
            pe_ratio: quote.pe_ratio.value(),
            pb_ratio: quote.pb_ratio.value(),
            turnover_rate: quote.turnover_rate.value(),
            volume_ratio: quote.volume_ratio.value(),
            ..Fundamentals::default()
        })
    }
}
