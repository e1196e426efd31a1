//! Tushare Pro provider.
//!
//! All calls POST one JSON envelope `{api_name, token, params, fields}`
//! to `api.tushare.pro` and get back a column-oriented table
//! `{code, msg, data: {fields, items}}`. A non-zero `code` with a quota
//! message means the token ran out of credits for the minute, which is
//! throttling, not failure. Volume arrives in lots of 100 shares and
//! amount in units of 1000 yuan. Daily history and the daily_basic
//! fundamentals table only; there is no realtime endpoint.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::errors::{looks_rate_limited, QuoteError};
use crate::models::{DailyBar, Fundamentals, StockSymbol};
use crate::provider::{build_client, post_json, Pacing, ProviderCapabilities, QuoteProvider};

const PROVIDER_ID: &str = "TUSHARE";
const API_URL: &str = "https://api.tushare.pro";

const DAILY_FIELDS: &str = "trade_date,open,high,low,close,vol,amount,pct_chg";
const BASIC_FIELDS: &str = "turnover_rate,volume_ratio,pe,pb,total_mv,circ_mv";

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    data: Option<ApiTable>,
}

#[derive(Debug, Deserialize)]
struct ApiTable {
    fields: Vec<String>,
    items: Vec<Vec<Value>>,
}

impl ApiTable {
    /// Column index by field name.
    fn column(&self, name: &str) -> Result<usize, QuoteError> {
        self.fields
            .iter()
            .position(|f| f == name)
            .ok_or_else(|| QuoteError::Parse {
                provider: PROVIDER_ID.to_string(),
                message: format!("missing column '{}'", name),
            })
    }
}

fn cell_decimal(row: &[Value], index: usize) -> Option<Decimal> {
    match row.get(index) {
        Some(Value::Number(n)) => n.to_string().parse::<Decimal>().ok(),
        Some(Value::String(s)) if !s.is_empty() => s.parse::<Decimal>().ok(),
        _ => None,
    }
}

pub struct TushareProvider {
    client: Client,
    token: String,
}

impl TushareProvider {
    /// The token is passed through on every request; the crate does no
    /// credential lifecycle management.
    pub fn new(token: String) -> Self {
        Self {
            client: build_client(Duration::from_secs(10)),
            token,
        }
    }

    fn parse_envelope(body: &str) -> Result<ApiTable, QuoteError> {
        let envelope: ApiEnvelope =
            serde_json::from_str(body).map_err(|e| QuoteError::Parse {
                provider: PROVIDER_ID.to_string(),
                message: format!("bad envelope: {}", e),
            })?;
        if envelope.code != 0 {
            let msg = envelope.msg.unwrap_or_default();
            if looks_rate_limited(&msg) {
                return Err(QuoteError::RateLimited {
                    provider: PROVIDER_ID.to_string(),
                });
            }
            return Err(QuoteError::Network {
                provider: PROVIDER_ID.to_string(),
                message: format!("api code {}: {}", envelope.code, msg),
            });
        }
        envelope.data.ok_or_else(|| QuoteError::Parse {
            provider: PROVIDER_ID.to_string(),
            message: "envelope without data".to_string(),
        })
    }

    fn parse_daily(body: &str) -> Result<Vec<DailyBar>, QuoteError> {
        let table = Self::parse_envelope(body)?;
        let date_col = table.column("trade_date")?;
        let open_col = table.column("open")?;
        let high_col = table.column("high")?;
        let low_col = table.column("low")?;
        let close_col = table.column("close")?;
        let vol_col = table.column("vol")?;
        let amount_col = table.column("amount")?;
        let pct_col = table.column("pct_chg")?;

        let mut bars = Vec::with_capacity(table.items.len());
        for row in &table.items {
            let raw_date = row
                .get(date_col)
                .and_then(Value::as_str)
                .unwrap_or_default();
            let date = NaiveDate::parse_from_str(raw_date, "%Y%m%d").map_err(|_| {
                QuoteError::Parse {
                    provider: PROVIDER_ID.to_string(),
                    message: format!("bad trade_date '{}'", raw_date),
                }
            })?;
            bars.push(DailyBar {
                date,
                open: cell_decimal(row, open_col).unwrap_or_default(),
                high: cell_decimal(row, high_col).unwrap_or_default(),
                low: cell_decimal(row, low_col).unwrap_or_default(),
                close: cell_decimal(row, close_col).unwrap_or_default(),
                volume: cell_decimal(row, vol_col).unwrap_or_default() * Decimal::from(100),
                amount: cell_decimal(row, amount_col).unwrap_or_default()
                    * Decimal::from(1000),
                pct_change: cell_decimal(row, pct_col).unwrap_or_default(),
            });
        }
        Ok(bars)
    }

    fn parse_fundamentals(body: &str) -> Result<Fundamentals, QuoteError> {
        let table = Self::parse_envelope(body)?;
        let row = table.items.first().ok_or_else(|| QuoteError::Parse {
            provider: PROVIDER_ID.to_string(),
            message: "daily_basic answered no rows".to_string(),
        })?;
        // market caps arrive in units of 10000 yuan
        let scale_wan = |v: Option<Decimal>| v.map(|v| v * Decimal::from(10_000));
        Ok(Fundamentals {
            pe_ratio: cell_decimal(row, table.column("pe")?),
            pb_ratio: cell_decimal(row, table.column("pb")?),
            total_market_cap: scale_wan(cell_decimal(row, table.column("total_mv")?)),
            float_market_cap: scale_wan(cell_decimal(row, table.column("circ_mv")?)),
            turnover_rate: cell_decimal(row, table.column("turnover_rate")?),
            volume_ratio: cell_decimal(row, table.column("volume_ratio")?),
        })
    }

    async fn call(
        &self,
        api_name: &str,
        params: Value,
        fields: &str,
    ) -> Result<String, QuoteError> {
        let body = json!({
            "api_name": api_name,
            "token": self.token,
            "params": params,
            "fields": fields,
        });
        post_json(&self.client, PROVIDER_ID, API_URL, &body).await
    }
}

#[async_trait]
impl QuoteProvider for TushareProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u16 {
        20
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_realtime: false,
            supports_daily: true,
            supports_batch: false,
            supports_fundamentals: true,
            max_batch_size: 1,
            daily_is_synthesized: false,
            explicit_only: false,
        }
    }

    fn pacing(&self) -> Pacing {
        // free-tier tokens allow very few calls per minute
        Pacing {
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(1200),
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
        let params = json!({
            "ts_code": symbol.tushare(),
            "start_date": start.format("%Y%m%d").to_string(),
            "end_date": end.format("%Y%m%d").to_string(),
        });
        let body = self.call("daily", params, DAILY_FIELDS).await?;
        let bars = Self::parse_daily(&body)?;
        debug!("Tushare returned {} bars for {}", bars.len(), symbol);
        Ok(bars)
    }

    async fn fetch_fundamentals(&self, symbol: &StockSymbol) -> Result<Fundamentals, QuoteError> {
        let params = json!({ "ts_code": symbol.tushare() });
        let body = self.call("daily_basic", params, BASIC_FIELDS).await?;
        Self::parse_fundamentals(&body)
    }
}
