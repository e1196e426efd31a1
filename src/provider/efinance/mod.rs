//! Efinance-style list provider.
//!
//! Uses the push2 `ulist.np/get` endpoint, which answers a whole list
//! of symbols in one `data.diff` array with the same `fNN` field
//! naming and `"-"` placeholders as the single-stock push2 API. The
//! adapter is batch-native and participates only when explicitly
//! selected, never in automatic failover.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::QuoteError;
use crate::models::{Metric, RealtimeQuote, StockSymbol};
use crate::provider::{build_client, get_text, Pacing, ProviderCapabilities, QuoteProvider};

const PROVIDER_ID: &str = "EFINANCE";
const LIST_URL: &str = "https://push2.eastmoney.com/api/qt/ulist.np/get";
const LIST_FIELDS: &str = "f2,f3,f5,f6,f8,f9,f10,f12,f14,f15,f16,f17,f18,f23";
const MAX_BATCH: usize = 100;

#[derive(Debug, Deserialize)]
struct ListEnvelope {
    data: Option<ListData>,
}

#[derive(Debug, Deserialize)]
struct ListData {
    #[serde(default)]
    diff: Vec<DiffItem>,
}

#[derive(Debug, Default, Deserialize)]
struct DiffItem {
    /// Latest price
    #[serde(default)]
    f2: Value,
    /// Change percent
    #[serde(default)]
    f3: Value,
    /// Volume, lots of 100 shares
    #[serde(default)]
    f5: Value,
    /// Amount, yuan
    #[serde(default)]
    f6: Value,
    /// Turnover rate
    #[serde(default)]
    f8: Value,
    /// PE
    #[serde(default)]
    f9: Value,
    /// Volume ratio
    #[serde(default)]
    f10: Value,
    /// Bare 6-digit code
    #[serde(default)]
    f12: Value,
    /// Display name
    #[serde(default)]
    f14: Value,
    /// Day high
    #[serde(default)]
    f15: Value,
    /// Day low
    #[serde(default)]
    f16: Value,
    /// Open
    #[serde(default)]
    f17: Value,
    /// Previous close
    #[serde(default)]
    f18: Value,
    /// PB
    #[serde(default)]
    f23: Value,
}

fn decimal_field(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse::<Decimal>().ok(),
        Value::String(s) if s != "-" && !s.is_empty() => s.parse::<Decimal>().ok(),
        _ => None,
    }
}

pub struct EfinanceProvider {
    client: Client,
}

impl Default for EfinanceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EfinanceProvider {
    pub fn new() -> Self {
        Self {
            client: build_client(Duration::from_secs(10)),
        }
    }

    fn quote_from_item(item: &DiffItem, code: &str) -> RealtimeQuote {
        RealtimeQuote {
            symbol: code.to_string(),
            name: item.f14.as_str().unwrap_or_default().to_string(),
            price: decimal_field(&item.f2).unwrap_or_default(),
            change_pct: decimal_field(&item.f3).unwrap_or_default(),
            open: decimal_field(&item.f17).unwrap_or_default(),
            pre_close: decimal_field(&item.f18).unwrap_or_default(),
            high: decimal_field(&item.f15).unwrap_or_default(),
            low: decimal_field(&item.f16).unwrap_or_default(),
            volume: decimal_field(&item.f5).unwrap_or_default() * Decimal::from(100),
            amount: decimal_field(&item.f6).unwrap_or_default(),
            turnover_rate: Metric::from(decimal_field(&item.f8)),
            volume_ratio: Metric::from(decimal_field(&item.f10)),
            pe_ratio: Metric::from(decimal_field(&item.f9)),
            pb_ratio: Metric::from(decimal_field(&item.f23)),
            captured_at: Utc::now(),
        }
    }

    fn parse_list(body: &str) -> Result<Vec<DiffItem>, QuoteError> {
        let envelope: ListEnvelope =
            serde_json::from_str(body).map_err(|e| QuoteError::Parse {
                provider: PROVIDER_ID.to_string(),
                message: format!("bad list envelope: {}", e),
            })?;
        match envelope.data {
            Some(data) => Ok(data.diff),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_list(
        &self,
        symbols: &[StockSymbol],
    ) -> Result<HashMap<String, Option<RealtimeQuote>>, QuoteError> {
        let secids = symbols
            .iter()
            .map(|s| s.eastmoney_secid())
            .collect::<Vec<_>>()
            .join(",");
        let url = format!(
            "{}?secids={}&fields={}&fltt=2&invt=2&pn=1&pz={}",
            LIST_URL,
            secids,
            LIST_FIELDS,
            symbols.len()
        );
        let body = get_text(&self.client, PROVIDER_ID, &url, None).await?;
        let items = Self::parse_list(&body)?;
        debug!(
            "Efinance list answered {} of {} symbols",
            items.len(),
            symbols.len()
        );

        let by_code: HashMap<&str, &DiffItem> = items
            .iter()
            .filter_map(|item| item.f12.as_str().map(|code| (code, item)))
            .collect();

        let mut results = HashMap::with_capacity(symbols.len());
        for symbol in symbols {
            let quote = by_code
                .get(symbol.code())
                .map(|item| Self::quote_from_item(item, symbol.code()));
            if quote.is_none() {
                warn!("Efinance returned no data for {}", symbol);
            }
            results.insert(symbol.code().to_string(), quote);
        }
        Ok(results)
    }
}

#[async_trait]
impl QuoteProvider for EfinanceProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u16 {
        50
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_realtime: true,
            supports_daily: false,
            supports_batch: true,
            supports_fundamentals: false,
            max_batch_size: MAX_BATCH,
            daily_is_synthesized: false,
            explicit_only: true,
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
        let results = self.fetch_list(std::slice::from_ref(symbol)).await?;
        match results.get(symbol.code()).cloned().flatten() {
            Some(quote) => Ok(quote),
            None => Err(QuoteError::Parse {
                provider: PROVIDER_ID.to_string(),
                message: format!("no list entry for {}", symbol),
            }),
        }
    }

    async fn fetch_batch_realtime(
        &self,
        symbols: &[StockSymbol],
    ) -> Result<HashMap<String, Option<RealtimeQuote>>, QuoteError> {
        self.fetch_list(symbols).await
    }
}
