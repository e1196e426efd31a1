//! Sina Finance provider.
//!
//! Realtime quotes come from `hq.sinajs.cn` as JS-literal assignment
//! lines, one per symbol, comma-delimited with at least 32 fields.
//! The endpoint requires a finance.sina.com.cn Referer and answers
//! batches of up to 800 comma-joined codes. Daily history uses the
//! `CN_MarketData.getKLineData` JSON endpoint, which carries no amount
//! column and no percent change.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::QuoteError;
use crate::models::{derive_pct_changes, DailyBar, RealtimeQuote, StockSymbol};
use crate::provider::fieldmap::{extract_assignment, parse_delimited, FieldSpec, QuoteField};
use crate::provider::{build_client, get_text, Pacing, ProviderCapabilities, QuoteProvider};

const PROVIDER_ID: &str = "SINA";
const QUOTE_URL: &str = "https://hq.sinajs.cn/list=";
const KLINE_URL: &str =
    "https://money.finance.sina.com.cn/quotes_service/api/json_v2.php/CN_MarketData.getKLineData";
const REFERER: &str = "https://finance.sina.com.cn/";
const MIN_FIELDS: usize = 32;
const MAX_BATCH: usize = 800;

/// Comma-position map for the hq.sinajs.cn payload. Volume is already
/// in shares and amount in yuan; change percent is derived from price
/// vs previous close.
const FIELDS: &[FieldSpec] = &[
    FieldSpec::new(0, QuoteField::Name),
    FieldSpec::new(1, QuoteField::Open),
    FieldSpec::new(2, QuoteField::PreClose),
    FieldSpec::new(3, QuoteField::Price),
    FieldSpec::new(4, QuoteField::High),
    FieldSpec::new(5, QuoteField::Low),
    FieldSpec::new(8, QuoteField::Volume),
    FieldSpec::new(9, QuoteField::Amount),
];

/// One bar from the getKLineData endpoint.
#[derive(Debug, Deserialize)]
struct KlineItem {
    day: String,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
}

pub struct SinaProvider {
    client: Client,
}

impl Default for SinaProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SinaProvider {
    pub fn new() -> Self {
        Self {
            client: build_client(Duration::from_secs(5)),
        }
    }

    fn parse_quote_line(
        line: &str,
        symbol: &StockSymbol,
    ) -> Result<Option<RealtimeQuote>, QuoteError> {
        let payload = match extract_assignment(line) {
            Some(payload) if !payload.is_empty() => payload,
            _ => return Ok(None),
        };
        let draft = parse_delimited(PROVIDER_ID, payload, ',', MIN_FIELDS, FIELDS)?;
        Ok(Some(draft.into_quote(symbol)))
    }

    fn parse_kline(body: &str) -> Result<Vec<DailyBar>, QuoteError> {
        let items: Vec<KlineItem> =
            serde_json::from_str(body.trim()).map_err(|e| QuoteError::Parse {
                provider: PROVIDER_ID.to_string(),
                message: format!("kline body is not a JSON array: {}", e),
            })?;

        let mut bars = Vec::with_capacity(items.len());
        for item in items {
            let date = NaiveDate::parse_from_str(&item.day, "%Y-%m-%d").map_err(|_| {
                QuoteError::Parse {
                    provider: PROVIDER_ID.to_string(),
                    message: format!("bad kline date '{}'", item.day),
                }
            })?;
            bars.push(DailyBar {
                date,
                open: parse_decimal(&item.open)?,
                high: parse_decimal(&item.high)?,
                low: parse_decimal(&item.low)?,
                close: parse_decimal(&item.close)?,
                volume: parse_decimal(&item.volume)?,
                // the kline endpoint has no amount column
                amount: Decimal::ZERO,
                pct_change: Decimal::ZERO,
            });
        }
        derive_pct_changes(&mut bars);
        Ok(bars)
    }
}

fn parse_decimal(raw: &str) -> Result<Decimal, QuoteError> {
    raw.trim().parse::<Decimal>().map_err(|_| QuoteError::Parse {
        provider: PROVIDER_ID.to_string(),
        message: format!("unparsable kline number '{}'", raw),
    })
}

#[async_trait]
impl QuoteProvider for SinaProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u16 {
        1
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_realtime: true,
            supports_daily: true,
            supports_batch: true,
            supports_fundamentals: false,
            max_batch_size: MAX_BATCH,
            daily_is_synthesized: false,
            explicit_only: false,
        }
    }

    fn pacing(&self) -> Pacing {
        Pacing {
            min_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(800),
            ..Pacing::default()
        }
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn fetch_realtime(&self, symbol: &StockSymbol) -> Result<RealtimeQuote, QuoteError> {
        let url = format!("{}{}", QUOTE_URL, symbol.exchange_prefixed());
        let body = get_text(&self.client, PROVIDER_ID, &url, Some(REFERER)).await?;
        match Self::parse_quote_line(&body, symbol)? {
            Some(quote) => Ok(quote),
            None => Err(QuoteError::Parse {
                provider: PROVIDER_ID.to_string(),
                message: format!("empty payload for {}", symbol),
            }),
        }
    }

    async fn fetch_batch_realtime(
        &self,
        symbols: &[StockSymbol],
    ) -> Result<HashMap<String, Option<RealtimeQuote>>, QuoteError> {
        let codes = symbols
            .iter()
            .map(|s| s.exchange_prefixed())
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}{}", QUOTE_URL, codes);
        let body = get_text(&self.client, PROVIDER_ID, &url, Some(REFERER)).await?;
        debug!("Sina batch of {} symbols answered", symbols.len());

        let mut results = HashMap::with_capacity(symbols.len());
        for symbol in symbols {
            let marker = format!("hq_str_{}", symbol.exchange_prefixed());
            let line = body.lines().find(|line| line.contains(&marker));
            let quote = match line {
                Some(line) => Self::parse_quote_line(line, symbol)?,
                None => None,
            };
            if quote.is_none() {
                warn!("Sina returned no data for {}", symbol);
            }
            results.insert(symbol.code().to_string(), quote);
        }
        Ok(results)
    }

    async fn fetch_daily_series(
        &self,
        symbol: &StockSymbol,
        lookback_days: u32,
    ) -> Result<Vec<DailyBar>, QuoteError> {
        let url = format!(
            "{}?symbol={}&scale=240&ma=no&datalen={}",
            KLINE_URL,
            symbol.exchange_prefixed(),
            lookback_days
        );
        let body = get_text(&self.client, PROVIDER_ID, &url, Some(REFERER)).await?;
        if body.trim().is_empty() || body.trim() == "null" {
            return Err(QuoteError::Parse {
                provider: PROVIDER_ID.to_string(),
                message: format!("no kline data for {}", symbol),
            });
        }
        Self::parse_kline(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const LINE: &str = "var hq_str_sh600519=\"贵州茅台,1845.00,1850.00,1860.00,1865.00,1840.00,1859.90,1860.00,1234567,2295678901.00,100,1859.90,200,1859.50,300,1859.00,400,1858.80,500,1858.50,100,1860.00,200,1860.10,300,1860.50,400,1861.00,500,1861.50,2024-06-14,15:00:00,00\";";

    #[test]
    fn test_parses_realtime_line() {
        let symbol = StockSymbol::parse("600519").unwrap();
        let quote = SinaProvider::parse_quote_line(LINE, &symbol)
            .unwrap()
            .unwrap();
        assert_eq!(quote.name, "贵州茅台");
        assert_eq!(quote.open, dec!(1845.00));
        assert_eq!(quote.pre_close, dec!(1850.00));
        assert_eq!(quote.price, dec!(1860.00));
        assert_eq!(quote.high, dec!(1865.00));
        assert_eq!(quote.low, dec!(1840.00));
        assert_eq!(quote.volume, dec!(1234567));
        assert_eq!(quote.amount, dec!(2295678901.00));
        // derived from price vs pre_close: (1860-1850)/1850*100
        assert!(quote.change_pct > dec!(0.54) && quote.change_pct < dec!(0.55));
        // sina reports no fundamentals in this payload
        assert!(!quote.turnover_rate.is_reported());
        assert!(!quote.pe_ratio.is_reported());
    }

    #[test]
    fn test_empty_assignment_means_unknown_symbol() {
        let symbol = StockSymbol::parse("600519").unwrap();
        let result =
            SinaProvider::parse_quote_line("var hq_str_sh600519=\"\";", &symbol).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_short_line_is_a_parse_error() {
        let symbol = StockSymbol::parse("600519").unwrap();
        let err = SinaProvider::parse_quote_line("var hq_str_sh600519=\"a,b,c\";", &symbol)
            .unwrap_err();
        assert!(matches!(err, QuoteError::Parse { .. }));
    }

    #[test]
    fn test_parses_kline_and_derives_pct() {
        let body = r#"[
            {"day":"2024-06-13","open":"1800.000","high":"1820.000","low":"1795.000","close":"1800.000","volume":"2500000"},
            {"day":"2024-06-14","open":"1805.000","high":"1865.000","low":"1800.000","close":"1860.000","volume":"3710239"}
        ]"#;
        let bars = SinaProvider::parse_kline(body).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].pct_change, dec!(0));
        // (1860-1800)/1800*100
        assert!(bars[1].pct_change > dec!(3.33) && bars[1].pct_change < dec!(3.34));
    }

    #[test]
    fn test_kline_null_body_is_rejected_upstream() {
        let err = SinaProvider::parse_kline("not json").unwrap_err();
        assert!(matches!(err, QuoteError::Parse { .. }));
    }
}
