//! Tencent (qt.gtimg.cn) provider.
//!
//! Realtime payloads are JS-literal assignment lines whose value is a
//! tilde-delimited record of 50+ positions. Volume arrives in lots of
//! 100 shares and amount in units of 10000 yuan. A missing symbol
//! answers with a `pv_none_match` line. The realtime record carries
//! turnover rate and PE, so fundamentals come from the same payload.
//! There is no history endpoint here; a daily request synthesizes a
//! single bar from the current snapshot.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::errors::QuoteError;
use crate::models::{DailyBar, Fundamentals, RealtimeQuote, StockSymbol};
use crate::provider::fieldmap::{extract_assignment, parse_delimited, FieldSpec, QuoteField};
use crate::provider::{build_client, get_text, Pacing, ProviderCapabilities, QuoteProvider};

const PROVIDER_ID: &str = "TENCENT";
const QUOTE_URL: &str = "https://qt.gtimg.cn/q=";
const MIN_FIELDS: usize = 20;
const MAX_BATCH: usize = 60;
const NONE_MATCH: &str = "pv_none_match";

/// Tilde-position map for the qt.gtimg.cn payload.
const FIELDS: &[FieldSpec] = &[
    FieldSpec::new(1, QuoteField::Name),
    FieldSpec::new(3, QuoteField::Price),
    FieldSpec::new(4, QuoteField::PreClose),
    FieldSpec::new(5, QuoteField::Open),
    FieldSpec::scaled(6, QuoteField::Volume, 100),
    FieldSpec::new(18, QuoteField::High),
    FieldSpec::new(19, QuoteField::Low),
    FieldSpec::scaled(21, QuoteField::Amount, 10_000),
    FieldSpec::new(43, QuoteField::ChangePct),
    FieldSpec::new(49, QuoteField::TurnoverRate),
    FieldSpec::new(50, QuoteField::PeRatio),
];

pub struct TencentProvider {
    client: Client,
}

impl Default for TencentProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TencentProvider {
    pub fn new() -> Self {
        Self {
            client: build_client(Duration::from_secs(5)),
        }
    }

    fn parse_quote_line(
        line: &str,
        symbol: &StockSymbol,
    ) -> Result<Option<RealtimeQuote>, QuoteError> {
        if line.contains(NONE_MATCH) {
            return Ok(None);
        }
        let payload = match extract_assignment(line) {
            Some(payload) if !payload.is_empty() => payload,
            _ => return Ok(None),
        };
        let draft = parse_delimited(PROVIDER_ID, payload, '~', MIN_FIELDS, FIELDS)?;
        Ok(Some(draft.into_quote(symbol)))
    }

    fn synthesize_daily(quote: &RealtimeQuote) -> DailyBar {
        DailyBar {
            date: quote.captured_at.date_naive(),
            open: quote.open,
            high: quote.high,
            low: quote.low,
            close: quote.price,
            volume: quote.volume,
            amount: quote.amount,
            pct_change: quote.change_pct,
        }
    }
}

#[async_trait]
impl QuoteProvider for TencentProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u16 {
        0
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_realtime: true,
            supports_daily: true,
            supports_batch: true,
            supports_fundamentals: true,
            max_batch_size: MAX_BATCH,
            daily_is_synthesized: true,
            explicit_only: false,
        }
    }

    fn pacing(&self) -> Pacing {
        Pacing {
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            ..Pacing::default()
        }
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn fetch_realtime(&self, symbol: &StockSymbol) -> Result<RealtimeQuote, QuoteError> {
        let url = format!("{}{}", QUOTE_URL, symbol.exchange_prefixed());
        let body = get_text(&self.client, PROVIDER_ID, &url, None).await?;
        match Self::parse_quote_line(&body, symbol)? {
            Some(quote) => Ok(quote),
            None => Err(QuoteError::Parse {
                provider: PROVIDER_ID.to_string(),
                message: format!("no match for {}", symbol),
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
        let body = get_text(&self.client, PROVIDER_ID, &url, None).await?;
        debug!("Tencent batch of {} symbols answered", symbols.len());

        let mut results = HashMap::with_capacity(symbols.len());
        for symbol in symbols {
            let marker = format!("v_{}=", symbol.exchange_prefixed());
            let line = body.lines().find(|line| line.contains(&marker));
            let quote = match line {
                Some(line) => Self::parse_quote_line(line, symbol)?,
                None => None,
            };
            if quote.is_none() {
                warn!("Tencent returned no data for {}", symbol);
            }
            results.insert(symbol.code().to_string(), quote);
        }
        Ok(results)
    }

    async fn fetch_daily_series(
        &self,
        symbol: &StockSymbol,
        _lookback_days: u32,
    ) -> Result<Vec<DailyBar>, QuoteError> {
        // no history endpoint; one bar from the live snapshot
        let quote = self.fetch_realtime(symbol).await?;
        Ok(vec![Self::synthesize_daily(&quote)])
    }

    async fn fetch_fundamentals(&self, symbol: &StockSymbol) -> Result<Fundamentals, QuoteError> {
        let quote = self.fetch_realtime(symbol).await?;
        Ok(Fundamentals {
            pe_ratio: quote.pe_ratio.value(),
            turnover_rate: quote.turnover_rate.value(),
            ..Fundamentals::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // positions 3/4/5 prices, 6 volume lots, 18/19 high/low, 21 amount
    // in units of 10000, 43 change pct, 49 turnover, 50 pe
    const LINE: &str = "v_sh600519=\"1~贵州茅台~600519~1860.00~1850.00~1845.00~12345~0~0~0~0~0~0~0~0~0~0~0~1865.00~1840.00~0~229567~0~0~0~0~0~0~0~0~0~0~0~0~0~0~0~0~0~0~0~0~10.00~0.54~0~0~0~0~0~0.28~31.50\";";

    #[test]
    fn test_parses_realtime_line_with_scaling() {
        let symbol = StockSymbol::parse("600519").unwrap();
        let quote = TencentProvider::parse_quote_line(LINE, &symbol)
            .unwrap()
            .unwrap();
        assert_eq!(quote.name, "贵州茅台");
        assert_eq!(quote.price, dec!(1860.00));
        assert_eq!(quote.pre_close, dec!(1850.00));
        assert_eq!(quote.open, dec!(1845.00));
        // 12345 lots of 100 shares
        assert_eq!(quote.volume, dec!(1234500));
        assert_eq!(quote.high, dec!(1865.00));
        assert_eq!(quote.low, dec!(1840.00));
        // index 21 in units of 10000 yuan
        assert_eq!(quote.amount, dec!(2295670000));
        assert_eq!(quote.change_pct, dec!(0.54));
        assert_eq!(quote.turnover_rate.value(), Some(dec!(0.28)));
        assert_eq!(quote.pe_ratio.value(), Some(dec!(31.50)));
        assert!(!quote.pb_ratio.is_reported());
    }

    #[test]
    fn test_none_match_line_means_unknown_symbol() {
        let symbol = StockSymbol::parse("600519").unwrap();
        let result =
            TencentProvider::parse_quote_line("v_pv_none_match=\"1\";", &symbol).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_short_line_is_a_parse_error() {
        let symbol = StockSymbol::parse("600519").unwrap();
        let err = TencentProvider::parse_quote_line("v_sh600519=\"1~x~y\";", &symbol).unwrap_err();
        assert!(matches!(err, QuoteError::Parse { .. }));
    }

    #[test]
    fn test_synthesized_daily_bar_mirrors_snapshot() {
        let symbol = StockSymbol::parse("600519").unwrap();
        let quote = TencentProvider::parse_quote_line(LINE, &symbol)
            .unwrap()
            .unwrap();
        let bar = TencentProvider::synthesize_daily(&quote);
        assert_eq!(bar.close, quote.price);
        assert_eq!(bar.pct_change, quote.change_pct);
        assert_eq!(bar.date, quote.captured_at.date_naive());
    }
}
