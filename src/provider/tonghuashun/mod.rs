//! Tonghuashun (10jqka) provider.
//!
//! The v6 line endpoint answers JSONP:
//! `quotebridge_v6_line_hs_600519_01_last({"data":"YYYYMMDD,open,close,high,low,volume,amount,pct"})`
//! with volume in lots of 100 shares and amount in units of 10000
//! yuan. Single symbol per request; the same payload serves realtime
//! and a synthesized single-bar daily series. The endpoint sometimes
//! reports bans inside an HTTP 200 body, which classifies as
//! rate limiting.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

use crate::errors::{looks_rate_limited, QuoteError};
use crate::models::{DailyBar, Metric, RealtimeQuote, StockSymbol};
use crate::provider::{build_client, get_text, Pacing, ProviderCapabilities, QuoteProvider};

const PROVIDER_ID: &str = "TONGHUASHUN";
const BASE_URL: &str = "https://d.10jqka.com.cn/v6/line";
const REFERER: &str = "http://10jqka.com.cn/";
const MIN_FIELDS: usize = 8;

#[derive(Debug, Deserialize)]
struct LineEnvelope {
    #[serde(default)]
    data: String,
}

/// One parsed snapshot from the line endpoint.
#[derive(Clone, Debug, PartialEq)]
struct Snapshot {
    date: NaiveDate,
    open: Decimal,
    close: Decimal,
    high: Decimal,
    low: Decimal,
    volume: Decimal,
    amount: Decimal,
    change_pct: Decimal,
}

pub struct TonghuashunProvider {
    client: Client,
}

impl Default for TonghuashunProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TonghuashunProvider {
    pub fn new() -> Self {
        Self {
            client: build_client(Duration::from_secs(8)),
        }
    }

    fn parse_snapshot(body: &str) -> Result<Snapshot, QuoteError> {
        // strip the JSONP callback wrapper
        let start = body.find('(');
        let end = body.rfind(')');
        let json = match (start, end) {
            (Some(start), Some(end)) if start + 1 < end => &body[start + 1..end],
            _ => {
                // bans arrive as an HTTP 200 with an HTML or text body
                if looks_rate_limited(body) {
                    warn!("Tonghuashun body carries a throttle marker");
                    return Err(QuoteError::RateLimited {
                        provider: PROVIDER_ID.to_string(),
                    });
                }
                return Err(QuoteError::Parse {
                    provider: PROVIDER_ID.to_string(),
                    message: "missing JSONP envelope".to_string(),
                });
            }
        };
        let envelope: LineEnvelope =
            serde_json::from_str(json).map_err(|e| QuoteError::Parse {
                provider: PROVIDER_ID.to_string(),
                message: format!("bad envelope: {}", e),
            })?;
        if envelope.data.is_empty() {
            return Err(QuoteError::Parse {
                provider: PROVIDER_ID.to_string(),
                message: "empty data payload".to_string(),
            });
        }

        let fields: Vec<&str> = envelope.data.split(',').collect();
        if fields.len() < MIN_FIELDS {
            return Err(QuoteError::Parse {
                provider: PROVIDER_ID.to_string(),
                message: format!("field count {} < {}", fields.len(), MIN_FIELDS),
            });
        }

        let date = NaiveDate::parse_from_str(fields[0], "%Y%m%d")
            .unwrap_or_else(|_| Utc::now().date_naive());
        Ok(Snapshot {
            date,
            open: parse_field(fields[1])?,
            close: parse_field(fields[2])?,
            high: parse_field(fields[3])?,
            low: parse_field(fields[4])?,
            volume: parse_field(fields[5])? * Decimal::from(100),
            amount: parse_field(fields[6])? * Decimal::from(10_000),
            change_pct: parse_field(fields[7])?,
        })
    }

    async fn fetch_snapshot(&self, symbol: &StockSymbol) -> Result<Snapshot, QuoteError> {
        let url = format!("{}/{}/01/last.js", BASE_URL, symbol.tonghuashun());
        let body = get_text(&self.client, PROVIDER_ID, &url, Some(REFERER)).await?;
        Self::parse_snapshot(&body)
    }
}

/// Back out the previous close from close and pct change. A -100 pct
/// day (close at zero) would zero the denominator, so fall back to the
/// close itself instead of dividing.
fn back_out_pre_close(close: Decimal, change_pct: Decimal) -> Decimal {
    let denominator = Decimal::from(100) + change_pct;
    if change_pct.is_zero() || denominator.is_zero() {
        close
    } else {
        close * Decimal::from(100) / denominator
    }
}

fn parse_field(raw: &str) -> Result<Decimal, QuoteError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }
    trimmed.parse::<Decimal>().map_err(|_| QuoteError::Parse {
        provider: PROVIDER_ID.to_string(),
        message: format!("unparsable number '{}'", raw),
    })
}

#[async_trait]
impl QuoteProvider for TonghuashunProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u16 {
        5
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_realtime: true,
            supports_daily: true,
            supports_batch: false,
            supports_fundamentals: false,
            max_batch_size: 1,
            daily_is_synthesized: true,
            explicit_only: false,
        }
    }

    fn pacing(&self) -> Pacing {
        // 10jqka bans aggressively
        Pacing {
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(1500),
            ..Pacing::default()
        }
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(45)
    }

    async fn fetch_realtime(&self, symbol: &StockSymbol) -> Result<RealtimeQuote, QuoteError> {
        let snapshot = self.fetch_snapshot(symbol).await?;
        let pre_close = back_out_pre_close(snapshot.close, snapshot.change_pct);
        Ok(RealtimeQuote {
            symbol: symbol.code().to_string(),
            // the line endpoint carries no display name
            name: String::new(),
            price: snapshot.close,
            change_pct: snapshot.change_pct,
            open: snapshot.open,
            pre_close,
            high: snapshot.high,
            low: snapshot.low,
            volume: snapshot.volume,
            amount: snapshot.amount,
            turnover_rate: Metric::unreported(),
            volume_ratio: Metric::unreported(),
            pe_ratio: Metric::unreported(),
            pb_ratio: Metric::unreported(),
            captured_at: Utc::now(),
        })
    }

    async fn fetch_daily_series(
        &self,
        symbol: &StockSymbol,
        _lookback_days: u32,
    ) -> Result<Vec<DailyBar>, QuoteError> {
        let snapshot = self.fetch_snapshot(symbol).await?;
        Ok(vec![DailyBar {
            date: snapshot.date,
            open: snapshot.open,
            high: snapshot.high,
            low: snapshot.low,
            close: snapshot.close,
            volume: snapshot.volume,
            amount: snapshot.amount,
            pct_change: snapshot.change_pct,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const BODY: &str =
        r#"quotebridge_v6_line_hs_600519_01_last({"data":"20240614,1845.00,1860.00,1865.00,1840.00,12345,229567,0.54"})"#;

    #[test]
    fn test_parses_jsonp_snapshot() {
        let snapshot = TonghuashunProvider::parse_snapshot(BODY).unwrap();
        assert_eq!(snapshot.date, NaiveDate::from_ymd_opt(2024, 6, 14).unwrap());
        assert_eq!(snapshot.open, dec!(1845.00));
        assert_eq!(snapshot.close, dec!(1860.00));
        // lots and 万元 scaled to shares and yuan
        assert_eq!(snapshot.volume, dec!(1234500));
        assert_eq!(snapshot.amount, dec!(2295670000));
        assert_eq!(snapshot.change_pct, dec!(0.54));
    }

    #[test]
    fn test_missing_envelope_is_a_parse_error() {
        let err = TonghuashunProvider::parse_snapshot("null").unwrap_err();
        assert!(matches!(err, QuoteError::Parse { .. }));
    }

    #[test]
    fn test_empty_data_is_a_parse_error() {
        let err = TonghuashunProvider::parse_snapshot(r#"cb({"data":""})"#).unwrap_err();
        assert!(matches!(err, QuoteError::Parse { .. }));
    }

    #[test]
    fn test_full_loss_day_keeps_pre_close_finite() {
        let body = r#"cb({"data":"20240614,1.00,0.00,1.00,0.00,1,1,-100"})"#;
        let snapshot = TonghuashunProvider::parse_snapshot(body).unwrap();
        assert_eq!(snapshot.change_pct, dec!(-100));
        assert_eq!(
            back_out_pre_close(snapshot.close, snapshot.change_pct),
            dec!(0.00)
        );
    }

    #[test]
    fn test_pre_close_backed_out_from_pct() {
        // +25% from 8.00 closes at 10.00
        assert_eq!(back_out_pre_close(dec!(10.00), dec!(25)), dec!(8.00));
        assert_eq!(back_out_pre_close(dec!(10.00), dec!(0)), dec!(10.00));
    }

    #[test]
    fn test_ban_marker_in_body_classifies_as_rate_limited() {
        let err =
            TonghuashunProvider::parse_snapshot("your ip has been banned").unwrap_err();
        assert!(matches!(err, QuoteError::RateLimited { .. }));
    }
}
