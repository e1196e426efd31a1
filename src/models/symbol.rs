//! A-share symbol recognition and per-provider code formats.
//!
//! Every upstream wants the same six-digit code dressed differently:
//! Sina and Tencent take `sh600519`, Tonghuashun `hs_600519`, EastMoney
//! a `1.600519` secid, Tushare `600519.SH`, Baostock `sh.600519` and
//! Yahoo `600519.SS`. Recognition happens once, up front; a code that
//! matches no market prefix is rejected before any network traffic.

use crate::errors::QuoteError;

/// Mainland exchange a symbol trades on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Market {
    /// Shanghai Stock Exchange (600/601/603/605/688)
    Shanghai,
    /// Shenzhen Stock Exchange (000/001/002/003/300/301)
    Shenzhen,
}

const SHANGHAI_PREFIXES: &[&str] = &["600", "601", "603", "605", "688"];
const SHENZHEN_PREFIXES: &[&str] = &["000", "001", "002", "003", "300", "301"];

/// A validated A-share symbol: six-digit code plus its market.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StockSymbol {
    code: String,
    market: Market,
}

impl StockSymbol {
    /// Parse a raw symbol string.
    ///
    /// Accepts bare codes (`600519`), exchange-prefixed forms
    /// (`sh600519`, `SZ000001`) and suffixed forms (`600519.SH`,
    /// `600519.SS`, `000001.SZ`). A bare code whose prefix matches no
    /// known market is an error, not a guess.
    pub fn parse(raw: &str) -> Result<Self, QuoteError> {
        let trimmed = raw.trim();
        let mut market: Option<Market> = None;

        let mut code = trimmed.to_string();

        // Suffixed forms: 600519.SH / 600519.SS / 000001.SZ
        let upper = code.to_uppercase();
        for (suffix, m) in [
            (".SH", Market::Shanghai),
            (".SS", Market::Shanghai),
            (".SZ", Market::Shenzhen),
        ] {
            if let Some(stripped) = upper.strip_suffix(suffix) {
                market = Some(m);
                code = stripped.to_string();
                break;
            }
        }

        // Prefixed forms: sh600519 / sz000001
        let lower = code.to_lowercase();
        if let Some(stripped) = lower.strip_prefix("sh") {
            market = Some(Market::Shanghai);
            code = stripped.to_string();
        } else if let Some(stripped) = lower.strip_prefix("sz") {
            market = Some(Market::Shenzhen);
            code = stripped.to_string();
        }

        if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(QuoteError::UnrecognizedSymbol(raw.to_string()));
        }

        let market = match market {
            Some(m) => m,
            None => infer_market(&code).ok_or_else(|| QuoteError::UnrecognizedSymbol(raw.to_string()))?,
        };

        Ok(Self { code, market })
    }

    /// The bare six-digit code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The exchange this symbol trades on.
    pub fn market(&self) -> Market {
        self.market
    }

    /// Sina / Tencent wire format: `sh600519`, `sz000001`.
    pub fn exchange_prefixed(&self) -> String {
        match self.market {
            Market::Shanghai => format!("sh{}", self.code),
            Market::Shenzhen => format!("sz{}", self.code),
        }
    }

    /// Tonghuashun wire format: `hs_600519`.
    pub fn tonghuashun(&self) -> String {
        format!("hs_{}", self.code)
    }

    /// EastMoney secid: `1.600519` for Shanghai, `0.000001` for Shenzhen.
    pub fn eastmoney_secid(&self) -> String {
        match self.market {
            Market::Shanghai => format!("1.{}", self.code),
            Market::Shenzhen => format!("0.{}", self.code),
        }
    }

    /// Tushare code: `600519.SH`, `000001.SZ`.
    pub fn tushare(&self) -> String {
        match self.market {
            Market::Shanghai => format!("{}.SH", self.code),
            Market::Shenzhen => format!("{}.SZ", self.code),
        }
    }

    /// Baostock code: `sh.600519`, `sz.000001`.
    pub fn baostock(&self) -> String {
        match self.market {
            Market::Shanghai => format!("sh.{}", self.code),
            Market::Shenzhen => format!("sz.{}", self.code),
        }
    }

    /// Yahoo Finance ticker: `600519.SS`, `000001.SZ`.
    pub fn yahoo(&self) -> String {
        match self.market {
            Market::Shanghai => format!("{}.SS", self.code),
            Market::Shenzhen => format!("{}.SZ", self.code),
        }
    }
}

impl std::fmt::Display for StockSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.code)
    }
}

fn infer_market(code: &str) -> Option<Market> {
    let prefix = &code[..3];
    if SHANGHAI_PREFIXES.contains(&prefix) {
        Some(Market::Shanghai)
    } else if SHENZHEN_PREFIXES.contains(&prefix) {
        Some(Market::Shenzhen)
    } else {
        None
    }
}
