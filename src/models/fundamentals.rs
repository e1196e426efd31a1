use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Best-effort fundamentals for a symbol.
///
/// Unlike [`RealtimeQuote`](super::RealtimeQuote), this is not part of
/// the strict canonical contract: fields a provider cannot supply are
/// omitted from serialization rather than defaulted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    /// Price/earnings ratio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pe_ratio: Option<Decimal>,

    /// Price/book ratio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pb_ratio: Option<Decimal>,

    /// Total market capitalization, in CNY
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_market_cap: Option<Decimal>,

    /// Free-float market capitalization, in CNY
    #[serde(skip_serializing_if = "Option::is_none")]
    pub float_market_cap: Option<Decimal>,

    /// Turnover rate (%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turnover_rate: Option<Decimal>,

    /// Volume ratio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_ratio: Option<Decimal>,
}

impl Fundamentals {
    /// True when no field was reported at all.
    pub fn is_empty(&self) -> bool {
        self.pe_ratio.is_none()
            && self.pb_ratio.is_none()
            && self.total_market_cap.is_none()
            && self.float_market_cap.is_none()
            && self.turnover_rate.is_none()
            && self.volume_ratio.is_none()
    }
}
