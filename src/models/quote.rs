use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An optional per-quote metric that distinguishes "the source reported
/// this value" from "the source does not carry this field".
///
/// Defaulting an unreported metric to zero conflates "unknown" with
/// "genuinely zero" and corrupts downstream scoring, so unreported
/// metrics serialize as an explicit `null` instead. The field itself is
/// always present in the serialized map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metric(Option<Decimal>);

impl Metric {
    /// A value the source actually reported.
    pub fn reported(value: Decimal) -> Self {
        Self(Some(value))
    }

    /// The source does not carry this field.
    pub fn unreported() -> Self {
        Self(None)
    }

    /// True when the source reported a value.
    pub fn is_reported(&self) -> bool {
        self.0.is_some()
    }

    /// The reported value, if any.
    pub fn value(&self) -> Option<Decimal> {
        self.0
    }
}

impl From<Option<Decimal>> for Metric {
    fn from(value: Option<Decimal>) -> Self {
        Self(value)
    }
}

/// Canonical realtime quote.
///
/// A strict structural superset of every provider's native fields:
/// every field is always present, so consumers never branch on "does
/// this provider have field X". Core trade fields default to zero when
/// a source omits them; the four fundamentals use [`Metric`] so that
/// "unreported" stays distinct from a genuine zero.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RealtimeQuote {
    /// Exchange symbol, e.g. "600519"
    pub symbol: String,

    /// Security display name ("" when the source omits it)
    pub name: String,

    /// Latest traded price
    pub price: Decimal,

    /// Percent change vs. previous close
    pub change_pct: Decimal,

    /// Opening price of the session
    pub open: Decimal,

    /// Previous session close
    pub pre_close: Decimal,

    /// Session high
    pub high: Decimal,

    /// Session low
    pub low: Decimal,

    /// Traded volume, in shares
    pub volume: Decimal,

    /// Traded amount, in CNY
    pub amount: Decimal,

    /// Turnover rate (%), if the source reports it
    pub turnover_rate: Metric,

    /// Volume ratio, if the source reports it
    pub volume_ratio: Metric,

    /// Price/earnings ratio, if the source reports it
    pub pe_ratio: Metric,

    /// Price/book ratio, if the source reports it
    pub pb_ratio: Metric,

    /// When this quote was captured from the upstream
    pub captured_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> RealtimeQuote {
        RealtimeQuote {
            symbol: "600519".to_string(),
            name: "贵州茅台".to_string(),
            price: dec!(1850.00),
            change_pct: dec!(0.27),
            open: dec!(1845.00),
            pre_close: dec!(1845.00),
            high: dec!(1860.00),
            low: dec!(1840.00),
            volume: dec!(12345678),
            amount: dec!(1234567890.00),
            turnover_rate: Metric::reported(dec!(0.98)),
            volume_ratio: Metric::unreported(),
            pe_ratio: Metric::reported(dec!(28.5)),
            pb_ratio: Metric::unreported(),
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_unreported_is_distinct_from_zero() {
        assert_ne!(Metric::unreported(), Metric::reported(dec!(0)));
        assert!(!Metric::unreported().is_reported());
        assert_eq!(Metric::reported(dec!(0)).value(), Some(dec!(0)));
    }

    #[test]
    fn test_serialized_map_contains_every_field() {
        let value = serde_json::to_value(sample()).unwrap();
        let map = value.as_object().unwrap();

        for key in [
            "symbol",
            "name",
            "price",
            "change_pct",
            "open",
            "pre_close",
            "high",
            "low",
            "volume",
            "amount",
            "turnover_rate",
            "volume_ratio",
            "pe_ratio",
            "pb_ratio",
            "captured_at",
        ] {
            assert!(map.contains_key(key), "missing field {}", key);
        }

        // Unreported metrics serialize as explicit null, never as 0.
        assert!(map["volume_ratio"].is_null());
        assert!(map["pb_ratio"].is_null());
        assert!(!map["turnover_rate"].is_null());
    }

    #[test]
    fn test_map_round_trip_preserves_every_field() {
        let quote = sample();
        let value = serde_json::to_value(&quote).unwrap();
        let restored: RealtimeQuote = serde_json::from_value(value).unwrap();
        assert_eq!(quote, restored);
    }
}
