//! Declarative positional field mapping for delimited wire formats.
//!
//! Sina and Tencent speak JS-literal assignment strings whose payload is
//! a single delimited line addressed by fixed numeric index. Each
//! adapter declares one table mapping raw index → canonical field (with
//! explicit unit scaling), and this module turns a literal payload plus
//! that table into a [`QuoteDraft`]. The table is the single source of
//! truth for the adapter's parsing and is testable without any network.

use chrono::Utc;
use rust_decimal::Decimal;

use crate::errors::QuoteError;
use crate::models::{Metric, RealtimeQuote, StockSymbol};

/// Canonical destination of one raw positional field.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QuoteField {
    Name,
    Price,
    PreClose,
    Open,
    High,
    Low,
    Volume,
    Amount,
    ChangePct,
    TurnoverRate,
    VolumeRatio,
    PeRatio,
    PbRatio,
}

/// One entry of an adapter's field-mapping table.
#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
    /// Zero-based index into the delimited payload.
    pub index: usize,
    /// Canonical field the raw value feeds.
    pub field: QuoteField,
    /// Unit multiplier (手→股 is 100, 万元→元 is 10_000).
    pub scale: u32,
}

impl FieldSpec {
    pub const fn new(index: usize, field: QuoteField) -> Self {
        Self {
            index,
            field,
            scale: 1,
        }
    }

    pub const fn scaled(index: usize, field: QuoteField, scale: u32) -> Self {
        Self {
            index,
            field,
            scale,
        }
    }
}

/// Partially assembled quote, prior to sentinel/`Unreported` fill-in.
#[derive(Clone, Debug, Default)]
pub struct QuoteDraft {
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub pre_close: Option<Decimal>,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub change_pct: Option<Decimal>,
    pub turnover_rate: Option<Decimal>,
    pub volume_ratio: Option<Decimal>,
    pub pe_ratio: Option<Decimal>,
    pub pb_ratio: Option<Decimal>,
}

impl QuoteDraft {
    /// Finalize into a canonical quote.
    ///
    /// Core fields the table never mapped (or the payload left blank)
    /// take the zero sentinel; change percent is derived from price vs.
    /// previous close when the wire omits it; optional metrics the
    /// table does not map materialize as `Unreported`.
    pub fn into_quote(self, symbol: &StockSymbol) -> RealtimeQuote {
        let price = self.price.unwrap_or_default();
        let pre_close = self.pre_close.unwrap_or_default();

        let change_pct = self.change_pct.unwrap_or_else(|| {
            if pre_close > Decimal::ZERO {
                (price - pre_close) / pre_close * Decimal::from(100)
            } else {
                Decimal::ZERO
            }
        });

        RealtimeQuote {
            symbol: symbol.code().to_string(),
            name: self.name.unwrap_or_default(),
            price,
            change_pct,
            open: self.open.unwrap_or_default(),
            pre_close,
            high: self.high.unwrap_or_default(),
            low: self.low.unwrap_or_default(),
            volume: self.volume.unwrap_or_default(),
            amount: self.amount.unwrap_or_default(),
            turnover_rate: Metric::from(self.turnover_rate),
            volume_ratio: Metric::from(self.volume_ratio),
            pe_ratio: Metric::from(self.pe_ratio),
            pb_ratio: Metric::from(self.pb_ratio),
            captured_at: Utc::now(),
        }
    }
}

/// Parse a delimited payload through an adapter's field table.
///
/// Fails with a parse error when the payload has fewer than
/// `min_fields` fields or a mapped field holds an unparsable number.
/// Mapped indices beyond the payload length, and blank fields, are
/// treated as not reported by this response.
pub fn parse_delimited(
    provider: &'static str,
    payload: &str,
    separator: char,
    min_fields: usize,
    table: &[FieldSpec],
) -> Result<QuoteDraft, QuoteError> {
    let fields: Vec<&str> = payload.split(separator).collect();
    if fields.len() < min_fields {
        return Err(QuoteError::Parse {
            provider: provider.to_string(),
            message: format!("field count {} < {}", fields.len(), min_fields),
        });
    }

    let mut draft = QuoteDraft::default();
    for spec in table {
        let raw = match fields.get(spec.index) {
            Some(raw) if !raw.trim().is_empty() => raw.trim(),
            _ => continue,
        };

        if spec.field == QuoteField::Name {
            draft.name = Some(raw.to_string());
            continue;
        }

        let value = parse_number(provider, spec.index, raw)? * Decimal::from(spec.scale);
        match spec.field {
            // handled above
            QuoteField::Name => {}
            QuoteField::Price => draft.price = Some(value),
            QuoteField::PreClose => draft.pre_close = Some(value),
            QuoteField::Open => draft.open = Some(value),
            QuoteField::High => draft.high = Some(value),
            QuoteField::Low => draft.low = Some(value),
            QuoteField::Volume => draft.volume = Some(value),
            QuoteField::Amount => draft.amount = Some(value),
            QuoteField::ChangePct => draft.change_pct = Some(value),
            QuoteField::TurnoverRate => draft.turnover_rate = Some(value),
            QuoteField::VolumeRatio => draft.volume_ratio = Some(value),
            QuoteField::PeRatio => draft.pe_ratio = Some(value),
            QuoteField::PbRatio => draft.pb_ratio = Some(value),
        }
    }

    Ok(draft)
}

/// Coerce a raw numeric string, stripping a trailing percent sign.
fn parse_number(provider: &'static str, index: usize, raw: &str) -> Result<Decimal, QuoteError> {
    let trimmed = raw.strip_suffix('%').unwrap_or(raw);
    trimmed.parse::<Decimal>().map_err(|_| QuoteError::Parse {
        provider: provider.to_string(),
        message: format!("unparsable number '{}' at index {}", raw, index),
    })
}

/// Extract the payload of a JS-literal assignment line, i.e. the text
/// between `="` and the closing `"`.
pub fn extract_assignment(line: &str) -> Option<&str> {
    let start = line.find("=\"")? + 2;
    let rest = &line[start..];
    let end = rest.find('"')?;
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const TABLE: &[FieldSpec] = &[
        FieldSpec::new(0, QuoteField::Name),
        FieldSpec::new(1, QuoteField::Price),
        FieldSpec::new(2, QuoteField::PreClose),
        FieldSpec::scaled(3, QuoteField::Volume, 100),
        FieldSpec::new(9, QuoteField::TurnoverRate),
    ];

    #[test]
    fn test_parse_with_scaling() {
        let draft = parse_delimited("TEST", "平安银行,10.50,10.00,1234,x", ',', 4, TABLE).unwrap();
        assert_eq!(draft.name.as_deref(), Some("平安银行"));
        assert_eq!(draft.price, Some(dec!(10.50)));
        assert_eq!(draft.volume, Some(dec!(123400)));
        // index 9 beyond payload length: not reported
        assert_eq!(draft.turnover_rate, None);
    }

    #[test]
    fn test_short_payload_is_a_parse_error() {
        let err = parse_delimited("TEST", "a,b", ',', 4, TABLE).unwrap_err();
        assert!(matches!(err, QuoteError::Parse { .. }));
    }

    #[test]
    fn test_unparsable_number_is_a_parse_error() {
        let err =
            parse_delimited("TEST", "name,not-a-number,10.00,5", ',', 4, TABLE).unwrap_err();
        match err {
            QuoteError::Parse { message, .. } => assert!(message.contains("index 1")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_blank_fields_are_not_reported() {
        let draft = parse_delimited("TEST", "name,,10.00,5", ',', 4, TABLE).unwrap();
        assert_eq!(draft.price, None);
        assert_eq!(draft.pre_close, Some(dec!(10.00)));
    }

    #[test]
    fn test_percent_suffix_is_stripped() {
        let table = &[FieldSpec::new(0, QuoteField::ChangePct)];
        let draft = parse_delimited("TEST", "3.25%", ',', 1, table).unwrap();
        assert_eq!(draft.change_pct, Some(dec!(3.25)));
    }

    #[test]
    fn test_into_quote_derives_change_pct_and_fills_sentinels() {
        let draft = QuoteDraft {
            price: Some(dec!(105)),
            pre_close: Some(dec!(100)),
            ..Default::default()
        };
        let symbol = StockSymbol::parse("600519").unwrap();
        let quote = draft.into_quote(&symbol);
        assert_eq!(quote.change_pct, dec!(5));
        assert_eq!(quote.open, dec!(0));
        assert_eq!(quote.volume, dec!(0));
        assert!(!quote.pe_ratio.is_reported());
        assert!(!quote.volume_ratio.is_reported());
    }

    #[test]
    fn test_extract_assignment() {
        let line = r#"var hq_str_sh600519="贵州茅台,1845.00,1850.00";"#;
        assert_eq!(extract_assignment(line), Some("贵州茅台,1845.00,1850.00"));
        assert_eq!(extract_assignment("no assignment here"), None);
    }
}
