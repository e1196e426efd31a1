use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One day's bar in a daily series.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    /// Trading date
    pub date: NaiveDate,

    /// Opening price
    pub open: Decimal,

    /// Session high
    pub high: Decimal,

    /// Session low
    pub low: Decimal,

    /// Closing price
    pub close: Decimal,

    /// Traded volume, in shares
    pub volume: Decimal,

    /// Traded amount, in CNY (zero when the source omits it)
    pub amount: Decimal,

    /// Percent change vs. the previous bar's close
    pub pct_change: Decimal,
}

/// Enforce the series invariant: date-ascending, one bar per trading
/// date. When an upstream repeats a date, the later bar wins.
pub fn normalize_series(mut bars: Vec<DailyBar>) -> Vec<DailyBar> {
    bars.sort_by_key(|bar| bar.date);
    bars.dedup_by(|next, kept| {
        if next.date == kept.date {
            // dedup_by removes `next`; keep the later occurrence instead.
            std::mem::swap(next, kept);
            true
        } else {
            false
        }
    });
    bars
}

/// Fill in `pct_change` from consecutive closes where the source left it
/// at zero. The first bar keeps whatever the source reported.
pub fn derive_pct_changes(bars: &mut [DailyBar]) {
    for i in 1..bars.len() {
        if bars[i].pct_change == Decimal::ZERO && bars[i - 1].close > Decimal::ZERO {
            let prev = bars[i - 1].close;
            bars[i].pct_change = (bars[i].close - prev) / prev * Decimal::from(100);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar(date: &str, close: Decimal) -> DailyBar {
        DailyBar {
            date: date.parse().unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(100),
            amount: dec!(0),
            pct_change: dec!(0),
        }
    }

    #[test]
    fn test_normalize_sorts_ascending() {
        let bars = vec![
            bar("2024-01-22", dec!(11)),
            bar("2024-01-19", dec!(10)),
            bar("2024-01-23", dec!(12)),
        ];
        let normalized = normalize_series(bars);
        let dates: Vec<_> = normalized.iter().map(|b| b.date.to_string()).collect();
        assert_eq!(dates, ["2024-01-19", "2024-01-22", "2024-01-23"]);
    }

    #[test]
    fn test_normalize_drops_duplicate_dates_keeping_later() {
        let bars = vec![
            bar("2024-01-19", dec!(10)),
            bar("2024-01-22", dec!(11)),
            bar("2024-01-22", dec!(99)),
        ];
        let normalized = normalize_series(bars);
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[1].close, dec!(99));
    }

    #[test]
    fn test_derive_pct_changes() {
        let mut bars = vec![bar("2024-01-19", dec!(100)), bar("2024-01-22", dec!(105))];
        derive_pct_changes(&mut bars);
        assert_eq!(bars[1].pct_change, dec!(5));
        // first bar untouched
        assert_eq!(bars[0].pct_change, dec!(0));
    }
}
