//! Market data models
//!
//! This module contains the core data types for quote operations:
//! - `quote` - Canonical realtime quote (RealtimeQuote) and the
//!   reported/unreported metric marker (Metric)
//! - `series` - Daily bars (DailyBar) and series-invariant helpers
//! - `fundamentals` - Best-effort fundamentals (Fundamentals)
//! - `symbol` - A-share symbol recognition and per-provider formats

mod fundamentals;
mod quote;
mod series;
mod symbol;

pub use fundamentals::Fundamentals;
pub use quote::{Metric, RealtimeQuote};
pub use series::{derive_pct_changes, normalize_series, DailyBar};
pub use symbol::{Market, StockSymbol};
