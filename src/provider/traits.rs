//! Quote provider trait definition.
//!
//! Implement [`QuoteProvider`] to add a new upstream source. The
//! registry uses the declared priority and capabilities to decide when
//! and how a provider is dispatched; optional operations default to
//! `Unsupported` so daily-only or realtime-only sources implement just
//! what their wire protocol carries.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::QuoteError;
use crate::models::{DailyBar, Fundamentals, RealtimeQuote, StockSymbol};

use super::capabilities::{Pacing, ProviderCapabilities};

/// Trait for upstream quote providers.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Unique identifier, a constant like "SINA" or "TENCENT". Used for
    /// logging, cache keys and health tracking.
    fn id(&self) -> &'static str;

    /// Failover priority. Lower values are tried first; ties are broken
    /// by registration order.
    fn priority(&self) -> u16;

    /// Declares which operations this provider can serve.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Anti-throttle pacing applied to every outbound call.
    fn pacing(&self) -> Pacing {
        Pacing::default()
    }

    /// How long a successful result stays valid in the TTL cache.
    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(30)
    }

    /// Fetch the latest quote for one symbol.
    async fn fetch_realtime(&self, symbol: &StockSymbol) -> Result<RealtimeQuote, QuoteError> {
        let _ = symbol;
        Err(QuoteError::Unsupported {
            provider: self.id().to_string(),
            operation: "realtime quote".to_string(),
        })
    }

    /// Fetch quotes for several symbols in one round trip.
    ///
    /// Only providers whose wire protocol supports multi-symbol
    /// requests override this; the caller is responsible for keeping
    /// `symbols` within `max_batch_size`. Symbols the upstream did not
    /// answer for map to `None`.
    async fn fetch_batch_realtime(
        &self,
        symbols: &[StockSymbol],
    ) -> Result<HashMap<String, Option<RealtimeQuote>>, QuoteError> {
        let _ = symbols;
        Err(QuoteError::Unsupported {
            provider: self.id().to_string(),
            operation: "batch realtime quotes".to_string(),
        })
    }

    /// Fetch a date-ascending daily series covering up to
    /// `lookback_days` trading days.
    ///
    /// Providers with `daily_is_synthesized` return a single bar built
    /// from the current realtime snapshot instead of true history.
    async fn fetch_daily_series(
        &self,
        symbol: &StockSymbol,
        lookback_days: u32,
    ) -> Result<Vec<DailyBar>, QuoteError> {
        let _ = (symbol, lookback_days);
        Err(QuoteError::Unsupported {
            provider: self.id().to_string(),
            operation: "daily series".to_string(),
        })
    }

    /// Fetch best-effort fundamentals. Absent fields are omitted, not
    /// defaulted.
    async fn fetch_fundamentals(&self, symbol: &StockSymbol) -> Result<Fundamentals, QuoteError> {
        let _ = symbol;
        Err(QuoteError::Unsupported {
            provider: self.id().to_string(),
            operation: "fundamentals".to_string(),
        })
    }
}
