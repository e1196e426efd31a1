//! A-Share Market Data Crate
//!
//! This crate provides a uniform acquisition layer over heterogeneous
//! quote sources for Chinese A-share symbols, with a Yahoo Finance
//! fallback.
//!
//! # Overview
//!
//! The crate supports:
//! - One canonical quote/series contract regardless of which upstream answered
//! - Eight providers with strict priority-ordered failover
//! - Anti-throttle pacing: randomized delays, User-Agent rotation, backoff retry
//! - TTL caching per (provider, symbol, operation)
//! - Per-provider health tracking with cooldown
//!
//! # Architecture
//!
//! ```text
//! +------------------+     +------------------+
//! |      Caller      | --> |   StockSymbol    |  (market recognition)
//! +------------------+     +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          | ProviderRegistry |  (priority failover)
//!                          +------------------+
//!                            |      |      |
//!                            v      v      v
//!                       +-------+ +-----+ +----------+
//!                       | Cache | |Health| | Throttle |
//!                       +-------+ +-----+ +----------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |  QuoteProvider   |  (Tencent, Sina, ...)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |  RealtimeQuote   |  (canonical data)
//!                          +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`StockSymbol`] - Market-recognized symbol with per-provider formats
//! - [`RealtimeQuote`] - Canonical quote; every field always present
//! - [`Metric`] - Optional metric distinguishing reported from unreported
//! - [`DailyBar`] - One trading day of a date-ascending series
//! - [`ProviderRegistry`] - Priority-ordered failover orchestrator
//! - [`QuoteProvider`] - Trait one implements to add an upstream source

pub mod cache;
pub mod errors;
pub mod models;
pub mod provider;
pub mod registry;
pub mod throttle;

// Re-export all public types from models
pub use models::{
    derive_pct_changes, normalize_series, DailyBar, Fundamentals, Market, Metric, RealtimeQuote,
    StockSymbol,
};

// Re-export error types
pub use errors::{ProviderFailure, QuoteError, RetryClass};

// Re-export provider types
pub use provider::baostock::BaostockProvider;
pub use provider::eastmoney::EastmoneyProvider;
pub use provider::efinance::EfinanceProvider;
pub use provider::sina::SinaProvider;
pub use provider::tencent::TencentProvider;
pub use provider::tonghuashun::TonghuashunProvider;
pub use provider::tushare::TushareProvider;
pub use provider::yahoo::YahooProvider;
pub use provider::{Pacing, ProviderCapabilities, QuoteProvider};

// Re-export registry and infrastructure types
pub use cache::{CacheKey, CachedValue, Operation, TtlCache};
pub use registry::{
    FetchDiagnostics, ProviderAttempt, ProviderHealth, ProviderRegistry, ProviderSelection,
    SkipReason,
};
pub use throttle::AntiThrottle;

use std::sync::Arc;

/// Build a registry with every no-credential provider registered.
///
/// Tushare needs a token and Baostock a gateway URL, so both are left
/// out here; register them through [`ProviderRegistry::new`] when the
/// credentials are available. Efinance is included but only answers
/// when pinned by name.
pub fn default_registry() -> ProviderRegistry {
    ProviderRegistry::new(vec![
        Arc::new(TencentProvider::new()),
        Arc::new(SinaProvider::new()),
        Arc::new(TonghuashunProvider::new()),
        Arc::new(EastmoneyProvider::new()),
        Arc::new(YahooProvider::new()),
        Arc::new(EfinanceProvider::new()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_failover_order_follows_declared_priorities() {
        let registry = default_registry();
        // Tencent's 0 outranks Sina's 1; numeric priority is
        // authoritative even though Sina is often described as the
        // fastest source
        assert_eq!(
            registry.failover_order(),
            vec![
                "TENCENT",
                "SINA",
                "TONGHUASHUN",
                "EASTMONEY",
                "YAHOO",
                "EFINANCE"
            ]
        );
    }
}
