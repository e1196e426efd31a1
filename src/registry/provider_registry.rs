//! Provider registry and failover orchestration.
//!
//! The registry owns the provider list sorted by priority and walks it
//! for every operation: health check, cache lookup, throttled adapter
//! call, cache store. A caller may pin a single provider, which
//! disables failover entirely.

use std::collections::HashMap;
use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::cache::{CacheKey, CachedValue, Operation, TtlCache};
use crate::errors::{QuoteError, RetryClass};
use crate::models::{normalize_series, DailyBar, Fundamentals, RealtimeQuote, StockSymbol};
use crate::provider::{Pacing, QuoteProvider};
use crate::throttle::AntiThrottle;

use super::diagnostics::{FetchDiagnostics, SkipReason};
use super::health::ProviderHealth;

/// Which providers a fetch may use.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProviderSelection {
    /// Walk the full priority order, skipping explicit-only providers.
    Auto,
    /// Use exactly this provider, with no fallback.
    Only(String),
}

impl FromStr for ProviderSelection {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("auto") {
            Ok(Self::Auto)
        } else {
            Ok(Self::Only(trimmed.to_ascii_uppercase()))
        }
    }
}

/// Priority-ordered provider collection with shared cache, health and
/// throttle state.
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn QuoteProvider>>,
    cache: TtlCache,
    health: ProviderHealth,
    throttle: AntiThrottle,
}

impl ProviderRegistry {
    /// Build a registry. Providers are kept in ascending priority
    /// order; ties keep their registration order.
    pub fn new(mut providers: Vec<Arc<dyn QuoteProvider>>) -> Self {
        providers.sort_by_key(|p| p.priority());
        info!(
            "Registered providers in failover order: {}",
            providers
                .iter()
                .map(|p| format!("{}({})", p.id(), p.priority()))
                .collect::<Vec<_>>()
                .join(" > ")
        );
        Self {
            providers,
            cache: TtlCache::new(),
            health: ProviderHealth::new(),
            throttle: AntiThrottle::new(),
        }
    }

    /// Provider ids in the order the failover walk visits them.
    pub fn failover_order(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    /// Drop one cached entry, e.g. to force a refetch of a single
    /// symbol out of a cached batch.
    pub fn invalidate_cached(&self, provider: &'static str, symbol: &str, operation: Operation) {
        self.cache
            .invalidate(&CacheKey::new(provider, symbol, operation));
    }

    /// Clear all health state, letting benched providers be retried.
    pub fn reset_health(&self) {
        self.health.reset();
    }

    /// Candidates for one operation, in walk order. For a pinned
    /// selection the result is exactly that provider, or `Unsupported`
    /// when it is unknown or lacks the capability.
    fn candidates(
        &self,
        operation: Operation,
        batch: bool,
        selection: &ProviderSelection,
        diagnostics: &mut FetchDiagnostics,
    ) -> Result<Vec<Arc<dyn QuoteProvider>>, QuoteError> {
        let supports = |p: &Arc<dyn QuoteProvider>| {
            let caps = p.capabilities();
            if batch {
                return caps.supports_batch;
            }
            match operation {
                Operation::Realtime => caps.supports_realtime,
                Operation::Daily => caps.supports_daily,
                Operation::Fundamentals => caps.supports_fundamentals,
            }
        };

        match selection {
            ProviderSelection::Auto => {
                let mut out = Vec::new();
                for provider in &self.providers {
                    if provider.capabilities().explicit_only {
                        diagnostics.record_skip(provider.id(), SkipReason::ExplicitOnly);
                        continue;
                    }
                    if !supports(provider) {
                        diagnostics.record_skip(provider.id(), SkipReason::Unsupported);
                        continue;
                    }
                    out.push(Arc::clone(provider));
                }
                Ok(out)
            }
            ProviderSelection::Only(id) => {
                let provider = self
                    .providers
                    .iter()
                    .find(|p| p.id() == id)
                    .ok_or_else(|| QuoteError::Unsupported {
                        provider: id.clone(),
                        operation: "unknown provider".to_string(),
                    })?;
                if !supports(provider) {
                    return Err(QuoteError::Unsupported {
                        provider: id.clone(),
                        operation: operation_name(operation, batch).to_string(),
                    });
                }
                Ok(vec![Arc::clone(provider)])
            }
        }
    }

    /// Fetch the latest quote for one symbol, failing over through the
    /// priority order.
    pub async fn get_realtime_quote(
        &self,
        symbol: &str,
        selection: &ProviderSelection,
    ) -> Result<RealtimeQuote, QuoteError> {
        self.realtime_walk(symbol, selection, None).await
    }

    /// Same as [`get_realtime_quote`](Self::get_realtime_quote), but
    /// the whole walk is bounded by `deadline`. An in-flight attempt
    /// that outlives the deadline counts as a timeout for that provider
    /// and ends the walk.
    pub async fn get_realtime_quote_with_deadline(
        &self,
        symbol: &str,
        selection: &ProviderSelection,
        deadline: Duration,
    ) -> Result<RealtimeQuote, QuoteError> {
        self.realtime_walk(symbol, selection, Some(Instant::now() + deadline))
            .await
    }

    async fn realtime_walk(
        &self,
        symbol: &str,
        selection: &ProviderSelection,
        deadline: Option<Instant>,
    ) -> Result<RealtimeQuote, QuoteError> {
        let symbol = StockSymbol::parse(symbol)?;
        let mut diagnostics = FetchDiagnostics::default();
        let pinned = matches!(selection, ProviderSelection::Only(_));
        let candidates =
            self.candidates(Operation::Realtime, false, selection, &mut diagnostics)?;

        for provider in candidates {
            let id = provider.id();
            if !self.health.is_available(id) {
                diagnostics.record_skip(id, SkipReason::Benched);
                continue;
            }

            let key = CacheKey::new(id, symbol.code(), Operation::Realtime);
            if let Some(CachedValue::Realtime(quote)) = self.cache.get(&key) {
                diagnostics.record_success(id, true);
                return Ok(quote);
            }

            let pacing = provider.pacing();
            let attempt = self
                .throttle
                .execute(id, &pacing, || provider.fetch_realtime(&symbol));
            let result = match deadline {
                Some(at) => {
                    let remaining = at.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        // never invoked, so a skip rather than a failure
                        diagnostics.record_skip(id, SkipReason::DeadlineElapsed);
                        break;
                    }
                    match tokio::time::timeout(remaining, attempt).await {
                        Ok(result) => result,
                        Err(_) => Err(QuoteError::Timeout {
                            provider: id.to_string(),
                        }),
                    }
                }
                None => attempt.await,
            };

            match result {
                Ok(quote) => {
                    self.health.record_success(id);
                    self.cache.put(
                        key,
                        CachedValue::Realtime(quote.clone()),
                        provider.cache_ttl(),
                    );
                    diagnostics.record_success(id, false);
                    debug!("Realtime quote for {} served by {}", symbol, id);
                    return Ok(quote);
                }
                Err(err) => {
                    self.health.record_failures(id, attempts_spent(&err, &pacing));
                    warn!("Provider {} failed realtime fetch for {}: {}", id, symbol, err);
                    if pinned {
                        return Err(err);
                    }
                    diagnostics.record_failure(id, err);
                }
            }
        }

        warn!(
            "Realtime fetch for {} exhausted all providers: {}",
            symbol,
            diagnostics.summary()
        );
        Err(QuoteError::AllProvidersExhausted {
            attempts: diagnostics.into_failures(),
        })
    }

    /// Fetch quotes for several symbols. Symbols already cached are
    /// served without network; the rest are fetched in provider-sized
    /// chunks and cached independently. A symbol the upstream reports
    /// as unknown maps to `None`.
    pub async fn get_batch_realtime_quotes(
        &self,
        symbols: &[&str],
        selection: &ProviderSelection,
    ) -> Result<HashMap<String, Option<RealtimeQuote>>, QuoteError> {
        let parsed: Vec<StockSymbol> = symbols
            .iter()
            .map(|raw| StockSymbol::parse(raw))
            .collect::<Result<_, _>>()?;

        let mut diagnostics = FetchDiagnostics::default();
        let pinned = matches!(selection, ProviderSelection::Only(_));
        let candidates =
            self.candidates(Operation::Realtime, true, selection, &mut diagnostics)?;

        let mut results: HashMap<String, Option<RealtimeQuote>> = HashMap::new();
        let mut pending: Vec<StockSymbol> = Vec::new();
        for symbol in parsed {
            let cached = candidates.iter().find_map(|p| {
                match self
                    .cache
                    .get(&CacheKey::new(p.id(), symbol.code(), Operation::Realtime))
                {
                    Some(CachedValue::Realtime(quote)) => Some(quote),
                    _ => None,
                }
            });
            match cached {
                Some(quote) => {
                    results.insert(symbol.code().to_string(), Some(quote));
                }
                None => pending.push(symbol),
            }
        }

        for provider in &candidates {
            if pending.is_empty() {
                break;
            }
            let id = provider.id();
            if !self.health.is_available(id) {
                diagnostics.record_skip(id, SkipReason::Benched);
                continue;
            }

            let chunk_size = provider.capabilities().max_batch_size.max(1);
            let pacing = provider.pacing();
            let mut unresolved: Vec<StockSymbol> = Vec::new();
            let mut provider_down = false;

            for chunk in pending.chunks(chunk_size) {
                if provider_down {
                    unresolved.extend_from_slice(chunk);
                    continue;
                }
                let outcome = self
                    .throttle
                    .execute(id, &pacing, || provider.fetch_batch_realtime(chunk))
                    .await;
                match outcome {
                    Ok(mut fetched) => {
                        self.health.record_success(id);
                        for symbol in chunk {
                            match fetched.remove(symbol.code()) {
                                Some(Some(quote)) => {
                                    self.cache.put(
                                        CacheKey::new(id, symbol.code(), Operation::Realtime),
                                        CachedValue::Realtime(quote.clone()),
                                        provider.cache_ttl(),
                                    );
                                    results.insert(symbol.code().to_string(), Some(quote));
                                }
                                Some(None) => {
                                    debug!("Provider {} reports {} as unknown", id, symbol);
                                    results.insert(symbol.code().to_string(), None);
                                }
                                None => unresolved.push(symbol.clone()),
                            }
                        }
                    }
                    Err(err) => {
                        self.health.record_failures(id, attempts_spent(&err, &pacing));
                        warn!("Provider {} failed batch fetch: {}", id, err);
                        if pinned {
                            return Err(err);
                        }
                        diagnostics.record_failure(id, err);
                        provider_down = true;
                        unresolved.extend_from_slice(chunk);
                    }
                }
            }
            pending = unresolved;
        }

        // symbols no batch-capable provider answered fall back to
        // single fetches, which also reaches realtime-only providers
        for symbol in pending {
            if pinned {
                results.insert(symbol.code().to_string(), None);
                continue;
            }
            match self.realtime_walk(symbol.code(), selection, None).await {
                Ok(quote) => {
                    results.insert(symbol.code().to_string(), Some(quote));
                }
                Err(err) => {
                    warn!("No provider produced a quote for {}: {}", symbol, err);
                    results.insert(symbol.code().to_string(), None);
                }
            }
        }
        Ok(results)
    }

    /// Fetch a date-ascending daily series.
    pub async fn get_daily_series(
        &self,
        symbol: &str,
        lookback_days: u32,
        selection: &ProviderSelection,
    ) -> Result<Vec<DailyBar>, QuoteError> {
        let symbol = StockSymbol::parse(symbol)?;
        let mut diagnostics = FetchDiagnostics::default();
        let pinned = matches!(selection, ProviderSelection::Only(_));
        let candidates = self.candidates(Operation::Daily, false, selection, &mut diagnostics)?;

        for provider in candidates {
            let id = provider.id();
            if !self.health.is_available(id) {
                diagnostics.record_skip(id, SkipReason::Benched);
                continue;
            }
            if provider.capabilities().daily_is_synthesized {
                warn!(
                    "Provider {} synthesizes daily data from a realtime snapshot for {}",
                    id, symbol
                );
            }

            let key = CacheKey::new(id, symbol.code(), Operation::Daily);
            if let Some(CachedValue::Daily(series)) = self.cache.get(&key) {
                diagnostics.record_success(id, true);
                return Ok(series);
            }

            let pacing = provider.pacing();
            let outcome = self
                .throttle
                .execute(id, &pacing, || {
                    provider.fetch_daily_series(&symbol, lookback_days)
                })
                .await;
            match outcome {
                Ok(series) => {
                    self.health.record_success(id);
                    let series = normalize_series(series);
                    self.cache
                        .put(key, CachedValue::Daily(series.clone()), provider.cache_ttl());
                    diagnostics.record_success(id, false);
                    debug!(
                        "Daily series for {} ({} bars) served by {}",
                        symbol,
                        series.len(),
                        id
                    );
                    return Ok(series);
                }
                Err(err) => {
                    self.health.record_failures(id, attempts_spent(&err, &pacing));
                    warn!("Provider {} failed daily fetch for {}: {}", id, symbol, err);
                    if pinned {
                        return Err(err);
                    }
                    diagnostics.record_failure(id, err);
                }
            }
        }

        warn!(
            "Daily fetch for {} exhausted all providers: {}",
            symbol,
            diagnostics.summary()
        );
        Err(QuoteError::AllProvidersExhausted {
            attempts: diagnostics.into_failures(),
        })
    }

    /// Fetch valuation and liquidity metrics beyond the core quote.
    pub async fn get_enhanced_data(
        &self,
        symbol: &str,
        selection: &ProviderSelection,
    ) -> Result<Fundamentals, QuoteError> {
        let symbol = StockSymbol::parse(symbol)?;
        let mut diagnostics = FetchDiagnostics::default();
        let pinned = matches!(selection, ProviderSelection::Only(_));
        let candidates =
            self.candidates(Operation::Fundamentals, false, selection, &mut diagnostics)?;

        for provider in candidates {
            let id = provider.id();
            if !self.health.is_available(id) {
                diagnostics.record_skip(id, SkipReason::Benched);
                continue;
            }

            let key = CacheKey::new(id, symbol.code(), Operation::Fundamentals);
            if let Some(CachedValue::Fundamentals(data)) = self.cache.get(&key) {
                diagnostics.record_success(id, true);
                return Ok(data);
            }

            let pacing = provider.pacing();
            let outcome = self
                .throttle
                .execute(id, &pacing, || provider.fetch_fundamentals(&symbol))
                .await;
            match outcome {
                Ok(data) => {
                    self.health.record_success(id);
                    self.cache.put(
                        key,
                        CachedValue::Fundamentals(data.clone()),
                        provider.cache_ttl(),
                    );
                    diagnostics.record_success(id, false);
                    return Ok(data);
                }
                Err(err) => {
                    self.health.record_failures(id, attempts_spent(&err, &pacing));
                    warn!(
                        "Provider {} failed fundamentals fetch for {}: {}",
                        id, symbol, err
                    );
                    if pinned {
                        return Err(err);
                    }
                    diagnostics.record_failure(id, err);
                }
            }
        }

        warn!(
            "Fundamentals fetch for {} exhausted all providers: {}",
            symbol,
            diagnostics.summary()
        );
        Err(QuoteError::AllProvidersExhausted {
            attempts: diagnostics.into_failures(),
        })
    }
}

/// Underlying attempts a failed throttled call represents. Transient
/// errors were retried to the pacing cap inside the throttle, so
/// health sees one failure per attempt and a single exhausted loop can
/// bench the provider.
fn attempts_spent(err: &QuoteError, pacing: &Pacing) -> u32 {
    match err.retry_class() {
        RetryClass::WithBackoff => pacing.max_retries.max(1),
        _ => 1,
    }
}

fn operation_name(operation: Operation, batch: bool) -> &'static str {
    if batch {
        return "batch realtime quotes";
    }
    match operation {
        Operation::Realtime => "realtime quote",
        Operation::Daily => "daily series",
        Operation::Fundamentals => "fundamentals",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::models::Metric;
    use crate::provider::{Pacing, ProviderCapabilities};

    fn quote(code: &str, price: Decimal) -> RealtimeQuote {
        RealtimeQuote {
            symbol: code.to_string(),
            name: format!("stock {}", code),
            price,
            change_pct: dec!(0),
            open: price,
            pre_close: price,
            high: price,
            low: price,
            volume: dec!(1000),
            amount: dec!(100000),
            turnover_rate: Metric::unreported(),
            volume_ratio: Metric::unreported(),
            pe_ratio: Metric::unreported(),
            pb_ratio: Metric::unreported(),
            captured_at: Utc::now(),
        }
    }

    enum MockBehavior {
        Price(Decimal),
        NetworkError,
    }

    struct MockProvider {
        id: &'static str,
        priority: u16,
        behavior: MockBehavior,
        explicit_only: bool,
        calls: AtomicUsize,
    }

    impl MockProvider {
        fn serving(id: &'static str, priority: u16, price: Decimal) -> Arc<Self> {
            Arc::new(Self {
                id,
                priority,
                behavior: MockBehavior::Price(price),
                explicit_only: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(id: &'static str, priority: u16) -> Arc<Self> {
            Arc::new(Self {
                id,
                priority,
                behavior: MockBehavior::NetworkError,
                explicit_only: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl QuoteProvider for MockProvider {
        fn id(&self) -> &'static str {
            self.id
        }

        fn priority(&self) -> u16 {
            self.priority
        }

        fn capabilities(&self) -> ProviderCapabilities {
            ProviderCapabilities {
                supports_realtime: true,
                supports_daily: false,
                supports_batch: true,
                supports_fundamentals: false,
                max_batch_size: 100,
                daily_is_synthesized: false,
                explicit_only: self.explicit_only,
            }
        }

        fn pacing(&self) -> Pacing {
            Pacing {
                min_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                max_retries: 3,
                backoff_base: Duration::from_millis(1),
                max_in_flight: 4,
            }
        }

        async fn fetch_realtime(
            &self,
            symbol: &StockSymbol,
        ) -> Result<RealtimeQuote, QuoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                MockBehavior::Price(price) => Ok(quote(symbol.code(), *price)),
                MockBehavior::NetworkError => Err(QuoteError::Network {
                    provider: self.id.to_string(),
                    message: "connection refused".to_string(),
                }),
            }
        }

        async fn fetch_batch_realtime(
            &self,
            symbols: &[StockSymbol],
        ) -> Result<HashMap<String, Option<RealtimeQuote>>, QuoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                MockBehavior::Price(price) => Ok(symbols
                    .iter()
                    .map(|s| (s.code().to_string(), Some(quote(s.code(), *price))))
                    .collect()),
                MockBehavior::NetworkError => Err(QuoteError::Network {
                    provider: self.id.to_string(),
                    message: "connection refused".to_string(),
                }),
            }
        }
    }

    fn registry_of(providers: Vec<Arc<MockProvider>>) -> ProviderRegistry {
        ProviderRegistry::new(
            providers
                .into_iter()
                .map(|p| p as Arc<dyn QuoteProvider>)
                .collect(),
        )
    }

    #[test]
    fn test_selection_parses_auto_and_pinned() {
        assert_eq!("auto".parse::<ProviderSelection>(), Ok(ProviderSelection::Auto));
        assert_eq!("AUTO".parse::<ProviderSelection>(), Ok(ProviderSelection::Auto));
        assert_eq!(
            "sina".parse::<ProviderSelection>(),
            Ok(ProviderSelection::Only("SINA".to_string()))
        );
    }

    #[tokio::test]
    async fn test_cache_idempotence() {
        let provider = MockProvider::serving("A", 0, dec!(10.50));
        let registry = registry_of(vec![Arc::clone(&provider)]);

        let first = registry
            .get_realtime_quote("600519", &ProviderSelection::Auto)
            .await
            .unwrap();
        let second = registry
            .get_realtime_quote("600519", &ProviderSelection::Auto)
            .await
            .unwrap();

        assert_eq!(provider.call_count(), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_failover_determinism() {
        let failing = MockProvider::failing("A", 0);
        let serving = MockProvider::serving("B", 1, dec!(1850.00));
        let registry = registry_of(vec![Arc::clone(&failing), Arc::clone(&serving)]);

        let result = registry
            .get_realtime_quote("600519", &ProviderSelection::Auto)
            .await
            .unwrap();

        assert_eq!(failing.call_count(), 3);
        assert_eq!(serving.call_count(), 1);
        assert_eq!(result.price, dec!(1850.00));
    }

    #[tokio::test]
    async fn test_exhaustion_reports_every_failed_provider() {
        let a = MockProvider::failing("A", 0);
        let b = MockProvider::failing("B", 1);
        let registry = registry_of(vec![a, b]);

        let err = registry
            .get_realtime_quote("600519", &ProviderSelection::Auto)
            .await
            .unwrap_err();
        match err {
            QuoteError::AllProvidersExhausted { attempts } => {
                let providers: Vec<&str> =
                    attempts.iter().map(|f| f.provider.as_str()).collect();
                assert_eq!(providers, vec!["A", "B"]);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unrecognized_symbol_makes_zero_provider_calls() {
        let provider = MockProvider::serving("A", 0, dec!(10));
        let registry = registry_of(vec![Arc::clone(&provider)]);

        let err = registry
            .get_realtime_quote("999999", &ProviderSelection::Auto)
            .await
            .unwrap_err();

        assert!(matches!(err, QuoteError::UnrecognizedSymbol(_)));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_batch_split_caches_symbols_independently() {
        let provider = MockProvider::serving("A", 0, dec!(25.00));
        let registry = registry_of(vec![Arc::clone(&provider)]);

        let results = registry
            .get_batch_realtime_quotes(&["600519", "000001", "300750"], &ProviderSelection::Auto)
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(provider.call_count(), 1);

        // one entry invalidated, the other two still serve from cache
        registry.invalidate_cached("A", "000001", Operation::Realtime);
        let again = registry
            .get_batch_realtime_quotes(&["600519", "000001", "300750"], &ProviderSelection::Auto)
            .await
            .unwrap();
        assert_eq!(again.len(), 3);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_pinned_provider_does_not_fall_back() {
        let failing = MockProvider::failing("A", 0);
        let serving = MockProvider::serving("B", 1, dec!(42));
        let registry = registry_of(vec![Arc::clone(&failing), Arc::clone(&serving)]);

        let err = registry
            .get_realtime_quote("600519", &ProviderSelection::Only("A".to_string()))
            .await
            .unwrap_err();

        assert!(matches!(err, QuoteError::Network { .. }));
        assert_eq!(serving.call_count(), 0);
    }

    #[tokio::test]
    async fn test_pinned_unknown_provider_is_unsupported() {
        let registry = registry_of(vec![MockProvider::serving("A", 0, dec!(1))]);
        let err = registry
            .get_realtime_quote("600519", &ProviderSelection::Only("NOPE".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, QuoteError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn test_explicit_only_provider_is_skipped_in_auto_walk() {
        let explicit = Arc::new(MockProvider {
            id: "E",
            priority: 0,
            behavior: MockBehavior::Price(dec!(1)),
            explicit_only: true,
            calls: AtomicUsize::new(0),
        });
        let serving = MockProvider::serving("B", 1, dec!(2));
        let registry = registry_of(vec![Arc::clone(&explicit), Arc::clone(&serving)]);

        let result = registry
            .get_realtime_quote("600519", &ProviderSelection::Auto)
            .await
            .unwrap();
        assert_eq!(result.price, dec!(2));
        assert_eq!(explicit.call_count(), 0);

        // still reachable when pinned
        let pinned = registry
            .get_realtime_quote("000001", &ProviderSelection::Only("E".to_string()))
            .await
            .unwrap();
        assert_eq!(pinned.price, dec!(1));
        assert_eq!(explicit.call_count(), 1);
    }

    #[tokio::test]
    async fn test_benched_provider_is_skipped_until_reset() {
        let flaky = MockProvider::failing("A", 0);
        let serving = MockProvider::serving("B", 1, dec!(7));
        let registry = registry_of(vec![Arc::clone(&flaky), Arc::clone(&serving)]);

        // first walk burns A's retries and benches it
        registry
            .get_realtime_quote("600519", &ProviderSelection::Auto)
            .await
            .unwrap();
        assert_eq!(flaky.call_count(), 3);

        // second walk for a fresh symbol skips A entirely
        registry
            .get_realtime_quote("000001", &ProviderSelection::Auto)
            .await
            .unwrap();
        assert_eq!(flaky.call_count(), 3);

        registry.reset_health();
        registry
            .get_realtime_quote("300750", &ProviderSelection::Auto)
            .await
            .unwrap();
        assert_eq!(flaky.call_count(), 6);
    }

    #[tokio::test]
    async fn test_deadline_bounds_the_walk() {
        struct SlowProvider;

        #[async_trait::async_trait]
        impl QuoteProvider for SlowProvider {
            fn id(&self) -> &'static str {
                "SLOW"
            }
            fn priority(&self) -> u16 {
                0
            }
            fn capabilities(&self) -> ProviderCapabilities {
                ProviderCapabilities {
                    supports_realtime: true,
                    ..Default::default()
                }
            }
            fn pacing(&self) -> Pacing {
                Pacing {
                    min_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(2),
                    max_retries: 3,
                    backoff_base: Duration::from_millis(1),
                    max_in_flight: 1,
                }
            }
            async fn fetch_realtime(
                &self,
                _symbol: &StockSymbol,
            ) -> Result<RealtimeQuote, QuoteError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                unreachable!("deadline should fire first")
            }
        }

        let registry = ProviderRegistry::new(vec![Arc::new(SlowProvider)]);
        let err = registry
            .get_realtime_quote_with_deadline(
                "600519",
                &ProviderSelection::Auto,
                Duration::from_millis(50),
            )
            .await
            .unwrap_err();
        match err {
            QuoteError::AllProvidersExhausted { attempts } => {
                assert_eq!(attempts.len(), 1);
                assert!(attempts[0].cause.contains("timeout"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deadline_lapse_does_not_blame_untried_providers() {
        struct Sleeper {
            id: &'static str,
            priority: u16,
        }

        #[async_trait::async_trait]
        impl QuoteProvider for Sleeper {
            fn id(&self) -> &'static str {
                self.id
            }
            fn priority(&self) -> u16 {
                self.priority
            }
            fn capabilities(&self) -> ProviderCapabilities {
                ProviderCapabilities {
                    supports_realtime: true,
                    ..Default::default()
                }
            }
            fn pacing(&self) -> Pacing {
                Pacing {
                    min_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(2),
                    max_retries: 3,
                    backoff_base: Duration::from_millis(1),
                    max_in_flight: 1,
                }
            }
            async fn fetch_realtime(
                &self,
                _symbol: &StockSymbol,
            ) -> Result<RealtimeQuote, QuoteError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                unreachable!("deadline should fire first")
            }
        }

        let registry = ProviderRegistry::new(vec![
            Arc::new(Sleeper {
                id: "SLOW1",
                priority: 0,
            }),
            Arc::new(Sleeper {
                id: "SLOW2",
                priority: 1,
            }),
        ]);
        let err = registry
            .get_realtime_quote_with_deadline(
                "600519",
                &ProviderSelection::Auto,
                Duration::from_millis(50),
            )
            .await
            .unwrap_err();
        // only the provider whose attempt was actually in flight shows
        // up in the failure trail; SLOW2 was never invoked
        match err {
            QuoteError::AllProvidersExhausted { attempts } => {
                assert_eq!(attempts.len(), 1);
                assert_eq!(attempts[0].provider, "SLOW1");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
