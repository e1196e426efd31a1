//! Short-horizon response cache.
//!
//! Successful fetches are cached per (provider, symbol, operation)
//! with a TTL taken from the provider's descriptor. Entries are
//! evicted lazily on read; there is no background sweeper.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::models::{DailyBar, Fundamentals, RealtimeQuote};

/// The cacheable operations.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Operation {
    Realtime,
    Daily,
    Fundamentals,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CacheKey {
    pub provider: &'static str,
    pub symbol: String,
    pub operation: Operation,
}

impl CacheKey {
    pub fn new(provider: &'static str, symbol: impl Into<String>, operation: Operation) -> Self {
        Self {
            provider,
            symbol: symbol.into(),
            operation,
        }
    }
}

#[derive(Clone, Debug)]
pub enum CachedValue {
    Realtime(RealtimeQuote),
    Daily(Vec<DailyBar>),
    Fundamentals(Fundamentals),
}

struct Entry {
    value: CachedValue,
    stored_at: Instant,
    ttl: Duration,
}

impl Entry {
    fn is_fresh(&self) -> bool {
        self.stored_at.elapsed() < self.ttl
    }
}

/// TTL cache shared by the registry across all providers.
pub struct TtlCache {
    entries: Mutex<HashMap<CacheKey, Entry>>,
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TtlCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<CacheKey, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("Cache lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Fetch a fresh entry, evicting it if the TTL has lapsed.
    pub fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        let mut entries = self.lock_entries();
        match entries.get(key) {
            Some(entry) if entry.is_fresh() => {
                debug!("Cache hit for {}:{:?}:{}", key.provider, key.operation, key.symbol);
                Some(entry.value.clone())
            }
            Some(_) => {
                debug!(
                    "Cache entry expired for {}:{:?}:{}",
                    key.provider, key.operation, key.symbol
                );
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: CacheKey, value: CachedValue, ttl: Duration) {
        let mut entries = self.lock_entries();
        entries.insert(
            key,
            Entry {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Drop one entry regardless of freshness.
    pub fn invalidate(&self, key: &CacheKey) {
        self.lock_entries().remove(key);
    }

    /// Drop everything. Used by tests and by callers that need a
    /// guaranteed refetch across the board.
    pub fn clear(&self) {
        self.lock_entries().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use crate::models::Metric;

    fn sample_quote(price: rust_decimal::Decimal) -> RealtimeQuote {
        RealtimeQuote {
            symbol: "600519".to_string(),
            name: "贵州茅台".to_string(),
            price,
            change_pct: dec!(0),
            open: dec!(0),
            pre_close: dec!(0),
            high: dec!(0),
            low: dec!(0),
            volume: dec!(0),
            amount: dec!(0),
            turnover_rate: Metric::unreported(),
            volume_ratio: Metric::unreported(),
            pe_ratio: Metric::unreported(),
            pb_ratio: Metric::unreported(),
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_fresh_entry_is_returned() {
        let cache = TtlCache::new();
        let key = CacheKey::new("SINA", "600519", Operation::Realtime);
        cache.put(
            key.clone(),
            CachedValue::Realtime(sample_quote(dec!(1850))),
            Duration::from_secs(30),
        );
        match cache.get(&key) {
            Some(CachedValue::Realtime(quote)) => assert_eq!(quote.price, dec!(1850)),
            other => panic!("unexpected cache result {:?}", other.is_some()),
        }
    }

    #[test]
    fn test_expired_entry_is_evicted() {
        let cache = TtlCache::new();
        let key = CacheKey::new("SINA", "600519", Operation::Realtime);
        cache.put(
            key.clone(),
            CachedValue::Realtime(sample_quote(dec!(1850))),
            Duration::ZERO,
        );
        assert!(cache.get(&key).is_none());
        // the lapsed entry is gone, not merely hidden
        assert!(cache.lock_entries().is_empty());
    }

    #[test]
    fn test_keys_are_scoped_per_provider_and_operation() {
        let cache = TtlCache::new();
        cache.put(
            CacheKey::new("SINA", "600519", Operation::Realtime),
            CachedValue::Realtime(sample_quote(dec!(1850))),
            Duration::from_secs(30),
        );
        assert!(cache
            .get(&CacheKey::new("TENCENT", "600519", Operation::Realtime))
            .is_none());
        assert!(cache
            .get(&CacheKey::new("SINA", "600519", Operation::Daily))
            .is_none());
    }

    #[test]
    fn test_invalidate_removes_fresh_entry() {
        let cache = TtlCache::new();
        let key = CacheKey::new("SINA", "600519", Operation::Realtime);
        cache.put(
            key.clone(),
            CachedValue::Realtime(sample_quote(dec!(1850))),
            Duration::from_secs(30),
        );
        cache.invalidate(&key);
        assert!(cache.get(&key).is_none());
    }
}
