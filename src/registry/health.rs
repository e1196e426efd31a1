//! Per-provider health tracking.
//!
//! A provider that fails repeatedly is benched for a cooldown period
//! so failover stops burning its retry budget on a dead endpoint. Any
//! success resets the counter.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{info, warn};

const FAILURE_THRESHOLD: u32 = 3;
const COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Default)]
struct ProviderState {
    consecutive_failures: u32,
    benched_until: Option<Instant>,
}

/// Tracks consecutive failures per provider and benches repeat
/// offenders for [`COOLDOWN`].
pub struct ProviderHealth {
    states: Mutex<HashMap<&'static str, ProviderState>>,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderHealth {
    pub fn new() -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
        }
    }

    fn lock_states(&self) -> MutexGuard<'_, HashMap<&'static str, ProviderState>> {
        self.states.lock().unwrap_or_else(|poisoned| {
            warn!("Health state lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Whether the provider may be attempted right now. A lapsed
    /// cooldown clears the bench but keeps the failure count, so one
    /// more failure re-benches immediately.
    pub fn is_available(&self, provider: &'static str) -> bool {
        let mut states = self.lock_states();
        let state = states.entry(provider).or_default();
        match state.benched_until {
            Some(until) if Instant::now() < until => false,
            Some(_) => {
                info!("Provider {} cooldown elapsed, allowing a probe", provider);
                state.benched_until = None;
                true
            }
            None => true,
        }
    }

    pub fn record_success(&self, provider: &'static str) {
        let mut states = self.lock_states();
        let state = states.entry(provider).or_default();
        state.consecutive_failures = 0;
        state.benched_until = None;
    }

    pub fn record_failure(&self, provider: &'static str) {
        self.record_failures(provider, 1);
    }

    /// Record several consecutive failures at once, e.g. when a retry
    /// loop burned multiple underlying attempts before giving up.
    pub fn record_failures(&self, provider: &'static str, count: u32) {
        let mut states = self.lock_states();
        let state = states.entry(provider).or_default();
        state.consecutive_failures += count;
        if state.consecutive_failures >= FAILURE_THRESHOLD {
            warn!(
                "Provider {} benched after {} consecutive failures",
                provider, state.consecutive_failures
            );
            state.benched_until = Some(Instant::now() + COOLDOWN);
        }
    }

    /// Forget all recorded state.
    pub fn reset(&self) {
        self.lock_states().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_until_threshold() {
        let health = ProviderHealth::new();
        health.record_failure("SINA");
        health.record_failure("SINA");
        assert!(health.is_available("SINA"));
        health.record_failure("SINA");
        assert!(!health.is_available("SINA"));
    }

    #[test]
    fn test_bulk_failures_bench_immediately() {
        let health = ProviderHealth::new();
        health.record_failures("SINA", 3);
        assert!(!health.is_available("SINA"));
    }

    #[test]
    fn test_success_resets_failures() {
        let health = ProviderHealth::new();
        health.record_failure("SINA");
        health.record_failure("SINA");
        health.record_success("SINA");
        health.record_failure("SINA");
        health.record_failure("SINA");
        assert!(health.is_available("SINA"));
    }

    #[test]
    fn test_providers_are_independent() {
        let health = ProviderHealth::new();
        for _ in 0..3 {
            health.record_failure("SINA");
        }
        assert!(!health.is_available("SINA"));
        assert!(health.is_available("TENCENT"));
    }

    #[test]
    fn test_reset_unbenches() {
        let health = ProviderHealth::new();
        for _ in 0..3 {
            health.record_failure("SINA");
        }
        health.reset();
        assert!(health.is_available("SINA"));
    }
}
