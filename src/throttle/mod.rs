//! Request pacing and retry for upstream endpoints that ban bursty
//! clients.
//!
//! Every outbound call funnels through [`AntiThrottle::execute`], which
//! applies a per-provider concurrency cap, a randomized pre-call delay,
//! a minimum inter-call interval, and exponential backoff on transient
//! failures. User-Agent rotation lives here as well so adapters share
//! one pool.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};
use rand::Rng;
use tokio::sync::Semaphore;

use crate::errors::{QuoteError, RetryClass};
use crate::provider::Pacing;

/// Desktop browser identities rotated across calls.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36 Edg/119.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

/// Pick a User-Agent for one outbound call.
pub fn random_user_agent() -> &'static str {
    let idx = rand::thread_rng().gen_range(0..USER_AGENTS.len());
    USER_AGENTS[idx]
}

struct ProviderState {
    semaphore: Arc<Semaphore>,
    next_allowed: Option<Instant>,
}

/// Shared pacing executor, keyed by provider id.
pub struct AntiThrottle {
    states: Mutex<HashMap<&'static str, ProviderState>>,
}

impl Default for AntiThrottle {
    fn default() -> Self {
        Self::new()
    }
}

impl AntiThrottle {
    pub fn new() -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
        }
    }

    fn lock_states(&self) -> MutexGuard<'_, HashMap<&'static str, ProviderState>> {
        self.states.lock().unwrap_or_else(|poisoned| {
            warn!("Throttle state lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn semaphore(&self, provider: &'static str, pacing: &Pacing) -> Arc<Semaphore> {
        let mut states = self.lock_states();
        let state = states.entry(provider).or_insert_with(|| ProviderState {
            semaphore: Arc::new(Semaphore::new(pacing.max_in_flight)),
            next_allowed: None,
        });
        Arc::clone(&state.semaphore)
    }

    /// Delay owed before the next call: the remainder of the minimum
    /// inter-call interval plus a fresh random jitter. The interval is
    /// measured from the dispatch this delay leads to, not from
    /// scheduling time, so queued concurrent callers stay at least
    /// `min_delay` apart.
    fn next_delay(&self, provider: &'static str, pacing: &Pacing) -> Duration {
        let min_ms = pacing.min_delay.as_millis() as u64;
        let max_ms = pacing.max_delay.as_millis() as u64;
        let jitter_ms = if max_ms > min_ms {
            rand::thread_rng().gen_range(min_ms..=max_ms)
        } else {
            min_ms
        };
        let jitter = Duration::from_millis(jitter_ms);

        let mut states = self.lock_states();
        let state = states.entry(provider).or_insert_with(|| ProviderState {
            semaphore: Arc::new(Semaphore::new(pacing.max_in_flight)),
            next_allowed: None,
        });

        let now = Instant::now();
        let owed = match state.next_allowed {
            Some(at) => at.saturating_duration_since(now),
            None => Duration::ZERO,
        };
        let delay = owed + jitter;
        state.next_allowed = Some(now + delay + pacing.min_delay);
        delay
    }

    fn backoff_delay(pacing: &Pacing, attempt: u32) -> Duration {
        let base = pacing.backoff_base * (1u32 << attempt.min(8));
        let jitter_ms = rand::thread_rng().gen_range(0..=pacing.max_delay.as_millis() as u64);
        base + Duration::from_millis(jitter_ms)
    }

    /// Run `call` under the provider's pacing policy, retrying with
    /// backoff up to `max_retries` total attempts for transient
    /// failures. Errors classified `NextProvider` or `Never` surface
    /// immediately.
    pub async fn execute<T, F, Fut>(
        &self,
        provider: &'static str,
        pacing: &Pacing,
        call: F,
    ) -> Result<T, QuoteError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, QuoteError>>,
    {
        let semaphore = self.semaphore(provider, pacing);
        let _permit = semaphore
            .acquire()
            .await
            .map_err(|_| QuoteError::Network {
                provider: provider.to_string(),
                message: "throttle semaphore closed".to_string(),
            })?;

        let mut attempt: u32 = 0;
        loop {
            let delay = self.next_delay(provider, pacing);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match call().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    let retryable = err.retry_class() == RetryClass::WithBackoff;
                    if !retryable || attempt >= pacing.max_retries {
                        return Err(err);
                    }
                    let backoff = Self::backoff_delay(pacing, attempt - 1);
                    debug!(
                        "Provider {} attempt {}/{} failed ({}), backing off {:?}",
                        provider, attempt, pacing.max_retries, err, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}
