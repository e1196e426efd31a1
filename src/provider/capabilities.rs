//! Provider capability flags and pacing configuration.
//!
//! Capabilities are declared once per provider and checked by the
//! registry before dispatch; no runtime method probing.

use std::time::Duration;

/// Describes which operations a quote provider can serve.
#[derive(Clone, Debug)]
pub struct ProviderCapabilities {
    /// Whether the provider serves realtime quotes.
    pub supports_realtime: bool,

    /// Whether the provider serves daily history.
    pub supports_daily: bool,

    /// Whether the wire protocol accepts multi-symbol requests.
    pub supports_batch: bool,

    /// Whether the provider carries fundamentals (PE/PB/market cap).
    pub supports_fundamentals: bool,

    /// Maximum symbols per batch request (0 when batch is unsupported).
    pub max_batch_size: usize,

    /// The "daily" series is synthesized from a realtime snapshot
    /// rather than a true history endpoint. Such a series carries at
    /// most the current session's bar.
    pub daily_is_synthesized: bool,

    /// Provider participates only when explicitly selected, never in
    /// the automatic failover walk.
    pub explicit_only: bool,
}

impl Default for ProviderCapabilities {
    fn default() -> Self {
        Self {
            supports_realtime: false,
            supports_daily: false,
            supports_batch: false,
            supports_fundamentals: false,
            max_batch_size: 0,
            daily_is_synthesized: false,
            explicit_only: false,
        }
    }
}

/// Anti-throttle pacing parameters for a provider.
///
/// Every outbound call sleeps for a uniformly random duration in
/// `[min_delay, max_delay]` before firing; transient failures are
/// retried with `backoff_base * 2^attempt` plus jitter up to
/// `max_retries` total attempts.
#[derive(Clone, Debug)]
pub struct Pacing {
    /// Minimum pre-call delay; also the floor on the gap between two
    /// consecutive calls to the same provider.
    pub min_delay: Duration,

    /// Maximum pre-call delay.
    pub max_delay: Duration,

    /// Total attempts per call, including the first (default 3).
    pub max_retries: u32,

    /// Base of the exponential backoff between attempts.
    pub backoff_base: Duration,

    /// Maximum concurrent in-flight requests to this provider.
    pub max_in_flight: usize,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            max_in_flight: 5,
        }
    }
}
