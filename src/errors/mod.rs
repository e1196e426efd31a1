//! Error types and retry classification for quote fetching.
//!
//! This module provides:
//! - [`QuoteError`]: the error enum for all market data operations
//! - [`RetryClass`]: classification driving retry/failover behavior
//! - [`ProviderFailure`]: one per-provider diagnostic carried by the
//!   aggregate exhaustion error

mod retry;

pub use retry::RetryClass;

use thiserror::Error;

/// Per-provider failure record attached to
/// [`QuoteError::AllProvidersExhausted`].
#[derive(Clone, Debug)]
pub struct ProviderFailure {
    /// The provider that was attempted.
    pub provider: String,
    /// Human-readable cause of the failure.
    pub cause: String,
}

/// Errors that can occur during market data operations.
///
/// Each variant is classified into a [`RetryClass`] via
/// [`retry_class`](Self::retry_class), which determines whether the
/// anti-throttle executor retries in place, the orchestrator advances to
/// the next provider, or the error is surfaced as-is.
#[derive(Error, Debug)]
pub enum QuoteError {
    /// Connection failure, reset, or other transport-level error.
    /// Retried in place with backoff.
    #[error("network error from {provider}: {message}")]
    Network {
        /// The provider whose request failed
        provider: String,
        /// Transport error description
        message: String,
    },

    /// A single attempt exceeded its timeout, or the caller deadline
    /// elapsed while this provider was in flight.
    #[error("timeout waiting on {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// The upstream signalled explicit throttling (HTTP 429/403 or a
    /// quota message in the response body).
    #[error("rate limited by {provider}")]
    RateLimited {
        /// The provider that throttled the request
        provider: String,
    },

    /// The payload did not match the provider's expected shape: wrong
    /// field count, unparsable number, missing envelope. Never retried,
    /// since the format will not change on a retry.
    #[error("malformed payload from {provider}: {message}")]
    Parse {
        /// The provider whose payload failed to parse
        provider: String,
        /// What was wrong with the payload
        message: String,
    },

    /// The provider does not support the requested capability, or an
    /// explicitly selected provider cannot serve the operation.
    #[error("provider {provider} does not support {operation}")]
    Unsupported {
        /// The provider that was asked
        provider: String,
        /// The operation it cannot serve
        operation: String,
    },

    /// The symbol matches no recognized market-prefix pattern. Returned
    /// before any network call is attempted.
    #[error("symbol '{0}' matches no recognized market prefix")]
    UnrecognizedSymbol(String),

    /// Every eligible provider was tried and all failed. Carries one
    /// diagnostic per attempted provider.
    #[error("all providers exhausted: [{}]", format_failures(.attempts))]
    AllProvidersExhausted {
        /// Per-provider failure reasons, in the order they were tried
        attempts: Vec<ProviderFailure>,
    },
}

fn format_failures(attempts: &[ProviderFailure]) -> String {
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.provider, a.cause))
        .collect::<Vec<_>>()
        .join("; ")
}

impl QuoteError {
    /// Returns the retry classification for this error.
    ///
    /// - [`RetryClass::WithBackoff`]: retry the same provider with backoff
    /// - [`RetryClass::NextProvider`]: immediate provider failure, advance
    /// - [`RetryClass::Never`]: terminal, surface to the caller
    pub fn retry_class(&self) -> RetryClass {
        match self {
            // Transient upstream conditions are retried in place.
            Self::Network { .. } | Self::Timeout { .. } | Self::RateLimited { .. } => {
                RetryClass::WithBackoff
            }

            // A retry cannot fix a malformed payload or a missing
            // capability; fail this provider and move on.
            Self::Parse { .. } | Self::Unsupported { .. } => RetryClass::NextProvider,

            // Symbol recognition happens before provider dispatch, and
            // exhaustion is already the end of the line.
            Self::UnrecognizedSymbol(_) | Self::AllProvidersExhausted { .. } => RetryClass::Never,
        }
    }

    /// Classify a transport error from reqwest, attributing it to a provider.
    pub fn from_transport(provider: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                provider: provider.to_string(),
            }
        } else {
            Self::Network {
                provider: provider.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Heuristic for throttle markers hidden in upstream error text.
///
/// Some upstreams report bans inside an HTTP 200 body or a quota message
/// instead of a 429 status.
pub fn looks_rate_limited(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["banned", "blocked", "rate", "limit", "403", "429", "频率", "限制", "每分钟"]
        .iter()
        .any(|marker| lower.contains(marker))
}
