//! Per-fetch diagnostics.
//!
//! The registry records what happened at every provider it considered
//! during one fetch, both for logging and so an exhausted failover can
//! report the full failure trail to the caller.

use crate::errors::{ProviderFailure, QuoteError};

/// Why a provider was passed over without being called.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SkipReason {
    /// Capability table says the operation is unsupported.
    Unsupported,
    /// Health tracker has the provider benched.
    Benched,
    /// Provider is explicit-only and the caller asked for automatic
    /// selection.
    ExplicitOnly,
    /// Caller pinned a different provider.
    NotSelected,
    /// Caller deadline ran out before the provider could be tried.
    DeadlineElapsed,
}

impl SkipReason {
    fn describe(&self) -> &'static str {
        match self {
            SkipReason::Unsupported => "operation unsupported",
            SkipReason::Benched => "benched by health tracker",
            SkipReason::ExplicitOnly => "explicit-only provider",
            SkipReason::NotSelected => "not the pinned provider",
            SkipReason::DeadlineElapsed => "deadline elapsed before attempt",
        }
    }
}

#[derive(Debug)]
pub enum ProviderAttempt {
    Skipped {
        provider: &'static str,
        reason: SkipReason,
    },
    Failed {
        provider: &'static str,
        error: QuoteError,
    },
    Succeeded {
        provider: &'static str,
        from_cache: bool,
    },
}

/// Trail of everything that happened during one fetch.
#[derive(Debug, Default)]
pub struct FetchDiagnostics {
    attempts: Vec<ProviderAttempt>,
}

impl FetchDiagnostics {
    pub fn record_skip(&mut self, provider: &'static str, reason: SkipReason) {
        self.attempts.push(ProviderAttempt::Skipped { provider, reason });
    }

    pub fn record_failure(&mut self, provider: &'static str, error: QuoteError) {
        self.attempts.push(ProviderAttempt::Failed { provider, error });
    }

    pub fn record_success(&mut self, provider: &'static str, from_cache: bool) {
        self.attempts
            .push(ProviderAttempt::Succeeded { provider, from_cache });
    }

    pub fn attempts(&self) -> &[ProviderAttempt] {
        &self.attempts
    }

    /// One-line human summary for logs.
    pub fn summary(&self) -> String {
        self.attempts
            .iter()
            .map(|attempt| match attempt {
                ProviderAttempt::Skipped { provider, reason } => {
                    format!("{}: skipped ({})", provider, reason.describe())
                }
                ProviderAttempt::Failed { provider, error } => {
                    format!("{}: failed ({})", provider, error)
                }
                ProviderAttempt::Succeeded {
                    provider,
                    from_cache,
                } => {
                    if *from_cache {
                        format!("{}: hit cache", provider)
                    } else {
                        format!("{}: ok", provider)
                    }
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Condense into the failure list carried by an exhausted-failover
    /// error. Skips are omitted; the caller cares about what was
    /// actually tried.
    pub fn into_failures(self) -> Vec<ProviderFailure> {
        self.attempts
            .into_iter()
            .filter_map(|attempt| match attempt {
                ProviderAttempt::Failed { provider, error } => Some(ProviderFailure {
                    provider: provider.to_string(),
                    cause: error.to_string(),
                }),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_covers_every_attempt() {
        let mut diag = FetchDiagnostics::default();
        diag.record_skip("EFINANCE", SkipReason::ExplicitOnly);
        diag.record_failure(
            "TENCENT",
            QuoteError::Timeout {
                provider: "TENCENT".to_string(),
            },
        );
        diag.record_success("SINA", false);
        let summary = diag.summary();
        assert!(summary.contains("EFINANCE: skipped"));
        assert!(summary.contains("TENCENT: failed"));
        assert!(summary.contains("SINA: ok"));
    }

    #[test]
    fn test_into_failures_keeps_only_real_failures() {
        let mut diag = FetchDiagnostics::default();
        diag.record_skip("EFINANCE", SkipReason::ExplicitOnly);
        diag.record_failure(
            "TENCENT",
            QuoteError::RateLimited {
                provider: "TENCENT".to_string(),
            },
        );
        let failures = diag.into_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].provider, "TENCENT");
        assert!(failures[0].cause.contains("rate"));
    }
}
