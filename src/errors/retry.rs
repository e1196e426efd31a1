//! Retry classification for quote-fetch errors.

/// How the failover orchestrator should react to an error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Transient upstream condition. Retry the same provider in place,
    /// with exponential backoff, up to its configured attempt budget.
    WithBackoff,

    /// The provider cannot produce a usable answer for this request.
    /// A retry cannot change the outcome (a malformed payload stays
    /// malformed); advance to the next provider immediately.
    NextProvider,

    /// Terminal. Surface to the caller without trying anything else.
    Never,
}
