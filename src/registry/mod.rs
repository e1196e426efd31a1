//! Failover orchestration: provider ordering, health tracking and
//! per-fetch diagnostics.

mod diagnostics;
mod health;
mod provider_registry;

pub use diagnostics::{FetchDiagnostics, ProviderAttempt, SkipReason};
pub use health::ProviderHealth;
pub use provider_registry::{ProviderRegistry, ProviderSelection};
