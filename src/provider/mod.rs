//! Upstream quote providers.
//!
//! Each submodule adapts one upstream wire protocol to the
//! [`QuoteProvider`] trait. Shared HTTP plumbing lives here so every
//! adapter gets the same client construction, User-Agent rotation and
//! status-code classification.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::errors::QuoteError;
use crate::throttle::random_user_agent;

pub mod capabilities;
pub mod fieldmap;
mod traits;

pub mod baostock;
pub mod eastmoney;
pub mod efinance;
pub mod sina;
pub mod tencent;
pub mod tonghuashun;
pub mod tushare;
pub mod yahoo;

pub use capabilities::{Pacing, ProviderCapabilities};
pub use traits::QuoteProvider;

/// Build the HTTP client all adapters use, with a per-attempt timeout.
pub(crate) fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Classify the response status and return the body text.
///
/// 429 and 403 map to `RateLimited` since those endpoints use both for
/// throttling; any other non-success status is a `Network` failure.
async fn read_body(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<String, QuoteError> {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::FORBIDDEN
    {
        return Err(QuoteError::RateLimited {
            provider: provider.to_string(),
        });
    }
    if !status.is_success() {
        return Err(QuoteError::Network {
            provider: provider.to_string(),
            message: format!("HTTP {}", status),
        });
    }
    response
        .text()
        .await
        .map_err(|e| QuoteError::from_transport(provider, e))
}

/// GET a URL with a rotated User-Agent and optional Referer.
pub(crate) async fn get_text(
    client: &Client,
    provider: &'static str,
    url: &str,
    referer: Option<&str>,
) -> Result<String, QuoteError> {
    let mut request = client.get(url).header("User-Agent", random_user_agent());
    if let Some(referer) = referer {
        request = request.header("Referer", referer);
    }
    debug!("{} request: {}", provider, url);

    let response = request
        .send()
        .await
        .map_err(|e| QuoteError::from_transport(provider, e))?;
    read_body(provider, response).await
}

/// POST a JSON body with a rotated User-Agent.
pub(crate) async fn post_json(
    client: &Client,
    provider: &'static str,
    url: &str,
    body: &serde_json::Value,
) -> Result<String, QuoteError> {
    debug!("{} request: POST {}", provider, url);
    let response = client
        .post(url)
        .header("User-Agent", random_user_agent())
        .json(body)
        .send()
        .await
        .map_err(|e| QuoteError::from_transport(provider, e))?;
    read_body(provider, response).await
}
