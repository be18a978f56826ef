//! Shared HTTP plumbing for the remote embedding providers

use std::time::Duration;

use reqwest::Client;
use reqwest::RequestBuilder;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::errors::ProviderError;
use crate::errors::Result;
use crate::errors::VecMigrateError;

/// Build the HTTP client shared by every provider of a run
pub fn build_http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .pool_max_idle_per_host(16)
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| VecMigrateError::HttpError(e.to_string()))
}

/// Body fragments that turn a 429 into a quota failure instead of a rate limit
const QUOTA_MARKERS: &[&str] = &[
    "quota",
    "insufficient_quota",
    "resource_exhausted",
    "billing",
];

/// Map an unsuccessful HTTP status into the provider failure taxonomy
#[must_use]
pub fn classify_status(provider: &str, status: StatusCode, body: &str) -> ProviderError {
    let message = format!("{provider} API error ({status}): {}", snippet(body));
    match status.as_u16() {
        402 => ProviderError::QuotaExceeded(message),
        429 => {
            let lowered = body.to_ascii_lowercase();
            if QUOTA_MARKERS.iter().any(|m| lowered.contains(m)) {
                ProviderError::QuotaExceeded(message)
            } else {
                ProviderError::RateLimited(message)
            }
        }
        401 | 403 => ProviderError::Fatal(message),
        _ => ProviderError::Transient(message),
    }
}

/// Network level failures (connect, timeout, body read) are always retryable
#[must_use]
pub fn classify_transport(provider: &str, err: &reqwest::Error) -> ProviderError {
    ProviderError::Transient(format!("{provider} request failed: {err}"))
}

/// Send a prepared request and decode a JSON body, classifying every failure
pub async fn send_json<R: DeserializeOwned>(
    provider: &str,
    request: RequestBuilder,
) -> std::result::Result<R, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| classify_transport(provider, &e))?;

    let status = response.status();
    debug!(provider, %status, "embedding API responded");

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(classify_status(provider, status, &error_text));
    }

    response.json::<R>().await.map_err(|e| {
        ProviderError::Transient(format!("{provider} returned an unreadable response: {e}"))
    })
}

/// Check that a response carries one vector per submitted text
pub fn expect_vectors(
    provider: &str,
    vectors: &[Vec<f32>],
    submitted: usize,
) -> std::result::Result<(), ProviderError> {
    if vectors.len() == submitted {
        Ok(())
    } else {
        Err(ProviderError::Transient(format!(
            "{provider} returned {} embeddings for {submitted} texts",
            vectors.len()
        )))
    }
}

/// Join a base URL and a path without doubling the slash
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn snippet(body: &str) -> &str {
    super::text_preprocessing::truncate_chars(body.trim(), 300)
}
