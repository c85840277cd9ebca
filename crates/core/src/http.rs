//! Shared HTTP client construction for the hosted providers.

use crate::error::ProviderError;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client with a bounded connect and request timeout; an elapsed timeout
/// surfaces as [`ProviderError::Timeout`], never as an internal retry.
pub fn default_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .timeout(timeout)
        .user_agent(concat!("pdf-chat/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Maps a non-success status to a provider error. Response bodies are
/// logged by callers, never embedded in the error.
pub(crate) fn error_for_status(
    provider: &str,
    status: reqwest::StatusCode,
) -> Result<(), ProviderError> {
    use reqwest::StatusCode;

    if status.is_success() {
        return Ok(());
    }

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Authentication {
            provider: provider.to_string(),
            status: status.as_u16(),
        },
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            provider: provider.to_string(),
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ProviderError::Timeout {
            provider: provider.to_string(),
        },
        _ => ProviderError::BackendResponse {
            backend: provider.to_string(),
            details: status.to_string(),
        },
    })
}
