use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;

use crate::error::LlmError;

const BASE_BACKOFF_SECS: u64 = 1;
const MAX_BACKOFF_SECS: u64 = 60;

/// Parse the `Retry-After` header value as seconds, falling back to exponential backoff.
pub(crate) fn retry_delay(response: &reqwest::Response, attempt: u32) -> Duration {
    if let Some(val) = response.headers().get("retry-after")
        && let Ok(s) = val.to_str()
        && let Ok(secs) = s.trim().parse::<u64>()
    {
        return Duration::from_secs(secs.min(MAX_BACKOFF_SECS));
    }
    backoff(attempt)
}

fn backoff(attempt: u32) -> Duration {
    let secs = BASE_BACKOFF_SECS
        .checked_shl(attempt)
        .unwrap_or(MAX_BACKOFF_SECS)
        .min(MAX_BACKOFF_SECS);
    Duration::from_secs(secs)
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::BAD_GATEWAY
        || status == StatusCode::SERVICE_UNAVAILABLE
        || status == StatusCode::GATEWAY_TIMEOUT
}

/// Send an HTTP request, retrying up to `max_retries` times on 429 and transient 5xx responses.
///
/// Returns the first non-transient `Response` for further processing by the caller.
///
/// # Errors
///
/// Returns `LlmError::RateLimited` (429) or `LlmError::Unavailable` (5xx) once all
/// attempts are exhausted, or the underlying `reqwest::Error` wrapped as `LlmError::Http`.
pub(crate) async fn send_with_retry<F, Fut>(
    provider_name: &str,
    max_retries: u32,
    mut f: F,
) -> Result<reqwest::Response, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut attempt = 0;
    loop {
        let response = f().await.map_err(LlmError::Http)?;
        let status = response.status();

        if !is_transient(status) {
            return Ok(response);
        }
        if attempt == max_retries {
            return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                LlmError::RateLimited
            } else {
                LlmError::Unavailable
            });
        }

        let delay = retry_delay(&response, attempt);
        tracing::warn!(
            provider = provider_name,
            %status,
            "transient upstream failure, retrying in {}s ({}/{})",
            delay.as_secs(),
            attempt + 1,
            max_retries
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
