//! Shared HTTP client construction for consistent timeout and TLS configuration.

use std::time::Duration;

use crate::error::LlmError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the HTTP client used by every provider.
///
/// Config: 30s connect timeout, `request_timeout` for the whole request, rustls TLS,
/// `generag/{version}` user-agent, redirect limit 10.
///
/// # Errors
///
/// Returns [`LlmError::Http`] if the TLS backend cannot be initialized.
pub fn build_client(request_timeout: Duration) -> Result<reqwest::Client, LlmError> {
    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT.min(request_timeout))
        .timeout(request_timeout)
        .user_agent(concat!("generag/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()?;
    Ok(client)
}
