use std::future::Future;
use std::time::Duration;

use crate::error::LlmError;

const BASE_BACKOFF_SECS: u64 = 1;

/// Parse the `Retry-After` header value as seconds, falling back to exponential backoff.
pub(crate) fn retry_delay(response: &reqwest::Response, attempt: u32) -> Duration {
    if let Some(val) = response.headers().get("retry-after")
        && let Ok(s) = val.to_str()
        && let Ok(secs) = s.parse::<u64>()
    {
        return Duration::from_secs(secs);
    }
    Duration::from_secs(BASE_BACKOFF_SECS << attempt)
}

/// Send an HTTP request, retrying up to `max_retries` times on 429 and 5xx
/// responses. 4xx responses other than 429 are returned to the caller as-is.
///
/// # Errors
///
/// Returns `LlmError::RateLimited` if all attempts are exhausted on 429, the
/// last 5xx response if retries run out there, or the underlying transport
/// error wrapped as `LlmError::Http`.
pub(crate) async fn send_with_retry<F, Fut>(
    provider_name: &str,
    max_retries: u32,
    mut f: F,
) -> Result<reqwest::Response, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    for attempt in 0..=max_retries {
        let response = f().await.map_err(LlmError::Http)?;
        let status = response.status();

        let retryable =
            status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
        if !retryable || attempt == max_retries {
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(LlmError::RateLimited);
            }
            return Ok(response);
        }

        let delay = retry_delay(&response, attempt);
        tracing::warn!(
            provider = provider_name,
            status = status.as_u16(),
            delay_secs = delay.as_secs(),
            attempt = attempt + 1,
            max_retries,
            "retrying request"
        );
        tokio::time::sleep(delay).await;
    }

    Err(LlmError::RateLimited)
}
