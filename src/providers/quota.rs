//! Quota detection for provider HTTP failures

use std::time::Duration;

use super::ProviderError;

/// Longest `Retry-After` honoured; anything larger is clamped
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Classify a non-success provider response
///
/// HTTP 429, or a body mentioning quota or rate limiting, is
/// `QuotaExceeded`. Everything else is `Failure`.
#[must_use]
pub fn classify_failure(status: u16, retry_after: Option<&str>, body: &str) -> ProviderError {
    let lower = body.to_lowercase();
    let quota = status == 429
        || lower.contains("quota")
        || lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("resource_exhausted");

    if quota {
        let retry_after = retry_after
            .and_then(parse_retry_after)
            .or_else(|| retry_delay_from_body(body));
        return ProviderError::QuotaExceeded { retry_after };
    }

    let snippet: String = body.chars().take(200).collect();
    ProviderError::Failure(format!("HTTP {status}: {snippet}"))
}

/// Parse a `Retry-After` header given in seconds
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs = value.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

/// Gemini reports the wait as `"retryDelay": "30s"` inside `error.details`
fn retry_delay_from_body(body: &str) -> Option<Duration> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    v.get("error")?
        .get("details")?
        .as_array()?
        .iter()
        .find_map(|d| d.get("retryDelay")?.as_str())
        .and_then(|s| s.strip_suffix('s'))
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(|s| Duration::from_secs_f64(s).min(MAX_RETRY_AFTER))
}
