//! Remote completion providers
//!
//! Each backend answers a driver question given the engineer's context.
//! The `ProviderRoster` orders them by priority and tracks quota cooldowns.

mod anthropic;
mod gemini;
mod openai_compat;
mod quota;
mod roster;

use std::time::Duration;

use async_trait::async_trait;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use quota::{classify_failure, parse_retry_after};
pub use roster::{DEFAULT_COOLDOWN, ProviderCredential, ProviderRoster, RemoteAnswer};

/// Output budget for a radio answer
pub const MAX_OUTPUT_TOKENS: u32 = 300;

/// Why a provider did not produce an answer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Key exhausted or rate limited; the provider may say for how long
    #[error("quota exceeded")]
    QuotaExceeded { retry_after: Option<Duration> },

    #[error("{0}")]
    Failure(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        Self::Failure(e.to_string())
    }
}

/// A language model that can answer a question
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Stable identifier, e.g. `anthropic`
    fn id(&self) -> &str;

    /// Answer `prompt` with `context` as the system instructions
    ///
    /// # Errors
    ///
    /// Returns `QuotaExceeded` when the key is rate limited, `Failure`
    /// for any other problem
    async fn complete(&self, prompt: &str, context: &str) -> Result<String, ProviderError>;
}

/// Turn a provider HTTP response into JSON, classifying failures
pub(crate) async fn read_json(
    provider: &str,
    response: reqwest::Response,
) -> Result<serde_json::Value, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = response.text().await.unwrap_or_default();

    let error = classify_failure(status.as_u16(), retry_after.as_deref(), &body);
    tracing::warn!(provider, status = %status, error = %error, "provider request failed");
    Err(error)
}

/// Reject blank completions so the next provider gets a chance
pub(crate) fn non_empty(text: String) -> Result<String, ProviderError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ProviderError::Failure("empty completion".to_string()));
    }
    Ok(trimmed.to_string())
}
