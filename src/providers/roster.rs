//! Ordered provider credentials with quota cooldowns

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::time::Instant;

use super::{
    AnthropicProvider, CompletionProvider, GeminiProvider, OpenAiCompatProvider, ProviderError,
};
use crate::{Error, Result};

/// Cooldown applied after a quota error when the provider gives no hint
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// One API key for one provider
#[derive(Debug, Clone)]
pub struct ProviderCredential {
    pub id: String,
    pub key: SecretString,
    /// Lower values are tried first
    pub priority: u32,
    pub cooldown_until: Option<Instant>,
}

impl ProviderCredential {
    #[must_use]
    pub const fn new(id: String, key: SecretString, priority: u32) -> Self {
        Self {
            id,
            key,
            priority,
            cooldown_until: None,
        }
    }

    /// Whether the key is still resting after a quota error
    #[must_use]
    pub fn is_cooling(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    pub fn start_cooldown(&mut self, now: Instant, interval: Duration) {
        self.cooldown_until = Some(now + interval);
    }

    /// Build the HTTP client for this credential
    ///
    /// Known ids are `openai`, `mistral`, `nvidia`, `anthropic` and
    /// `gemini`; any other id needs an OpenAI-compatible `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns error if the key is blank or the id is unknown without an
    /// endpoint
    pub fn connect(
        &self,
        model: Option<String>,
        endpoint: Option<String>,
    ) -> Result<Arc<dyn CompletionProvider>> {
        if self.key.expose_secret().trim().is_empty() {
            return Err(Error::Config(format!("provider {} has no API key", self.id)));
        }

        let key = self.key.clone();
        let provider: Arc<dyn CompletionProvider> = match (self.id.as_str(), endpoint) {
            ("anthropic", None) => Arc::new(AnthropicProvider::new(key, model)),
            ("gemini", None) => Arc::new(GeminiProvider::new(key, model)),
            ("openai", None) => Arc::new(OpenAiCompatProvider::openai(key, model)),
            ("mistral", None) => Arc::new(OpenAiCompatProvider::mistral(key, model)),
            ("nvidia", None) => Arc::new(OpenAiCompatProvider::nvidia(key, model)),
            (id, Some(base_url)) => {
                let model = model.ok_or_else(|| {
                    Error::Config(format!("provider {id} with a custom endpoint needs a model"))
                })?;
                Arc::new(OpenAiCompatProvider::new(id, base_url, key, model))
            }
            (id, None) => {
                return Err(Error::Config(format!(
                    "unknown provider {id}; set an OpenAI-compatible endpoint"
                )));
            }
        };
        Ok(provider)
    }
}

/// Answer produced by a remote provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAnswer {
    pub text: String,
    pub provider: String,
}

struct RosterEntry {
    credential: ProviderCredential,
    provider: Arc<dyn CompletionProvider>,
}

/// Providers in priority order, tried one after the other
pub struct ProviderRoster {
    entries: Vec<RosterEntry>,
    timeout: Duration,
    cooldown: Duration,
}

impl ProviderRoster {
    #[must_use]
    pub const fn new(timeout: Duration, cooldown: Duration) -> Self {
        Self {
            entries: Vec::new(),
            timeout,
            cooldown,
        }
    }

    /// Register a provider; ties keep insertion order
    pub fn add(&mut self, credential: ProviderCredential, provider: Arc<dyn CompletionProvider>) {
        self.entries.push(RosterEntry {
            credential,
            provider,
        });
        self.entries.sort_by_key(|e| e.credential.priority);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Credentials in the order they are tried
    pub fn credentials(&self) -> impl Iterator<Item = &ProviderCredential> {
        self.entries.iter().map(|e| &e.credential)
    }

    /// Whether the credential with this id is currently cooling down
    #[must_use]
    pub fn is_cooling(&self, id: &str) -> bool {
        let now = Instant::now();
        self.entries
            .iter()
            .any(|e| e.credential.id == id && e.credential.is_cooling(now))
    }

    /// Ask each available provider in turn until one answers
    ///
    /// Timeouts, failures and quota errors move on to the next provider;
    /// a quota error also rests that key. `None` when nobody answered.
    pub async fn complete(&mut self, prompt: &str, context: &str) -> Option<RemoteAnswer> {
        for entry in &mut self.entries {
            let id = entry.credential.id.as_str();
            if entry.credential.is_cooling(Instant::now()) {
                tracing::debug!(provider = id, "provider cooling down, skipped");
                continue;
            }

            let attempt = tokio::time::timeout(self.timeout, entry.provider.complete(prompt, context));
            match attempt.await {
                Ok(Ok(text)) => {
                    tracing::debug!(provider = id, "provider answered");
                    return Some(RemoteAnswer {
                        text: text.trim().to_string(),
                        provider: entry.credential.id.clone(),
                    });
                }
                Ok(Err(ProviderError::QuotaExceeded { retry_after })) => {
                    let rest = retry_after.unwrap_or(self.cooldown);
                    tracing::warn!(
                        provider = id,
                        cooldown_secs = rest.as_secs(),
                        "provider quota exceeded"
                    );
                    entry.credential.start_cooldown(Instant::now(), rest);
                }
                Ok(Err(ProviderError::Failure(reason))) => {
                    tracing::warn!(provider = id, reason = %reason, "provider failed");
                }
                Err(_) => {
                    tracing::warn!(
                        provider = id,
                        timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                        "provider timed out"
                    );
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(id: &str, priority: u32) -> ProviderCredential {
        ProviderCredential::new(id.to_string(), SecretString::from("key".to_string()), priority)
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_expires() {
        let mut c = credential("openai", 1);
        let now = Instant::now();
        c.start_cooldown(now, Duration::from_secs(60));
        assert!(c.is_cooling(now));
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!c.is_cooling(Instant::now()));
    }

    #[test]
    fn blank_key_rejected() {
        let c = ProviderCredential::new("openai".into(), SecretString::from(" ".to_string()), 1);
        assert!(matches!(c.connect(None, None), Err(Error::Config(_))));
    }

    #[test]
    fn unknown_provider_needs_endpoint() {
        assert!(credential("groq", 1).connect(None, None).is_err());
        assert!(
            credential("groq", 1)
                .connect(Some("llama".into()), Some("https://api.groq.com/openai/v1".into()))
                .is_ok()
        );
    }

    #[test]
    fn known_provider_ids() {
        for id in ["openai", "mistral", "nvidia", "anthropic", "gemini"] {
            let provider = credential(id, 1).connect(None, None).unwrap();
            assert_eq!(provider.id(), id);
        }
    }
}
