//! OpenAI-compatible chat completions (OpenAI, Mistral, NVIDIA and custom)

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::{CompletionProvider, MAX_OUTPUT_TOKENS, ProviderError, non_empty, read_json};

const OPENAI_BASE: &str = "https://api.openai.com/v1";
const MISTRAL_BASE: &str = "https://api.mistral.ai/v1";
const NVIDIA_BASE: &str = "https://integrate.api.nvidia.com/v1";

/// Any endpoint speaking `POST {base}/chat/completions`
pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: SecretString,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        base_url: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn openai(api_key: SecretString, model: Option<String>) -> Self {
        Self::new(
            "openai",
            OPENAI_BASE,
            api_key,
            model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
        )
    }

    #[must_use]
    pub fn mistral(api_key: SecretString, model: Option<String>) -> Self {
        Self::new(
            "mistral",
            MISTRAL_BASE,
            api_key,
            model.unwrap_or_else(|| "mistral-small-latest".to_string()),
        )
    }

    #[must_use]
    pub fn nvidia(api_key: SecretString, model: Option<String>) -> Self {
        Self::new(
            "nvidia",
            NVIDIA_BASE,
            api_key,
            model.unwrap_or_else(|| "nvidia/llama-3.1-nemotron-70b-instruct".to_string()),
        )
    }

    fn request_body(&self, prompt: &str, context: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": context },
                { "role": "user", "content": prompt },
            ],
            "max_tokens": MAX_OUTPUT_TOKENS,
            "temperature": 0.7,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn complete(&self, prompt: &str, context: &str) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&self.request_body(prompt, context))
            .send()
            .await?;

        let body = read_json(&self.id, response).await?;
        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        non_empty(text)
    }
}
