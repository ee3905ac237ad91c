//! Anthropic Messages API

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::{CompletionProvider, MAX_OUTPUT_TOKENS, ProviderError, non_empty, read_json};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    api_key: SecretString,
    model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    #[must_use]
    pub fn new(api_key: SecretString, model: Option<String>) -> Self {
        Self {
            api_key,
            model: model.unwrap_or_else(|| "claude-sonnet-4-20250514".to_string()),
            client: reqwest::Client::new(),
        }
    }

    fn request_body(&self, prompt: &str, context: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "system": context,
            "messages": [{ "role": "user", "content": prompt }],
        })
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn id(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, prompt: &str, context: &str) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&self.request_body(prompt, context))
            .send()
            .await?;

        let body = read_json("anthropic", response).await?;
        let text = body["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b["type"] == "text")
                    .filter_map(|b| b["text"].as_str())
                    .collect::<String>()
            })
            .unwrap_or_default();
        non_empty(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_is_top_level() {
        let p = AnthropicProvider::new(SecretString::from("k".to_string()), None);
        let body = p.request_body("tyres?", "persona");
        assert_eq!(body["system"], "persona");
        assert_eq!(body["messages"][0]["content"], "tyres?");
        assert_eq!(body["max_tokens"], 300);
    }
}
