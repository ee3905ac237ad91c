//! Google Gemini `generateContent`

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::{CompletionProvider, MAX_OUTPUT_TOKENS, ProviderError, non_empty, read_json};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    api_key: SecretString,
    model: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    #[must_use]
    pub fn new(api_key: SecretString, model: Option<String>) -> Self {
        Self {
            api_key,
            model: model.unwrap_or_else(|| "gemini-2.0-flash".to_string()),
            client: reqwest::Client::new(),
        }
    }

    fn request_body(prompt: &str, context: &str) -> serde_json::Value {
        serde_json::json!({
            "systemInstruction": { "parts": [{ "text": context }] },
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "maxOutputTokens": MAX_OUTPUT_TOKENS },
        })
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    fn id(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, prompt: &str, context: &str) -> Result<String, ProviderError> {
        let url = format!("{API_BASE}/models/{}:generateContent", self.model);
        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&Self::request_body(prompt, context))
            .send()
            .await?;

        let body = read_json("gemini", response).await?;
        let text = body["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
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
    fn request_shape() {
        let body = GeminiProvider::request_body("fuel?", "persona");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "persona");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "fuel?");
    }
}
