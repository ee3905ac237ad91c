//! Speech-to-text for wake windows and driver commands

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::capture::{SAMPLE_RATE, samples_to_wav};
use super::{SPEECH_REQUEST_TIMEOUT, http_client};
use crate::{Error, Result};

const WHISPER_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const DEEPGRAM_URL: &str = "https://api.deepgram.com/v1/listen";

/// Vocabulary hint so team radio jargon survives transcription
const RADIO_PROMPT: &str =
    "Bono, box, DRS, ERS, pneus, tyres, softs, mediums, hards, gap, delta, pit, strategy";

/// Whisper returns these for near-silent clips
const SILENCE_ARTIFACTS: [&str; 4] = [
    "thank you.",
    "thanks for watching!",
    "sous-titres réalisés par la communauté d'amara.org",
    "merci.",
];

/// Turns captured audio into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe 16 kHz mono samples
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails
    async fn transcribe(&self, samples: &[f32]) -> Result<String>;
}

#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
}

#[derive(Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

#[derive(Debug, Clone, Copy)]
enum Backend {
    Whisper,
    Deepgram,
}

impl Backend {
    const fn name(self) -> &'static str {
        match self {
            Self::Whisper => "Whisper",
            Self::Deepgram => "Deepgram",
        }
    }

    const fn url(self) -> &'static str {
        match self {
            Self::Whisper => WHISPER_URL,
            Self::Deepgram => DEEPGRAM_URL,
        }
    }
}

/// Transcribes speech to text over HTTP
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    /// ISO 639-1 hint, e.g. `fr`
    language: Option<String>,
    backend: Backend,
    endpoint: String,
}

impl SpeechToText {
    /// `OpenAI` Whisper
    ///
    /// # Errors
    ///
    /// Returns error if the API key is blank
    pub fn new_whisper(api_key: SecretString, model: String) -> Result<Self> {
        Self::with_backend(api_key, model, Backend::Whisper)
    }

    /// Deepgram pre-recorded audio API
    ///
    /// # Errors
    ///
    /// Returns error if the API key is blank
    pub fn new_deepgram(api_key: SecretString, model: String) -> Result<Self> {
        Self::with_backend(api_key, model, Backend::Deepgram)
    }

    fn with_backend(api_key: SecretString, model: String, backend: Backend) -> Result<Self> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(Error::Config(format!("{} API key required", backend.name())));
        }
        Ok(Self {
            client: http_client(SPEECH_REQUEST_TIMEOUT)?,
            api_key,
            model,
            language: None,
            backend,
            endpoint: backend.url().to_string(),
        })
    }

    /// Send requests to a compatible server instead of the hosted API
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Replace the per-request timeout
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = http_client(timeout)?;
        Ok(self)
    }

    /// Set the spoken language hint; empty lets the backend detect it
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        let language = language.into();
        self.language = (!language.is_empty()).then_some(language);
        self
    }

    /// Transcribe WAV bytes
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the backend refuses it
    pub async fn transcribe_wav(&self, audio: Vec<u8>) -> Result<String> {
        tracing::debug!(
            audio_bytes = audio.len(),
            backend = self.backend.name(),
            "transcribing"
        );

        let request = match self.backend {
            Backend::Whisper => {
                let file = reqwest::multipart::Part::bytes(audio)
                    .file_name("radio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?;
                let mut form = reqwest::multipart::Form::new()
                    .part("file", file)
                    .text("model", self.model.clone())
                    .text("prompt", RADIO_PROMPT);
                if let Some(language) = &self.language {
                    form = form.text("language", language.clone());
                }
                self.client
                    .post(&self.endpoint)
                    .bearer_auth(self.api_key.expose_secret())
                    .multipart(form)
            }
            Backend::Deepgram => {
                let mut query = vec![("model", self.model.as_str()), ("punctuate", "true")];
                if let Some(language) = &self.language {
                    query.push(("language", language.as_str()));
                }
                self.client
                    .post(&self.endpoint)
                    .query(&query)
                    .header(
                        "Authorization",
                        format!("Token {}", self.api_key.expose_secret()),
                    )
                    .header("Content-Type", "audio/wav")
                    .body(audio)
            }
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(200).collect();
            return Err(Error::Stt(format!("{} returned {status}: {body}", self.backend.name())));
        }

        let text = match self.backend {
            Backend::Whisper => response.json::<WhisperResponse>().await?.text,
            Backend::Deepgram => deepgram_transcript(response.json().await?),
        };
        let text = clean_transcript(&text);
        tracing::debug!(transcript = %text, "transcription complete");
        Ok(text)
    }
}

fn deepgram_transcript(response: DeepgramResponse) -> String {
    response
        .results
        .channels
        .into_iter()
        .next()
        .and_then(|c| c.alternatives.into_iter().next())
        .map(|a| a.transcript)
        .unwrap_or_default()
}

/// Collapse whitespace and drop known silence artifacts
fn clean_transcript(text: &str) -> String {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if SILENCE_ARTIFACTS.contains(&text.to_lowercase().as_str()) {
        return String::new();
    }
    text
}

#[async_trait]
impl Transcriber for SpeechToText {
    async fn transcribe(&self, samples: &[f32]) -> Result<String> {
        let wav = samples_to_wav(samples, SAMPLE_RATE)?;
        self.transcribe_wav(wav).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_rejected() {
        assert!(SpeechToText::new_whisper(SecretString::from(String::new()), "whisper-1".into()).is_err());
        assert!(SpeechToText::new_deepgram(SecretString::from(" ".to_string()), "nova-2".into()).is_err());
    }

    #[test]
    fn test_language_hint_blank_is_none() {
        let stt = SpeechToText::new_whisper(SecretString::from("k".to_string()), "whisper-1".into())
            .unwrap()
            .with_language("");
        assert!(stt.language.is_none());
    }

    #[test]
    fn test_silence_artifacts_dropped() {
        assert_eq!(clean_transcript("  Thank you. "), "");
        assert_eq!(clean_transcript("Bono   what's the\ngap"), "Bono what's the gap");
    }

    #[test]
    fn test_deepgram_first_alternative() {
        let response: DeepgramResponse = serde_json::from_str(
            r#"{"results":{"channels":[{"alternatives":[{"transcript":"box box"},{"transcript":"fox"}]}]}}"#,
        )
        .unwrap();
        assert_eq!(deepgram_transcript(response), "box box");
    }

    #[tokio::test]
    async fn test_stalled_backend_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept connections and never answer
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let stt = SpeechToText::new_whisper(SecretString::from("k".to_string()), "whisper-1".into())
            .unwrap()
            .with_endpoint(format!("http://{addr}/v1/audio/transcriptions"))
            .with_timeout(Duration::from_millis(200))
            .unwrap();

        let err = tokio::time::timeout(Duration::from_secs(5), stt.transcribe(&[0.0; 1600]))
            .await
            .expect("request outlived its timeout")
            .unwrap_err();
        assert!(matches!(err, Error::Http(ref e) if e.is_timeout()), "{err}");
        server.abort();
    }
}
