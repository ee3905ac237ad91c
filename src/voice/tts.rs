//! Text-to-speech for radio messages
//!
//! Both backends return MP3. Text is rewritten into a spoken form first so
//! lap times and acronyms come out the way an engineer would say them.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};

use super::{SPEECH_REQUEST_TIMEOUT, http_client};
use crate::{Error, Result};

const OPENAI_SPEECH_URL: &str = "https://api.openai.com/v1/audio/speech";
const ELEVENLABS_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";

static LAP_TIME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2}):(\d{2})\.(\d{3})\b").ok());

static ACRONYM: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\b(DRS|ERS|SC|VSC)\b").ok());

#[derive(Debug, Clone)]
enum Backend {
    OpenAi { voice: String, speed: f32, model: String },
    ElevenLabs { voice_id: String, model: String },
}

/// Synthesizes radio messages to MP3
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    backend: Backend,
    endpoint: String,
}

impl TextToSpeech {
    /// `OpenAI` speech with the `tts-1` model
    ///
    /// # Errors
    ///
    /// Returns error if the API key is blank
    pub fn new_openai(api_key: SecretString, voice: String, speed: f32) -> Result<Self> {
        Self::new_openai_with_model(api_key, voice, speed, "tts-1".to_string())
    }

    /// `OpenAI` speech with an explicit model
    ///
    /// # Errors
    ///
    /// Returns error if the API key is blank
    pub fn new_openai_with_model(
        api_key: SecretString,
        voice: String,
        speed: f32,
        model: String,
    ) -> Result<Self> {
        Self::with_backend(
            api_key,
            "OpenAI",
            OPENAI_SPEECH_URL,
            Backend::OpenAi {
                voice,
                speed: speed.clamp(0.25, 4.0),
                model,
            },
        )
    }

    /// `ElevenLabs` speech with the multilingual model
    ///
    /// # Errors
    ///
    /// Returns error if the API key is blank
    pub fn new_elevenlabs(api_key: SecretString, voice_id: String) -> Result<Self> {
        Self::new_elevenlabs_with_model(api_key, voice_id, "eleven_multilingual_v2".to_string())
    }

    /// `ElevenLabs` speech with an explicit model
    ///
    /// # Errors
    ///
    /// Returns error if the API key is blank
    pub fn new_elevenlabs_with_model(
        api_key: SecretString,
        voice_id: String,
        model: String,
    ) -> Result<Self> {
        Self::with_backend(
            api_key,
            "ElevenLabs",
            ELEVENLABS_URL,
            Backend::ElevenLabs { voice_id, model },
        )
    }

    fn with_backend(
        api_key: SecretString,
        name: &str,
        endpoint: &str,
        backend: Backend,
    ) -> Result<Self> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(Error::Config(format!("{name} API key required for TTS")));
        }
        Ok(Self {
            client: http_client(SPEECH_REQUEST_TIMEOUT)?,
            api_key,
            backend,
            endpoint: endpoint.to_string(),
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

    /// Synthesize a radio message to MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the backend refuses it
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let spoken = spoken_form(text);
        let request = match &self.backend {
            Backend::OpenAi { voice, speed, model } => self
                .client
                .post(&self.endpoint)
                .bearer_auth(self.api_key.expose_secret())
                .json(&serde_json::json!({
                    "model": model,
                    "input": spoken,
                    "voice": voice,
                    "speed": speed,
                    "response_format": "mp3",
                })),
            Backend::ElevenLabs { voice_id, model } => self
                .client
                .post(format!("{}/{voice_id}", self.endpoint))
                .header("xi-api-key", self.api_key.expose_secret())
                .header("Accept", "audio/mpeg")
                .json(&serde_json::json!({
                    "text": spoken,
                    "model_id": model,
                })),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(200).collect();
            return Err(Error::Tts(format!("{} returned {status}: {body}", self.backend_name())));
        }

        let audio = response.bytes().await?;
        tracing::trace!(bytes = audio.len(), backend = self.backend_name(), "speech synthesized");
        Ok(audio.to_vec())
    }

    const fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::OpenAi { .. } => "OpenAI TTS",
            Backend::ElevenLabs { .. } => "ElevenLabs",
        }
    }
}

/// Rewrite text the way it should be read over the radio
///
/// `1:31.245` becomes "1 31 point 2 4 5" and acronyms are spelled out.
#[must_use]
pub fn spoken_form(text: &str) -> String {
    let mut out = text.to_string();
    if let Some(re) = LAP_TIME.as_ref() {
        out = re
            .replace_all(&out, |caps: &regex::Captures<'_>| {
                let millis: Vec<String> = caps[3].chars().map(String::from).collect();
                format!("{} {} point {}", &caps[1], &caps[2], millis.join(" "))
            })
            .into_owned();
    }
    if let Some(re) = ACRONYM.as_ref() {
        out = re
            .replace_all(&out, |caps: &regex::Captures<'_>| {
                caps[1].chars().map(String::from).collect::<Vec<_>>().join(" ")
            })
            .into_owned();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_config_error() {
        let err = TextToSpeech::new_openai(SecretString::from(String::new()), "onyx".into(), 1.0)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
        assert!(
            TextToSpeech::new_elevenlabs(SecretString::from("  ".to_string()), "voice".into())
                .is_err()
        );
    }

    #[test]
    fn test_lap_times_read_aloud() {
        assert_eq!(
            spoken_form("Lap 4 done, 1:31.245. P3."),
            "Lap 4 done, 1 31 point 2 4 5. P3."
        );
    }

    #[test]
    fn test_acronyms_spelled_out() {
        assert_eq!(spoken_form("DRS available."), "D R S available.");
        assert_eq!(spoken_form("Drsx stays"), "Drsx stays");
    }

    #[tokio::test]
    async fn test_stalled_backend_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let tts = TextToSpeech::new_openai(SecretString::from("k".to_string()), "onyx".into(), 1.0)
            .unwrap()
            .with_endpoint(format!("http://{addr}/v1/audio/speech"))
            .with_timeout(Duration::from_millis(200))
            .unwrap();

        let err = tokio::time::timeout(Duration::from_secs(5), tts.synthesize("box box"))
            .await
            .expect("request outlived its timeout")
            .unwrap_err();
        assert!(matches!(err, Error::Http(ref e) if e.is_timeout()), "{err}");
        server.abort();
    }
}
