//! Configuration management for the race engineer
//!
//! Precedence is CLI flag > environment > TOML file > default.

pub mod file;

use std::fmt::Display;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::engineer::AdvisorConfig;
use crate::providers::{ProviderCredential, ProviderRoster};
use crate::telemetry::ListenerConfig;
use crate::voice::{DEFAULT_QUEUE_BOUND, RecognizerConfig, SpeechToText, TextToSpeech};
use crate::{Error, Result};

use file::EngineerConfigFile;

/// Provider order used when no `[[providers]]` table is configured
const IMPLICIT_PROVIDER_ORDER: [&str; 5] = ["mistral", "nvidia", "gemini", "openai", "anthropic"];

/// Race engineer configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub telemetry: ListenerConfig,
    pub voice: VoiceConfig,
    pub engineer: EngineerConfig,
    /// Remote providers, sorted by priority
    pub providers: Vec<ProviderEntry>,
    pub api_keys: ApiKeys,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Enable microphone input and spoken output
    pub enabled: bool,

    pub wake_word: String,

    /// Mis-hearings accepted for the wake word
    pub alternatives: Vec<String>,

    /// Minimum wake word similarity, 0.0 to 1.0
    pub sensitivity: f32,

    /// STT language hint; empty lets the backend detect it
    pub language: String,

    /// STT model (e.g. "whisper-1", "deepgram/nova-2")
    pub stt_model: String,

    /// TTS model (e.g. "tts-1", "elevenlabs/eleven_multilingual_v2")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,

    pub silence: Duration,
    pub max_utterance: Duration,
    pub debounce: Duration,
}

impl VoiceConfig {
    /// Recognizer tuning derived from these settings
    #[must_use]
    pub fn recognizer_config(&self) -> RecognizerConfig {
        RecognizerConfig {
            sensitivity: self.sensitivity,
            silence: self.silence,
            max_utterance: self.max_utterance,
            debounce: self.debounce,
            ..RecognizerConfig::default()
        }
    }
}

/// Engineer behaviour
#[derive(Debug, Clone)]
pub struct EngineerConfig {
    /// Name the engineer answers to on the radio
    pub name: String,
    pub auto_advice: bool,
    pub advice_interval: Duration,
    pub announce_laps: bool,
    pub queue_bound: usize,
    pub provider_timeout: Duration,
    /// Cooldown after a quota error when the provider gives no hint
    pub cooldown: Duration,
}

impl EngineerConfig {
    #[must_use]
    pub const fn advisor_config(&self) -> AdvisorConfig {
        AdvisorConfig {
            auto_advice: self.auto_advice,
            interval: self.advice_interval,
            announce_laps: self.announce_laps,
        }
    }
}

/// A configured remote provider
#[derive(Debug, Clone)]
pub struct ProviderEntry {
    pub credential: ProviderCredential,
    pub model: Option<String>,
    pub endpoint: Option<String>,
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (chat, Whisper and TTS)
    pub openai: Option<SecretString>,
    pub anthropic: Option<SecretString>,
    /// Google Gemini API key
    pub gemini: Option<SecretString>,
    pub mistral: Option<SecretString>,
    /// NVIDIA API catalog key
    pub nvidia: Option<SecretString>,
    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<SecretString>,
    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<SecretString>,
}

impl ApiKeys {
    /// Key stored for a known provider id
    #[must_use]
    pub fn for_provider(&self, id: &str) -> Option<&SecretString> {
        match id {
            "openai" => self.openai.as_ref(),
            "anthropic" => self.anthropic.as_ref(),
            "gemini" => self.gemini.as_ref(),
            "mistral" => self.mistral.as_ref(),
            "nvidia" => self.nvidia.as_ref(),
            _ => None,
        }
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub bind: Option<IpAddr>,
    pub disable_voice: bool,
}

impl Config {
    /// Load configuration from the process environment and the default file
    ///
    /// # Errors
    ///
    /// Returns error if a setting is out of range
    pub fn load(overrides: &CliOverrides) -> Result<Self> {
        let fc = file::load_config_file();
        Self::resolve(fc, &|key| std::env::var(key).ok(), overrides)
    }

    /// Load configuration with an explicit config file
    ///
    /// # Errors
    ///
    /// Returns error if a setting is out of range
    pub fn load_from(path: &Path, overrides: &CliOverrides) -> Result<Self> {
        let fc = file::read_config_file(path);
        Self::resolve(fc, &|key| std::env::var(key).ok(), overrides)
    }

    /// Merge file values, environment lookups and CLI overrides
    ///
    /// # Errors
    ///
    /// Returns error if a setting is out of range
    pub fn resolve(
        fc: EngineerConfigFile,
        env: &dyn Fn(&str) -> Option<String>,
        overrides: &CliOverrides,
    ) -> Result<Self> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let secret = |key: &str, file: Option<String>| {
            env(key)
                .or(file.filter(|v| !v.trim().is_empty()))
                .map(SecretString::from)
        };

        // API keys (env > toml > None)
        let api_keys = ApiKeys {
            openai: secret("OPENAI_API_KEY", fc.api_keys.openai),
            anthropic: secret("ANTHROPIC_API_KEY", fc.api_keys.anthropic),
            gemini: secret("GEMINI_API_KEY", fc.api_keys.gemini),
            mistral: secret("MISTRAL_API_KEY", fc.api_keys.mistral),
            nvidia: secret("NVIDIA_API_KEY", fc.api_keys.nvidia),
            elevenlabs: secret("ELEVENLABS_API_KEY", fc.api_keys.elevenlabs),
            deepgram: secret("DEEPGRAM_API_KEY", fc.api_keys.deepgram),
        };

        // Telemetry (cli > env > toml > default)
        let mut telemetry = ListenerConfig::default();
        let env_port = match overrides.port {
            Some(_) => None,
            None => parse_env(&env, "RACE_ENGINEER_UDP_PORT")?,
        };
        if let Some(port) = overrides.port.or(env_port).or(fc.telemetry.port) {
            telemetry.port = port;
        }
        let bind = match overrides.bind {
            Some(ip) => Some(ip),
            None => env("RACE_ENGINEER_UDP_BIND")
                .or(fc.telemetry.bind)
                .map(|s| {
                    s.parse::<IpAddr>()
                        .map_err(|e| Error::Config(format!("invalid bind address {s}: {e}")))
                })
                .transpose()?,
        };
        if let Some(ip) = bind {
            telemetry.bind = ip;
        }

        // Voice (env > toml > default)
        let v = fc.voice;
        let sensitivity = parse_env(&env, "RACE_ENGINEER_SENSITIVITY")?
            .or(v.sensitivity)
            .unwrap_or(0.75);
        if !(0.0..=1.0).contains(&sensitivity) {
            return Err(Error::Config(format!(
                "wake word sensitivity must be between 0 and 1, got {sensitivity}"
            )));
        }
        let voice = VoiceConfig {
            enabled: !overrides.disable_voice && v.enabled.unwrap_or(true),
            wake_word: env("RACE_ENGINEER_WAKE_WORD")
                .or(v.wake_word)
                .unwrap_or_else(|| "bono".to_string()),
            alternatives: v.alternatives.unwrap_or_else(|| {
                ["bonno", "bruno", "chrono"].map(String::from).to_vec()
            }),
            sensitivity,
            language: v.language.unwrap_or_default(),
            stt_model: v.stt_model.unwrap_or_else(|| "whisper-1".to_string()),
            tts_model: v.tts_model.unwrap_or_else(|| "tts-1".to_string()),
            tts_voice: v.tts_voice.unwrap_or_else(|| "onyx".to_string()),
            tts_speed: v.tts_speed.unwrap_or(1.1).clamp(0.25, 4.0),
            silence: Duration::from_millis(v.silence_ms.unwrap_or(800)),
            max_utterance: Duration::from_millis(v.max_utterance_ms.unwrap_or(8000)),
            debounce: Duration::from_millis(v.debounce_ms.unwrap_or(1500)),
        };

        if overrides.disable_voice {
            tracing::info!("voice explicitly disabled via --no-voice");
        }

        let e = fc.engineer;
        let engineer = EngineerConfig {
            name: e.name.unwrap_or_else(|| "Bono".to_string()),
            auto_advice: e.auto_advice.unwrap_or(true),
            advice_interval: Duration::from_secs(e.advice_interval_secs.unwrap_or(30)),
            announce_laps: e.announce_laps.unwrap_or(true),
            queue_bound: e.queue_bound.unwrap_or(DEFAULT_QUEUE_BOUND).max(1),
            provider_timeout: Duration::from_secs(e.provider_timeout_secs.unwrap_or(10).max(1)),
            cooldown: Duration::from_secs(e.cooldown_secs.unwrap_or(60)),
        };

        let mut providers = if fc.providers.is_empty() {
            implicit_providers(&api_keys)
        } else {
            explicit_providers(fc.providers, &api_keys)
        };
        providers.sort_by_key(|p| p.credential.priority);

        Ok(Self {
            telemetry,
            voice,
            engineer,
            providers,
            api_keys,
        })
    }

    /// Connect every configured provider; broken entries are logged and skipped
    #[must_use]
    pub fn provider_roster(&self) -> ProviderRoster {
        let mut roster =
            ProviderRoster::new(self.engineer.provider_timeout, self.engineer.cooldown);
        for entry in &self.providers {
            match entry
                .credential
                .connect(entry.model.clone(), entry.endpoint.clone())
            {
                Ok(provider) => roster.add(entry.credential.clone(), provider),
                Err(e) => {
                    tracing::warn!(provider = %entry.credential.id, error = %e, "provider skipped");
                }
            }
        }
        roster
    }

    /// Speech-to-text client for the configured model
    ///
    /// # Errors
    ///
    /// Returns error if the needed API key is missing
    pub fn speech_to_text(&self) -> Result<SpeechToText> {
        let stt = if let Some(model) = self.voice.stt_model.strip_prefix("deepgram/") {
            let key = self
                .api_keys
                .deepgram
                .clone()
                .ok_or_else(|| Error::Config("DEEPGRAM_API_KEY not set".to_string()))?;
            SpeechToText::new_deepgram(key, model.to_string())?
        } else {
            let key = self
                .api_keys
                .openai
                .clone()
                .ok_or_else(|| Error::Config("OPENAI_API_KEY not set".to_string()))?;
            SpeechToText::new_whisper(key, self.voice.stt_model.clone())?
        };
        Ok(stt.with_language(self.voice.language.clone()))
    }

    /// Text-to-speech client for the configured model
    ///
    /// # Errors
    ///
    /// Returns error if the needed API key is missing
    pub fn text_to_speech(&self) -> Result<TextToSpeech> {
        if let Some(model) = self.voice.tts_model.strip_prefix("elevenlabs/") {
            let key = self
                .api_keys
                .elevenlabs
                .clone()
                .ok_or_else(|| Error::Config("ELEVENLABS_API_KEY not set".to_string()))?;
            TextToSpeech::new_elevenlabs_with_model(
                key,
                self.voice.tts_voice.clone(),
                model.to_string(),
            )
        } else {
            let key = self
                .api_keys
                .openai
                .clone()
                .ok_or_else(|| Error::Config("OPENAI_API_KEY not set".to_string()))?;
            TextToSpeech::new_openai_with_model(
                key,
                self.voice.tts_voice.clone(),
                self.voice.tts_speed,
                self.voice.tts_model.clone(),
            )
        }
    }
}

/// Parse an optional environment value; a value that is set but unparsable is an error
fn parse_env<T>(env: &dyn Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    env(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::Config(format!("invalid {name} value {raw:?}: {e}")))
        })
        .transpose()
}

fn implicit_providers(keys: &ApiKeys) -> Vec<ProviderEntry> {
    IMPLICIT_PROVIDER_ORDER
        .iter()
        .zip(1u32..)
        .filter_map(|(id, priority)| {
            keys.for_provider(id).map(|key| ProviderEntry {
                credential: ProviderCredential::new((*id).to_string(), key.clone(), priority),
                model: None,
                endpoint: None,
            })
        })
        .collect()
}

fn explicit_providers(entries: Vec<file::ProviderFileEntry>, keys: &ApiKeys) -> Vec<ProviderEntry> {
    entries
        .into_iter()
        .zip(1u32..)
        .filter_map(|(entry, position)| {
            let key = entry
                .key
                .filter(|k| !k.trim().is_empty())
                .map(SecretString::from)
                .or_else(|| keys.for_provider(&entry.id).cloned());
            let Some(key) = key else {
                tracing::warn!(provider = %entry.id, "no API key for provider, skipping");
                return None;
            };
            Some(ProviderEntry {
                credential: ProviderCredential::new(
                    entry.id,
                    key,
                    entry.priority.unwrap_or(position),
                ),
                model: entry.model,
                endpoint: entry.endpoint,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::net::Ipv4Addr;

    use secrecy::ExposeSecret;

    use super::*;

    fn resolve(toml: &str, env: &[(&str, &str)], overrides: &CliOverrides) -> Result<Config> {
        let vars: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let fc = file::parse_config(toml)?;
        Config::resolve(fc, &|k| vars.get(k).cloned(), overrides)
    }

    #[test]
    fn defaults() {
        let config = resolve("", &[], &CliOverrides::default()).unwrap();
        assert_eq!(config.telemetry.port, 20777);
        assert_eq!(config.telemetry.bind, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.voice.wake_word, "bono");
        assert!((config.voice.sensitivity - 0.75).abs() < f32::EPSILON);
        assert_eq!(config.engineer.name, "Bono");
        assert_eq!(config.engineer.queue_bound, 3);
        assert!(config.providers.is_empty());
    }

    #[test]
    fn env_beats_file_and_cli_beats_env() {
        let toml = "[telemetry]\nport = 20000";
        let env = [("RACE_ENGINEER_UDP_PORT", "21000")];
        let config = resolve(toml, &env, &CliOverrides::default()).unwrap();
        assert_eq!(config.telemetry.port, 21000);

        let cli = CliOverrides {
            port: Some(22000),
            ..CliOverrides::default()
        };
        assert_eq!(resolve(toml, &env, &cli).unwrap().telemetry.port, 22000);
    }

    #[test]
    fn sensitivity_out_of_range_rejected() {
        let env = [("RACE_ENGINEER_SENSITIVITY", "1.5")];
        assert!(matches!(
            resolve("", &env, &CliOverrides::default()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn unparsable_env_numbers_rejected() {
        for (name, value) in [
            ("RACE_ENGINEER_UDP_PORT", "twenty"),
            ("RACE_ENGINEER_UDP_PORT", "70000"),
            ("RACE_ENGINEER_SENSITIVITY", "high"),
        ] {
            let err = resolve("", &[(name, value)], &CliOverrides::default()).unwrap_err();
            assert!(matches!(err, Error::Config(ref msg) if msg.contains(name)), "{name}={value}");
        }

        // The flag wins, so a broken env port is never read
        let cli = CliOverrides {
            port: Some(22000),
            ..CliOverrides::default()
        };
        let env = [("RACE_ENGINEER_UDP_PORT", "twenty")];
        assert_eq!(resolve("", &env, &cli).unwrap().telemetry.port, 22000);
    }

    #[test]
    fn bad_bind_address_rejected() {
        assert!(resolve("[telemetry]\nbind = \"nowhere\"", &[], &CliOverrides::default()).is_err());
    }

    #[test]
    fn implicit_providers_follow_available_keys() {
        let env = [("OPENAI_API_KEY", "ok"), ("MISTRAL_API_KEY", "mk")];
        let config = resolve("", &env, &CliOverrides::default()).unwrap();
        let ids: Vec<_> = config.providers.iter().map(|p| p.credential.id.as_str()).collect();
        assert_eq!(ids, ["mistral", "openai"]);
    }

    #[test]
    fn explicit_providers_use_priority_and_fallback_keys() {
        let toml = r#"
            [[providers]]
            id = "anthropic"
            priority = 2

            [[providers]]
            id = "gemini"
            priority = 1
            key = "from-table"

            [[providers]]
            id = "openai"
            priority = 3
        "#;
        let env = [("ANTHROPIC_API_KEY", "ak")];
        let config = resolve(toml, &env, &CliOverrides::default()).unwrap();
        let ids: Vec<_> = config.providers.iter().map(|p| p.credential.id.as_str()).collect();
        // openai has no key anywhere
        assert_eq!(ids, ["gemini", "anthropic"]);
        assert_eq!(config.providers[0].credential.key.expose_secret(), "from-table");
    }

    #[test]
    fn blank_env_key_ignored() {
        let env = [("OPENAI_API_KEY", "  ")];
        let config = resolve("", &env, &CliOverrides::default()).unwrap();
        assert!(config.api_keys.openai.is_none());
    }

    #[test]
    fn disable_voice_override() {
        let cli = CliOverrides {
            disable_voice: true,
            ..CliOverrides::default()
        };
        assert!(!resolve("", &[], &cli).unwrap().voice.enabled);
    }

    #[test]
    fn deepgram_model_needs_deepgram_key() {
        let config = resolve(
            "[voice]\nstt_model = \"deepgram/nova-2\"",
            &[("OPENAI_API_KEY", "ok")],
            &CliOverrides::default(),
        )
        .unwrap();
        assert!(config.speech_to_text().is_err());
    }
}
