//! TOML configuration file loading
//!
//! Supports `~/.config/race-engineer/config.toml` as a persistent config
//! source. All fields are optional; the file is a partial overlay on top of
//! defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct EngineerConfigFile {
    #[serde(default)]
    pub telemetry: TelemetryFileConfig,

    #[serde(default)]
    pub voice: VoiceFileConfig,

    #[serde(default)]
    pub engineer: EngineerFileConfig,

    /// Remote providers in any order; `priority` decides
    #[serde(default)]
    pub providers: Vec<ProviderFileEntry>,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// UDP listener settings
#[derive(Debug, Default, Deserialize)]
pub struct TelemetryFileConfig {
    /// Bind address, e.g. "0.0.0.0"
    pub bind: Option<String>,
    pub port: Option<u16>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Enable voice input/output
    pub enabled: Option<bool>,

    pub wake_word: Option<String>,

    /// Mis-hearings accepted for the wake word
    pub alternatives: Option<Vec<String>>,

    /// Minimum wake word similarity, 0.0 to 1.0
    pub sensitivity: Option<f32>,

    /// Spoken language hint for STT (ISO 639-1); empty means auto-detect
    pub language: Option<String>,

    /// STT model (e.g. "whisper-1", "deepgram/nova-2")
    pub stt_model: Option<String>,

    /// TTS model (e.g. "tts-1", "elevenlabs/eleven_multilingual_v2")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,

    pub silence_ms: Option<u64>,
    pub max_utterance_ms: Option<u64>,
    pub debounce_ms: Option<u64>,
}

/// Engineer behaviour
#[derive(Debug, Default, Deserialize)]
pub struct EngineerFileConfig {
    /// Persona name used on the radio
    pub name: Option<String>,
    pub auto_advice: Option<bool>,
    pub advice_interval_secs: Option<u64>,
    pub announce_laps: Option<bool>,
    /// Pending responses kept by the synthesizer
    pub queue_bound: Option<usize>,
    pub provider_timeout_secs: Option<u64>,
    pub cooldown_secs: Option<u64>,
}

/// One `[[providers]]` table
#[derive(Debug, Default, Deserialize)]
pub struct ProviderFileEntry {
    /// `openai`, `mistral`, `nvidia`, `anthropic`, `gemini` or a custom id
    pub id: String,
    pub priority: Option<u32>,
    pub model: Option<String>,
    /// OpenAI-compatible base URL for custom providers
    pub endpoint: Option<String>,
    /// Falls back to `[api_keys]` for known ids
    pub key: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
    pub gemini: Option<String>,
    pub mistral: Option<String>,
    pub nvidia: Option<String>,
    pub elevenlabs: Option<String>,
    pub deepgram: Option<String>,
}

/// Parse a config document
///
/// # Errors
///
/// Returns error if the document is not valid TOML for this schema
pub fn parse_config(content: &str) -> Result<EngineerConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load the TOML config file from the standard path
///
/// Returns `EngineerConfigFile::default()` if the file doesn't exist or
/// can't be parsed.
#[must_use]
pub fn load_config_file() -> EngineerConfigFile {
    config_file_path().map_or_else(EngineerConfigFile::default, |path| read_config_file(&path))
}

/// Load a config file from an explicit path, with the same fallbacks
#[must_use]
pub fn read_config_file(path: &Path) -> EngineerConfigFile {
    if !path.exists() {
        return EngineerConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match parse_config(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                EngineerConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            EngineerConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/race-engineer/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("race-engineer").join("config.toml"))
}
