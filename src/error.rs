//! Error types for the race engineer

use thiserror::Error;

/// Result type alias for race engineer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the race engineer
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Telemetry listener error (socket setup, simulator send)
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// Voice processing error
    #[error("voice error: {0}")]
    Voice(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Remote language-model provider error
    #[error("provider error: {0}")]
    Provider(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
