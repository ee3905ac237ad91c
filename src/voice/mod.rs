//! Voice processing module
//!
//! Microphone capture, wake word and command recognition, speech-to-text,
//! and the response synthesizer that speaks answers back.

mod capture;
mod playback;
mod recognizer;
mod stt;
mod synthesizer;
mod tts;
mod wake_word;

use std::time::Duration;

use crate::{Error, Result};

pub use capture::{AudioCapture, CHUNK_CHANNEL_CAPACITY, SAMPLE_RATE, samples_to_wav};
pub use playback::{AudioPlayback, DecodedAudio, decode_mp3, resample_linear};
pub use recognizer::{Recognizer, RecognizerConfig, RecognizerState, VoiceCommand};
pub use stt::{SpeechToText, Transcriber};
pub use synthesizer::{
    DEFAULT_QUEUE_BOUND, Speaker, Synthesizer, SynthesizerHandle, VoiceSpeaker,
};
pub use tts::TextToSpeech;
pub use wake_word::{
    Detection, ENERGY_THRESHOLD, KeywordSpotter, TranscribingSpotter, WakePhrase, rms_energy,
};

/// Upper bound on a single speech request
pub const SPEECH_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// HTTP client for the speech backends
fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))
}
