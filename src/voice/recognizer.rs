//! Wake word and command recognizer
//!
//! `Idle -> Armed -> Capturing -> Finalizing -> Idle`, driven entirely by
//! the sample stream: every duration is counted in samples, so the same
//! audio always produces the same commands.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::capture::SAMPLE_RATE;
use super::stt::Transcriber;
use super::wake_word::{Detection, ENERGY_THRESHOLD, KeywordSpotter, rms_energy};

/// A spoken request captured after the wake word
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceCommand {
    pub id: Uuid,
    pub transcript: String,
    /// Wake word confidence that opened the capture
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}

impl VoiceCommand {
    #[must_use]
    pub fn new(transcript: impl Into<String>, confidence: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            transcript: transcript.into(),
            confidence,
            timestamp: Utc::now(),
        }
    }
}

/// Recognizer tuning
#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    pub sample_rate: u32,
    /// Minimum spotter confidence that counts as a wake
    pub sensitivity: f32,
    pub energy_threshold: f32,
    /// Silence that closes a wake window
    pub wake_silence: Duration,
    /// Longest wake window handed to the spotter
    pub max_wake_window: Duration,
    /// Trailing silence that ends a command
    pub silence: Duration,
    pub max_utterance: Duration,
    /// Voiced audio required for a command to count
    pub min_voiced: Duration,
    /// Detections this soon after an emitted command are ignored
    pub debounce: Duration,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            sensitivity: 0.75,
            energy_threshold: ENERGY_THRESHOLD,
            wake_silence: Duration::from_millis(500),
            max_wake_window: Duration::from_secs(4),
            silence: Duration::from_millis(800),
            max_utterance: Duration::from_secs(8),
            min_voiced: Duration::from_millis(300),
            debounce: Duration::from_millis(1500),
        }
    }
}

impl RecognizerConfig {
    #[allow(clippy::cast_possible_truncation)]
    fn samples(&self, d: Duration) -> u64 {
        (d.as_micros() * u128::from(self.sample_rate) / 1_000_000) as u64
    }
}

/// Current recognizer phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizerState {
    /// No speech
    Idle,
    /// Speech heard, collecting a wake window
    Armed,
    /// Wake phrase confirmed, collecting the command
    Capturing,
    /// Command audio complete, transcribing
    Finalizing,
}

/// Sample-counted window of audio
#[derive(Default)]
struct Segment {
    samples: Vec<f32>,
    voiced: u64,
    trailing_silence: u64,
}

impl Segment {
    fn push(&mut self, chunk: &[f32], voiced: bool) {
        self.samples.extend_from_slice(chunk);
        let n = chunk.len() as u64;
        if voiced {
            self.voiced += n;
            self.trailing_silence = 0;
        } else {
            self.trailing_silence += n;
        }
    }

    fn len(&self) -> u64 {
        self.samples.len() as u64
    }

    fn clear(&mut self) {
        self.samples.clear();
        self.voiced = 0;
        self.trailing_silence = 0;
    }
}

/// Turns an audio stream into `VoiceCommand`s
pub struct Recognizer {
    config: RecognizerConfig,
    spotter: Arc<dyn KeywordSpotter>,
    transcriber: Arc<dyn Transcriber>,
    state: RecognizerState,
    segment: Segment,
    /// Samples consumed since start
    clock: u64,
    last_emitted: Option<u64>,
    wake_confidence: f32,
}

impl Recognizer {
    #[must_use]
    pub fn new(
        config: RecognizerConfig,
        spotter: Arc<dyn KeywordSpotter>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        Self {
            config,
            spotter,
            transcriber,
            state: RecognizerState::Idle,
            segment: Segment::default(),
            clock: 0,
            last_emitted: None,
            wake_confidence: 0.0,
        }
    }

    #[must_use]
    pub const fn state(&self) -> RecognizerState {
        self.state
    }

    /// Feed one chunk; returns a command when one completes
    pub async fn push(&mut self, chunk: &[f32]) -> Option<VoiceCommand> {
        self.clock += chunk.len() as u64;
        let voiced = rms_energy(chunk) > self.config.energy_threshold;

        match self.state {
            RecognizerState::Idle => {
                if voiced {
                    self.segment.clear();
                    self.segment.push(chunk, true);
                    self.state = RecognizerState::Armed;
                    tracing::trace!("speech detected, armed");
                }
                None
            }
            RecognizerState::Armed => {
                self.segment.push(chunk, voiced);
                let window_closed =
                    self.segment.trailing_silence >= self.config.samples(self.config.wake_silence);
                let window_full =
                    self.segment.len() >= self.config.samples(self.config.max_wake_window);
                if window_closed || window_full {
                    self.check_wake().await
                } else {
                    None
                }
            }
            RecognizerState::Capturing => {
                self.segment.push(chunk, voiced);
                let min_voiced = self.config.samples(self.config.min_voiced);
                let ended = self.segment.voiced > 0
                    && self.segment.trailing_silence >= self.config.samples(self.config.silence);
                let maxed = self.segment.len() >= self.config.samples(self.config.max_utterance);

                if maxed && self.segment.voiced < min_voiced {
                    tracing::debug!("no command after wake word, discarding");
                    self.reset();
                    None
                } else if ended || maxed {
                    self.finalize().await
                } else {
                    None
                }
            }
            // Finalizing completes inside `finalize`
            RecognizerState::Finalizing => None,
        }
    }

    async fn check_wake(&mut self) -> Option<VoiceCommand> {
        let window = std::mem::take(&mut self.segment.samples);
        let voiced = self.segment.voiced;
        self.segment.clear();
        self.state = RecognizerState::Idle;

        if voiced < self.config.samples(self.config.min_voiced) {
            tracing::trace!(voiced, "wake window too short");
            return None;
        }
        if self.in_debounce() {
            tracing::debug!("wake window ignored during debounce");
            return None;
        }

        let detection = match self.spotter.spot(&window).await {
            Ok(Some(d)) if d.confidence >= self.config.sensitivity => d,
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "wake word spotting failed");
                return None;
            }
        };

        tracing::info!(confidence = detection.confidence, "wake word detected");
        self.wake_confidence = detection.confidence;

        match detection {
            Detection {
                trailing_command: Some(command),
                confidence,
            } => Some(self.emit(command, confidence)),
            Detection { .. } => {
                self.state = RecognizerState::Capturing;
                None
            }
        }
    }

    async fn finalize(&mut self) -> Option<VoiceCommand> {
        self.state = RecognizerState::Finalizing;
        let audio = std::mem::take(&mut self.segment.samples);
        let result = self.transcriber.transcribe(&audio).await;
        self.reset();

        match result {
            Ok(text) if !text.trim().is_empty() => {
                Some(self.emit(text.trim().to_string(), self.wake_confidence))
            }
            Ok(_) => {
                tracing::debug!("empty command transcript");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "command transcription failed");
                None
            }
        }
    }

    fn emit(&mut self, transcript: String, confidence: f32) -> VoiceCommand {
        self.last_emitted = Some(self.clock);
        let command = VoiceCommand::new(transcript, confidence);
        tracing::info!(id = %command.id, transcript = %command.transcript, "voice command");
        command
    }

    fn in_debounce(&self) -> bool {
        self.last_emitted
            .is_some_and(|at| self.clock - at < self.config.samples(self.config.debounce))
    }

    fn reset(&mut self) {
        self.segment.clear();
        self.state = RecognizerState::Idle;
    }

    /// Consume audio chunks until shutdown, forwarding commands with `try_send`
    ///
    /// Shutdown also abandons a spotting or transcription request in flight.
    pub async fn run(
        mut self,
        mut audio: mpsc::Receiver<Vec<f32>>,
        commands: mpsc::Sender<VoiceCommand>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                chunk = audio.recv() => {
                    let Some(chunk) = chunk else { break };
                    let command = tokio::select! {
                        command = self.push(&chunk) => command,
                        _ = shutdown.changed() => break,
                    };
                    if let Some(command) = command {
                        if let Err(e) = commands.try_send(command) {
                            tracing::warn!(error = %e, "dispatcher busy, command dropped");
                        }
                    }
                }
            }
        }
        tracing::debug!("recognizer stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::Result;

    struct FixedSpotter(Option<Detection>);

    #[async_trait]
    impl KeywordSpotter for FixedSpotter {
        async fn spot(&self, _window: &[f32]) -> Result<Option<Detection>> {
            Ok(self.0.clone())
        }
    }

    struct Scripted(Mutex<Vec<String>>);

    #[async_trait]
    impl Transcriber for Scripted {
        async fn transcribe(&self, _samples: &[f32]) -> Result<String> {
            Ok(self.0.lock().unwrap().pop().unwrap_or_default())
        }
    }

    const CHUNK: usize = 1600;

    fn loud() -> Vec<f32> {
        vec![0.3; CHUNK]
    }

    fn quiet() -> Vec<f32> {
        vec![0.0; CHUNK]
    }

    async fn feed(r: &mut Recognizer, chunks: &[Vec<f32>]) -> Vec<VoiceCommand> {
        let mut out = Vec::new();
        for c in chunks {
            out.extend(r.push(c).await);
        }
        out
    }

    fn speech(loud_chunks: usize, quiet_chunks: usize) -> Vec<Vec<f32>> {
        std::iter::repeat_with(loud)
            .take(loud_chunks)
            .chain(std::iter::repeat_with(quiet).take(quiet_chunks))
            .collect()
    }

    fn recognizer(detection: Option<Detection>, transcripts: &[&str]) -> Recognizer {
        let scripted = transcripts.iter().rev().map(ToString::to_string).collect();
        Recognizer::new(
            RecognizerConfig::default(),
            Arc::new(FixedSpotter(detection)),
            Arc::new(Scripted(Mutex::new(scripted))),
        )
    }

    #[tokio::test]
    async fn test_wake_then_capture() {
        let mut r = recognizer(
            Some(Detection {
                confidence: 0.9,
                trailing_command: None,
            }),
            &["tyre temps please"],
        );

        // Wake: 0.4 s speech + 0.5 s silence
        assert!(feed(&mut r, &speech(4, 5)).await.is_empty());
        assert_eq!(r.state(), RecognizerState::Capturing);

        // Command: 1 s speech + 0.8 s silence
        let cmds = feed(&mut r, &speech(10, 8)).await;
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].transcript, "tyre temps please");
        assert_eq!(r.state(), RecognizerState::Idle);
    }

    #[tokio::test]
    async fn test_low_confidence_ignored() {
        let mut r = recognizer(
            Some(Detection {
                confidence: 0.4,
                trailing_command: Some("gap".into()),
            }),
            &[],
        );
        assert!(feed(&mut r, &speech(4, 5)).await.is_empty());
        assert_eq!(r.state(), RecognizerState::Idle);
    }

    #[tokio::test]
    async fn test_silent_capture_discarded_at_max() {
        let mut r = recognizer(
            Some(Detection {
                confidence: 1.0,
                trailing_command: None,
            }),
            &["should not be used"],
        );
        feed(&mut r, &speech(4, 5)).await;
        assert_eq!(r.state(), RecognizerState::Capturing);

        // 8 s of silence
        assert!(feed(&mut r, &speech(0, 80)).await.is_empty());
        assert_eq!(r.state(), RecognizerState::Idle);
    }

    #[tokio::test]
    async fn test_empty_transcript_emits_nothing() {
        let mut r = recognizer(
            Some(Detection {
                confidence: 1.0,
                trailing_command: None,
            }),
            &["   "],
        );
        feed(&mut r, &speech(4, 5)).await;
        assert!(feed(&mut r, &speech(5, 8)).await.is_empty());
        assert_eq!(r.state(), RecognizerState::Idle);
    }

    struct CountingSpotter(std::sync::atomic::AtomicUsize);

    #[async_trait]
    impl KeywordSpotter for CountingSpotter {
        async fn spot(&self, _window: &[f32]) -> Result<Option<Detection>> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(Some(Detection {
                confidence: 1.0,
                trailing_command: Some("box".into()),
            }))
        }
    }

    #[tokio::test]
    async fn test_debounce_skips_spotting() {
        let spotter = Arc::new(CountingSpotter(std::sync::atomic::AtomicUsize::new(0)));
        let mut r = Recognizer::new(
            RecognizerConfig::default(),
            Arc::clone(&spotter) as Arc<dyn KeywordSpotter>,
            Arc::new(Scripted(Mutex::new(Vec::new()))),
        );

        assert_eq!(feed(&mut r, &speech(4, 5)).await.len(), 1);
        // Second window closes 0.9 s after the command
        assert!(feed(&mut r, &speech(4, 5)).await.is_empty());
        assert_eq!(spotter.0.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
