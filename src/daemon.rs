//! Daemon - wires telemetry, voice and the engineer together
//!
//! ```text
//! UDP ──► listener (owns aggregator) ──► snapshot (watch)
//!               │ transitions                 │
//!               ▼                             ▼
//!            advisor ───────────────┐    dispatcher ◄── recognizer ◄── capture thread
//!                                   ▼         │
//!                               synthesizer ◄─┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::engineer::{Advisor, AssistantResponse, Dispatcher};
use crate::session::{ApplyOutcome, SessionAggregator};
use crate::telemetry::{TelemetryListener, TelemetryStats};
use crate::voice::{
    AudioCapture, AudioPlayback, Recognizer, Speaker, Synthesizer, Transcriber,
    TranscribingSpotter, VoiceCommand, VoiceSpeaker, WakePhrase,
};
use crate::{Config, Result};

/// Lap, sector and session transitions buffered for the advisor
const TRANSITION_CAPACITY: usize = 32;

/// Commands buffered between recognizer and dispatcher
const COMMAND_CAPACITY: usize = 4;

/// The race engineer daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns error if the telemetry socket cannot be bound or the
    /// microphone cannot be opened
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                return;
            }
            tracing::info!("shutting down");
            let _ = shutdown_tx.send(true);
        });
        self.run_until(shutdown_rx).await
    }

    /// Run until the shutdown signal flips to `true`
    ///
    /// # Errors
    ///
    /// Returns error if the telemetry socket cannot be bound or the
    /// microphone cannot be opened
    pub async fn run_until(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let config = self.config;

        let stats = Arc::new(TelemetryStats::new());
        let listener = TelemetryListener::bind(config.telemetry.clone(), Arc::clone(&stats)).await?;
        let aggregator = SessionAggregator::new();
        let snapshots = aggregator.handle();
        let (transitions_tx, transitions_rx) = mpsc::channel::<ApplyOutcome>(TRANSITION_CAPACITY);
        let (commands_tx, commands_rx) = mpsc::channel::<VoiceCommand>(COMMAND_CAPACITY);

        let mut tasks = JoinSet::new();

        // Voice input
        let capture = if config.voice.enabled {
            match config.speech_to_text() {
                Ok(stt) => {
                    let (capture, audio) = AudioCapture::start()?;
                    let transcriber: Arc<dyn Transcriber> = Arc::new(stt);
                    let spotter = TranscribingSpotter::new(
                        Arc::clone(&transcriber),
                        WakePhrase::new(&config.voice.wake_word, &config.voice.alternatives),
                    );
                    let recognizer = Recognizer::new(
                        config.voice.recognizer_config(),
                        Arc::new(spotter),
                        transcriber,
                    );
                    tasks.spawn(recognizer.run(audio, commands_tx.clone(), shutdown.clone()));
                    tracing::info!(wake_word = %config.voice.wake_word, "listening for the wake word");
                    Some(capture)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "speech recognition unavailable, voice input disabled");
                    None
                }
            }
        } else {
            tracing::info!("voice disabled");
            None
        };

        let speaker = if config.voice.enabled {
            open_speaker(&config)
        } else {
            None
        };
        let (synth_handle, synthesizer) = Synthesizer::new(config.engineer.queue_bound, speaker);
        tasks.spawn(synthesizer.run(shutdown.clone()));

        let roster = config.provider_roster();
        tracing::info!(
            providers = ?roster.credentials().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            "remote providers"
        );
        let dispatcher = Dispatcher::new(config.engineer.name.clone(), roster);
        tasks.spawn(dispatcher.run(
            commands_rx,
            snapshots.clone(),
            synth_handle.clone(),
            shutdown.clone(),
        ));

        let advisor = Advisor::new(config.engineer.advisor_config());
        tasks.spawn(advisor.run(transitions_rx, snapshots, synth_handle, shutdown.clone()));

        tracing::info!(
            addr = %config.telemetry.addr(),
            engineer = %config.engineer.name,
            "race engineer ready"
        );

        let result = listener.run(aggregator, transitions_tx, shutdown).await;

        drop(commands_tx);
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "task panicked");
            }
        }
        if let Some(capture) = capture {
            let _ = tokio::task::spawn_blocking(move || capture.stop()).await;
        }

        let totals = stats.snapshot();
        tracing::info!(
            received = totals.received,
            decoded = totals.decoded,
            dropped_malformed = totals.dropped_malformed,
            "daemon stopped"
        );
        result
    }

    /// Listen to telemetry for `listen`, then answer a typed question
    ///
    /// # Errors
    ///
    /// Returns error if the telemetry socket cannot be bound
    pub async fn ask(self, question: &str, listen: Duration) -> Result<AssistantResponse> {
        let config = self.config;
        let stats = Arc::new(TelemetryStats::new());
        let listener = TelemetryListener::bind(config.telemetry.clone(), Arc::clone(&stats)).await?;
        let aggregator = SessionAggregator::new();
        let snapshots = aggregator.handle();
        let (transitions_tx, _transitions_rx) = mpsc::channel(TRANSITION_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let listening = tokio::spawn(listener.run(aggregator, transitions_tx, shutdown_rx));
        tokio::time::sleep(listen).await;
        let _ = shutdown_tx.send(true);
        if let Ok(Err(e)) = listening.await {
            tracing::warn!(error = %e, "listener failed");
        }

        tracing::debug!(received = stats.snapshot().received, "telemetry collected");
        let mut dispatcher = Dispatcher::new(config.engineer.name.clone(), config.provider_roster());
        let snapshot = snapshots.current();
        Ok(dispatcher
            .resolve(&VoiceCommand::new(question, 1.0), &snapshot)
            .await)
    }
}

/// TTS plus the default output device, or `None` for text-only output
pub fn open_speaker(config: &Config) -> Option<Arc<dyn Speaker>> {
    let tts = match config.text_to_speech() {
        Ok(tts) => tts,
        Err(e) => {
            tracing::warn!(error = %e, "speech synthesis unavailable");
            return None;
        }
    };
    match AudioPlayback::new() {
        Ok(playback) => Some(Arc::new(VoiceSpeaker::new(tts, playback))),
        Err(e) => {
            tracing::warn!(error = %e, "no audio output device");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;
    use crate::config::{CliOverrides, file::EngineerConfigFile};
    use crate::engineer::{Intent, Provenance};

    fn headless() -> Config {
        let overrides = CliOverrides {
            port: Some(0),
            bind: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            disable_voice: true,
        };
        Config::resolve(EngineerConfigFile::default(), &|_| None, &overrides).unwrap()
    }

    #[tokio::test]
    async fn headless_daemon_stops_on_signal() {
        let (tx, rx) = watch::channel(false);
        let daemon = tokio::spawn(Daemon::new(headless()).run_until(rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        daemon.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn ask_without_telemetry_answers_locally() {
        let response = Daemon::new(headless())
            .ask("how are my tyres", Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(response.provenance, Provenance::Local(Intent::Tyres));
    }
}
