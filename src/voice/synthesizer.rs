//! Spoken responses, one utterance at a time
//!
//! Producers push into a small bounded queue; a single worker speaks the
//! front entry to completion before taking the next. When the queue is full
//! the oldest pending entry makes room, never the one being spoken.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Notify, watch};

use super::playback::AudioPlayback;
use super::tts::TextToSpeech;
use crate::engineer::AssistantResponse;
use crate::{Error, Result};

/// Pending responses kept by default
pub const DEFAULT_QUEUE_BOUND: usize = 3;

/// Turns text into sound on some output
#[async_trait]
pub trait Speaker: Send + Sync {
    /// Speak the text, returning once it has been played
    ///
    /// # Errors
    ///
    /// `Error::Audio` means the output device is gone; any other error
    /// only affects this utterance
    async fn speak(&self, text: &str) -> Result<()>;
}

/// TTS over HTTP, played on the default output device
pub struct VoiceSpeaker {
    tts: TextToSpeech,
    playback: AudioPlayback,
}

impl VoiceSpeaker {
    #[must_use]
    pub const fn new(tts: TextToSpeech, playback: AudioPlayback) -> Self {
        Self { tts, playback }
    }
}

#[async_trait]
impl Speaker for VoiceSpeaker {
    async fn speak(&self, text: &str) -> Result<()> {
        let mp3 = self.tts.synthesize(text).await?;
        let playback = self.playback.clone();
        tokio::task::spawn_blocking(move || playback.play_mp3_blocking(&mp3))
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }
}

struct Queue {
    pending: Mutex<VecDeque<AssistantResponse>>,
    notify: Notify,
    bound: usize,
}

impl Queue {
    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<AssistantResponse>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Producer side of the synthesizer
#[derive(Clone)]
pub struct SynthesizerHandle {
    queue: Arc<Queue>,
}

impl SynthesizerHandle {
    /// Queue a response; returns the pending entry dropped to make room
    pub fn enqueue(&self, response: AssistantResponse) -> Option<AssistantResponse> {
        let dropped = {
            let mut pending = self.queue.lock();
            pending.push_back(response);
            if pending.len() > self.queue.bound {
                pending.pop_front()
            } else {
                None
            }
        };
        self.queue.notify.notify_one();
        dropped
    }

    /// Responses waiting behind the one being spoken
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

/// Worker that speaks queued responses
pub struct Synthesizer {
    queue: Arc<Queue>,
    speaker: Option<Arc<dyn Speaker>>,
}

impl Synthesizer {
    /// Create the queue and its worker
    ///
    /// Without a speaker, responses are only logged.
    #[must_use]
    pub fn new(bound: usize, speaker: Option<Arc<dyn Speaker>>) -> (SynthesizerHandle, Self) {
        let queue = Arc::new(Queue {
            pending: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            bound: bound.max(1),
        });
        if speaker.is_none() {
            tracing::warn!("no audio output, responses will be text only");
        }
        (
            SynthesizerHandle {
                queue: Arc::clone(&queue),
            },
            Self { queue, speaker },
        )
    }

    /// Whether responses are still spoken aloud
    #[must_use]
    pub const fn is_voiced(&self) -> bool {
        self.speaker.is_some()
    }

    /// Speak responses until shutdown
    ///
    /// New responses never interrupt the utterance in progress. Shutdown
    /// abandons it along with whatever is still pending.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            let next = self.queue.lock().pop_front();
            let Some(response) = next else {
                tokio::select! {
                    () = self.queue.notify.notified() => {}
                    res = shutdown.changed() => {
                        if res.is_err() {
                            break;
                        }
                    }
                }
                continue;
            };
            tokio::select! {
                () = self.say(&response) => {}
                _ = shutdown.changed() => {
                    tracing::debug!(text = %response.text, "utterance abandoned at shutdown");
                    break;
                }
            }
        }

        let discarded = {
            let mut pending = self.queue.lock();
            let n = pending.len();
            pending.clear();
            n
        };
        tracing::debug!(discarded, "synthesizer stopped");
    }

    /// Speak one response, falling back to the log on failure
    pub async fn say(&mut self, response: &AssistantResponse) {
        let Some(speaker) = &self.speaker else {
            tracing::info!(text = %response.text, provenance = ?response.provenance, "radio");
            return;
        };

        match speaker.speak(&response.text).await {
            Ok(()) => {
                tracing::debug!(text = %response.text, provenance = ?response.provenance, "spoken");
            }
            Err(Error::Audio(e)) => {
                tracing::warn!(error = %e, "audio output failed, switching to text only");
                tracing::info!(text = %response.text, "radio");
                self.speaker = None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "speech failed");
                tracing::info!(text = %response.text, "radio");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engineer::Intent;

    struct Broken;

    #[async_trait]
    impl Speaker for Broken {
        async fn speak(&self, _text: &str) -> Result<()> {
            Err(Error::Audio("device unplugged".into()))
        }
    }

    fn response(text: &str) -> AssistantResponse {
        AssistantResponse::local(text, Intent::Status)
    }

    #[test]
    fn bound_drops_oldest_pending() {
        let (handle, _worker) = Synthesizer::new(2, None);
        assert!(handle.enqueue(response("a")).is_none());
        assert!(handle.enqueue(response("b")).is_none());
        assert_eq!(handle.enqueue(response("c")).unwrap().text, "a");
        assert_eq!(handle.pending(), 2);
    }

    #[tokio::test]
    async fn audio_failure_switches_to_text_only() {
        let (_handle, mut worker) = Synthesizer::new(3, Some(Arc::new(Broken)));
        assert!(worker.is_voiced());
        worker.say(&response("box box")).await;
        assert!(!worker.is_voiced());
    }

    #[tokio::test]
    async fn shutdown_discards_pending() {
        let (handle, worker) = Synthesizer::new(3, None);
        let (tx, rx) = watch::channel(true);
        handle.enqueue(response("a"));
        handle.enqueue(response("b"));
        worker.run(rx).await;
        assert_eq!(handle.pending(), 0);
        drop(tx);
    }
}
