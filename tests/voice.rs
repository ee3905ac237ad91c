//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use race_engineer::engineer::{AssistantResponse, Intent};
use race_engineer::voice::{
    Detection, KeywordSpotter, Recognizer, RecognizerConfig, RecognizerState, SAMPLE_RATE,
    Speaker, Synthesizer, Transcriber, TranscribingSpotter, WakePhrase, samples_to_wav,
};
use race_engineer::Result;
use tokio::sync::{Semaphore, mpsc, watch};

/// 100 ms at 16 kHz
const CHUNK: usize = 1600;

struct FixedSpotter(Detection);

#[async_trait]
impl KeywordSpotter for FixedSpotter {
    async fn spot(&self, _window: &[f32]) -> Result<Option<Detection>> {
        Ok(Some(self.0.clone()))
    }
}

struct FixedTranscript(&'static str);

#[async_trait]
impl Transcriber for FixedTranscript {
    async fn transcribe(&self, _samples: &[f32]) -> Result<String> {
        Ok(self.0.to_string())
    }
}

/// Generate `loud` chunks of speech-level audio followed by `quiet` chunks of silence
fn utterance(loud: usize, quiet: usize) -> Vec<Vec<f32>> {
    std::iter::repeat_n(vec![0.25; CHUNK], loud)
        .chain(std::iter::repeat_n(vec![0.0; CHUNK], quiet))
        .collect()
}

async fn feed(recognizer: &mut Recognizer, chunks: &[Vec<f32>]) -> Vec<String> {
    let mut out = Vec::new();
    for chunk in chunks {
        if let Some(command) = recognizer.push(chunk).await {
            out.push(command.transcript);
        }
    }
    out
}

#[tokio::test]
async fn test_wake_debounce_emits_one_command() {
    let spotter = FixedSpotter(Detection {
        confidence: 0.95,
        trailing_command: Some("what's the gap".to_string()),
    });
    let mut recognizer = Recognizer::new(
        RecognizerConfig::default(),
        Arc::new(spotter),
        Arc::new(FixedTranscript("")),
    );

    // Two wake phrases 0.9 s apart, inside the 1.5 s window
    assert_eq!(feed(&mut recognizer, &utterance(4, 5)).await, ["what's the gap"]);
    assert!(feed(&mut recognizer, &utterance(4, 5)).await.is_empty());

    // The window is measured from the emitted command
    assert_eq!(feed(&mut recognizer, &utterance(4, 5)).await, ["what's the gap"]);
    assert_eq!(recognizer.state(), RecognizerState::Idle);
}

#[tokio::test]
async fn test_wake_phrase_through_transcript() {
    let stt: Arc<dyn Transcriber> = Arc::new(FixedTranscript("Bruno, how are the tyres?"));
    let phrase = WakePhrase::new("bono", &["bruno".to_string()]);
    let spotter = TranscribingSpotter::new(Arc::clone(&stt), phrase);
    let mut recognizer = Recognizer::new(RecognizerConfig::default(), Arc::new(spotter), stt);

    let commands = feed(&mut recognizer, &utterance(5, 5)).await;
    assert_eq!(commands.len(), 1);
    assert!(commands[0].contains("tyres"));
}

#[tokio::test]
async fn test_background_noise_never_arms() {
    let spotter = FixedSpotter(Detection {
        confidence: 1.0,
        trailing_command: Some("box".to_string()),
    });
    let mut recognizer = Recognizer::new(
        RecognizerConfig::default(),
        Arc::new(spotter),
        Arc::new(FixedTranscript("")),
    );
    let hum: Vec<Vec<f32>> = std::iter::repeat_n(vec![0.005; CHUNK], 50).collect();
    assert!(feed(&mut recognizer, &hum).await.is_empty());
    assert_eq!(recognizer.state(), RecognizerState::Idle);
}

/// Spotter whose request never completes, reporting when it starts
struct StalledSpotter(mpsc::UnboundedSender<()>);

#[async_trait]
impl KeywordSpotter for StalledSpotter {
    async fn spot(&self, _window: &[f32]) -> Result<Option<Detection>> {
        let _ = self.0.send(());
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_recognizer_stops_while_spotting() {
    let (started_tx, mut started) = mpsc::unbounded_channel();
    let recognizer = Recognizer::new(
        RecognizerConfig::default(),
        Arc::new(StalledSpotter(started_tx)),
        Arc::new(FixedTranscript("")),
    );

    let (audio_tx, audio_rx) = mpsc::channel(16);
    let (commands_tx, _commands_rx) = mpsc::channel(4);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(recognizer.run(audio_rx, commands_tx, shutdown_rx));

    for chunk in utterance(4, 6) {
        audio_tx.send(chunk).await.unwrap();
    }
    tokio::time::timeout(Duration::from_secs(3), started.recv())
        .await
        .unwrap()
        .unwrap();

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(3), task)
        .await
        .expect("recognizer still running after shutdown")
        .unwrap();
}

/// Speaker that blocks each utterance until a permit is released
struct GatedSpeaker {
    gate: Arc<Semaphore>,
    started: mpsc::UnboundedSender<String>,
    spoken: Mutex<Vec<String>>,
}

#[async_trait]
impl Speaker for GatedSpeaker {
    async fn speak(&self, text: &str) -> Result<()> {
        let _ = self.started.send(text.to_string());
        self.gate.acquire().await.unwrap().forget();
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

fn response(text: &str) -> AssistantResponse {
    AssistantResponse::local(text, Intent::Status)
}

#[tokio::test]
async fn test_synthesizer_drops_oldest_pending_never_playing() {
    let gate = Arc::new(Semaphore::new(0));
    let (started_tx, mut started) = mpsc::unbounded_channel();
    let speaker = Arc::new(GatedSpeaker {
        gate: Arc::clone(&gate),
        started: started_tx,
        spoken: Mutex::new(Vec::new()),
    });

    let (handle, synthesizer) = Synthesizer::new(2, Some(Arc::clone(&speaker) as Arc<dyn Speaker>));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(synthesizer.run(shutdown_rx));

    handle.enqueue(response("box this lap"));
    assert_eq!(started.recv().await.unwrap(), "box this lap");

    assert!(handle.enqueue(response("gap 1.2")).is_none());
    assert!(handle.enqueue(response("tyres 95")).is_none());
    let dropped = handle.enqueue(response("fuel plus 0.4")).unwrap();
    assert_eq!(dropped.text, "gap 1.2");
    assert_eq!(handle.pending(), 2);

    gate.add_permits(3);
    assert_eq!(started.recv().await.unwrap(), "tyres 95");
    assert_eq!(started.recv().await.unwrap(), "fuel plus 0.4");

    tokio::time::timeout(Duration::from_secs(1), async {
        while speaker.spoken.lock().unwrap().len() < 3 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    shutdown_tx.send(true).unwrap();
    worker.await.unwrap();
    assert_eq!(
        *speaker.spoken.lock().unwrap(),
        ["box this lap", "tyres 95", "fuel plus 0.4"]
    );
}

#[tokio::test]
async fn test_synthesizer_stops_mid_utterance() {
    let (started_tx, mut started) = mpsc::unbounded_channel();
    let speaker = Arc::new(GatedSpeaker {
        gate: Arc::new(Semaphore::new(0)),
        started: started_tx,
        spoken: Mutex::new(Vec::new()),
    });

    let (handle, synthesizer) = Synthesizer::new(3, Some(Arc::clone(&speaker) as Arc<dyn Speaker>));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(synthesizer.run(shutdown_rx));

    handle.enqueue(response("radio check"));
    handle.enqueue(response("never spoken"));
    assert_eq!(started.recv().await.unwrap(), "radio check");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(3), worker)
        .await
        .expect("synthesizer still running after shutdown")
        .unwrap();
    assert!(speaker.spoken.lock().unwrap().is_empty());
    assert_eq!(handle.pending(), 0);
}

#[test]
fn test_samples_to_wav() {
    let samples: Vec<f32> = (0..SAMPLE_RATE / 10)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f32 / SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5
        })
        .collect();

    let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();
    let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.channels, 1);
    assert_eq!(reader.len() as usize, samples.len());
}
