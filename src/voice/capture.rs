//! Audio capture from microphone
//!
//! The `cpal` stream lives on a dedicated OS thread; chunks reach async
//! code through a bounded channel and are dropped when it is full.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Chunks buffered between the audio callback and the recognizer
pub const CHUNK_CHANNEL_CAPACITY: usize = 64;

/// Running microphone capture
pub struct AudioCapture {
    stop: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl AudioCapture {
    /// Open the default input device and start streaming
    ///
    /// Returns once the device is open, so a missing microphone is
    /// reported to the caller.
    ///
    /// # Errors
    ///
    /// Returns error if no usable input device can be opened
    pub fn start() -> Result<(Self, mpsc::Receiver<Vec<f32>>)> {
        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();
        let stop = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicU64::new(0));

        let thread_stop = Arc::clone(&stop);
        let thread_dropped = Arc::clone(&dropped);
        let thread = std::thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                let stream = match open_input_stream(tx, thread_dropped) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                while !thread_stop.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_millis(50));
                }
                drop(stream);
                tracing::debug!("audio capture stopped");
            })
            .map_err(|e| Error::Audio(format!("failed to spawn capture thread: {e}")))?;

        ready_rx
            .recv()
            .map_err(|_| Error::Audio("capture thread exited during startup".to_string()))??;

        Ok((
            Self {
                stop,
                dropped,
                thread: Some(thread),
            },
            rx,
        ))
    }

    /// Chunks discarded because the consumer fell behind
    #[must_use]
    pub fn dropped_chunks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Signal the capture thread and wait for it to release the device
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("audio capture thread panicked");
            }
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn open_input_stream(tx: mpsc::Sender<Vec<f32>>, dropped: Arc<AtomicU64>) -> Result<Stream> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

    let supports_rate = |c: &cpal::SupportedStreamConfigRange| {
        c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
            && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            && c.sample_format() == cpal::SampleFormat::F32
    };

    // Prefer mono; otherwise downmix in the callback
    let supported_config = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter(|c| supports_rate(c))
        .min_by_key(cpal::SupportedStreamConfigRange::channels)
        .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

    let config: StreamConfig = supported_config
        .with_sample_rate(SampleRate(SAMPLE_RATE))
        .config();
    let channels = usize::from(config.channels.max(1));

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = SAMPLE_RATE,
        channels = config.channels,
        "audio capture initialized"
    );

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let chunk = downmix(data, channels);
                if tx.try_send(chunk).is_err() {
                    dropped.fetch_add(1, Ordering::Relaxed);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;
    tracing::debug!("audio capture started");
    Ok(stream)
}

/// Average interleaved frames down to mono
#[allow(clippy::cast_precision_loss)]
fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo() {
        let mono = downmix(&[0.2, 0.4, -1.0, 1.0], 2);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!(mono[1].abs() < 1e-6);
    }

    #[test]
    fn test_wav_header_and_length() {
        let wav = samples_to_wav(&[0.0; 1600], SAMPLE_RATE).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        // 44-byte header plus two bytes per sample
        assert_eq!(wav.len(), 44 + 3200);

        let reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
    }
}
