//! Wake word detection
//!
//! Local energy gating finds candidate speech; a `KeywordSpotter` then
//! decides whether the window holds the wake phrase.

use std::sync::Arc;

use async_trait::async_trait;

use super::stt::Transcriber;
use crate::Result;

/// Minimum audio energy threshold to consider speech
pub const ENERGY_THRESHOLD: f32 = 0.03;

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// A wake phrase found in an audio window
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Similarity to the closest accepted form, 0.0 to 1.0
    pub confidence: f32,
    /// Words that followed the wake phrase in the same window
    pub trailing_command: Option<String>,
}

/// Decides whether an audio window contains the wake phrase
#[async_trait]
pub trait KeywordSpotter: Send + Sync {
    /// # Errors
    ///
    /// Returns error if the window cannot be analysed
    async fn spot(&self, window: &[f32]) -> Result<Option<Detection>>;
}

/// Wake word plus the mis-hearings accepted for it
#[derive(Debug, Clone)]
pub struct WakePhrase {
    forms: Vec<Vec<String>>,
}

impl WakePhrase {
    #[must_use]
    pub fn new(word: &str, alternatives: &[String]) -> Self {
        let forms = std::iter::once(word)
            .chain(alternatives.iter().map(String::as_str))
            .map(words)
            .filter(|w| !w.is_empty())
            .collect();
        Self { forms }
    }

    /// Best fuzzy match of any accepted form inside a transcript
    ///
    /// Each form is compared against every run of the same number of words
    /// using normalized Levenshtein similarity.
    #[must_use]
    pub fn find(&self, transcript: &str) -> Option<Detection> {
        let heard = words(transcript);
        let mut best: Option<(f64, usize)> = None;

        for form in &self.forms {
            let n = form.len();
            if heard.len() < n {
                continue;
            }
            let target = form.join(" ");
            for start in 0..=heard.len() - n {
                let candidate = heard[start..start + n].join(" ");
                let score = strsim::normalized_levenshtein(&candidate, &target);
                if best.is_none_or(|(s, _)| score > s) {
                    best = Some((score, start + n));
                }
            }
        }

        let (score, end) = best?;
        let rest = heard[end..].join(" ");
        #[allow(clippy::cast_possible_truncation)]
        let confidence = score as f32;
        Some(Detection {
            confidence,
            trailing_command: (!rest.is_empty()).then_some(rest),
        })
    }
}

/// Lowercase words with punctuation stripped
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || (c.is_ascii_punctuation() && c != '\''))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Spotter that transcribes the window and fuzzy-matches the text
pub struct TranscribingSpotter {
    transcriber: Arc<dyn Transcriber>,
    phrase: WakePhrase,
}

impl TranscribingSpotter {
    #[must_use]
    pub fn new(transcriber: Arc<dyn Transcriber>, phrase: WakePhrase) -> Self {
        Self {
            transcriber,
            phrase,
        }
    }
}

#[async_trait]
impl KeywordSpotter for TranscribingSpotter {
    async fn spot(&self, window: &[f32]) -> Result<Option<Detection>> {
        let transcript = self.transcriber.transcribe(window).await?;
        let detection = self.phrase.find(&transcript);
        tracing::debug!(
            transcript = %transcript,
            confidence = detection.as_ref().map(|d| d.confidence),
            "wake window transcribed"
        );
        Ok(detection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bono() -> WakePhrase {
        WakePhrase::new(
            "bono",
            &["bonno".to_string(), "bruno".to_string(), "chrono".to_string()],
        )
    }

    #[test]
    fn test_energy_calculation() {
        let silence = vec![0.0f32; 100];
        assert!(rms_energy(&silence) < 0.001);

        let loud = vec![0.5f32; 100];
        assert!(rms_energy(&loud) > 0.4);
    }

    #[test]
    fn test_exact_wake_word_with_command() {
        let d = bono().find("Bono, état des pneus ?").unwrap();
        assert!((d.confidence - 1.0).abs() < f32::EPSILON);
        assert_eq!(d.trailing_command.as_deref(), Some("état des pneus"));
    }

    #[test]
    fn test_alternative_form_matches() {
        let d = bono().find("bruno").unwrap();
        assert!((d.confidence - 1.0).abs() < f32::EPSILON);
        assert!(d.trailing_command.is_none());
    }

    #[test]
    fn test_near_miss_scores_partial() {
        let d = bono().find("bonjour tout le monde").unwrap();
        assert!(d.confidence < 0.7);
    }

    #[test]
    fn test_multi_word_phrase() {
        let phrase = WakePhrase::new("hey engineer", &[]);
        let d = phrase.find("ok hey engineer what's the gap").unwrap();
        assert!((d.confidence - 1.0).abs() < f32::EPSILON);
        assert_eq!(d.trailing_command.as_deref(), Some("what's the gap"));
    }

    #[test]
    fn test_empty_transcript() {
        assert!(bono().find("").is_none());
    }
}
