//! Emotion classification for finished utterances.

use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::GenerationBackend;

/// Label used whenever classification fails or returns something unusable.
pub const DEFAULT_EMOTION: &str = "thoughtful";

const MIN_LABEL_LEN: usize = 3;
const MAX_LABEL_LEN: usize = 20;

/// Infers a single descriptive emotion word for an utterance.
///
/// Never fails: backend errors, timeouts and invalid replies all resolve to
/// [`DEFAULT_EMOTION`].
pub struct EmotionClassifier {
    backend: Arc<dyn GenerationBackend>,
    timeout: Duration,
}

impl EmotionClassifier {
    pub fn new(backend: Arc<dyn GenerationBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub async fn classify(&self, utterance: &str) -> String {
        let prompt = emotion_prompt(utterance);

        let raw = match tokio::time::timeout(self.timeout, self.backend.generate(&prompt)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!("Emotion detection failed: {}", e);
                return DEFAULT_EMOTION.to_string();
            }
            Err(_) => {
                warn!(
                    "Emotion detection timed out after {}s",
                    self.timeout.as_secs()
                );
                return DEFAULT_EMOTION.to_string();
            }
        };

        match normalize_emotion(&raw) {
            Some(emotion) => {
                info!("Detected emotion: {}", emotion);
                emotion
            }
            None => {
                warn!(
                    "Invalid emotion word received: '{}', using {} as default",
                    raw.trim(),
                    DEFAULT_EMOTION
                );
                DEFAULT_EMOTION.to_string()
            }
        }
    }
}

fn emotion_prompt(utterance: &str) -> String {
    format!(
        r#"Analyze the emotional tone and mood of this message. Think about how the speaker feels based on their words, tone, and content.

Respond with ONLY a single descriptive emotion word that best captures their emotional state. Be creative and specific - don't use generic words. Think about subtle emotions and nuances.

Message: "{}"

What emotion does this speaker convey? Respond with just ONE word:"#,
        utterance
    )
}

/// Reduce a raw classifier reply to a single lowercase word.
///
/// Returns `None` unless the word is alphabetic and 3 to 20 characters long.
pub fn normalize_emotion(raw: &str) -> Option<String> {
    let word = raw
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
        .find(|token| !token.is_empty())?
        .to_lowercase();

    let len = word.chars().count();
    let valid = (MIN_LABEL_LEN..=MAX_LABEL_LEN).contains(&len) && word.chars().all(char::is_alphabetic);
    valid.then_some(word)
}
