//! Error types for the dialogue system.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DialogueError {
    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting { key: &'static str, reason: String },

    #[error("Generation failed for {role}: {reason}")]
    GenerationFailed { role: String, reason: String },

    #[error("Generation for {role} timed out after {seconds}s")]
    GenerationTimeout { role: String, seconds: u64 },

    #[error("Evaluation error: {0}")]
    EvaluationError(String),

    #[error("TTS error: {0}")]
    TtsError(String),

    #[error("Conversation state violation: {0}")]
    StateViolation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
