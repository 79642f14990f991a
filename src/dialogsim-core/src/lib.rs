//! DialogSim Core Library
//!
//! Provides the two-agent dialogue orchestration engine, the per-turn
//! generation pipeline, and audio assembly for finished transcripts.

pub mod audio;
pub mod backend;
pub mod config;
pub mod emotion;
pub mod error;
pub mod evaluation;
pub mod orchestrator;
pub mod participant;
pub mod sanitize;
pub mod state;
pub mod transcript;
pub mod turn;

pub use audio::{
    AssemblyReport, AudioAssembler, SpeechSynthesizer, render_transcript, synthesizer_for_provider,
};
pub use backend::{ApiConfig, GenerationBackend, OpenAiBackend};
pub use config::Settings;
pub use emotion::{DEFAULT_EMOTION, EmotionClassifier};
pub use error::DialogueError;
pub use evaluation::{
    EvalTemplate, EvaluationOutcome, Evaluator, EvaluatorCredentials, HttpEvaluator,
    QualityEvaluator,
};
pub use orchestrator::{
    ConversationEvent, ConversationMetrics, DialogueBackends, DialogueOrchestrator, Transition,
};
pub use participant::{Participant, Role};
pub use state::{ConversationState, Utterance};
pub use transcript::{load_transcript, save_transcript};
