//! Per-turn generation pipeline.
//!
//! prompt -> generate -> sanitize -> classify -> evaluate -> append

use log::{debug, info};
use std::sync::Arc;

use crate::backend::GenerationBackend;
use crate::emotion::EmotionClassifier;
use crate::error::DialogueError;
use crate::evaluation::{EvaluationOutcome, QualityEvaluator};
use crate::participant::{Participant, Role};
use crate::sanitize::sanitize_response;
use crate::state::{ConversationState, Utterance};

/// What a completed turn produced, for the orchestrator's event stream.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub turn: u32,
    pub utterance: Utterance,
    pub evaluations: Vec<EvaluationOutcome>,
}

/// Produces one utterance for a fixed role.
pub struct TurnGenerator {
    participant: Participant,
    backend: Arc<dyn GenerationBackend>,
}

impl TurnGenerator {
    pub fn new(participant: Participant, backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            participant,
            backend,
        }
    }

    pub fn role(&self) -> Role {
        self.participant.role
    }

    /// Run one turn and append the result to `state`.
    ///
    /// A generation failure or timeout is returned as an error and nothing
    /// is appended. Classification and evaluation never fail the turn.
    pub async fn take_turn(
        &self,
        state: &mut ConversationState,
        classifier: &EmotionClassifier,
        evaluator: &QualityEvaluator,
    ) -> Result<TurnReport, DialogueError> {
        let role = self.role();
        let name = role.display_name();
        let settings = state.settings();
        let turn = state.turn() + 1;
        let is_first = state.messages().is_empty();

        let input = resolve_input(state);
        if is_first {
            info!("{} initiating conversation about: {}", name, settings.topic);
        } else {
            info!("{} received: {}", name, preview(&input, 100));
        }

        let prompt = build_prompt(&self.participant, state, &input);
        info!("{} generating response (Turn {})", name, turn);

        let timeout = settings.generation_timeout();
        let raw = tokio::time::timeout(timeout, self.backend.generate(&prompt))
            .await
            .map_err(|_| DialogueError::GenerationTimeout {
                role: name.to_string(),
                seconds: timeout.as_secs(),
            })??;

        let text = sanitize_response(&raw);
        info!("{} replied: {}", name, preview(&text, 100));

        debug!("Detecting emotion for {} response", name);
        let emotion = classifier.classify(&text).await;

        let evaluations = evaluator.evaluate_utterance(&text, is_first).await;

        let session_id = state.settings().session_id();
        let utterance = state.append_utterance(role, emotion, text)?.clone();

        info!(
            "Turn {} completed: speaker={}, emotion={}, length={} chars, session={}",
            turn,
            name,
            utterance.emotion,
            utterance.text.chars().count(),
            session_id
        );

        Ok(TurnReport {
            turn,
            utterance,
            evaluations,
        })
    }
}

/// The utterance this turn replies to.
///
/// The opening turn has nothing to reply to and gets a synthesized greeting.
pub fn resolve_input(state: &ConversationState) -> String {
    match state.last_message() {
        Some(last) => last.render(),
        None => opening_line(&state.settings().topic),
    }
}

pub fn opening_line(topic: &str) -> String {
    format!("Hello, let's discuss {}.", topic)
}

/// Role prompt: persona, shared tone, context, topic and the input utterance.
pub fn build_prompt(participant: &Participant, state: &ConversationState, input: &str) -> String {
    let settings = state.settings();
    let input_label = match participant.role {
        Role::AgentA => "Previous message",
        Role::AgentB => "Respond to this message",
    };

    format!(
        "You are {persona}. Speak in a {tone} tone. Context: {context} Topic: {topic} \
         {input_label}: {input} \
         IMPORTANT: Do not start your response with your name or any agent identifier. \
         Just provide your direct response content without any prefixes.",
        persona = participant.persona,
        tone = settings.tone,
        context = settings.conversation_context(),
        topic = settings.topic,
        input_label = input_label,
        input = input,
    )
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}
