//! Dialogue orchestration logic.
//!
//! Alternates the two turn generators until the turn budget is spent.

use log::{error, info};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backend::GenerationBackend;
use crate::config::Settings;
use crate::emotion::EmotionClassifier;
use crate::error::DialogueError;
use crate::evaluation::{EvaluationOutcome, QualityEvaluator};
use crate::participant::Role;
use crate::state::{ConversationState, Utterance};
use crate::turn::TurnGenerator;

/// Backend handles for one run.
#[derive(Clone)]
pub struct DialogueBackends {
    pub agent_a: Arc<dyn GenerationBackend>,
    pub agent_b: Arc<dyn GenerationBackend>,
    /// Used by the emotion classifier.
    pub classifier: Arc<dyn GenerationBackend>,
}

/// Routing decision after each turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Continue(Role),
    Terminal,
}

/// Decide who speaks next, if anyone.
pub fn next_transition(state: &ConversationState) -> Transition {
    if state.is_terminal() {
        Transition::Terminal
    } else {
        Transition::Continue(state.speaker())
    }
}

/// Callback for conversation events.
pub type ConversationCallback = Box<dyn Fn(ConversationEvent) + Send + Sync>;

/// Events emitted during a conversation.
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    ConversationStarted {
        topic: String,
        max_turns: u32,
        session_id: String,
        conversation_id: String,
    },
    /// A role is about to generate.
    TurnStarted { turn: u32, role: Role },
    /// An utterance was accepted into the transcript.
    MessageProcessed { turn: u32, utterance: Utterance },
    Evaluation {
        turn: u32,
        role: Role,
        outcome: EvaluationOutcome,
    },
    ConversationCompleted { total_messages: usize, final_turn: u32 },
    /// A turn failed fatally; the run stops here.
    ConversationFailed { turn: u32, error: String },
}

/// Transcript summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationMetrics {
    pub total_messages: usize,
    pub turn: u32,
    pub max_turns: u32,
    pub messages_by_role: BTreeMap<&'static str, usize>,
    pub emotions: BTreeMap<String, usize>,
}

/// Drives the two-role conversation state machine.
pub struct DialogueOrchestrator {
    state: ConversationState,
    agent_a: TurnGenerator,
    agent_b: TurnGenerator,
    classifier: EmotionClassifier,
    evaluator: QualityEvaluator,
    callback: Option<ConversationCallback>,
}

impl DialogueOrchestrator {
    pub fn new(settings: Settings, backends: DialogueBackends, evaluator: QualityEvaluator) -> Self {
        let agent_a = TurnGenerator::new(settings.participant(Role::AgentA), backends.agent_a);
        let agent_b = TurnGenerator::new(settings.participant(Role::AgentB), backends.agent_b);
        let classifier =
            EmotionClassifier::new(backends.classifier, settings.classification_timeout());

        Self {
            state: ConversationState::new(settings),
            agent_a,
            agent_b,
            classifier,
            evaluator,
            callback: None,
        }
    }

    /// Set a callback for conversation events.
    pub fn with_callback(mut self, callback: ConversationCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Run turns until the budget is spent.
    ///
    /// On a fatal turn error the partial state stays available through
    /// [`DialogueOrchestrator::state`].
    pub async fn run(&mut self) -> Result<Vec<Utterance>, DialogueError> {
        let settings = self.state.settings();
        info!(
            "Session: {}, Conversation: {}",
            settings.session_id(),
            settings.conversation_id()
        );
        self.emit_event(ConversationEvent::ConversationStarted {
            topic: settings.topic.clone(),
            max_turns: self.state.max_turns(),
            session_id: settings.session_id(),
            conversation_id: settings.conversation_id(),
        });

        while let Transition::Continue(role) = next_transition(&self.state) {
            self.run_turn(role).await?;
        }

        info!(
            "Conversation finished: {} messages, {} turns",
            self.state.messages().len(),
            self.state.turn()
        );
        self.emit_event(ConversationEvent::ConversationCompleted {
            total_messages: self.state.messages().len(),
            final_turn: self.state.turn(),
        });
        Ok(self.state.messages().to_vec())
    }

    async fn run_turn(&mut self, role: Role) -> Result<(), DialogueError> {
        let turn = self.state.turn() + 1;
        self.emit_event(ConversationEvent::TurnStarted { turn, role });

        let generator = match role {
            Role::AgentA => &self.agent_a,
            Role::AgentB => &self.agent_b,
        };

        let result = generator
            .take_turn(&mut self.state, &self.classifier, &self.evaluator)
            .await;
        let report = match result {
            Ok(report) => report,
            Err(e) => {
                error!("{} failed on turn {}: {}", role.display_name(), turn, e);
                self.emit_event(ConversationEvent::ConversationFailed {
                    turn,
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        for outcome in report.evaluations {
            self.emit_event(ConversationEvent::Evaluation {
                turn: report.turn,
                role,
                outcome,
            });
        }
        self.emit_event(ConversationEvent::MessageProcessed {
            turn: report.turn,
            utterance: report.utterance,
        });
        Ok(())
    }

    /// Emit an event if a callback is registered.
    fn emit_event(&self, event: ConversationEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Get the full transcript.
    pub fn transcript(&self) -> &[Utterance] {
        self.state.messages()
    }

    pub fn metrics(&self) -> ConversationMetrics {
        let mut messages_by_role = BTreeMap::new();
        let mut emotions = BTreeMap::new();
        for utterance in self.state.messages() {
            *messages_by_role
                .entry(utterance.speaker.display_name())
                .or_insert(0) += 1;
            *emotions.entry(utterance.emotion.clone()).or_insert(0) += 1;
        }

        ConversationMetrics {
            total_messages: self.state.messages().len(),
            turn: self.state.turn(),
            max_turns: self.state.max_turns(),
            messages_by_role,
            emotions,
        }
    }
}
