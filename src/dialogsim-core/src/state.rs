//! Conversation state.
//!
//! Holds the transcript and the turn bookkeeping. The transcript is stored as
//! structured [`Utterance`] records; the flattened `"Agent A (emotion): text"`
//! form is only produced at the sink boundary.

use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::DialogueError;
use crate::participant::Role;

/// One accepted, labeled utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: Role,
    pub emotion: String,
    pub text: String,
}

impl Utterance {
    pub fn new(speaker: Role, emotion: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker,
            emotion: emotion.into(),
            text: text.into(),
        }
    }

    /// Speaker label with the emotion, e.g. `Agent A (curious)`.
    pub fn label(&self) -> String {
        format!("{} ({})", self.speaker.display_name(), self.emotion)
    }

    /// Flattened transcript line.
    pub fn render(&self) -> String {
        format!("{}: {}", self.label(), self.text)
    }
}

/// Mutable record of dialogue progress.
#[derive(Debug, Clone)]
pub struct ConversationState {
    messages: Vec<Utterance>,
    turn: u32,
    max_turns: u32,
    speaker: Role,
    settings: Settings,
}

impl ConversationState {
    /// Create a fresh state; the turn budget comes from `settings.turns`.
    pub fn new(settings: Settings) -> Self {
        Self {
            messages: Vec::new(),
            turn: 0,
            max_turns: settings.turns,
            speaker: Role::opener(),
            settings,
        }
    }

    /// Append an utterance, then advance the turn and flip the speaker.
    ///
    /// Appending after the budget is spent, or out of turn, is rejected and
    /// leaves the state untouched.
    pub fn append_utterance(
        &mut self,
        speaker: Role,
        emotion: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<&Utterance, DialogueError> {
        if self.is_terminal() {
            return Err(DialogueError::StateViolation(format!(
                "cannot append turn {} to a conversation limited to {} turns",
                self.turn + 1,
                self.max_turns
            )));
        }
        if speaker != self.speaker {
            return Err(DialogueError::StateViolation(format!(
                "{} spoke out of turn; expected {}",
                speaker.display_name(),
                self.speaker.display_name()
            )));
        }

        self.messages.push(Utterance::new(speaker, emotion, text));
        self.turn += 1;
        self.speaker = speaker.other();

        let last = self.messages.len() - 1;
        Ok(&self.messages[last])
    }

    pub fn is_terminal(&self) -> bool {
        self.turn >= self.max_turns
    }

    pub fn messages(&self) -> &[Utterance] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&Utterance> {
        self.messages.last()
    }

    /// Flattened transcript lines, in order.
    pub fn rendered_messages(&self) -> Vec<String> {
        self.messages.iter().map(Utterance::render).collect()
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    /// The role whose turn is next.
    pub fn speaker(&self) -> Role {
        self.speaker
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn settings_with_turns(turns: u32) -> Settings {
        Settings::from_toml(&format!(
            r#"
turns = {turns}
topic = "AI"
tone = "neutral"
voices = ["male", "female"]
tts_provider = "x"
"#
        ))
        .unwrap()
    }

    #[test]
    fn test_new_state_is_empty() {
        let state = ConversationState::new(settings_with_turns(3));
        assert_eq!(state.turn(), 0);
        assert_eq!(state.max_turns(), 3);
        assert!(state.messages().is_empty());
        assert_eq!(state.speaker(), Role::AgentA);
        assert!(!state.is_terminal());
    }

    #[test]
    fn test_append_advances_turn_and_flips_speaker() {
        let mut state = ConversationState::new(settings_with_turns(2));
        state.append_utterance(Role::AgentA, "curious", "Hi there").unwrap();
        assert_eq!(state.turn(), 1);
        assert_eq!(state.speaker(), Role::AgentB);
        assert_eq!(state.messages().len(), 1);

        state.append_utterance(Role::AgentB, "calm", "Hello").unwrap();
        assert_eq!(state.turn(), 2);
        assert_eq!(state.speaker(), Role::AgentA);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_append_after_terminal_fails() {
        let mut state = ConversationState::new(settings_with_turns(1));
        state.append_utterance(Role::AgentA, "curious", "Hi").unwrap();
        let err = state.append_utterance(Role::AgentB, "calm", "Late").unwrap_err();
        assert!(matches!(err, DialogueError::StateViolation(_)));
        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.turn(), 1);
    }

    #[test]
    fn test_out_of_turn_append_fails() {
        let mut state = ConversationState::new(settings_with_turns(4));
        let err = state.append_utterance(Role::AgentB, "calm", "Me first").unwrap_err();
        assert!(matches!(err, DialogueError::StateViolation(_)));
        assert_eq!(state.turn(), 0);
        assert!(state.messages().is_empty());
    }

    #[test]
    fn test_render_legacy_format() {
        let utterance = Utterance::new(Role::AgentB, "wry", "Fair point.");
        assert_eq!(utterance.label(), "Agent B (wry)");
        assert_eq!(utterance.render(), "Agent B (wry): Fair point.");
    }
}
