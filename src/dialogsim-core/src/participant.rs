//! Conversation participants.
//!
//! The conversation always has exactly two roles that alternate turns.

use serde::{Deserialize, Serialize};

/// One of the two fixed conversational roles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Opens the conversation.
    AgentA,
    /// Responds to the opener.
    AgentB,
}

impl Role {
    /// Label used in the rendered transcript.
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::AgentA => "Agent A",
            Role::AgentB => "Agent B",
        }
    }

    /// The role that speaks after this one.
    pub fn other(&self) -> Role {
        match self {
            Role::AgentA => Role::AgentB,
            Role::AgentB => Role::AgentA,
        }
    }

    /// The role that speaks first.
    pub fn opener() -> Role {
        Role::AgentA
    }

    /// Index into two-element per-role settings such as `voices`.
    pub fn index(&self) -> usize {
        match self {
            Role::AgentA => 0,
            Role::AgentB => 1,
        }
    }
}

/// A participant bound to a role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// The role this participant plays.
    pub role: Role,
    /// The LLM model backing this participant (e.g., "gpt-4o-mini").
    pub model: String,
    /// Persona text injected into every prompt.
    pub persona: String,
}

impl Participant {
    pub fn new(role: Role, model: impl Into<String>, persona: impl Into<String>) -> Self {
        Self {
            role,
            model: model.into(),
            persona: persona.into(),
        }
    }
}
