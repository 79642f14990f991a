//! Configuration module for loading TOML settings files.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::DialogueError;
use crate::participant::{Participant, Role};

const DEFAULT_AGENT_A_PERSONA: &str = "A professional discussant";
const DEFAULT_AGENT_B_PERSONA: &str = "A professional respondent";
const DEFAULT_AGENT_A_MODEL: &str = "gpt-4o-mini";
const DEFAULT_AGENT_B_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_EVALUATOR_MODEL: &str = "turing_flash";

/// Settings for one conversation run.
///
/// Unknown keys in the file are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Turn budget; the conversation ends after this many utterances.
    pub turns: u32,
    pub topic: String,
    /// Base tone shared by both agents.
    pub tone: String,
    /// Voice for agent A, then agent B.
    pub voices: Vec<String>,
    pub tts_provider: String,

    #[serde(default)]
    pub agent_a_persona: Option<String>,
    #[serde(default)]
    pub agent_b_persona: Option<String>,
    #[serde(default)]
    pub conversation_context: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,

    #[serde(default)]
    pub agent_a_model: Option<String>,
    #[serde(default)]
    pub agent_b_model: Option<String>,
    /// Model used for emotion classification. Defaults to agent A's model.
    #[serde(default)]
    pub classifier_model: Option<String>,
    /// Evaluator model candidates, tried in order.
    #[serde(default = "default_evaluator_models")]
    pub evaluator_models: Vec<String>,

    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,
    #[serde(default = "default_soft_timeout")]
    pub classification_timeout_secs: u64,
    #[serde(default = "default_soft_timeout")]
    pub evaluation_timeout_secs: u64,
    /// Silence inserted between clips in the merged track.
    #[serde(default)]
    pub clip_gap_secs: f32,
}

fn default_evaluator_models() -> Vec<String> {
    vec![DEFAULT_EVALUATOR_MODEL.to_string()]
}

fn default_generation_timeout() -> u64 {
    120
}

fn default_soft_timeout() -> u64 {
    30
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DialogueError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| DialogueError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse and validate settings from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, DialogueError> {
        let settings: Settings = toml::from_str(content)
            .map_err(|e| DialogueError::ConfigError(format!("Failed to parse config: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check the value constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), DialogueError> {
        if self.turns == 0 {
            return Err(DialogueError::InvalidSetting {
                key: "turns",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.topic.trim().is_empty() {
            return Err(DialogueError::InvalidSetting {
                key: "topic",
                reason: "must not be empty".to_string(),
            });
        }
        if self.voices.len() != 2 {
            return Err(DialogueError::InvalidSetting {
                key: "voices",
                reason: format!("expected exactly 2 voices, got {}", self.voices.len()),
            });
        }
        for (key, secs) in [
            ("generation_timeout_secs", self.generation_timeout_secs),
            ("classification_timeout_secs", self.classification_timeout_secs),
            ("evaluation_timeout_secs", self.evaluation_timeout_secs),
        ] {
            if secs == 0 {
                return Err(DialogueError::InvalidSetting {
                    key,
                    reason: "must be at least 1 second".to_string(),
                });
            }
        }
        if self.clip_gap_secs < 0.0 {
            return Err(DialogueError::InvalidSetting {
                key: "clip_gap_secs",
                reason: "must not be negative".to_string(),
            });
        }
        Ok(())
    }

    /// Persona text for a role, falling back to the defaults.
    pub fn persona(&self, role: Role) -> &str {
        let persona = match role {
            Role::AgentA => self.agent_a_persona.as_deref(),
            Role::AgentB => self.agent_b_persona.as_deref(),
        };
        persona.unwrap_or(match role {
            Role::AgentA => DEFAULT_AGENT_A_PERSONA,
            Role::AgentB => DEFAULT_AGENT_B_PERSONA,
        })
    }

    /// Generation model for a role.
    pub fn model(&self, role: Role) -> &str {
        match role {
            Role::AgentA => self.agent_a_model.as_deref().unwrap_or(DEFAULT_AGENT_A_MODEL),
            Role::AgentB => self.agent_b_model.as_deref().unwrap_or(DEFAULT_AGENT_B_MODEL),
        }
    }

    pub fn classifier_model(&self) -> &str {
        self.classifier_model
            .as_deref()
            .unwrap_or_else(|| self.model(Role::AgentA))
    }

    pub fn participant(&self, role: Role) -> Participant {
        Participant::new(role, self.model(role), self.persona(role))
    }

    pub fn conversation_context(&self) -> &str {
        self.conversation_context.as_deref().unwrap_or("")
    }

    /// Voice assigned to a role.
    pub fn voice(&self, role: Role) -> &str {
        self.voices
            .get(role.index())
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn session_id(&self) -> String {
        self.session_id
            .clone()
            .unwrap_or_else(|| format!("session_{}", topic_slug(&self.topic)))
    }

    pub fn conversation_id(&self) -> String {
        self.conversation_id
            .clone()
            .unwrap_or_else(|| format!("conv_{}", self.topic.replace(' ', "_")))
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn classification_timeout(&self) -> Duration {
        Duration::from_secs(self.classification_timeout_secs)
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_secs(self.evaluation_timeout_secs)
    }
}

/// Lowercased topic with every non-alphanumeric run collapsed to `_`.
fn topic_slug(topic: &str) -> String {
    let mut slug = String::with_capacity(topic.len());
    for c in topic.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}
