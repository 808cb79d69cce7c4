//! Interpretation - the structured guess at what an utterance asks for.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::command::{Action, CommandType};

/// Parameters handed to action adapters (app_name, search_query, platform...)
pub type ExecutionData = BTreeMap<String, serde_json::Value>;

/// Structured result of resolving one utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interpretation {
    pub is_command: bool,
    pub command_type: CommandType,
    pub action: Action,
    pub target: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub execution_data: ExecutionData,
    #[serde(default)]
    pub needs_clarification: bool,
    #[serde(default)]
    pub knowledge_used: bool,
    #[serde(default)]
    pub natural_response: String,
    #[serde(default)]
    pub original_utterance: String,
}

impl Interpretation {
    /// Create an interpretation; `is_command` follows the category and
    /// confidence is clamped to [0, 1].
    pub fn new(
        command_type: CommandType,
        action: Action,
        target: Option<String>,
        confidence: f64,
    ) -> Self {
        Self {
            is_command: command_type.is_command(),
            command_type,
            action,
            target,
            confidence: clamp_unit(confidence),
            execution_data: ExecutionData::new(),
            needs_clarification: false,
            knowledge_used: false,
            natural_response: String::new(),
            original_utterance: String::new(),
        }
    }

    /// Plain conversational reply
    pub fn conversation(confidence: f64, response: &str) -> Self {
        Self::new(CommandType::Conversation, Action::Chat, None, confidence)
            .with_response(response)
    }

    pub fn with_data(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.execution_data.insert(key.to_string(), value.into());
        self
    }

    pub fn with_response(mut self, response: &str) -> Self {
        self.natural_response = response.to_string();
        self
    }

    pub fn with_utterance(mut self, utterance: &str) -> Self {
        self.original_utterance = utterance.to_string();
        self
    }

    /// Replace the confidence, keeping it inside [0, 1]
    pub fn set_confidence(&mut self, confidence: f64) {
        self.confidence = clamp_unit(confidence);
    }

    /// Re-establish invariants after fields were edited directly
    pub fn normalized(mut self) -> Self {
        if self.command_type == CommandType::Conversation {
            self.is_command = false;
        }
        self.confidence = clamp_unit(self.confidence);
        if let Some(t) = &self.target {
            if t.trim().is_empty() {
                self.target = None;
            }
        }
        self
    }

    /// Lowercased target, if any
    pub fn target_lower(&self) -> Option<String> {
        self.target.as_ref().map(|t| t.to_lowercase())
    }

    /// Key used to deduplicate alternatives and spot repeated commands
    pub fn identity(&self) -> (Action, Option<String>) {
        (self.action, self.target_lower())
    }
}

/// Clamp to [0, 1], mapping NaN to 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sets_is_command_from_category() {
        let i = Interpretation::new(CommandType::App, Action::OpenApp, Some("spotify".into()), 0.9);
        assert!(i.is_command);
        let c = Interpretation::conversation(0.7, "hola");
        assert!(!c.is_command);
        assert_eq!(c.natural_response, "hola");
    }

    #[test]
    fn test_confidence_clamped() {
        let i = Interpretation::new(CommandType::Music, Action::SearchMusic, None, 1.7);
        assert_eq!(i.confidence, 1.0);
        let mut j = Interpretation::new(CommandType::Music, Action::SearchMusic, None, -0.2);
        assert_eq!(j.confidence, 0.0);
        j.set_confidence(f64::NAN);
        assert_eq!(j.confidence, 0.0);
    }

    #[test]
    fn test_normalized_enforces_conversation_invariant() {
        let mut i = Interpretation::conversation(0.8, "");
        i.is_command = true;
        i.target = Some("  ".into());
        let n = i.normalized();
        assert!(!n.is_command);
        assert!(n.target.is_none());
    }

    #[test]
    fn test_identity_is_case_insensitive() {
        let a = Interpretation::new(CommandType::App, Action::OpenApp, Some("Chrome".into()), 0.9);
        let b = Interpretation::new(CommandType::App, Action::OpenApp, Some("chrome".into()), 0.5);
        assert_eq!(a.identity(), b.identity());
    }
}
