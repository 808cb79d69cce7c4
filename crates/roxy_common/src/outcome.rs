//! Outcome Records - persisted successes and failures.
//!
//! They bias future confidence and feed the instruction augmentation of the
//! intent resolver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::command::{Action, CommandType};
use crate::interpretation::Interpretation;

/// Why a command failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Classifier reply unusable, or the utterance never became a command
    Parsing,
    /// Adapter reported failure
    Execution,
    /// Blocked by the pre-execution validator
    Validation,
    /// Low confidence or high ambiguity
    Misinterpretation,
}

impl ErrorCategory {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "parsing" => Some(Self::Parsing),
            "execution" => Some(Self::Execution),
            "validation" => Some(Self::Validation),
            "misinterpretation" => Some(Self::Misinterpretation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parsing => "parsing",
            Self::Execution => "execution",
            Self::Validation => "validation",
            Self::Misinterpretation => "misinterpretation",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A command that did not do what the user wanted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    #[serde(alias = "user_input")]
    pub utterance: String,
    /// "<action> <target>" as the user meant it
    pub intended_action: String,
    /// Canonical action, used for per-action success rates
    #[serde(default)]
    pub action: Action,
    pub actual_result: String,
    pub command_type: CommandType,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub error_category: ErrorCategory,
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl FailureRecord {
    /// Failure for `interpretation`, stamped now
    pub fn for_interpretation(
        utterance: &str,
        interpretation: &Interpretation,
        actual_result: &str,
        error_category: ErrorCategory,
    ) -> Self {
        let intended_action = match &interpretation.target {
            Some(t) => format!("{} {}", interpretation.action, t),
            None => interpretation.action.to_string(),
        };
        Self {
            utterance: utterance.to_string(),
            intended_action,
            action: interpretation.action,
            actual_result: actual_result.to_string(),
            command_type: interpretation.command_type,
            confidence: interpretation.confidence,
            timestamp: Utc::now(),
            error_category,
            context: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A command that ran and worked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessRecord {
    #[serde(alias = "user_input")]
    pub utterance: String,
    pub command_type: CommandType,
    pub action: Action,
    pub target: Option<String>,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub knowledge_used: bool,
}

impl SuccessRecord {
    pub fn for_interpretation(utterance: &str, interpretation: &Interpretation) -> Self {
        Self {
            utterance: utterance.to_string(),
            command_type: interpretation.command_type,
            action: interpretation.action,
            target: interpretation.target.clone(),
            confidence: interpretation.confidence,
            timestamp: Utc::now(),
            knowledge_used: interpretation.knowledge_used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_intended_action_includes_target() {
        let i = Interpretation::new(CommandType::App, Action::OpenApp, Some("steam".into()), 0.8);
        let f = FailureRecord::for_interpretation("abre steam", &i, "execution_failed", ErrorCategory::Execution);
        assert_eq!(f.intended_action, "open_app steam");
        assert_eq!(f.action, Action::OpenApp);
    }

    #[test]
    fn test_failure_record_json_roundtrip_keeps_context() {
        let i = Interpretation::new(CommandType::Music, Action::SearchMusic, None, 0.4);
        let f = FailureRecord::for_interpretation("pon eso", &i, "blocked", ErrorCategory::Validation)
            .with_context("validation_issues", serde_json::json!(["Sin conexión a internet"]))
            .with_context("confidence", 0.4);

        let json = serde_json::to_string(&f).unwrap();
        let back: FailureRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, f);
        assert_eq!(back.error_category, ErrorCategory::Validation);
        assert_eq!(back.context.len(), 2);
    }

    #[test]
    fn test_legacy_user_input_field_accepted() {
        let json = r#"{"user_input":"abre chrome","command_type":"app","action":"open_app",
            "target":"chrome","confidence":0.9,"timestamp":"2024-05-01T10:00:00Z"}"#;
        let s: SuccessRecord = serde_json::from_str(json).unwrap();
        assert_eq!(s.utterance, "abre chrome");
        assert!(!s.knowledge_used);
    }

    #[test]
    fn test_error_category_parse() {
        assert_eq!(ErrorCategory::from_str("Parsing"), Some(ErrorCategory::Parsing));
        assert_eq!(ErrorCategory::from_str("other"), None);
    }
}
