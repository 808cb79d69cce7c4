//! Ambiguity signals and analysis results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::interpretation::Interpretation;

/// Which detector produced a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityKind {
    MultipleInterpretations,
    IncompleteCommand,
    MissingContext,
    HistoryConflict,
    LowConfidence,
    ConflictingTargets,
    VagueReference,
}

impl std::fmt::Display for AmbiguityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MultipleInterpretations => "multiple_interpretations",
            Self::IncompleteCommand => "incomplete_command",
            Self::MissingContext => "missing_context",
            Self::HistoryConflict => "history_conflict",
            Self::LowConfidence => "low_confidence",
            Self::ConflictingTargets => "conflicting_targets",
            Self::VagueReference => "vague_reference",
        };
        write!(f, "{}", s)
    }
}

/// One reason an interpretation may be wrong or underspecified.
/// Built once by a detector and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbiguitySignal {
    pub kind: AmbiguityKind,
    pub severity: f64,
    pub description: String,
    pub clarifying_questions: Vec<String>,
    pub evidence: BTreeMap<String, serde_json::Value>,
}

impl AmbiguitySignal {
    pub fn new(kind: AmbiguityKind, severity: f64, description: impl Into<String>) -> Self {
        Self {
            kind,
            severity: crate::interpretation::clamp_unit(severity),
            description: description.into(),
            clarifying_questions: Vec::new(),
            evidence: BTreeMap::new(),
        }
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.clarifying_questions.push(question.into());
        self
    }

    pub fn with_questions<I, S>(mut self, questions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.clarifying_questions
            .extend(questions.into_iter().map(Into::into));
        self
    }

    pub fn with_evidence(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.evidence.insert(key.to_string(), value.into());
        self
    }

    /// String list stored under `key`, empty when absent
    pub fn evidence_list(&self, key: &str) -> Vec<String> {
        self.evidence
            .get(key)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// What the pipeline should do with an interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Execute,
    Clarify,
    SuggestAlternatives,
}

impl std::fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Execute => "execute",
            Self::Clarify => "clarify",
            Self::SuggestAlternatives => "suggest_alternatives",
        };
        write!(f, "{}", s)
    }
}

/// Result of running every detector over one interpretation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbiguityAnalysis {
    pub has_ambiguity: bool,
    pub score: f64,
    pub signals: Vec<AmbiguitySignal>,
    pub alternative_interpretations: Vec<Interpretation>,
    pub recommended_action: RecommendedAction,
    pub clarifying_questions: Vec<String>,
}

impl AmbiguityAnalysis {
    /// Analysis of an utterance nothing flagged
    pub fn clear(interpretation: &Interpretation) -> Self {
        Self {
            has_ambiguity: false,
            score: 0.0,
            signals: Vec::new(),
            alternative_interpretations: vec![interpretation.clone()],
            recommended_action: RecommendedAction::Execute,
            clarifying_questions: Vec::new(),
        }
    }

    pub fn has_signal(&self, kind: AmbiguityKind) -> bool {
        self.signals.iter().any(|s| s.kind == kind)
    }

    pub fn max_severity(&self) -> f64 {
        self.signals
            .iter()
            .map(|s| s.severity)
            .fold(0.0, f64::max)
    }
}
