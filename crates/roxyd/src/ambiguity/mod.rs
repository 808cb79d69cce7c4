//! Ambiguity Analyzer - runs detectors and decides execute / clarify / suggest.
//!
//! Detectors are an ordered list behind the `Detector` trait; adding one is
//! a push onto that list. The analyzer only aggregates:
//! - score from signal severities and the classifier confidence
//! - recommended action from the configured policy
//! - alternatives from signal evidence, original interpretation first
//! - clarifying questions as the deduplicated union of all signals

pub mod catalog;
pub mod detectors;

pub use detectors::{AnalysisContext, Detector};

use roxy_common::{
    clamp_unit, AmbiguityAnalysis, AmbiguityKind, AmbiguitySignal, CommandType, Interpretation,
    RecommendedAction,
};
use tracing::{debug, info};

use crate::config::AmbiguityConfig;
use detectors::{
    ConflictingTargetsDetector, HistoryConflictDetector, IncompleteCommandDetector,
    LowConfidenceDetector, MissingContextDetector, MultipleInterpretationsDetector,
    VagueReferenceDetector,
};

/// Severity above which a signal counts double in the score
const SEVERE_SIGNAL: f64 = 0.7;

/// Discount for apps proposed by a multiple-interpretations signal
const TERM_ALTERNATIVE_FACTOR: f64 = 0.8;

/// Discount for other apps named in the same utterance
const TARGET_ALTERNATIVE_FACTOR: f64 = 0.7;

pub struct AmbiguityAnalyzer {
    config: AmbiguityConfig,
    detectors: Vec<Box<dyn Detector>>,
}

impl AmbiguityAnalyzer {
    /// Analyzer with the seven standard detectors
    pub fn new(config: AmbiguityConfig) -> Self {
        let detectors: Vec<Box<dyn Detector>> = vec![
            Box::new(MultipleInterpretationsDetector),
            Box::new(IncompleteCommandDetector),
            Box::new(MissingContextDetector),
            Box::new(HistoryConflictDetector {
                window_secs: config.history_conflict_window_secs,
            }),
            Box::new(LowConfidenceDetector {
                threshold: config.low_confidence_threshold,
            }),
            Box::new(ConflictingTargetsDetector),
            Box::new(VagueReferenceDetector::new()),
        ];
        Self { config, detectors }
    }

    /// Append a detector after the standard ones
    pub fn with_detector(mut self, detector: Box<dyn Detector>) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    pub fn config(&self) -> &AmbiguityConfig {
        &self.config
    }

    pub fn analyze(
        &self,
        utterance: &str,
        interpretation: &Interpretation,
        ctx: &AnalysisContext<'_>,
    ) -> AmbiguityAnalysis {
        let signals: Vec<AmbiguitySignal> = self
            .detectors
            .iter()
            .flat_map(|d| d.detect(utterance, interpretation, ctx))
            .collect();

        if signals.is_empty() {
            return AmbiguityAnalysis::clear(interpretation);
        }

        let confidence = interpretation.confidence;
        let score = ambiguity_score(&signals, confidence);
        let has_ambiguity = score > self.config.threshold || !signals.is_empty();
        let recommended_action = self.recommend(&signals, score, confidence);
        let alternative_interpretations = self.alternatives(interpretation, &signals);
        let clarifying_questions = self.questions(&signals);

        info!(
            "Ambiguity: score={:.2}, signals={}, action={}",
            score,
            signals.len(),
            recommended_action
        );
        for s in &signals {
            debug!("  {} ({:.2}): {}", s.kind, s.severity, s.description);
        }

        AmbiguityAnalysis {
            has_ambiguity,
            score,
            signals,
            alternative_interpretations,
            recommended_action,
            clarifying_questions,
        }
    }

    fn recommend(&self, signals: &[AmbiguitySignal], score: f64, confidence: f64) -> RecommendedAction {
        let c = &self.config;
        if signals.iter().any(|s| s.severity > c.clarify_severity) {
            RecommendedAction::Clarify
        } else if score > c.clarify_score {
            RecommendedAction::Clarify
        } else if confidence < c.clarify_confidence {
            RecommendedAction::Clarify
        } else if score > c.threshold && confidence > c.suggest_confidence {
            RecommendedAction::SuggestAlternatives
        } else {
            RecommendedAction::Execute
        }
    }

    fn alternatives(
        &self,
        interpretation: &Interpretation,
        signals: &[AmbiguitySignal],
    ) -> Vec<Interpretation> {
        let mut out = vec![interpretation.clone()];
        let current = interpretation.target_lower();

        for signal in signals {
            let (apps, factor, take) = match signal.kind {
                AmbiguityKind::MultipleInterpretations => {
                    (signal.evidence_list("possible_apps"), TERM_ALTERNATIVE_FACTOR, 2)
                }
                AmbiguityKind::ConflictingTargets => {
                    (signal.evidence_list("apps"), TARGET_ALTERNATIVE_FACTOR, usize::MAX)
                }
                _ => continue,
            };
            for app in apps
                .into_iter()
                .filter(|a| current.as_deref() != Some(a.as_str()))
                .take(take)
            {
                out.push(retargeted(interpretation, &app, factor));
            }
        }

        let mut seen = Vec::new();
        out.retain(|i| {
            let id = i.identity();
            if seen.contains(&id) {
                false
            } else {
                seen.push(id);
                true
            }
        });
        out.truncate(self.config.max_alternatives);
        out
    }

    fn questions(&self, signals: &[AmbiguitySignal]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for q in signals.iter().flat_map(|s| s.clarifying_questions.iter()) {
            if !out.contains(q) {
                out.push(q.clone());
            }
        }
        out.truncate(self.config.max_questions);
        out
    }
}

/// `mean(severity) + (1 - confidence) * 0.3 + 0.1 * count(severity > 0.7)`,
/// clamped; zero without signals
pub fn ambiguity_score(signals: &[AmbiguitySignal], confidence: f64) -> f64 {
    if signals.is_empty() {
        return 0.0;
    }
    let mean = signals.iter().map(|s| s.severity).sum::<f64>() / signals.len() as f64;
    let severe = signals.iter().filter(|s| s.severity > SEVERE_SIGNAL).count();
    clamp_unit(mean + (1.0 - confidence) * 0.3 + 0.1 * severe as f64)
}

fn retargeted(base: &Interpretation, app: &str, factor: f64) -> Interpretation {
    let mut alt = base.clone();
    alt.target = Some(app.to_string());
    alt.set_confidence(base.confidence * factor);
    let key = match base.command_type {
        CommandType::App => "app_name",
        _ => "platform",
    };
    alt.execution_data
        .insert(key.to_string(), serde_json::Value::from(app));
    alt
}
