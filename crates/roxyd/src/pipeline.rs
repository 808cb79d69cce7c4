//! Command Pipeline - utterance in, decision out.
//!
//! Flow:
//! 1. Optional autocorrect (only suggestions above 0.8)
//! 2. Intent resolver
//! 3. One system snapshot
//! 4. Ambiguity analysis
//! 5. Confidence, computed once, after ambiguity
//! 6. Pre-execution validation
//!
//! Invariants:
//! - `process` never fails; every stage has a degraded path
//! - Per-caller mutable state lives in `PipelineContext`
//! - The adapter only ever sees `Decision::Execute` interpretations

use chrono::Utc;
use roxy_common::{
    ActionAdapter, AdapterOutcome, AmbiguityAnalysis, ClassifierClient, Clock, CommandType,
    ErrorCategory, FailureRecord, HttpClassifierClient, HttpKnowledgeClient, Interpretation,
    KnowledgeClient, RecentCommand, RecommendedAction, SystemClock, SystemStateSnapshot, UserPreferences, ValidationOutcome,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::adapters::DryRunAdapter;
use crate::ambiguity::{AmbiguityAnalyzer, AnalysisContext};
use crate::confidence::{ConfidenceCalculator, ConfidenceContext, ConfidenceLevel, ConfidenceReport};
use crate::config::Config;
use crate::corrector::CommandCorrector;
use crate::learning::{Improvement, LearningStore};
use crate::probe::{SysinfoProbe, SystemProbe};
use crate::resolver::{IntentResolver, ResolutionSource};
use crate::validator::{PreExecutionValidator, ValidationContext};

/// Failures below this classifier confidence count as misunderstandings
const MISINTERPRETATION_CONFIDENCE: f64 = 0.5;

// ============================================================================
// Context
// ============================================================================

/// What one caller carries between utterances
#[derive(Debug, Clone, Default)]
pub struct PipelineContext {
    /// Oldest first, capped
    pub recent: Vec<RecentCommand>,
    pub preferences: UserPreferences,
    cap: usize,
}

impl PipelineContext {
    pub fn new(cap: usize) -> Self {
        Self {
            recent: Vec::new(),
            preferences: UserPreferences::default(),
            cap: cap.max(1),
        }
    }

    pub fn with_preferences(mut self, preferences: UserPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn push(&mut self, command: RecentCommand) {
        self.recent.push(command);
        if self.recent.len() > self.cap {
            let excess = self.recent.len() - self.cap;
            self.recent.drain(..excess);
        }
    }
}

// ============================================================================
// Decision
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Run it, after `validation.delay_seconds`
    Execute {
        interpretation: Interpretation,
        validation: ValidationOutcome,
        confidence: Option<ConfidenceReport>,
    },
    /// Ask before running; `explicit` when confidence is low
    Confirm {
        interpretation: Interpretation,
        validation: ValidationOutcome,
        confidence: ConfidenceReport,
        explicit: bool,
    },
    /// Ask the analysis questions
    Clarify {
        interpretation: Interpretation,
        analysis: AmbiguityAnalysis,
    },
    /// Not a command
    Converse { interpretation: Interpretation },
    /// Too unsure to even ask for confirmation
    Reject {
        interpretation: Interpretation,
        confidence: ConfidenceReport,
    },
    /// The validator found a blocking issue
    Blocked {
        interpretation: Interpretation,
        validation: ValidationOutcome,
    },
}

impl Decision {
    pub fn interpretation(&self) -> &Interpretation {
        match self {
            Self::Execute { interpretation, .. }
            | Self::Confirm { interpretation, .. }
            | Self::Clarify { interpretation, .. }
            | Self::Converse { interpretation }
            | Self::Reject { interpretation, .. }
            | Self::Blocked { interpretation, .. } => interpretation,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Execute { .. } => "execute",
            Self::Confirm { .. } => "confirm",
            Self::Clarify { .. } => "clarify",
            Self::Converse { .. } => "converse",
            Self::Reject { .. } => "reject",
            Self::Blocked { .. } => "blocked",
        }
    }

    pub fn is_execute(&self) -> bool {
        matches!(self, Self::Execute { .. })
    }

    pub fn delay_seconds(&self) -> u64 {
        match self {
            Self::Execute { validation, .. } => validation.delay_seconds,
            _ => 0,
        }
    }

    /// A confirmed `Confirm` becomes `Execute`; everything else is unchanged
    pub fn confirmed(self) -> Self {
        match self {
            Self::Confirm {
                interpretation,
                validation,
                confidence,
                ..
            } => Self::Execute {
                interpretation,
                validation,
                confidence: Some(confidence),
            },
            other => other,
        }
    }

    /// What to tell the user
    pub fn message(&self) -> String {
        match self {
            Self::Execute { interpretation, .. }
            | Self::Clarify { interpretation, .. }
            | Self::Converse { interpretation } => interpretation.natural_response.clone(),
            Self::Confirm {
                interpretation,
                confidence,
                explicit: false,
                ..
            } => format!(
                "{} ({}). ¿Quieres que continúe?",
                interpretation.natural_response, confidence.explanation
            ),
            Self::Confirm { interpretation, .. } => format!(
                "No estoy segura de haberte entendido: {} ¿Es correcto? (sí/no)",
                interpretation.natural_response
            ),
            Self::Reject { .. } => {
                "No he entendido bien tu solicitud. ¿Puedes repetirla de otra forma?".to_string()
            }
            Self::Blocked { validation, .. } if validation.blocking_issues.is_empty() => {
                format!("No puedo hacerlo ahora: {}", validation.summary())
            }
            Self::Blocked { validation, .. } => format!(
                "No puedo hacerlo ahora: {}",
                validation.blocking_issues.join("; ")
            ),
        }
    }
}

/// Result of `Pipeline::execute`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub decision: Decision,
    pub outcome: Option<AdapterOutcome>,
    pub improvements: Vec<Improvement>,
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct Pipeline {
    resolver: IntentResolver,
    analyzer: AmbiguityAnalyzer,
    calculator: ConfidenceCalculator,
    validator: PreExecutionValidator,
    learning: LearningStore,
    corrector: Option<CommandCorrector>,
    probe: Box<dyn SystemProbe>,
    clock: Box<dyn Clock>,
    adapter: Box<dyn ActionAdapter>,
}

impl Pipeline {
    /// Pipeline with live probe, system clock and the dry-run adapter
    pub fn new(config: &Config, classifier: Arc<dyn ClassifierClient>) -> Self {
        let learning = LearningStore::open(config.learning.clone());
        let mut resolver = IntentResolver::new(classifier);
        resolver.refresh_instructions(learning.augmentation());

        let corrector = config
            .pipeline
            .autocorrect
            .then(|| CommandCorrector::open(&config.pipeline.corrections_path));

        Self {
            resolver,
            analyzer: AmbiguityAnalyzer::new(config.ambiguity.clone()),
            calculator: ConfidenceCalculator::new(config.confidence.clone()),
            validator: PreExecutionValidator::new(config.validation.clone()),
            learning,
            corrector,
            probe: Box::new(SysinfoProbe::new(
                &config.validation.network_probe_addr,
                config.validation.network_timeout_secs,
            )),
            clock: Box::new(SystemClock),
            adapter: Box::new(DryRunAdapter),
        }
    }

    /// Pipeline talking to the configured HTTP classifier and, when
    /// enabled, the knowledge service
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let classifier = HttpClassifierClient::new(config.classifier.clone())?;
        let mut pipeline = Self::new(config, Arc::new(classifier));
        if config.knowledge.enabled {
            match HttpKnowledgeClient::new(config.knowledge.clone()) {
                Ok(k) => pipeline = pipeline.with_knowledge(Arc::new(k)),
                Err(e) => warn!("Knowledge lookup disabled: {:#}", e),
            }
        }
        Ok(pipeline)
    }

    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeClient>) -> Self {
        self.resolver = self.resolver.with_knowledge(knowledge);
        self
    }

    pub fn with_probe(mut self, probe: Box<dyn SystemProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_adapter(mut self, adapter: Box<dyn ActionAdapter>) -> Self {
        self.adapter = adapter;
        self
    }

    pub fn with_corrector(mut self, corrector: Option<CommandCorrector>) -> Self {
        self.corrector = corrector;
        self
    }

    pub fn resolver(&self) -> &IntentResolver {
        &self.resolver
    }

    pub fn learning(&self) -> &LearningStore {
        &self.learning
    }

    pub fn validator(&self) -> &PreExecutionValidator {
        &self.validator
    }

    pub fn validator_mut(&mut self) -> &mut PreExecutionValidator {
        &mut self.validator
    }

    pub fn corrector_mut(&mut self) -> Option<&mut CommandCorrector> {
        self.corrector.as_mut()
    }

    /// Decide what to do with one utterance
    pub fn process(&mut self, utterance: &str, ctx: &mut PipelineContext) -> Decision {
        let utterance = self.autocorrect(utterance, ctx);
        let resolution = self.resolver.resolve_traced(&utterance, &ctx.recent);
        let interpretation = resolution.interpretation;
        if let ResolutionSource::Unparsable { reason, reply } = resolution.source {
            self.record_parse_failure(&utterance, &interpretation, &reason, &reply);
        }
        let now = self.clock.now();
        let state = self.snapshot(&interpretation);

        let analysis = self.analyzer.analyze(
            &utterance,
            &interpretation,
            &AnalysisContext::new(&ctx.recent, now.with_timezone(&Utc)),
        );

        let report = {
            let cctx = ConfidenceContext::new(&ctx.preferences, now)
                .with_recent(&ctx.recent)
                .with_analysis(&analysis)
                .with_state(&state)
                .with_learning(&self.learning);
            self.calculator.assess(&interpretation, &cctx)
        };
        let mut interpretation = interpretation;
        interpretation.set_confidence(report.score);
        info!(
            "'{}' -> {} {} (confidence {:.2}, {})",
            utterance,
            interpretation.command_type,
            interpretation.action,
            report.score,
            report.level
        );

        let decision = self.decide(&utterance, interpretation, analysis, report, &state, ctx);

        let interp = decision.interpretation();
        if interp.is_command && !matches!(decision, Decision::Clarify { .. }) {
            ctx.push(RecentCommand::from_interpretation(
                &utterance,
                interp,
                now.with_timezone(&Utc),
            ));
        }
        debug!("Decision: {}", decision.kind());
        decision
    }

    /// Settle a pending clarification with the user's reply, then validate
    pub fn clarify(
        &mut self,
        reply: &str,
        analysis: &AmbiguityAnalysis,
        selection: Option<usize>,
        ctx: &mut PipelineContext,
    ) -> Decision {
        let interpretation = self.resolver.resolve_ambiguity(reply, analysis, selection);
        if !interpretation.is_command {
            return Decision::Converse { interpretation };
        }

        let now = self.clock.now();
        let state = self.snapshot(&interpretation);
        let utterance = if interpretation.original_utterance.is_empty() {
            reply.to_string()
        } else {
            interpretation.original_utterance.clone()
        };
        let validation = self.run_validation(&utterance, &interpretation, &state, ctx);

        ctx.push(RecentCommand::from_interpretation(
            &utterance,
            &interpretation,
            now.with_timezone(&Utc),
        ));

        if validation.should_execute {
            Decision::Execute {
                interpretation,
                validation,
                confidence: None,
            }
        } else {
            Decision::Blocked {
                interpretation,
                validation,
            }
        }
    }

    /// `process` followed by `commit`
    pub fn execute(&mut self, utterance: &str, ctx: &mut PipelineContext) -> ExecutionReport {
        let decision = self.process(utterance, ctx);
        self.commit(decision)
    }

    /// Run an `Execute` decision through the adapter and record the outcome.
    /// Blocked and rejected commands are recorded as failures.
    pub fn commit(&mut self, decision: Decision) -> ExecutionReport {
        let (outcome, failure) = match &decision {
            Decision::Execute { interpretation, .. } => {
                let outcome = self.adapter.execute(interpretation);
                let failure = if outcome.success {
                    self.learning
                        .record_success(&interpretation.original_utterance, interpretation);
                    None
                } else {
                    let error = outcome.error.clone().unwrap_or_else(|| "execution_failed".into());
                    warn!("Adapter failed for {}: {}", interpretation.action, error);
                    Some(
                        failure_for(interpretation, &error, ErrorCategory::Execution)
                            .with_context("error", error.clone()),
                    )
                };
                (Some(outcome), failure)
            }
            Decision::Blocked {
                interpretation,
                validation,
            } => (
                None,
                Some(
                    failure_for(interpretation, "blocked", ErrorCategory::Validation)
                        .with_context("validation_issues", validation.blocking_issues.clone()),
                ),
            ),
            Decision::Reject { interpretation, .. } => (
                None,
                Some(failure_for(interpretation, "rejected", ErrorCategory::Misinterpretation)),
            ),
            _ => (None, None),
        };

        let improvements = match failure {
            Some(record) => self.learning.record_failure(record),
            None => Vec::new(),
        };
        if !improvements.is_empty() {
            self.resolver.refresh_instructions(self.learning.augmentation());
        }

        ExecutionReport {
            decision,
            outcome,
            improvements,
        }
    }

    /// Report that an executed command was not what the user meant
    pub fn record_misunderstanding(&mut self, interpretation: &Interpretation, said: &str) -> Vec<Improvement> {
        let record = failure_for(interpretation, "user_rejected", ErrorCategory::Misinterpretation)
            .with_context("user_feedback", said);
        let improvements = self.learning.record_failure(record);
        if !improvements.is_empty() {
            self.resolver.refresh_instructions(self.learning.augmentation());
        }
        improvements
    }

    /// An unusable classifier reply is a parsing failure even though the
    /// fallback table still produced an interpretation
    fn record_parse_failure(
        &mut self,
        utterance: &str,
        interpretation: &Interpretation,
        reason: &str,
        reply: &str,
    ) {
        let record = FailureRecord::for_interpretation(
            utterance,
            interpretation,
            "parse_error",
            ErrorCategory::Parsing,
        )
        .with_context("error", reason)
        .with_context("reply", reply);
        if !self.learning.record_failure(record).is_empty() {
            self.resolver.refresh_instructions(self.learning.augmentation());
        }
    }

    fn autocorrect(&self, utterance: &str, ctx: &PipelineContext) -> String {
        let Some(corrector) = &self.corrector else {
            return utterance.to_string();
        };
        match corrector.suggest_best_correction(utterance, &ctx.recent) {
            Some(corrected) if corrected != utterance.trim().to_lowercase() => {
                info!("Autocorrected '{}' -> '{}'", utterance, corrected);
                corrected
            }
            _ => utterance.to_string(),
        }
    }

    fn snapshot(&mut self, interpretation: &Interpretation) -> SystemStateSnapshot {
        let mut state = self.probe.sample();
        let needs_network = matches!(
            interpretation.command_type,
            CommandType::Music | CommandType::Content
        );
        if needs_network && state.network_reachable.is_none() {
            state.network_reachable = self.probe.network_reachable();
        }
        state
    }

    fn run_validation(
        &mut self,
        utterance: &str,
        interpretation: &Interpretation,
        state: &SystemStateSnapshot,
        ctx: &PipelineContext,
    ) -> ValidationOutcome {
        let vctx = ValidationContext {
            utterance,
            interpretation,
            state,
            recent: &ctx.recent,
            preferences: &ctx.preferences,
            now: self.clock.now(),
        };
        self.validator.validate(&vctx)
    }

    fn decide(
        &mut self,
        utterance: &str,
        mut interpretation: Interpretation,
        analysis: AmbiguityAnalysis,
        report: ConfidenceReport,
        state: &SystemStateSnapshot,
        ctx: &PipelineContext,
    ) -> Decision {
        if analysis.recommended_action == RecommendedAction::Clarify {
            let question = analysis
                .clarifying_questions
                .first()
                .cloned()
                .unwrap_or_else(|| "¿Puedes darme más detalles?".to_string());
            let mut clarification = Interpretation::conversation(0.9, &question)
                .with_utterance(utterance);
            clarification.action = roxy_common::Action::RequestClarification;
            clarification.needs_clarification = true;
            return Decision::Clarify {
                interpretation: clarification,
                analysis,
            };
        }

        if !interpretation.is_command {
            return Decision::Converse { interpretation };
        }

        if report.level == ConfidenceLevel::VeryLow || report.score < self.calculator.reject_floor() {
            return Decision::Reject {
                interpretation,
                confidence: report,
            };
        }

        if analysis.recommended_action == RecommendedAction::SuggestAlternatives {
            interpretation.natural_response = suggestion_text(&interpretation, &analysis);
        }

        let validation = self.run_validation(utterance, &interpretation, state, ctx);
        if !validation.should_execute {
            return Decision::Blocked {
                interpretation,
                validation,
            };
        }

        match report.level {
            ConfidenceLevel::VeryHigh | ConfidenceLevel::High => Decision::Execute {
                interpretation,
                validation,
                confidence: Some(report),
            },
            ConfidenceLevel::Medium => Decision::Confirm {
                interpretation,
                validation,
                confidence: report,
                explicit: false,
            },
            _ => Decision::Confirm {
                interpretation,
                validation,
                confidence: report,
                explicit: true,
            },
        }
    }
}

fn failure_for(interpretation: &Interpretation, actual: &str, category: ErrorCategory) -> FailureRecord {
    let category = if category == ErrorCategory::Execution
        && interpretation.confidence < MISINTERPRETATION_CONFIDENCE
    {
        ErrorCategory::Misinterpretation
    } else {
        category
    };
    FailureRecord::for_interpretation(
        &interpretation.original_utterance,
        interpretation,
        actual,
        category,
    )
    .with_context("command_type", interpretation.command_type.as_str())
    .with_context("confidence", interpretation.confidence)
}

fn suggestion_text(interpretation: &Interpretation, analysis: &AmbiguityAnalysis) -> String {
    let mut text = format!(
        "{}\nHe encontrado estas posibles interpretaciones:",
        interpretation.natural_response
    );
    for (i, alt) in analysis.alternative_interpretations.iter().enumerate() {
        text.push_str(&format!(
            "\n{}. {} {}",
            i + 1,
            alt.action,
            alt.target.as_deref().unwrap_or("")
        ));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::RecordingAdapter;
    use crate::config::LearningConfig;
    use crate::probe::FixedProbe;
    use roxy_common::{Action, FakeClassifier, FixedClock};
    use tempfile::TempDir;

    fn pipeline(dir: &TempDir, reply: serde_json::Value) -> (Pipeline, Arc<RecordingAdapter>) {
        let mut config = Config::default();
        config.learning = LearningConfig::at(dir.path().join("learning.json"));
        config.pipeline.autocorrect = false;
        let adapter = Arc::new(RecordingAdapter::new());
        let p = Pipeline::new(&config, Arc::new(FakeClassifier::always_json(reply)))
            .with_probe(Box::new(FixedProbe::new(
                SystemStateSnapshot::idle().with_load(20.0, 40.0),
            )))
            .with_clock(Box::new(FixedClock::at(2024, 5, 6, 12, 0)))
            .with_adapter(Box::new(adapter.clone()));
        (p, adapter)
    }

    #[test]
    fn test_context_cap() {
        let mut ctx = PipelineContext::new(2);
        let i = Interpretation::new(CommandType::App, Action::OpenApp, Some("chrome".into()), 0.9);
        for u in ["a", "b", "c"] {
            ctx.push(RecentCommand::from_interpretation(u, &i, Utc::now()));
        }
        assert_eq!(ctx.recent.len(), 2);
        assert_eq!(ctx.recent[0].utterance, "b");
    }

    #[test]
    fn test_conversation_is_not_executed() {
        let dir = TempDir::new().unwrap();
        let (mut p, adapter) = pipeline(
            &dir,
            serde_json::json!({"category": "conversation", "action": "chat", "confidence": 0.9}),
        );
        let mut ctx = PipelineContext::new(50);
        let report = p.execute("hola", &mut ctx);
        assert_eq!(report.decision.kind(), "converse");
        assert!(report.outcome.is_none());
        assert_eq!(adapter.count(), 0);
        assert!(ctx.recent.is_empty());
    }

    #[test]
    fn test_confirmed_becomes_execute() {
        let i = Interpretation::new(CommandType::App, Action::OpenApp, Some("chrome".into()), 0.6);
        let calc = ConfidenceCalculator::new(Default::default());
        let prefs = UserPreferences::default();
        let report = calc.assess(&i, &ConfidenceContext::new(&prefs, chrono::Local::now()));
        let d = Decision::Confirm {
            interpretation: i,
            validation: ValidationOutcome::pass(),
            confidence: report,
            explicit: false,
        };
        assert!(d.message().contains("¿Quieres que continúe?"));
        assert!(d.confirmed().is_execute());
    }

    #[test]
    fn test_blocked_message_lists_issues() {
        let mut v = ValidationOutcome::pass();
        v.should_execute = false;
        v.blocking_issues.push("CPU sobrecargada (92.0%)".into());
        let d = Decision::Blocked {
            interpretation: Interpretation::new(CommandType::App, Action::OpenApp, None, 0.9),
            validation: v,
        };
        assert_eq!(d.message(), "No puedo hacerlo ahora: CPU sobrecargada (92.0%)");
        assert_eq!(d.delay_seconds(), 0);
    }
}
