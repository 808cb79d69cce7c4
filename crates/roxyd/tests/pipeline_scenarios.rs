//! Pipeline scenario tests
//!
//! End-to-end runs of `Pipeline` with a scripted classifier, a fixed
//! system snapshot and a fixed clock. No network, no live probe.

use roxy_common::{
    Action, AmbiguityKind, CommandType, ErrorCategory, FakeClassifier, FixedClock,
    SystemStateSnapshot,
};
use roxyd::adapters::RecordingAdapter;
use roxyd::config::LearningConfig;
use roxyd::corrector::CommandCorrector;
use roxyd::learning::AUGMENTATION_BANNER;
use roxyd::probe::FixedProbe;
use roxyd::{Config, Decision, Pipeline, PipelineContext};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    pipeline: Pipeline,
    classifier: Arc<FakeClassifier>,
    adapter: Arc<RecordingAdapter>,
    ctx: PipelineContext,
    _dir: TempDir,
}

fn harness(reply: Value, state: SystemStateSnapshot) -> Harness {
    harness_with(Arc::new(FakeClassifier::always_json(reply)), state, RecordingAdapter::new())
}

fn harness_with(
    classifier: Arc<FakeClassifier>,
    state: SystemStateSnapshot,
    adapter: RecordingAdapter,
) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.learning = LearningConfig::at(dir.path().join("learning.json"));
    config.pipeline.autocorrect = false;

    let adapter = Arc::new(adapter);
    let pipeline = Pipeline::new(&config, classifier.clone())
        .with_probe(Box::new(FixedProbe::new(state)))
        // Monday noon
        .with_clock(Box::new(FixedClock::at(2024, 5, 6, 12, 0)))
        .with_adapter(Box::new(adapter.clone()));

    Harness {
        pipeline,
        classifier,
        adapter,
        ctx: PipelineContext::new(50),
        _dir: dir,
    }
}

fn open_app(app: &str) -> Value {
    json!({
        "category": "app",
        "action": "open_app",
        "target": app,
        "confidence": 0.9,
        "execution_data": {"app_name": app}
    })
}

fn calm() -> SystemStateSnapshot {
    SystemStateSnapshot::idle().with_load(20.0, 40.0)
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_clear_app_command_executes() {
    let mut h = harness(open_app("spotify"), calm());
    let report = h.pipeline.execute("abre spotify", &mut h.ctx);

    match &report.decision {
        Decision::Execute {
            interpretation,
            validation,
            ..
        } => {
            assert!(validation.should_execute);
            assert!(validation.blocking_issues.is_empty());
            assert!(interpretation.confidence >= 0.7, "confidence {}", interpretation.confidence);
            assert_eq!(interpretation.target.as_deref(), Some("spotify"));
        }
        other => panic!("expected execute, got {}", other.kind()),
    }
    assert_eq!(report.outcome.as_ref().map(|o| o.success), Some(true));
    assert_eq!(h.adapter.count(), 1);
    assert_eq!(h.pipeline.learning().successes().len(), 1);
    assert_eq!(h.ctx.recent.len(), 1);
}

#[test]
fn test_bare_verb_asks_for_clarification() {
    let reply = json!({"category": "music", "action": "search_music", "confidence": 0.9});
    let mut h = harness(reply, calm());
    let report = h.pipeline.execute("pon", &mut h.ctx);

    let Decision::Clarify {
        interpretation,
        analysis,
    } = &report.decision
    else {
        panic!("expected clarify, got {}", report.decision.kind());
    };
    let incomplete = analysis
        .signals
        .iter()
        .find(|s| s.kind == AmbiguityKind::IncompleteCommand)
        .expect("incomplete_command signal");
    assert!(incomplete.severity >= 0.8);
    assert!(interpretation.needs_clarification);
    assert_eq!(interpretation.action, Action::RequestClarification);
    assert_eq!(report.decision.message(), "¿Qué quieres que ponga?");
    assert_eq!(h.adapter.count(), 0);
    assert!(h.ctx.recent.is_empty());
}

#[test]
fn test_sixth_command_in_a_minute_is_blocked() {
    let mut h = harness(open_app("chrome"), calm());

    for n in 1..=5 {
        let d = h.pipeline.process("abre chrome", &mut h.ctx);
        assert!(
            !matches!(d, Decision::Blocked { .. } | Decision::Clarify { .. }),
            "call {} was {}",
            n,
            d.kind()
        );
    }

    let sixth = h.pipeline.process("abre chrome", &mut h.ctx);
    let Decision::Blocked { validation, .. } = &sixth else {
        panic!("expected blocked, got {}", sixth.kind());
    };
    assert!(!validation.should_execute);
    assert!(validation
        .blocking_issues
        .iter()
        .any(|b| b.contains("Demasiados comandos recientes")));
}

#[test]
fn test_cpu_overload_blocks_app_launch() {
    let mut h = harness(open_app("spotify"), SystemStateSnapshot::idle().with_load(90.0, 40.0));
    let report = h.pipeline.execute("abre spotify", &mut h.ctx);

    let Decision::Blocked { validation, .. } = &report.decision else {
        panic!("expected blocked, got {}", report.decision.kind());
    };
    assert!(validation.blocking_issues[0].contains("CPU sobrecargada"));
    assert!(report.decision.message().contains("CPU sobrecargada"));
    assert_eq!(h.adapter.count(), 0);

    let failures = h.pipeline.learning().failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].error_category, ErrorCategory::Validation);
    assert!(failures[0].context.contains_key("validation_issues"));
}

#[test]
fn test_repeated_blocks_feed_back_into_instructions() {
    let mut h = harness(open_app("spotify"), SystemStateSnapshot::idle().with_load(90.0, 40.0));
    let before = h.pipeline.resolver().instructions().version();

    let mut improvements = Vec::new();
    for _ in 0..5 {
        let report = h.pipeline.execute("abre spotify", &mut h.ctx);
        assert_eq!(report.decision.kind(), "blocked");
        improvements.extend(report.improvements);
    }

    assert!(!improvements.is_empty());
    assert!(h.pipeline.resolver().instructions().version() > before);
    let rendered = h.pipeline.resolver().instructions().render();
    assert!(rendered.contains(AUGMENTATION_BANNER));
    assert!(rendered.contains("MEJORA PARA APP"));

    // The next classifier call carries the learned text
    h.pipeline.process("abre spotify", &mut h.ctx);
    let (instructions, _) = h.classifier.calls().pop().unwrap();
    assert!(instructions.contains("MEJORA PARA APP"));
}

// ============================================================================
// Other paths
// ============================================================================

#[test]
fn test_similar_target_suggests_alternatives() {
    let mut h = harness(open_app("youtube"), calm());
    let d = h.pipeline.process("abre youtube", &mut h.ctx);

    assert!(d.is_execute(), "got {}", d.kind());
    assert!(d
        .interpretation()
        .natural_response
        .contains("He encontrado estas posibles interpretaciones"));
}

#[test]
fn test_adapter_failure_is_recorded() {
    let mut h = harness_with(
        Arc::new(FakeClassifier::always_json(open_app("steam"))),
        calm(),
        RecordingAdapter::new().failing_on("steam"),
    );
    let report = h.pipeline.execute("abre steam", &mut h.ctx);

    assert!(report.decision.is_execute());
    assert_eq!(report.outcome.as_ref().map(|o| o.success), Some(false));
    let failures = h.pipeline.learning().failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].error_category, ErrorCategory::Execution);
    assert_eq!(failures[0].utterance, "abre steam");
    assert!(failures[0].context.contains_key("error"));
}

#[test]
fn test_unreachable_classifier_uses_fallback() {
    let mut h = harness_with(Arc::new(FakeClassifier::unreachable()), calm(), RecordingAdapter::new());
    let d = h.pipeline.process("abre chrome", &mut h.ctx);

    assert!(d.is_execute(), "got {}", d.kind());
    assert_eq!(d.interpretation().action, Action::OpenApp);
    assert_eq!(d.interpretation().command_type, CommandType::App);
}

#[test]
fn test_malformed_replies_teach_the_classifier() {
    let classifier = Arc::new(FakeClassifier::always_text("Claro, ahora mismo lo pongo"));
    let mut h = harness_with(classifier.clone(), calm(), RecordingAdapter::new());
    let before = h.pipeline.resolver().instructions().version();

    for n in 0..5 {
        let d = h.pipeline.process(&format!("pon algo de jazz {}", n), &mut h.ctx);
        assert!(!d.is_execute(), "got {}", d.kind());
    }

    let failures = h.pipeline.learning().failures();
    assert_eq!(failures.len(), 5);
    assert!(failures
        .iter()
        .all(|f| f.error_category == ErrorCategory::Parsing && f.actual_result == "parse_error"));
    assert_eq!(
        failures[0].context.get("reply"),
        Some(&json!("Claro, ahora mismo lo pongo"))
    );

    assert!(h.pipeline.resolver().instructions().version() > before);
    let rendered = h.pipeline.resolver().instructions().render();
    assert!(rendered.contains("EJEMPLOS PROBLEMÁTICOS A MEJORAR:"));
    assert!(rendered.contains("pon algo de jazz 4"));

    h.pipeline.process("pon algo de jazz", &mut h.ctx);
    let (instructions, _) = classifier.calls().pop().unwrap();
    assert!(instructions.contains("EJEMPLOS PROBLEMÁTICOS A MEJORAR:"));
}

#[test]
fn test_unreachable_classifier_is_not_a_parsing_failure() {
    let mut h = harness_with(Arc::new(FakeClassifier::unreachable()), calm(), RecordingAdapter::new());
    h.pipeline.process("hola", &mut h.ctx);
    assert!(h.pipeline.learning().failures().is_empty());
}

#[test]
fn test_conversation_is_answered_not_executed() {
    let reply = json!({"category": "conversation", "action": "chat", "confidence": 0.95});
    let mut h = harness(reply, calm());
    let report = h.pipeline.execute("qué tal estás", &mut h.ctx);

    assert_eq!(report.decision.kind(), "converse");
    assert!(report.outcome.is_none());
    assert_eq!(h.adapter.count(), 0);
}

#[test]
fn test_music_without_network_is_blocked() {
    let reply = json!({
        "category": "music",
        "action": "search_music",
        "target": "rock clásico",
        "confidence": 0.9
    });
    let mut h = harness(reply, calm().with_network(false));
    let d = h.pipeline.process("pon rock clásico", &mut h.ctx);

    let Decision::Blocked { validation, .. } = &d else {
        panic!("expected blocked, got {}", d.kind());
    };
    assert!(validation
        .blocking_issues
        .contains(&"Sin conexión a internet".to_string()));
}

#[test]
fn test_clarification_reply_selects_alternative() {
    let reply = json!({"category": "music", "action": "search_music", "confidence": 0.9});
    let mut h = harness(reply, calm());
    let d = h.pipeline.process("pon", &mut h.ctx);
    let Decision::Clarify { analysis, .. } = d else {
        panic!("expected clarify");
    };

    let resolved = h.pipeline.clarify("1", &analysis, Some(1), &mut h.ctx);
    assert!(resolved.is_execute(), "got {}", resolved.kind());
    assert_eq!(resolved.interpretation().confidence, 0.8);
    assert!(!resolved.interpretation().needs_clarification);
    assert_eq!(h.ctx.recent.len(), 1);
}

#[test]
fn test_typo_is_corrected_before_classification() {
    let dir = TempDir::new().unwrap();
    let classifier = Arc::new(FakeClassifier::always_json(open_app("chrome")));
    let mut h = harness_with(classifier.clone(), calm(), RecordingAdapter::new());
    h.pipeline = h
        .pipeline
        .with_corrector(Some(CommandCorrector::open(&dir.path().join("corrections.json"))));

    h.pipeline.process("abre crome", &mut h.ctx);
    let (_, utterance) = classifier.calls().pop().unwrap();
    assert_eq!(utterance, "abre chrome");
    assert_eq!(h.ctx.recent[0].utterance, "abre chrome");
}

#[test]
fn test_validation_history_is_kept() {
    let mut h = harness(open_app("spotify"), calm());
    h.pipeline.process("abre spotify", &mut h.ctx);
    h.pipeline.process("abre spotify", &mut h.ctx);

    let stats = h.pipeline.validator().stats();
    assert_eq!(stats.total_validations, 2);
    assert_eq!(stats.executed, 2);
    assert_eq!(stats.blocked, 0);
    assert_eq!(stats.execution_rate, 1.0);
}
