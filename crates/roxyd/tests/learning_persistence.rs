//! Learning store persistence tests
//!
//! Records written by one store (or pipeline) must be visible to the next
//! one opened on the same file.

use chrono::{Duration, Utc};
use roxy_common::{
    Action, CommandType, ErrorCategory, FailureRecord, FakeClassifier, FixedClock, Interpretation,
    SystemStateSnapshot,
};
use roxyd::config::LearningConfig;
use roxyd::learning::{ImprovementKind, LearningStore, AUGMENTATION_BANNER};
use roxyd::probe::FixedProbe;
use roxyd::{Config, Pipeline, PipelineContext};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn config_in(dir: &TempDir) -> LearningConfig {
    LearningConfig::at(dir.path().join("learning.json"))
}

fn parsing_failure(utterance: &str) -> FailureRecord {
    let i = Interpretation::new(CommandType::Music, Action::SearchMusic, Some("jazz".into()), 0.45);
    FailureRecord::for_interpretation(utterance, &i, "parse_error", ErrorCategory::Parsing)
}

#[test]
fn test_parsing_failures_become_examples() {
    let dir = TempDir::new().unwrap();
    let mut store = LearningStore::open(config_in(&dir));

    let utterances = [
        "ponme algo de jazz",
        "quiero jazz suave",
        "jazz por favor",
        "algo de jazz tranquilo",
        "música jazz ya",
    ];
    let mut improvements = Vec::new();
    for u in utterances {
        improvements.extend(store.record_failure(parsing_failure(u)));
    }

    assert!(improvements
        .iter()
        .any(|i| i.kind == ImprovementKind::PromptEnhancement && i.category == "parsing"));

    let text = store.instruction_augmentation();
    assert!(text.trim_start().starts_with(AUGMENTATION_BANNER));
    let quoted = utterances.iter().filter(|u| text.contains(*u)).count();
    assert_eq!(quoted, 3);
    // The newest examples are the ones kept
    assert!(text.contains("música jazz ya"));
    assert!(!text.contains("ponme algo de jazz"));
}

#[test]
fn test_records_survive_reopen_unchanged() {
    let dir = TempDir::new().unwrap();
    let failure = parsing_failure("pon eso")
        .with_context("error", "empty reply")
        .with_context("attempts", 2);
    let success = {
        let mut store = LearningStore::open(config_in(&dir));
        store.record_failure(failure.clone());
        let ok = Interpretation::new(CommandType::App, Action::OpenApp, Some("chrome".into()), 0.9);
        store.record_success("abre chrome", &ok);
        store.successes()[0].clone()
    };

    let store = LearningStore::open(config_in(&dir));
    assert_eq!(store.failures(), &[failure.clone()]);
    assert_eq!(store.successes(), &[success.clone()]);

    let f = &store.failures()[0];
    assert_eq!(f.intended_action, "search_music jazz");
    assert_eq!(f.action, Action::SearchMusic);
    assert_eq!(f.actual_result, "parse_error");
    assert_eq!(f.command_type, CommandType::Music);
    assert_eq!(f.confidence, 0.45);
    assert_eq!(f.timestamp, failure.timestamp);
    assert_eq!(f.context.get("attempts"), Some(&json!(2)));

    assert_eq!(success.utterance, "abre chrome");
    assert_eq!(store.success_counts(Action::OpenApp, CommandType::App), (1, 1));
}

#[test]
fn test_stale_failures_are_pruned_on_open() {
    let dir = TempDir::new().unwrap();
    {
        let mut store = LearningStore::open(config_in(&dir));
        store.record_failure(parsing_failure("viejo").at(Utc::now() - Duration::days(30)));
        store.record_failure(parsing_failure("nuevo"));
    }

    let store = LearningStore::open(config_in(&dir));
    let kept: Vec<&str> = store.failures().iter().map(|f| f.utterance.as_str()).collect();
    assert_eq!(kept, vec!["nuevo"]);
}

#[test]
fn test_augmentation_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let augmentation = {
        let mut store = LearningStore::open(config_in(&dir));
        for n in 0..5 {
            store.record_failure(parsing_failure(&format!("jazz {}", n)));
        }
        store.augmentation().clone()
    };
    let version = augmentation.version;
    assert!(version > 0);
    assert!(!augmentation.blocks.is_empty());

    let store = LearningStore::open(config_in(&dir));
    assert_eq!(store.augmentation(), &augmentation);
    assert_eq!(store.instruction_augmentation(), augmentation.render());
    assert!(store.instruction_augmentation().contains("EJEMPLOS PROBLEMÁTICOS"));
    assert_eq!(store.stats().augmentation_version, version);
}

#[test]
fn test_new_pipeline_loads_learned_instructions() {
    let dir = TempDir::new().unwrap();
    {
        let mut store = LearningStore::open(config_in(&dir));
        for n in 0..5 {
            store.record_failure(parsing_failure(&format!("jazz {}", n)));
        }
    }

    let mut config = Config::default();
    config.learning = config_in(&dir);
    config.pipeline.autocorrect = false;

    let classifier = Arc::new(FakeClassifier::always_json(json!({
        "category": "app",
        "action": "open_app",
        "target": "chrome",
        "confidence": 0.9
    })));
    let mut pipeline = Pipeline::new(&config, classifier.clone())
        .with_probe(Box::new(FixedProbe::new(SystemStateSnapshot::idle())))
        .with_clock(Box::new(FixedClock::at(2024, 5, 6, 12, 0)));
    assert!(pipeline
        .resolver()
        .instructions()
        .render()
        .contains("EJEMPLOS PROBLEMÁTICOS"));

    let mut ctx = PipelineContext::new(10);
    pipeline.process("abre chrome", &mut ctx);
    let (instructions, utterance) = classifier.calls().pop().unwrap();
    assert_eq!(utterance, "abre chrome");
    assert!(instructions.contains("jazz 4"));
}
