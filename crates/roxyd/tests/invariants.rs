//! Invariants across a grid of utterances, interpretations and system states

use chrono::{Duration, Utc};
use roxy_common::{
    Action, Clock, CommandType, FixedClock, Interpretation, RecentCommand, SystemStateSnapshot,
    UserPreferences,
};
use roxyd::ambiguity::{AmbiguityAnalyzer, AnalysisContext};
use roxyd::confidence::{ConfidenceCalculator, ConfidenceContext, ConfidenceLevel};
use roxyd::config::{AmbiguityConfig, ConfidenceConfig, ValidationConfig};
use roxyd::validator::{PreExecutionValidator, ValidationContext};

fn utterances() -> Vec<&'static str> {
    vec![
        "",
        "pon",
        "abre",
        "abre spotify",
        "abre chrome y spotify",
        "pon la anterior",
        "siguiente",
        "busca recetas",
        "pon eso en youtube o spotify",
        "abre crome",
        "qué hora es",
    ]
}

fn interpretations() -> Vec<Interpretation> {
    let mut out = Vec::new();
    for confidence in [0.0, 0.2, 0.5, 0.75, 1.0] {
        out.push(Interpretation::new(CommandType::App, Action::OpenApp, Some("spotify".into()), confidence));
        out.push(Interpretation::new(CommandType::Music, Action::SearchMusic, None, confidence));
        out.push(Interpretation::new(CommandType::Music, Action::ControlMusic, Some("next".into()), confidence));
        out.push(Interpretation::new(CommandType::Content, Action::SearchContent, Some("youtube".into()), confidence));
        out.push(Interpretation::new(CommandType::App, Action::OpenApp, Some("chrome".into()), confidence));
    }
    out
}

fn states() -> Vec<SystemStateSnapshot> {
    vec![
        SystemStateSnapshot::idle(),
        SystemStateSnapshot::idle().with_load(95.0, 95.0),
        SystemStateSnapshot::idle()
            .with_load(50.0, 70.0)
            .with_idle_seconds(5.0)
            .with_free_disk_gb(0.5)
            .with_network(false)
            .with_audio(false)
            .with_processes(["spotify", "vlc", "youtube", "teams"]),
    ]
}

fn history(now: chrono::DateTime<Utc>) -> Vec<RecentCommand> {
    let i = Interpretation::new(CommandType::Music, Action::SearchMusic, Some("rock".into()), 0.9);
    (0..8)
        .map(|n| RecentCommand::from_interpretation("pon rock", &i, now - Duration::seconds(5 * n)))
        .rev()
        .collect()
}

#[test]
fn test_ambiguity_flag_matches_score_and_signals() {
    let config = AmbiguityConfig::default();
    let threshold = config.threshold;
    let analyzer = AmbiguityAnalyzer::new(config);
    let now = Utc::now();
    let recent = history(now);

    for utterance in utterances() {
        for interp in interpretations() {
            for recent in [&recent[..0], &recent[..]] {
                let a = analyzer.analyze(utterance, &interp, &AnalysisContext::new(recent, now));
                assert!((0.0..=1.0).contains(&a.score), "{} -> {}", utterance, a.score);
                assert_eq!(
                    a.has_ambiguity,
                    a.score > threshold || !a.signals.is_empty(),
                    "{}",
                    utterance
                );
                assert!(!a.alternative_interpretations.is_empty());
                for s in &a.signals {
                    assert!((0.0..=1.0).contains(&s.severity));
                }
            }
        }
    }
}

#[test]
fn test_confidence_is_a_unit_score() {
    let analyzer = AmbiguityAnalyzer::new(AmbiguityConfig::default());
    let calculator = ConfidenceCalculator::new(ConfidenceConfig::default());
    let preferences = UserPreferences::default();
    let now = Utc::now();
    let recent = history(now);

    for hour in [3, 12, 22] {
        let clock = FixedClock::at(2024, 5, 6, hour, 0);
        for utterance in utterances() {
            for interp in interpretations() {
                for state in states() {
                    let analysis =
                        analyzer.analyze(utterance, &interp, &AnalysisContext::new(&recent, now));
                    let ctx = ConfidenceContext::new(&preferences, clock.now())
                        .with_recent(&recent)
                        .with_analysis(&analysis)
                        .with_state(&state);
                    let report = calculator.assess(&interp, &ctx);

                    assert!((0.0..=1.0).contains(&report.score), "{}", report.score);
                    let f = report.factors;
                    for v in [f.classifier, f.historical, f.clarity, f.pattern, f.system, f.ambiguity] {
                        assert!((0.0..=1.0).contains(&v));
                    }
                    assert_eq!(
                        report.level,
                        ConfidenceLevel::from_score(report.score, &calculator.config().thresholds)
                    );
                }
            }
        }
    }
}

#[test]
fn test_validation_verdict_is_consistent() {
    let mut validator = PreExecutionValidator::new(ValidationConfig::default());
    let preferences = UserPreferences::default();
    let now = Utc::now();
    let recent = history(now);

    for hour in [2, 10, 23] {
        let clock = FixedClock::at(2024, 5, 6, hour, 30);
        for interp in interpretations() {
            for state in states() {
                for recent in [&recent[..0], &recent[..]] {
                    let outcome = validator.validate(&ValidationContext {
                        utterance: "test",
                        interpretation: &interp,
                        state: &state,
                        recent,
                        preferences: &preferences,
                        now: clock.now(),
                    });

                    assert!((0.0..=1.0).contains(&outcome.confidence_score));
                    assert_eq!(
                        outcome.should_execute,
                        outcome.blocking_issues.is_empty() && outcome.confidence_score > 0.3
                    );
                    if !outcome.blocking_issues.is_empty() {
                        assert!(outcome.confidence_score <= 0.3 + 1e-9);
                    }
                }
            }
        }
    }

    let stats = validator.stats();
    assert_eq!(stats.executed + stats.blocked, stats.total_validations);
}
