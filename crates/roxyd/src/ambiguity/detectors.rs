//! Ambiguity detectors.
//!
//! Each detector looks at one kind of problem and returns zero or more
//! signals. Detectors hold no mutable state; thresholds come from config
//! when the analyzer builds them.

use chrono::{DateTime, Utc};
use regex::Regex;
use roxy_common::{
    Action, AmbiguityKind, AmbiguitySignal, CommandType, Interpretation, RecentCommand,
};
use serde_json::json;

use super::catalog::{apps_mentioned, similar_apps, AMBIGUOUS_TERMS};

/// Recent commands detectors look at
pub const DETECTOR_HISTORY: usize = 10;

/// What detectors may know besides the utterance itself
#[derive(Debug, Clone)]
pub struct AnalysisContext<'a> {
    /// Prior commands, oldest first
    pub recent: &'a [RecentCommand],
    pub now: DateTime<Utc>,
    /// Whether anything is known about what is playing
    pub media_state_known: bool,
}

impl<'a> AnalysisContext<'a> {
    /// Context over the last few commands; media state counts as known
    /// once a music or content command has run
    pub fn new(recent: &'a [RecentCommand], now: DateTime<Utc>) -> Self {
        let recent = &recent[recent.len().saturating_sub(DETECTOR_HISTORY)..];
        let media_state_known = recent
            .iter()
            .any(|r| matches!(r.command_type, CommandType::Music | CommandType::Content));
        Self {
            recent,
            now,
            media_state_known,
        }
    }
}

/// One independent ambiguity check
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    fn detect(
        &self,
        utterance: &str,
        interpretation: &Interpretation,
        ctx: &AnalysisContext<'_>,
    ) -> Vec<AmbiguitySignal>;
}

/// Lowercased words with surrounding punctuation removed
fn words(utterance: &str) -> Vec<String> {
    utterance
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '+')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

fn ask_about_apps(apps: &[&str], verb: &str) -> Vec<String> {
    apps.iter()
        .take(3)
        .map(|a| format!("¿{} {}?", verb, a))
        .collect()
}

// ============================================================================
// 1. Multiple interpretations
// ============================================================================

pub struct MultipleInterpretationsDetector;

impl Detector for MultipleInterpretationsDetector {
    fn name(&self) -> &'static str {
        "multiple_interpretations"
    }

    fn detect(
        &self,
        utterance: &str,
        interpretation: &Interpretation,
        _ctx: &AnalysisContext<'_>,
    ) -> Vec<AmbiguitySignal> {
        let tokens = words(utterance);
        let lower = utterance.to_lowercase();
        let target = interpretation.target_lower();
        let mut signals = Vec::new();

        for (term, apps) in AMBIGUOUS_TERMS {
            // Only when the generic word is what the user asked for
            let term_is_target = target.as_deref().map_or(true, |t| t.contains(term));
            if !tokens.iter().any(|w| w == term) || !term_is_target {
                continue;
            }
            if apps.iter().any(|a| lower.contains(a)) {
                continue;
            }
            signals.push(
                AmbiguitySignal::new(
                    AmbiguityKind::MultipleInterpretations,
                    0.7,
                    format!("Término ambiguo '{}' puede referirse a múltiples aplicaciones", term),
                )
                .with_questions(ask_about_apps(apps, "Te refieres a"))
                .with_evidence("term", *term)
                .with_evidence("possible_apps", json!(apps)),
            );
        }

        if let Some(t) = target {
            let similar = similar_apps(&t);
            if similar.len() > 1 {
                signals.push(
                    AmbiguitySignal::new(
                        AmbiguityKind::MultipleInterpretations,
                        0.6,
                        format!("Objetivo '{}' similar a múltiples aplicaciones", t),
                    )
                    .with_questions(ask_about_apps(&similar, "Te refieres a"))
                    .with_evidence("target", t.clone())
                    .with_evidence("possible_apps", json!(similar)),
                );
            }
        }

        signals
    }
}

// ============================================================================
// 2. Incomplete command
// ============================================================================

const VERB_QUESTIONS: &[(&[&str], &str)] = &[
    (&["abre", "abrir"], "¿Qué aplicación quieres abrir?"),
    (&["pon", "poner", "play"], "¿Qué quieres que ponga?"),
    (&["reproduce", "reproducir"], "¿Qué música o video quieres reproducir?"),
    (&["busca", "buscar"], "¿Qué quieres buscar?"),
    (&["cambia", "cambiar"], "¿Qué configuración quieres cambiar?"),
    (&["para", "parar"], "¿Qué quieres parar?"),
    (&["cierra", "cerrar"], "¿Qué aplicación quieres cerrar?"),
];

/// Words that do not name anything on their own
const FILLERS: &[&str] = &["de", "el", "la", "lo", "los", "las", "un", "una", "me", "algo"];

pub struct IncompleteCommandDetector;

impl IncompleteCommandDetector {
    fn verb_question(verb: &str) -> Option<&'static str> {
        VERB_QUESTIONS
            .iter()
            .find(|(verbs, _)| verbs.contains(&verb))
            .map(|(_, q)| *q)
    }
}

impl Detector for IncompleteCommandDetector {
    fn name(&self) -> &'static str {
        "incomplete_command"
    }

    fn detect(
        &self,
        utterance: &str,
        interpretation: &Interpretation,
        _ctx: &AnalysisContext<'_>,
    ) -> Vec<AmbiguitySignal> {
        let tokens = words(utterance);
        let Some(first) = tokens.first() else {
            return Vec::new();
        };

        // Bare control verbs ("para", "siguiente") are complete commands
        let self_contained = matches!(
            interpretation.action,
            Action::ControlMusic | Action::ControlMedia | Action::StartAutoDj | Action::StopAutoDj
        );

        if let Some(question) = Self::verb_question(first) {
            let rest_is_filler = tokens[1..].iter().all(|w| FILLERS.contains(&w.as_str()));
            if rest_is_filler && interpretation.target.is_none() && !self_contained {
                return vec![AmbiguitySignal::new(
                    AmbiguityKind::IncompleteCommand,
                    0.85,
                    format!("Comando incompleto: '{}' sin objeto", first),
                )
                .with_question(question)
                .with_evidence("verb", first.clone())];
            }
        }

        if tokens.len() <= 2 && interpretation.confidence < 0.6 {
            return vec![AmbiguitySignal::new(
                AmbiguityKind::IncompleteCommand,
                0.6,
                "Comando muy corto con baja confianza",
            )
            .with_questions(["¿Puedes ser más específico?", "¿Qué exactamente quieres hacer?"])
            .with_evidence("word_count", tokens.len())];
        }

        Vec::new()
    }
}

// ============================================================================
// 3. Missing context
// ============================================================================

const REFERRING_WORDS: &[&str] = &[
    "anterior", "último", "ultimo", "pasado", "previo", "ese", "esa", "eso",
];

const STATE_WORDS: &[&str] = &[
    "siguiente", "anterior", "continúa", "continua", "reanuda", "para",
];

pub struct MissingContextDetector;

impl Detector for MissingContextDetector {
    fn name(&self) -> &'static str {
        "missing_context"
    }

    fn detect(
        &self,
        utterance: &str,
        interpretation: &Interpretation,
        ctx: &AnalysisContext<'_>,
    ) -> Vec<AmbiguitySignal> {
        let tokens = words(utterance);
        let mut signals = Vec::new();

        let referring: Vec<&str> = REFERRING_WORDS
            .iter()
            .copied()
            .filter(|w| tokens.iter().any(|t| t == w))
            .collect();
        if !referring.is_empty() && ctx.recent.is_empty() {
            signals.push(
                AmbiguitySignal::new(
                    AmbiguityKind::MissingContext,
                    0.7,
                    "Referencia a contexto previo sin historial",
                )
                .with_questions([
                    "¿A qué te refieres específicamente?",
                    "¿Puedes ser más específico sobre lo que mencionas?",
                ])
                .with_evidence("words", json!(referring)),
            );
        }

        let is_control = matches!(
            interpretation.action,
            Action::ControlMusic | Action::ControlMedia
        );
        let state_words: Vec<&str> = STATE_WORDS
            .iter()
            .copied()
            .filter(|w| tokens.iter().any(|t| t == w))
            .collect();
        if is_control && !state_words.is_empty() && !ctx.media_state_known {
            signals.push(
                AmbiguitySignal::new(
                    AmbiguityKind::MissingContext,
                    0.6,
                    "El comando depende de lo que se esté reproduciendo",
                )
                .with_questions([
                    "¿Hay algo reproduciéndose actualmente?",
                    "¿En qué aplicación quieres realizar esta acción?",
                ])
                .with_evidence("words", json!(state_words)),
            );
        }

        signals
    }
}

// ============================================================================
// 4. History conflict
// ============================================================================

/// (previous action, current action, description)
const HISTORY_CONFLICTS: &[(Action, Action, &str)] = &[
    (
        Action::OpenApp,
        Action::SearchMusic,
        "Cambio rápido de abrir app a reproducir música",
    ),
    (
        Action::SearchMusic,
        Action::OpenApp,
        "Cambio rápido de música a abrir aplicación",
    ),
    (
        Action::ControlMusic,
        Action::SearchContent,
        "Cambio de control de música a búsqueda de contenido",
    ),
];

pub struct HistoryConflictDetector {
    pub window_secs: i64,
}

impl Detector for HistoryConflictDetector {
    fn name(&self) -> &'static str {
        "history_conflict"
    }

    fn detect(
        &self,
        _utterance: &str,
        interpretation: &Interpretation,
        ctx: &AnalysisContext<'_>,
    ) -> Vec<AmbiguitySignal> {
        let Some(last) = ctx.recent.last() else {
            return Vec::new();
        };
        let elapsed = (ctx.now - last.timestamp).num_seconds();
        if elapsed < 0 || elapsed > self.window_secs {
            return Vec::new();
        }

        HISTORY_CONFLICTS
            .iter()
            .filter(|(prev, cur, _)| *prev == last.action && *cur == interpretation.action)
            .map(|(_, _, description)| {
                AmbiguitySignal::new(AmbiguityKind::HistoryConflict, 0.5, *description)
                    .with_questions([
                        "¿Quieres cancelar la acción anterior?",
                        "¿Confirmas que quieres hacer esto ahora?",
                    ])
                    .with_evidence("previous_utterance", last.utterance.clone())
                    .with_evidence("seconds_since", elapsed)
            })
            .collect()
    }
}

// ============================================================================
// 5. Low confidence
// ============================================================================

pub struct LowConfidenceDetector {
    pub threshold: f64,
}

impl Detector for LowConfidenceDetector {
    fn name(&self) -> &'static str {
        "low_confidence"
    }

    fn detect(
        &self,
        _utterance: &str,
        interpretation: &Interpretation,
        _ctx: &AnalysisContext<'_>,
    ) -> Vec<AmbiguitySignal> {
        let confidence = interpretation.confidence;
        if confidence >= self.threshold {
            return Vec::new();
        }
        vec![AmbiguitySignal::new(
            AmbiguityKind::LowConfidence,
            1.0 - confidence,
            format!("Baja confianza en la interpretación ({:.2})", confidence),
        )
        .with_questions([
            "¿Es esto lo que querías hacer?",
            "¿Puedes reformular tu solicitud?",
            "¿Necesitas ayuda para especificar mejor lo que buscas?",
        ])
        .with_evidence("confidence", confidence)]
    }
}

// ============================================================================
// 6. Conflicting targets
// ============================================================================

pub struct ConflictingTargetsDetector;

impl Detector for ConflictingTargetsDetector {
    fn name(&self) -> &'static str {
        "conflicting_targets"
    }

    fn detect(
        &self,
        utterance: &str,
        _interpretation: &Interpretation,
        _ctx: &AnalysisContext<'_>,
    ) -> Vec<AmbiguitySignal> {
        let apps = apps_mentioned(utterance);
        if apps.len() <= 1 {
            return Vec::new();
        }
        vec![AmbiguitySignal::new(
            AmbiguityKind::ConflictingTargets,
            0.6,
            format!("Múltiples aplicaciones mencionadas: {}", apps.join(", ")),
        )
        .with_questions(ask_about_apps(&apps, "Quieres abrir"))
        .with_evidence("apps", json!(apps))]
    }
}

// ============================================================================
// 7. Vague references
// ============================================================================

const VAGUE_PATTERNS: &[(&str, &str)] = &[
    (r"\b(algo|alguna|algún)\s+de\s+", "Referencia vaga a contenido"),
    (r"\b(esa|ese|eso)\s+", "Pronombre demostrativo sin antecedente claro"),
    (r"\b(lo|la)\s+de\s+", "Referencia indirecta"),
    (r"\b(como\s+antes|igual\s+que|similar\s+a)\b", "Comparación sin referente claro"),
];

pub struct VagueReferenceDetector {
    patterns: Vec<(Regex, &'static str)>,
}

impl VagueReferenceDetector {
    pub fn new() -> Self {
        let patterns = VAGUE_PATTERNS
            .iter()
            .filter_map(|(p, d)| Regex::new(p).ok().map(|r| (r, *d)))
            .collect();
        Self { patterns }
    }
}

impl Default for VagueReferenceDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for VagueReferenceDetector {
    fn name(&self) -> &'static str {
        "vague_reference"
    }

    fn detect(
        &self,
        utterance: &str,
        _interpretation: &Interpretation,
        _ctx: &AnalysisContext<'_>,
    ) -> Vec<AmbiguitySignal> {
        let lower = utterance.to_lowercase();
        self.patterns
            .iter()
            .filter_map(|(re, description)| {
                re.find(&lower).map(|m| {
                    AmbiguitySignal::new(AmbiguityKind::VagueReference, 0.6, *description)
                        .with_questions([
                            "¿Puedes ser más específico?",
                            "¿A qué te refieres exactamente?",
                        ])
                        .with_evidence("matched", m.as_str().trim())
                })
            })
            .collect()
    }
}
