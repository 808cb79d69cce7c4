//! Command Corrector - typo, grammar and completion suggestions.
//!
//! Runs before the resolver. Only a suggestion above 0.8 is ever applied
//! automatically; lower ones are for display. Learned corrections persist
//! to a JSON file with an atomic write.

use chrono::{DateTime, Utc};
use regex::Regex;
use roxy_common::{RecentCommand, RoxyError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::learning::store_error;

/// Auto-apply only above this
pub const AUTO_APPLY_CONFIDENCE: f64 = 0.8;

const MIN_SUGGESTION_CONFIDENCE: f64 = 0.5;
const MAX_SUGGESTIONS: usize = 3;
const KNOWN_TYPO_CONFIDENCE: f64 = 0.95;
const TYPO_SIMILARITY: f64 = 0.7;
const COMPLETION_CONFIDENCE: f64 = 0.6;
const COMPLETION_CONTEXT_BONUS: f64 = 0.2;
const GRAMMAR_CONFIDENCE: f64 = 0.8;
const PATTERN_SIMILARITY: f64 = 0.3;
const MAX_PATTERN_ALTERNATIVES: usize = 2;

const BUILTIN_TYPOS: &[(&str, &[&str])] = &[
    ("abre", &["habre", "abra"]),
    ("reproduce", &["reproduse", "repoduce", "reproduze"]),
    ("pausa", &["pauca", "pausar"]),
    ("spotify", &["spotifi", "spotiffy", "espotyfi"]),
    ("youtube", &["youtuve", "yutube", "youtub"]),
    ("chrome", &["crome", "chorme", "crohme"]),
    ("firefox", &["firefoxx", "firefo", "fierfox"]),
    ("siguiente", &["sigiente", "siguente", "sigueinte"]),
    ("anterior", &["anterio", "anteror", "anteior"]),
    ("busca", &["buscar", "vusca"]),
    ("música", &["musica", "muzica", "musicca"]),
    ("canción", &["cancion", "cansion"]),
    ("volumen", &["bolumen", "volumne"]),
    ("aplicación", &["aplicacion", "aplication", "aplicasion"]),
];

const COMPLETIONS: &[(&str, &[&str])] = &[
    (
        r"^(abre|abrir|open)$",
        &["abre chrome", "abre spotify", "abre youtube", "abre calculator"],
    ),
    (
        r"^(reproduce|pon|play)$",
        &["reproduce música", "reproduce en spotify", "pon una canción"],
    ),
    (
        r"^(busca|search)$",
        &["busca en google", "busca en youtube", "busca información sobre"],
    ),
    (
        r"^(volumen|volume)$",
        &["volumen arriba", "volumen abajo", "volumen al 50%"],
    ),
];

const GRAMMAR_FIXES: &[(&str, &str)] = &[
    (r"(?i)\b(la|una)\s+(volumen|nivel)\b", "el volumen"),
    (r"(?i)\b(el|un)\s+(música|canción)\b", "la música"),
    (r"(?i)\babre\s+a\s+", "abre "),
    (r"(?i)\breproducir\s+el\s+", "reproduce la "),
    (r"(?i)\babres\b", "abre"),
    (r"(?i)\breproduces\b", "reproduce"),
    (r"(?i)\bpones\b", "pon"),
    (r"(?i)\bla\s+spotify\b", "spotify"),
    (r"(?i)\bel\s+chrome\b", "chrome"),
];

/// Regexes and context words used to guess a command family
const TYPE_PATTERNS: &[(&str, &[&str], &[&str])] = &[
    (
        "music",
        &[
            r"\b(reproduce|pon|play|escucha)\b.*\b(música|canción|song|track)\b",
            r"\b(spotify|youtube music|vlc)\b",
            r"\b(pausa|pause|para|stop)\b.*\b(música|music)\b",
            r"\b(siguiente|next|anterior|previous)\b.*\b(canción|song)\b",
            r"\b(volumen|volume)\b.*(up|down|arriba|abajo|subir|bajar)",
        ],
        &["música", "canción", "album", "artista", "playlist", "song", "track"],
    ),
    (
        "app",
        &[
            r"\b(abre|abrir|open|ejecuta|launch)\b.*\b(chrome|firefox|edge|notepad|calculator)\b",
            r"\b(inicia|start|ejecutar)\b.*\b(aplicación|app|programa)\b",
        ],
        &["aplicación", "programa", "app", "software", "ejecutar", "abrir"],
    ),
    (
        "search",
        &[
            r"\b(busca|search|encuentra|find)\b",
            r"\b(google|bing|youtube)\b.*\b(buscar|search)\b",
        ],
        &["buscar", "encontrar", "google", "información", "search"],
    ),
    (
        "system",
        &[
            r"\b(apaga|shutdown|reinicia|restart)\b",
            r"\b(configuración|settings|config)\b",
        ],
        &[],
    ),
];

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionKind {
    Typo,
    Completion,
    Grammar,
    Alternative,
    UserFeedback,
}

impl CorrectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Typo => "typo",
            Self::Completion => "completion",
            Self::Grammar => "grammar",
            Self::Alternative => "alternative",
            Self::UserFeedback => "user_feedback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectionSuggestion {
    pub original: String,
    pub corrected: String,
    pub kind: CorrectionKind,
    pub confidence: f64,
    pub explanation: String,
}

/// A phrasing that worked before
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPattern {
    pub pattern: String,
    pub command_type: String,
    pub variations: Vec<String>,
    pub usage_count: u32,
    pub success_rate: f64,
    pub last_used: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionStats {
    pub total: usize,
    pub successful: usize,
    pub by_kind: BTreeMap<CorrectionKind, usize>,
}

impl CorrectionStats {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successful as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct CorrectionFile {
    patterns: BTreeMap<String, CommandPattern>,
    typos: BTreeMap<String, Vec<String>>,
    stats: CorrectionStats,
    last_updated: Option<DateTime<Utc>>,
}

// ============================================================================
// Corrector
// ============================================================================

pub struct CommandCorrector {
    path: Option<PathBuf>,
    patterns: BTreeMap<String, CommandPattern>,
    typos: BTreeMap<String, Vec<String>>,
    stats: CorrectionStats,
    completions: Vec<(Regex, &'static [&'static str])>,
    grammar: Vec<(Regex, &'static str)>,
    type_patterns: Vec<(&'static str, Vec<Regex>, &'static [&'static str])>,
}

fn builtin_typos() -> BTreeMap<String, Vec<String>> {
    BUILTIN_TYPOS
        .iter()
        .map(|(word, variants)| {
            (
                word.to_string(),
                variants.iter().map(|v| v.to_string()).collect(),
            )
        })
        .collect()
}

impl CommandCorrector {
    /// Corrector without persistence
    pub fn in_memory() -> Self {
        let completions = COMPLETIONS
            .iter()
            .filter_map(|(p, c)| Regex::new(p).ok().map(|r| (r, *c)))
            .collect();
        let grammar = GRAMMAR_FIXES
            .iter()
            .filter_map(|(p, r)| Regex::new(p).ok().map(|re| (re, *r)))
            .collect();
        let type_patterns = TYPE_PATTERNS
            .iter()
            .map(|(name, patterns, words)| {
                let compiled = patterns.iter().filter_map(|p| Regex::new(p).ok()).collect();
                (*name, compiled, *words)
            })
            .collect();

        Self {
            path: None,
            patterns: BTreeMap::new(),
            typos: builtin_typos(),
            stats: CorrectionStats::default(),
            completions,
            grammar,
            type_patterns,
        }
    }

    /// Corrector backed by `path`; unreadable files start empty
    pub fn open(path: &Path) -> Self {
        let mut corrector = Self::in_memory();
        corrector.path = Some(path.to_path_buf());

        if !path.exists() {
            debug!("No corrections file at {:?}, starting fresh", path);
            return corrector;
        }

        match fs::read_to_string(path)
            .map_err(|e| store_error("read", path, e))
            .and_then(|c| {
                serde_json::from_str::<CorrectionFile>(&c).map_err(|e| store_error("parse", path, e))
            }) {
            Ok(file) => {
                for (word, variants) in file.typos {
                    let entry = corrector.typos.entry(word).or_default();
                    for v in variants {
                        if !entry.contains(&v) {
                            entry.push(v);
                        }
                    }
                }
                corrector.patterns = file.patterns;
                corrector.stats = file.stats;
                info!(
                    "Loaded corrections: {} patterns, {} typo entries",
                    corrector.patterns.len(),
                    corrector.typos.len()
                );
            }
            Err(e) => warn!("Corrections not loaded: {}", e),
        }
        corrector
    }

    /// Write the learned data (temp file then rename)
    pub fn save(&self) -> Result<(), RoxyError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| store_error("create directory for", path, e))?;
        }
        let file = CorrectionFile {
            patterns: self.patterns.clone(),
            typos: self.typos.clone(),
            stats: self.stats.clone(),
            last_updated: Some(Utc::now()),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|e| store_error("serialize", path, e))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| store_error("write", &tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| store_error("rename to", path, e))?;
        Ok(())
    }

    pub fn stats(&self) -> &CorrectionStats {
        &self.stats
    }

    pub fn patterns(&self) -> &BTreeMap<String, CommandPattern> {
        &self.patterns
    }

    /// Words with known misspellings
    pub fn typo_count(&self) -> usize {
        self.typos.len()
    }

    /// Up to three suggestions, best first
    pub fn analyze(&self, text: &str, recent: &[RecentCommand]) -> Vec<CorrectionSuggestion> {
        let mut suggestions = Vec::new();
        suggestions.extend(self.typos_in(text));
        suggestions.extend(self.completions_for(text, recent));
        suggestions.extend(self.grammar_fix(text));
        suggestions.extend(self.pattern_alternatives(text));

        suggestions.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let original = text.trim().to_lowercase();
        let mut seen: Vec<(String, CorrectionKind)> = Vec::new();
        suggestions.retain(|s| {
            let key = (s.corrected.to_lowercase(), s.kind);
            if s.confidence <= MIN_SUGGESTION_CONFIDENCE || key.0 == original || seen.contains(&key) {
                return false;
            }
            seen.push(key);
            true
        });
        suggestions.truncate(MAX_SUGGESTIONS);
        suggestions
    }

    /// The top suggestion when it is confident enough to apply silently
    pub fn suggest_best_correction(&self, text: &str, recent: &[RecentCommand]) -> Option<String> {
        self.analyze(text, recent)
            .into_iter()
            .next()
            .filter(|s| s.confidence > AUTO_APPLY_CONFIDENCE)
            .map(|s| s.corrected)
    }

    fn typos_in(&self, text: &str) -> Vec<CorrectionSuggestion> {
        let words: Vec<String> = text.to_lowercase().split_whitespace().map(str::to_string).collect();
        let mut out = Vec::new();

        for (i, word) in words.iter().enumerate() {
            if self.typos.contains_key(word) {
                continue;
            }
            let mut best: Option<(&str, f64)> = None;
            for (correct, variants) in &self.typos {
                if variants.iter().any(|v| v == word) {
                    best = Some((correct.as_str(), KNOWN_TYPO_CONFIDENCE));
                    break;
                }
                let sim = similarity(word, correct);
                if sim > TYPO_SIMILARITY && best.map_or(true, |(_, c)| sim > c) {
                    best = Some((correct.as_str(), sim));
                }
            }
            if let Some((correct, confidence)) = best {
                let mut fixed = words.clone();
                fixed[i] = correct.to_string();
                out.push(CorrectionSuggestion {
                    original: text.to_string(),
                    corrected: fixed.join(" "),
                    kind: CorrectionKind::Typo,
                    confidence,
                    explanation: format!("Posible error tipográfico: '{}' → '{}'", word, correct),
                });
            }
        }
        out
    }

    fn completions_for(&self, text: &str, recent: &[RecentCommand]) -> Vec<CorrectionSuggestion> {
        let lower = text.trim().to_lowercase();
        let context = recent
            .iter()
            .rev()
            .take(3)
            .map(|r| r.utterance.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");

        let mut out = Vec::new();
        for (re, completions) in &self.completions {
            if !re.is_match(&lower) {
                continue;
            }
            for completion in completions.iter() {
                let related = !context.is_empty()
                    && completion.split_whitespace().any(|w| context.contains(w));
                let confidence = if related {
                    COMPLETION_CONFIDENCE + COMPLETION_CONTEXT_BONUS
                } else {
                    COMPLETION_CONFIDENCE
                };
                out.push(CorrectionSuggestion {
                    original: text.to_string(),
                    corrected: completion.to_string(),
                    kind: CorrectionKind::Completion,
                    confidence,
                    explanation: format!("Comando incompleto. ¿Quisiste decir '{}'?", completion),
                });
            }
        }
        out
    }

    fn grammar_fix(&self, text: &str) -> Vec<CorrectionSuggestion> {
        let mut fixed = text.to_string();
        let mut changes = 0;
        for (re, replacement) in &self.grammar {
            let next = re.replace_all(&fixed, *replacement).into_owned();
            if next != fixed {
                changes += 1;
                fixed = next;
            }
        }
        if changes == 0 {
            return Vec::new();
        }
        vec![CorrectionSuggestion {
            original: text.to_string(),
            corrected: fixed,
            kind: CorrectionKind::Grammar,
            confidence: GRAMMAR_CONFIDENCE,
            explanation: format!("Corrección gramatical: {} ajuste(s)", changes),
        }]
    }

    /// Most likely command family for `text`
    pub fn detect_command_type(&self, text: &str) -> Option<&'static str> {
        let lower = text.to_lowercase();
        let mut best: Option<(&'static str, usize)> = None;
        for (name, patterns, words) in &self.type_patterns {
            let score = patterns.iter().filter(|r| r.is_match(&lower)).count() * 2
                + words.iter().filter(|w| lower.contains(*w)).count();
            if score > 0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((*name, score));
            }
        }
        best.map(|(name, _)| name)
    }

    fn pattern_alternatives(&self, text: &str) -> Vec<CorrectionSuggestion> {
        let Some(kind) = self.detect_command_type(text) else {
            return Vec::new();
        };
        let lower = text.to_lowercase();
        let mut scored: Vec<(&CommandPattern, f64)> = self
            .patterns
            .values()
            .filter(|p| p.command_type == kind)
            .filter_map(|p| {
                let sim = similarity(&lower, &p.pattern.to_lowercase());
                (sim > PATTERN_SIMILARITY).then_some((p, sim * p.success_rate))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(MAX_PATTERN_ALTERNATIVES)
            .map(|(p, confidence)| CorrectionSuggestion {
                original: text.to_string(),
                corrected: p.pattern.clone(),
                kind: CorrectionKind::Alternative,
                confidence,
                explanation: format!(
                    "Alternativa basada en patrón exitoso ({:.0}% éxito)",
                    p.success_rate * 100.0
                ),
            })
            .collect()
    }

    /// Record the outcome of a correction and persist it
    pub fn learn_from_correction(
        &mut self,
        original: &str,
        corrected: &str,
        successful: bool,
        kind: CorrectionKind,
    ) {
        self.stats.total += 1;
        if successful {
            self.stats.successful += 1;
            *self.stats.by_kind.entry(kind).or_default() += 1;

            let key = corrected.trim().to_lowercase();
            let variation = original.trim().to_lowercase();
            let command_type = self.detect_command_type(corrected).unwrap_or("general");
            match self.patterns.get_mut(&key) {
                Some(p) => {
                    p.usage_count += 1;
                    let n = p.usage_count as f64;
                    p.success_rate = (p.success_rate * (n - 1.0) + 1.0) / n;
                    p.last_used = Utc::now();
                    if !p.variations.contains(&variation) {
                        p.variations.push(variation);
                    }
                }
                None => {
                    self.patterns.insert(
                        key,
                        CommandPattern {
                            pattern: corrected.trim().to_string(),
                            command_type: command_type.to_string(),
                            variations: vec![variation],
                            usage_count: 1,
                            success_rate: 1.0,
                            last_used: Utc::now(),
                        },
                    );
                }
            }

            if kind == CorrectionKind::Typo {
                self.learn_typos(original, corrected);
            }
        }

        if let Err(e) = self.save() {
            warn!("Failed to persist corrections: {}", e);
        }
    }

    fn learn_typos(&mut self, original: &str, corrected: &str) {
        let orig = original.to_lowercase();
        let corr = corrected.to_lowercase();
        let a: Vec<&str> = orig.split_whitespace().collect();
        let b: Vec<&str> = corr.split_whitespace().collect();
        if a.len() != b.len() {
            return;
        }
        for (wrong, right) in a.iter().zip(b.iter()).filter(|(x, y)| x != y) {
            let entry = self.typos.entry(right.to_string()).or_default();
            if !entry.iter().any(|v| v == wrong) {
                debug!("Learned typo '{}' -> '{}'", wrong, right);
                entry.push(wrong.to_string());
            }
        }
    }
}

// ============================================================================
// Edit distance
// ============================================================================

/// Levenshtein distance over chars
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let n = b.len();

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[n]
}

/// 1 - distance / longest length; identical empty strings are 1
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("música", "musica"), 1);
        assert_eq!(similarity("", ""), 1.0);
    }

    #[test]
    fn test_known_typo_auto_applies() {
        let c = CommandCorrector::in_memory();
        assert_eq!(c.suggest_best_correction("abre crome", &[]).as_deref(), Some("abre chrome"));
        let s = c.analyze("busca en youtuve", &[]);
        assert_eq!(s[0].corrected, "busca en youtube");
        assert_eq!(s[0].kind, CorrectionKind::Typo);
    }

    #[test]
    fn test_correct_input_left_alone() {
        let c = CommandCorrector::in_memory();
        assert!(c.suggest_best_correction("abre spotify", &[]).is_none());
        assert!(c.analyze("abre spotify", &[]).is_empty());
    }

    #[test]
    fn test_edit_distance_typo() {
        let c = CommandCorrector::in_memory();
        let s = c.analyze("abre firefx", &[]);
        assert_eq!(s[0].corrected, "abre firefox");
        assert!(s[0].confidence > 0.7 && s[0].confidence < 0.95);
    }

    #[test]
    fn test_completions_are_not_auto_applied() {
        let c = CommandCorrector::in_memory();
        let s = c.analyze("reproduce", &[]);
        assert_eq!(s.len(), 3);
        assert!(s.iter().all(|x| x.kind == CorrectionKind::Completion));
        assert!(c.suggest_best_correction("reproduce", &[]).is_none());
    }

    #[test]
    fn test_grammar_fix() {
        let c = CommandCorrector::in_memory();
        let s = c.analyze("abre a spotify", &[]);
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].corrected, "abre spotify");
        assert_eq!(s[0].kind, CorrectionKind::Grammar);
        assert_eq!(s[0].explanation, "Corrección gramatical: 1 ajuste(s)");
        // 0.8 is not above the auto-apply bar
        assert!(c.suggest_best_correction("abre a spotify", &[]).is_none());
    }

    #[test]
    fn test_detect_command_type() {
        let c = CommandCorrector::in_memory();
        assert_eq!(c.detect_command_type("abre chrome"), Some("app"));
        assert_eq!(c.detect_command_type("pon una canción"), Some("music"));
        assert_eq!(c.detect_command_type("hola"), None);
    }

    #[test]
    fn test_learning_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corrections.json");
        {
            let mut c = CommandCorrector::open(&path);
            c.learn_from_correction("abre crohm", "abre chrome", true, CorrectionKind::Typo);
            c.learn_from_correction("abre chrome ya", "abre chrome", true, CorrectionKind::UserFeedback);
            assert_eq!(c.patterns()["abre chrome"].usage_count, 2);
        }
        let c = CommandCorrector::open(&path);
        assert_eq!(c.stats().total, 2);
        assert_eq!(c.stats().success_rate(), 1.0);
        assert_eq!(c.patterns()["abre chrome"].command_type, "app");
        assert_eq!(
            c.suggest_best_correction("abre crohm", &[]).as_deref(),
            Some("abre chrome")
        );
    }

    #[test]
    fn test_pattern_alternative() {
        let mut c = CommandCorrector::in_memory();
        c.learn_from_correction("pon musica de rock", "pon música de rock", true, CorrectionKind::UserFeedback);
        let s = c.analyze("pon música de roc", &[]);
        assert!(s.iter().any(|x| x.kind == CorrectionKind::Alternative && x.corrected == "pon música de rock"));
    }

    #[test]
    fn test_corrupt_file_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corrections.json");
        fs::write(&path, "{ nope").unwrap();
        let c = CommandCorrector::open(&path);
        assert_eq!(c.stats().total, 0);
        assert!(c.patterns().is_empty());
    }
}
