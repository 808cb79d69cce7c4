//! Dynamic Confidence Calculator - one score from six weighted factors.
//!
//! Factors are each normalised to [0, 1], adjusted by time of day, usage
//! frequency and recent error rate, then combined as a weighted mean.
//! Deterministic for a fixed context; the system factor only moves with the
//! snapshot it is given.

use chrono::{DateTime, Duration, Local, Timelike};
use roxy_common::{
    clamp_unit, Action, AmbiguityAnalysis, CommandType, Interpretation, RecentCommand,
    SystemStateSnapshot, UserPreferences,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ConfidenceConfig, ConfidenceThresholds};
use crate::learning::LearningStore;

/// Historical factor when there is no data at all
const NO_HISTORY: f64 = 0.7;

/// Samples needed before the observed success rate is fully trusted
const HISTORY_SAMPLES: f64 = 10.0;

/// Recent commands the frequency adjustment looks at
const FREQUENCY_WINDOW: usize = 10;

/// Failures in the last hour before the error-rate penalty applies
const ERROR_RATE_FAILURES: usize = 3;

const WORK_APPS: &[&str] = &["word", "excel", "powerpoint", "teams", "outlook"];

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    VeryHigh,
    High,
    Medium,
    Low,
    VeryLow,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64, t: &ConfidenceThresholds) -> Self {
        if score >= t.very_high {
            Self::VeryHigh
        } else if score >= t.high {
            Self::High
        } else if score >= t.medium {
            Self::Medium
        } else if score >= t.low {
            Self::Low
        } else {
            Self::VeryLow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryHigh => "very_high",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::VeryLow => "very_low",
        }
    }

    fn phrase(&self) -> &'static str {
        match self {
            Self::VeryHigh => "Tengo muy alta confianza en este comando",
            Self::High => "Tengo alta confianza en este comando",
            Self::Medium => "Tengo confianza moderada en este comando",
            Self::Low => "Tengo poca confianza en este comando",
            Self::VeryLow => "Tengo muy poca confianza en este comando",
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The six normalised inputs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceFactors {
    pub classifier: f64,
    pub historical: f64,
    pub clarity: f64,
    pub pattern: f64,
    pub system: f64,
    pub ambiguity: f64,
}

impl ConfidenceFactors {
    fn clamped(self) -> Self {
        Self {
            classifier: clamp_unit(self.classifier),
            historical: clamp_unit(self.historical),
            clarity: clamp_unit(self.clarity),
            pattern: clamp_unit(self.pattern),
            system: clamp_unit(self.system),
            ambiguity: clamp_unit(self.ambiguity),
        }
    }
}

/// Everything the calculator may consult besides the interpretation
#[derive(Clone, Copy)]
pub struct ConfidenceContext<'a> {
    pub preferences: &'a UserPreferences,
    pub recent: &'a [RecentCommand],
    pub analysis: Option<&'a AmbiguityAnalysis>,
    pub state: Option<&'a SystemStateSnapshot>,
    pub learning: Option<&'a LearningStore>,
    pub now: DateTime<Local>,
}

impl<'a> ConfidenceContext<'a> {
    pub fn new(preferences: &'a UserPreferences, now: DateTime<Local>) -> Self {
        Self {
            preferences,
            recent: &[],
            analysis: None,
            state: None,
            learning: None,
            now,
        }
    }

    pub fn with_recent(mut self, recent: &'a [RecentCommand]) -> Self {
        self.recent = recent;
        self
    }

    pub fn with_analysis(mut self, analysis: &'a AmbiguityAnalysis) -> Self {
        self.analysis = Some(analysis);
        self
    }

    pub fn with_state(mut self, state: &'a SystemStateSnapshot) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_learning(mut self, learning: &'a LearningStore) -> Self {
        self.learning = Some(learning);
        self
    }
}

/// Result of one calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceReport {
    pub score: f64,
    pub level: ConfidenceLevel,
    /// Factors before dynamic adjustment
    pub raw_factors: ConfidenceFactors,
    pub factors: ConfidenceFactors,
    pub explanation: String,
}

// ============================================================================
// Calculator
// ============================================================================

pub struct ConfidenceCalculator {
    config: ConfidenceConfig,
}

impl ConfidenceCalculator {
    pub fn new(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConfidenceConfig {
        &self.config
    }

    /// Final score in [0, 1]
    pub fn score(&self, interpretation: &Interpretation, ctx: &ConfidenceContext<'_>) -> f64 {
        self.assess(interpretation, ctx).score
    }

    pub fn level(&self, score: f64) -> ConfidenceLevel {
        ConfidenceLevel::from_score(score, &self.config.thresholds)
    }

    /// Score below which a command is refused without asking
    pub fn reject_floor(&self) -> f64 {
        self.config.thresholds.reject_floor
    }

    /// Score, level, factors and a human explanation
    pub fn assess(
        &self,
        interpretation: &Interpretation,
        ctx: &ConfidenceContext<'_>,
    ) -> ConfidenceReport {
        let raw = self.factors(interpretation, ctx);
        let adjusted = self.adjust(raw, interpretation, ctx);
        let score = self.combine(&adjusted);
        let level = self.level(score);

        debug!(
            "Confidence factors: raw={:?} adjusted={:?} -> {:.3} ({})",
            raw, adjusted, score, level
        );

        ConfidenceReport {
            score,
            level,
            raw_factors: raw,
            factors: adjusted,
            explanation: explain(level, &adjusted),
        }
    }

    /// Unadjusted factors
    pub fn factors(
        &self,
        interpretation: &Interpretation,
        ctx: &ConfidenceContext<'_>,
    ) -> ConfidenceFactors {
        ConfidenceFactors {
            classifier: interpretation.confidence,
            historical: historical_success(interpretation, ctx.learning),
            clarity: context_clarity(interpretation, ctx),
            pattern: user_pattern_match(interpretation, ctx),
            system: system_readiness(interpretation, ctx.state),
            ambiguity: 1.0 - ambiguity_penalty(interpretation, ctx.analysis),
        }
        .clamped()
    }

    fn adjust(
        &self,
        mut f: ConfidenceFactors,
        interpretation: &Interpretation,
        ctx: &ConfidenceContext<'_>,
    ) -> ConfidenceFactors {
        let toggles = &self.config.adjustments;
        let hour = ctx.now.hour();

        if toggles.time_of_day {
            if interpretation.command_type == CommandType::Music
                && ((18..=23).contains(&hour) || (10..=14).contains(&hour))
            {
                f.pattern *= 1.1;
            }
            let work_target = interpretation
                .target_lower()
                .map_or(false, |t| WORK_APPS.iter().any(|a| t.contains(a)));
            if work_target && (8..=18).contains(&hour) {
                f.clarity *= 1.1;
            }
        }

        if toggles.command_frequency {
            let window = &ctx.recent[ctx.recent.len().saturating_sub(FREQUENCY_WINDOW)..];
            if !window.is_empty() {
                let same = window
                    .iter()
                    .filter(|r| r.command_type == interpretation.command_type)
                    .count();
                let share = same as f64 / window.len() as f64;
                if share > 0.3 {
                    f.historical *= 1.1;
                } else if share < 0.1 {
                    f.historical *= 0.9;
                }
            }
        }

        if toggles.error_rate {
            if let Some(store) = ctx.learning {
                let since = ctx.now.with_timezone(&chrono::Utc) - Duration::hours(1);
                if store.failures_since(since) > ERROR_RATE_FAILURES {
                    f.system *= 0.8;
                    f.classifier *= 0.9;
                }
            }
        }

        f.clamped()
    }

    fn combine(&self, f: &ConfidenceFactors) -> f64 {
        let w = &self.config.weights;
        let total = w.total();
        if total <= 0.0 {
            return clamp_unit(f.classifier);
        }
        let sum = w.classifier * f.classifier
            + w.historical * f.historical
            + w.clarity * f.clarity
            + w.pattern * f.pattern
            + w.system * f.system
            + w.ambiguity * f.ambiguity;
        clamp_unit(sum / total)
    }
}

// ============================================================================
// Factors
// ============================================================================

/// Success rate for (action, command_type), pulled toward 0.5 while there
/// are fewer than ten samples; 0.7 with no samples at all
pub fn historical_success(interpretation: &Interpretation, learning: Option<&LearningStore>) -> f64 {
    let Some(store) = learning else {
        return NO_HISTORY;
    };
    let (successes, attempts) =
        store.success_counts(interpretation.action, interpretation.command_type);
    if attempts == 0 {
        return NO_HISTORY;
    }
    let rate = successes as f64 / attempts as f64;
    let trust = (attempts as f64 / HISTORY_SAMPLES).min(1.0);
    rate * trust + 0.5 * (1.0 - trust)
}

fn context_clarity(interpretation: &Interpretation, ctx: &ConfidenceContext<'_>) -> f64 {
    let mut clarity = 0.5;
    if !ctx.preferences.relevant_facts.is_empty() {
        clarity += 0.2;
    }
    if !ctx.preferences.is_empty() {
        clarity += 0.15;
    }
    if let Some(t) = &interpretation.target {
        if t.chars().count() > 3 {
            clarity += 0.1;
        }
        if t.chars().any(|c| c.is_ascii_digit()) {
            clarity += 0.05;
        }
    }
    if interpretation.execution_data.len() > 2 {
        clarity += 0.1;
    }
    if !ctx.recent.is_empty() {
        clarity += 0.05;
        if ctx
            .recent
            .iter()
            .any(|r| r.command_type == interpretation.command_type)
        {
            clarity += 0.05;
        }
    }
    clamp_unit(clarity)
}

fn matches_any(target: &str, candidates: &[String]) -> bool {
    candidates.iter().any(|c| {
        let c = c.to_lowercase();
        !c.is_empty() && (target.contains(&c) || c.contains(target))
    })
}

fn user_pattern_match(interpretation: &Interpretation, ctx: &ConfidenceContext<'_>) -> f64 {
    let mut score = 0.5;
    let prefs = ctx.preferences;

    if let Some(t) = interpretation.target_lower() {
        match interpretation.command_type {
            CommandType::Music => {
                if matches_any(&t, &prefs.favorite_artists) {
                    score += 0.3;
                }
                if matches_any(&t, &prefs.favorite_genres) {
                    score += 0.2;
                }
            }
            CommandType::App => {
                if matches_any(&t, &prefs.frequently_used_apps) {
                    score += 0.3;
                }
            }
            CommandType::Content => {
                if matches_any(&t, &prefs.favorite_shows) {
                    score += 0.3;
                }
                if matches_any(&t, &prefs.favorite_content_genres) {
                    score += 0.2;
                }
            }
            CommandType::Conversation => {}
        }
    }

    let similar = ctx
        .recent
        .iter()
        .filter(|r| {
            r.command_type == interpretation.command_type && r.action == interpretation.action
        })
        .count();
    score += (0.05 * similar as f64).min(0.2);

    clamp_unit(score)
}

fn system_readiness(interpretation: &Interpretation, state: Option<&SystemStateSnapshot>) -> f64 {
    let mut readiness: f64 = 0.8;
    let Some(s) = state else {
        return readiness;
    };
    if s.cpu_pct > 80.0 {
        readiness -= 0.3;
    } else if s.cpu_pct > 60.0 {
        readiness -= 0.1;
    }
    if s.mem_pct > 85.0 {
        readiness -= 0.2;
    } else if s.mem_pct > 70.0 {
        readiness -= 0.1;
    }
    if interpretation.command_type == CommandType::Music && s.audio_available == Some(false) {
        readiness -= 0.2;
    }
    clamp_unit(readiness)
}

/// Penalty in [0, 1]; the ambiguity factor is its complement
fn ambiguity_penalty(interpretation: &Interpretation, analysis: Option<&AmbiguityAnalysis>) -> f64 {
    let mut penalty = analysis.map_or(0.0, |a| a.score * 0.5);
    let short_target = interpretation
        .target
        .as_ref()
        .map_or(true, |t| t.chars().count() < 3);
    if short_target {
        penalty += 0.1;
    }
    if matches!(interpretation.action, Action::Chat | Action::Unknown) {
        penalty += 0.2;
    }
    if interpretation.needs_clarification {
        penalty += 0.3;
    }
    penalty.min(1.0)
}

fn explain(level: ConfidenceLevel, f: &ConfidenceFactors) -> String {
    let mut details = Vec::new();
    if f.historical > 0.8 {
        details.push("historial exitoso");
    } else if f.historical < 0.4 {
        details.push("historial con errores");
    }
    if f.clarity > 0.8 {
        details.push("contexto claro");
    } else if f.clarity < 0.4 {
        details.push("contexto ambiguo");
    }
    if f.pattern > 0.8 {
        details.push("coincide con tus preferencias");
    }
    if details.is_empty() {
        level.phrase().to_string()
    } else {
        format!("{} ({})", level.phrase(), details.join(", "))
    }
}
