//! Pre-Execution Validator - decides whether an interpretation may run now.
//!
//! Seven checks, each contributing blocking issues, warnings,
//! recommendations, a score multiplier and a delay. Aggregation:
//! - a check with a blocking issue multiplies the score by 0.3
//! - a check with warnings multiplies it by its own penalty (default 0.8)
//! - delay is the maximum requested by any check
//! - executes only with no blocking issue and a score above 0.3

use chrono::{DateTime, Datelike, Duration, Local, Timelike, Utc, Weekday};
use roxy_common::{
    Action, CommandType, Interpretation, RecentCommand, RoxyError, SystemStateSnapshot,
    UserPreferences, ValidationOutcome,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{info, warn};

use crate::config::ValidationConfig;

const BLOCKING_FACTOR: f64 = 0.3;
const DEFAULT_WARNING_PENALTY: f64 = 0.8;
const MIN_EXECUTION_SCORE: f64 = 0.3;
const STATS_RECENT: usize = 10;

const WORK_APPS: &[&str] = &[
    "code", "visual studio", "word", "excel", "powerpoint", "teams", "zoom",
];

const MUSIC_APPS: &[&str] = &["spotify", "youtube", "vlc", "media player"];

const AUDIO_APPS: &[&str] = &["spotify", "youtube"];

/// Apps that fight over the same resource (audio output, default browser)
const APP_CONFLICTS: &[(&str, &[&str])] = &[
    ("spotify", &["youtube", "vlc", "windows media player"]),
    ("youtube", &["spotify", "vlc"]),
    ("chrome", &["firefox", "edge"]),
    ("firefox", &["chrome", "edge"]),
    ("edge", &["chrome", "firefox"]),
    ("steam", &["epic games", "origin", "uplay"]),
];

// ============================================================================
// Check contract
// ============================================================================

/// Inputs for one validation call
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub utterance: &'a str,
    pub interpretation: &'a Interpretation,
    pub state: &'a SystemStateSnapshot,
    /// Prior commands, oldest first, excluding the one being validated
    pub recent: &'a [RecentCommand],
    pub preferences: &'a UserPreferences,
    pub now: DateTime<Local>,
}

/// What one check found
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckOutcome {
    pub blocking: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
    /// Score multiplier when this check warns
    pub penalty: Option<f64>,
    pub delay_seconds: u64,
}

impl CheckOutcome {
    fn block(&mut self, issue: String, recommendation: Option<&str>) {
        self.blocking.push(issue);
        if let Some(r) = recommendation {
            self.recommendations.push(r.to_string());
        }
    }

    fn warn(&mut self, warning: String, penalty: f64, recommendation: Option<&str>) {
        self.warnings.push(warning);
        self.penalty = Some(self.penalty.map_or(penalty, |p| p.min(penalty)));
        if let Some(r) = recommendation {
            self.recommendations.push(r.to_string());
        }
    }
}

pub trait ValidationCheck: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, ctx: &ValidationContext<'_>, config: &ValidationConfig) -> CheckOutcome;
}

fn is_type(i: &Interpretation, types: &[CommandType]) -> bool {
    types.contains(&i.command_type)
}

// ============================================================================
// Checks
// ============================================================================

pub struct SystemLoadCheck;

impl ValidationCheck for SystemLoadCheck {
    fn name(&self) -> &'static str {
        "system_load"
    }

    fn check(&self, ctx: &ValidationContext<'_>, config: &ValidationConfig) -> CheckOutcome {
        let mut out = CheckOutcome::default();
        let s = ctx.state;
        let heavy = is_type(ctx.interpretation, &[CommandType::App, CommandType::Music]);

        if s.cpu_pct > config.cpu_usage_max && heavy {
            out.block(
                format!("CPU sobrecargada ({:.1}%)", s.cpu_pct),
                Some("Esperar a que baje el uso de CPU"),
            );
        } else if s.cpu_pct > config.cpu_warn {
            out.warn(format!("CPU alta ({:.1}%)", s.cpu_pct), 0.7, None);
        }

        if s.mem_pct > config.memory_usage_max {
            out.warn(
                format!("Memoria alta ({:.1}%)", s.mem_pct),
                0.8,
                Some("Considerar cerrar aplicaciones no usadas"),
            );
        }
        out
    }
}

pub struct UserActivityCheck;

impl ValidationCheck for UserActivityCheck {
    fn name(&self) -> &'static str {
        "user_activity"
    }

    fn check(&self, ctx: &ValidationContext<'_>, config: &ValidationConfig) -> CheckOutcome {
        let mut out = CheckOutcome::default();
        let i = ctx.interpretation;

        if let Some(idle) = ctx.state.idle_seconds {
            if idle < config.user_idle_min && i.action.is_intrusive() {
                out.warn(
                    "Usuario activo, comando puede interrumpir trabajo".to_string(),
                    DEFAULT_WARNING_PENALTY,
                    None,
                );
                out.delay_seconds = config.intrusive_delay_secs;
            }
        }

        if is_type(i, &[CommandType::Music, CommandType::Content]) {
            let working: Vec<&str> = WORK_APPS
                .iter()
                .copied()
                .filter(|a| ctx.state.is_running(a))
                .collect();
            if !working.is_empty() {
                out.warn(
                    format!("Aplicaciones de trabajo activas: {}", working.join(", ")),
                    DEFAULT_WARNING_PENALTY,
                    Some("Usar volumen bajo o auriculares"),
                );
            }
        }
        out
    }
}

pub struct ResourceCheck;

impl ValidationCheck for ResourceCheck {
    fn name(&self) -> &'static str {
        "resources"
    }

    fn check(&self, ctx: &ValidationContext<'_>, config: &ValidationConfig) -> CheckOutcome {
        let mut out = CheckOutcome::default();
        let i = ctx.interpretation;

        if let Some(gb) = ctx.state.free_disk_gb() {
            if gb < config.min_free_disk_gb && i.action == Action::OpenApp {
                out.block(
                    format!("Poco espacio en disco ({:.1}GB libre)", gb),
                    Some("Liberar espacio en disco"),
                );
            } else if gb < config.warn_free_disk_gb {
                out.warn(
                    format!("Espacio en disco limitado ({:.1}GB libre)", gb),
                    DEFAULT_WARNING_PENALTY,
                    None,
                );
            }
        }

        if is_type(i, &[CommandType::Music, CommandType::Content])
            && ctx.state.network_reachable == Some(false)
        {
            out.block(
                "Sin conexión a internet".to_string(),
                Some("Verificar la conexión de red"),
            );
        }
        out
    }
}

pub struct TimeCheck;

impl ValidationCheck for TimeCheck {
    fn name(&self) -> &'static str {
        "time"
    }

    fn check(&self, ctx: &ValidationContext<'_>, config: &ValidationConfig) -> CheckOutcome {
        let mut out = CheckOutcome::default();
        let i = ctx.interpretation;
        let hour = ctx.now.hour();

        if config.in_quiet_hours(hour) {
            if i.command_type == CommandType::Music {
                out.warn(
                    format!(
                        "Horas de silencio ({}:00-{}:00)",
                        config.quiet_hours_start, config.quiet_hours_end
                    ),
                    DEFAULT_WARNING_PENALTY,
                    Some("Usar volumen bajo"),
                );
            } else if i.action == Action::OpenApp
                && i
                    .target_lower()
                    .map_or(false, |t| AUDIO_APPS.iter().any(|a| t.contains(a)))
            {
                out.warn(
                    "Aplicación de audio en horas de silencio".to_string(),
                    DEFAULT_WARNING_PENALTY,
                    Some("Usar volumen bajo"),
                );
            }
        }

        let weekday = !matches!(ctx.now.weekday(), Weekday::Sat | Weekday::Sun);
        if weekday && config.in_work_hours(hour) && i.command_type == CommandType::Content {
            out.warn(
                "Horario laboral, comando de entretenimiento".to_string(),
                DEFAULT_WARNING_PENALTY,
                None,
            );
        }
        out
    }
}

pub struct ConflictCheck;

impl ValidationCheck for ConflictCheck {
    fn name(&self) -> &'static str {
        "conflicts"
    }

    fn check(&self, ctx: &ValidationContext<'_>, _config: &ValidationConfig) -> CheckOutcome {
        let mut out = CheckOutcome::default();
        let i = ctx.interpretation;

        if let Some(target) = i.target_lower() {
            let running: Vec<&str> = APP_CONFLICTS
                .iter()
                .filter(|(app, _)| target.contains(app))
                .flat_map(|(_, rivals)| rivals.iter().copied())
                .filter(|r| ctx.state.is_running(r))
                .collect();
            if !running.is_empty() {
                out.warn(
                    format!("Aplicaciones conflictivas ejecutándose: {}", running.join(", ")),
                    DEFAULT_WARNING_PENALTY,
                    Some("Considerar cerrar las aplicaciones en conflicto"),
                );
            }
        }

        if i.command_type == CommandType::Music {
            let music = MUSIC_APPS
                .iter()
                .filter(|a| ctx.state.is_running(a))
                .count();
            if music > 2 {
                out.warn(
                    format!("Múltiples aplicaciones de música ejecutándose ({})", music),
                    DEFAULT_WARNING_PENALTY,
                    None,
                );
            }
        }
        out
    }
}

pub struct FrequencyCheck;

impl ValidationCheck for FrequencyCheck {
    fn name(&self) -> &'static str {
        "frequency"
    }

    fn check(&self, ctx: &ValidationContext<'_>, config: &ValidationConfig) -> CheckOutcome {
        let mut out = CheckOutcome::default();
        let since = ctx.now.with_timezone(&Utc) - Duration::seconds(config.frequency_window_secs);
        let in_window: Vec<&RecentCommand> =
            ctx.recent.iter().filter(|r| r.timestamp > since).collect();
        // Count includes the command being validated
        let count = in_window.len() + 1;

        if count > config.command_frequency_max {
            out.block(
                format!(
                    "Demasiados comandos recientes ({} en {} segundos)",
                    count, config.frequency_window_secs
                ),
                Some("Esperar antes de enviar más comandos"),
            );
        } else if count >= config.frequency_warn {
            out.warn(
                format!("Frecuencia alta de comandos ({} recientes)", count),
                DEFAULT_WARNING_PENALTY,
                None,
            );
        }

        if in_window.iter().any(|r| r.same_request(ctx.interpretation)) {
            out.warn(
                "Comando similar ejecutado recientemente".to_string(),
                DEFAULT_WARNING_PENALTY,
                Some("Verificar si el comando anterior funcionó"),
            );
        }
        out
    }
}

pub struct AlreadyRunningCheck;

impl ValidationCheck for AlreadyRunningCheck {
    fn name(&self) -> &'static str {
        "already_running"
    }

    fn check(&self, ctx: &ValidationContext<'_>, _config: &ValidationConfig) -> CheckOutcome {
        let mut out = CheckOutcome::default();
        let i = ctx.interpretation;
        if i.action != Action::OpenApp {
            return out;
        }
        if let Some(target) = &i.target {
            if ctx.state.is_running(target) {
                out.warn(
                    format!("{} ya está ejecutándose", target),
                    0.6,
                    Some("Enfocar ventana existente en lugar de abrir nueva instancia"),
                );
            }
        }
        out
    }
}

// ============================================================================
// Validator
// ============================================================================

/// One entry of the validation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub timestamp: DateTime<Utc>,
    pub utterance: String,
    pub command_type: CommandType,
    pub action: Action,
    pub target: Option<String>,
    pub should_execute: bool,
    pub confidence_score: f64,
    pub blocking_issues: Vec<String>,
    pub warnings: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationStats {
    pub total_validations: usize,
    pub executed: usize,
    pub blocked: usize,
    pub execution_rate: f64,
    pub average_confidence: f64,
    pub recent: Vec<ValidationRecord>,
}

pub struct PreExecutionValidator {
    config: ValidationConfig,
    checks: Vec<Box<dyn ValidationCheck>>,
    history: VecDeque<ValidationRecord>,
}

impl PreExecutionValidator {
    pub fn new(config: ValidationConfig) -> Self {
        let checks: Vec<Box<dyn ValidationCheck>> = vec![
            Box::new(SystemLoadCheck),
            Box::new(UserActivityCheck),
            Box::new(ResourceCheck),
            Box::new(TimeCheck),
            Box::new(ConflictCheck),
            Box::new(FrequencyCheck),
            Box::new(AlreadyRunningCheck),
        ];
        Self {
            config,
            checks,
            history: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Run every check and record the verdict
    pub fn validate(&mut self, ctx: &ValidationContext<'_>) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::pass();

        for check in &self.checks {
            let found = check.check(ctx, &self.config);
            if !found.blocking.is_empty() {
                outcome.confidence_score *= BLOCKING_FACTOR;
            }
            if !found.warnings.is_empty() {
                outcome.confidence_score *= found.penalty.unwrap_or(DEFAULT_WARNING_PENALTY);
            }
            outcome.delay_seconds = outcome.delay_seconds.max(found.delay_seconds);
            outcome.blocking_issues.extend(found.blocking);
            outcome.warnings.extend(found.warnings);
            outcome.recommendations.extend(found.recommendations);
        }

        outcome.should_execute =
            outcome.blocking_issues.is_empty() && outcome.confidence_score > MIN_EXECUTION_SCORE;

        if outcome.should_execute {
            info!(
                "Validation passed for '{}' ({})",
                ctx.utterance,
                outcome.summary()
            );
        } else {
            warn!("Validation refused '{}': {}", ctx.utterance, outcome.summary());
        }

        self.remember(ctx, &outcome);
        outcome
    }

    fn remember(&mut self, ctx: &ValidationContext<'_>, outcome: &ValidationOutcome) {
        let i = ctx.interpretation;
        self.history.push_back(ValidationRecord {
            timestamp: ctx.now.with_timezone(&Utc),
            utterance: ctx.utterance.to_string(),
            command_type: i.command_type,
            action: i.action,
            target: i.target.clone(),
            should_execute: outcome.should_execute,
            confidence_score: outcome.confidence_score,
            blocking_issues: outcome.blocking_issues.clone(),
            warnings: outcome.warnings.len(),
        });
        while self.history.len() > self.config.history_limit {
            self.history.pop_front();
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &ValidationRecord> {
        self.history.iter()
    }

    pub fn stats(&self) -> ValidationStats {
        let total = self.history.len();
        let executed = self.history.iter().filter(|r| r.should_execute).count();
        let average_confidence = if total == 0 {
            0.0
        } else {
            self.history.iter().map(|r| r.confidence_score).sum::<f64>() / total as f64
        };
        ValidationStats {
            total_validations: total,
            executed,
            blocked: total - executed,
            execution_rate: if total == 0 {
                0.0
            } else {
                executed as f64 / total as f64
            },
            average_confidence,
            recent: self
                .history
                .iter()
                .skip(total.saturating_sub(STATS_RECENT))
                .cloned()
                .collect(),
        }
    }

    /// Change thresholds; rejected changes leave the config untouched
    pub fn configure_thresholds<F>(&mut self, update: F) -> Result<(), RoxyError>
    where
        F: FnOnce(&mut ValidationConfig),
    {
        let mut next = self.config.clone();
        update(&mut next);
        next.validate()?;
        info!("Validation thresholds updated");
        self.config = next;
        Ok(())
    }

    pub fn set_quiet_hours(&mut self, start: u32, end: u32) -> Result<(), RoxyError> {
        if start > 23 || end > 23 {
            return Err(RoxyError::InvalidQuietHours { start, end });
        }
        self.configure_thresholds(|c| {
            c.quiet_hours_start = start;
            c.quiet_hours_end = end;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roxy_common::FixedClock;

    // Wednesday 16:00, outside quiet hours
    fn afternoon() -> DateTime<Local> {
        FixedClock::at(2025, 3, 12, 16, 0).0
    }

    fn open(target: &str) -> Interpretation {
        Interpretation::new(CommandType::App, Action::OpenApp, Some(target.into()), 0.9)
    }

    fn music(target: &str) -> Interpretation {
        Interpretation::new(CommandType::Music, Action::SearchMusic, Some(target.into()), 0.9)
    }

    fn run(
        v: &mut PreExecutionValidator,
        i: &Interpretation,
        state: &SystemStateSnapshot,
        recent: &[RecentCommand],
        now: DateTime<Local>,
    ) -> ValidationOutcome {
        let prefs = UserPreferences::default();
        v.validate(&ValidationContext {
            utterance: "test",
            interpretation: i,
            state,
            recent,
            preferences: &prefs,
            now,
        })
    }

    fn validator() -> PreExecutionValidator {
        PreExecutionValidator::new(ValidationConfig::default())
    }

    #[test]
    fn test_quiet_machine_passes() {
        let state = SystemStateSnapshot::idle().with_load(20.0, 30.0);
        let out = run(&mut validator(), &open("spotify"), &state, &[], afternoon());
        assert!(out.should_execute);
        assert_eq!(out.confidence_score, 1.0);
        assert!(out.blocking_issues.is_empty());
    }

    #[test]
    fn test_cpu_overload_blocks_apps() {
        let state = SystemStateSnapshot::idle().with_load(90.0, 30.0);
        let out = run(&mut validator(), &open("spotify"), &state, &[], afternoon());
        assert!(!out.should_execute);
        assert!(out.blocking_issues[0].contains("CPU sobrecargada"));

        // Content under the same load only warns
        let content = Interpretation::new(CommandType::Content, Action::SearchContent, Some("x".into()), 0.9);
        let weekend = FixedClock::at(2025, 3, 15, 16, 0).0;
        let out = run(&mut validator(), &content, &state, &[], weekend);
        assert!(out.should_execute);
        assert!((out.confidence_score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_active_user_delays_intrusive() {
        let state = SystemStateSnapshot::idle().with_idle_seconds(2.0);
        let out = run(&mut validator(), &open("chrome"), &state, &[], afternoon());
        assert_eq!(out.delay_seconds, 5);
        assert!(out.should_execute);

        let unknown_idle = SystemStateSnapshot::idle();
        let out = run(&mut validator(), &open("chrome"), &unknown_idle, &[], afternoon());
        assert_eq!(out.delay_seconds, 0);
    }

    #[test]
    fn test_work_apps_suggest_headphones() {
        let state = SystemStateSnapshot::idle().with_processes(["excel.exe"]);
        let out = run(&mut validator(), &music("jazz"), &state, &[], afternoon());
        assert!(out.recommendations.contains(&"Usar volumen bajo o auriculares".to_string()));
    }

    #[test]
    fn test_resources() {
        let low_disk = SystemStateSnapshot::idle().with_free_disk_gb(0.5);
        let out = run(&mut validator(), &open("steam"), &low_disk, &[], afternoon());
        assert!(out.blocking_issues[0].starts_with("Poco espacio en disco"));

        let offline = SystemStateSnapshot::idle().with_network(false);
        let out = run(&mut validator(), &music("jazz"), &offline, &[], afternoon());
        assert_eq!(out.blocking_issues, vec!["Sin conexión a internet"]);

        // Unknown network state skips the check
        let out = run(&mut validator(), &music("jazz"), &SystemStateSnapshot::idle(), &[], afternoon());
        assert!(out.should_execute);
    }

    #[test]
    fn test_quiet_hours_warn_music() {
        let night = FixedClock::at(2025, 3, 12, 23, 30).0;
        let out = run(&mut validator(), &music("jazz"), &SystemStateSnapshot::idle(), &[], night);
        assert_eq!(out.warnings, vec!["Horas de silencio (22:00-7:00)"]);
        assert!(out.should_execute);

        let out = run(&mut validator(), &open("spotify"), &SystemStateSnapshot::idle(), &[], night);
        assert_eq!(out.warnings, vec!["Aplicación de audio en horas de silencio"]);
    }

    #[test]
    fn test_work_hours_warn_content_on_weekdays() {
        let content = Interpretation::new(CommandType::Content, Action::SearchContent, Some("anime".into()), 0.9);
        let out = run(&mut validator(), &content, &SystemStateSnapshot::idle(), &[], afternoon());
        assert!(out.warnings.iter().any(|w| w.starts_with("Horario laboral")));

        let saturday = FixedClock::at(2025, 3, 15, 16, 0).0;
        let out = run(&mut validator(), &content, &SystemStateSnapshot::idle(), &[], saturday);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_conflicting_apps_warn() {
        let state = SystemStateSnapshot::idle().with_processes(["vlc"]);
        let out = run(&mut validator(), &open("spotify"), &state, &[], afternoon());
        assert!(out.warnings[0].contains("vlc"));
    }

    #[test]
    fn test_browsers_conflict_both_ways() {
        let chrome = SystemStateSnapshot::idle().with_processes(["chrome"]);
        let out = run(&mut validator(), &open("firefox"), &chrome, &[], afternoon());
        assert_eq!(out.warnings, vec!["Aplicaciones conflictivas ejecutándose: chrome"]);

        let firefox = SystemStateSnapshot::idle().with_processes(["firefox-bin"]);
        let out = run(&mut validator(), &open("edge"), &firefox, &[], afternoon());
        assert_eq!(out.warnings, vec!["Aplicaciones conflictivas ejecutándose: firefox"]);
    }

    #[test]
    fn test_work_apps_need_whole_names() {
        let lookalikes = SystemStateSnapshot::idle().with_processes(["vscode-helper", "wordgrinder"]);
        let out = run(&mut validator(), &music("jazz"), &lookalikes, &[], afternoon());
        assert!(out.warnings.is_empty());

        let editor = SystemStateSnapshot::idle().with_processes(["code"]);
        let out = run(&mut validator(), &music("jazz"), &editor, &[], afternoon());
        assert_eq!(out.warnings, vec!["Aplicaciones de trabajo activas: code"]);
    }

    #[test]
    fn test_frequency_blocks_sixth() {
        let now = afternoon();
        let i = open("chrome");
        let recent: Vec<RecentCommand> = (0..5)
            .map(|n| {
                RecentCommand::from_interpretation(
                    "abre chrome",
                    &i,
                    now.with_timezone(&Utc) - Duration::seconds(50 - n * 10),
                )
            })
            .collect();
        let out = run(&mut validator(), &i, &SystemStateSnapshot::idle(), &recent, now);
        assert!(!out.should_execute);
        assert!(out.blocking_issues[0].contains("Demasiados comandos"));

        let out = run(&mut validator(), &i, &SystemStateSnapshot::idle(), &recent[..2], now);
        assert!(out.should_execute);
        assert!(out.warnings.iter().any(|w| w.starts_with("Frecuencia alta")));
        assert!(out.warnings.contains(&"Comando similar ejecutado recientemente".to_string()));
    }

    #[test]
    fn test_already_running_penalty() {
        let state = SystemStateSnapshot::idle().with_processes(["steam"]);
        let out = run(&mut validator(), &open("steam"), &state, &[], afternoon());
        assert!(out.should_execute);
        assert!((out.confidence_score - 0.6).abs() < 1e-9);
        assert_eq!(out.warnings, vec!["steam ya está ejecutándose"]);
    }

    #[test]
    fn test_history_and_stats() {
        let mut v = validator();
        v.configure_thresholds(|c| c.history_limit = 3).unwrap();
        let busy = SystemStateSnapshot::idle().with_load(95.0, 10.0);
        for _ in 0..2 {
            run(&mut v, &open("word"), &SystemStateSnapshot::idle(), &[], afternoon());
        }
        for _ in 0..2 {
            run(&mut v, &open("word"), &busy, &[], afternoon());
        }
        let stats = v.stats();
        assert_eq!(stats.total_validations, 3);
        assert_eq!(stats.executed, 1);
        assert_eq!(stats.blocked, 2);
        assert_eq!(stats.recent.len(), 3);
    }

    #[test]
    fn test_set_quiet_hours_validates() {
        let mut v = validator();
        assert!(matches!(
            v.set_quiet_hours(25, 7),
            Err(RoxyError::InvalidQuietHours { start: 25, end: 7 })
        ));
        assert_eq!(v.config().quiet_hours_start, 22);
        v.set_quiet_hours(21, 6).unwrap();
        assert_eq!(v.config().quiet_hours_start, 21);
    }
}
