//! Configuration management for roxyd.
//!
//! Loads settings from the user config dir, then /etc/roxy/config.toml,
//! or uses defaults. Every threshold the pipeline applies lives here so it
//! can be tuned without a rebuild.

use anyhow::{Context, Result};
use roxy_common::{ClientConfig, RoxyError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// System-wide config file path
pub const SYSTEM_CONFIG_PATH: &str = "/etc/roxy/config.toml";

/// Per-user config path ($XDG_CONFIG_HOME/roxy/config.toml)
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("roxy").join("config.toml"))
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join("roxy")
}

// ============================================================================
// Ambiguity
// ============================================================================

/// Ambiguity analyzer policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbiguityConfig {
    /// Score above which an analysis counts as ambiguous
    #[serde(default = "default_ambiguity_threshold")]
    pub threshold: f64,

    /// Classifier confidence below which the low-confidence detector fires
    #[serde(default = "default_low_confidence_threshold")]
    pub low_confidence_threshold: f64,

    /// How far back the history-conflict detector looks
    #[serde(default = "default_history_conflict_window")]
    pub history_conflict_window_secs: i64,

    /// Any signal above this severity forces clarification
    #[serde(default = "default_clarify_severity")]
    pub clarify_severity: f64,

    /// Aggregate score above which clarification is requested
    #[serde(default = "default_clarify_score")]
    pub clarify_score: f64,

    /// Classifier confidence below which clarification is requested
    #[serde(default = "default_clarify_confidence")]
    pub clarify_confidence: f64,

    /// Minimum confidence for suggesting alternatives instead of clarifying
    #[serde(default = "default_suggest_confidence")]
    pub suggest_confidence: f64,

    #[serde(default = "default_max_alternatives")]
    pub max_alternatives: usize,

    #[serde(default = "default_max_questions")]
    pub max_questions: usize,
}

fn default_ambiguity_threshold() -> f64 {
    0.4
}

fn default_low_confidence_threshold() -> f64 {
    0.7
}

fn default_history_conflict_window() -> i64 {
    30
}

fn default_clarify_severity() -> f64 {
    0.8
}

fn default_clarify_score() -> f64 {
    0.7
}

fn default_clarify_confidence() -> f64 {
    0.5
}

fn default_suggest_confidence() -> f64 {
    0.6
}

fn default_max_alternatives() -> usize {
    5
}

fn default_max_questions() -> usize {
    5
}

impl Default for AmbiguityConfig {
    fn default() -> Self {
        Self {
            threshold: default_ambiguity_threshold(),
            low_confidence_threshold: default_low_confidence_threshold(),
            history_conflict_window_secs: default_history_conflict_window(),
            clarify_severity: default_clarify_severity(),
            clarify_score: default_clarify_score(),
            clarify_confidence: default_clarify_confidence(),
            suggest_confidence: default_suggest_confidence(),
            max_alternatives: default_max_alternatives(),
            max_questions: default_max_questions(),
        }
    }
}

// ============================================================================
// Confidence
// ============================================================================

/// Factor weights for the dynamic confidence score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    #[serde(default = "default_w_classifier")]
    pub classifier: f64,
    #[serde(default = "default_w_historical")]
    pub historical: f64,
    #[serde(default = "default_w_clarity")]
    pub clarity: f64,
    #[serde(default = "default_w_pattern")]
    pub pattern: f64,
    #[serde(default = "default_w_system")]
    pub system: f64,
    #[serde(default = "default_w_ambiguity")]
    pub ambiguity: f64,
}

fn default_w_classifier() -> f64 {
    0.35
}

fn default_w_historical() -> f64 {
    0.20
}

fn default_w_clarity() -> f64 {
    0.15
}

fn default_w_pattern() -> f64 {
    0.15
}

fn default_w_system() -> f64 {
    0.10
}

fn default_w_ambiguity() -> f64 {
    0.05
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            classifier: default_w_classifier(),
            historical: default_w_historical(),
            clarity: default_w_clarity(),
            pattern: default_w_pattern(),
            system: default_w_system(),
            ambiguity: default_w_ambiguity(),
        }
    }
}

impl ConfidenceWeights {
    pub fn total(&self) -> f64 {
        self.classifier + self.historical + self.clarity + self.pattern + self.system + self.ambiguity
    }
}

/// Level boundaries on the final confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    #[serde(default = "default_t_very_high")]
    pub very_high: f64,
    #[serde(default = "default_t_high")]
    pub high: f64,
    #[serde(default = "default_t_medium")]
    pub medium: f64,
    #[serde(default = "default_t_low")]
    pub low: f64,
    /// Below this the command is rejected without offering alternatives
    #[serde(default = "default_t_reject_floor")]
    pub reject_floor: f64,
}

fn default_t_very_high() -> f64 {
    0.9
}

fn default_t_high() -> f64 {
    0.7
}

fn default_t_medium() -> f64 {
    0.5
}

fn default_t_low() -> f64 {
    0.3
}

fn default_t_reject_floor() -> f64 {
    0.15
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            very_high: default_t_very_high(),
            high: default_t_high(),
            medium: default_t_medium(),
            low: default_t_low(),
            reject_floor: default_t_reject_floor(),
        }
    }
}

/// Dynamic confidence calculator settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    #[serde(default)]
    pub weights: ConfidenceWeights,
    #[serde(default)]
    pub thresholds: ConfidenceThresholds,
    #[serde(default)]
    pub adjustments: AdjustmentToggles,
}

impl ConfidenceConfig {
    /// Weights must not all be zero and level boundaries must descend
    pub fn validate(&self) -> Result<(), RoxyError> {
        if self.weights.total() <= 0.0 {
            return Err(RoxyError::Config(
                "confidence weights must not all be zero".to_string(),
            ));
        }
        let t = &self.thresholds;
        let ordered = t.very_high >= t.high
            && t.high >= t.medium
            && t.medium >= t.low
            && t.low >= t.reject_floor;
        if !ordered {
            return Err(RoxyError::Config(format!(
                "confidence thresholds must descend: {} >= {} >= {} >= {} >= {}",
                t.very_high, t.high, t.medium, t.low, t.reject_floor
            )));
        }
        Ok(())
    }
}

/// Which dynamic adjustments are applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentToggles {
    #[serde(default = "default_true")]
    pub time_of_day: bool,
    #[serde(default = "default_true")]
    pub command_frequency: bool,
    #[serde(default = "default_true")]
    pub error_rate: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AdjustmentToggles {
    fn default() -> Self {
        Self {
            time_of_day: true,
            command_frequency: true,
            error_rate: true,
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Pre-execution validator thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// CPU % above which app/music commands are blocked
    #[serde(default = "default_cpu_usage_max")]
    pub cpu_usage_max: f64,
    /// CPU % above which a warning is raised
    #[serde(default = "default_cpu_warn")]
    pub cpu_warn: f64,
    #[serde(default = "default_memory_usage_max")]
    pub memory_usage_max: f64,
    /// Seconds of input idleness below which the user counts as busy
    #[serde(default = "default_user_idle_min")]
    pub user_idle_min: f64,
    #[serde(default = "default_intrusive_delay")]
    pub intrusive_delay_secs: u64,
    /// Commands allowed inside the frequency window before blocking
    #[serde(default = "default_command_frequency_max")]
    pub command_frequency_max: usize,
    /// Commands inside the window above which a warning is raised
    #[serde(default = "default_frequency_warn")]
    pub frequency_warn: usize,
    #[serde(default = "default_frequency_window")]
    pub frequency_window_secs: i64,
    #[serde(default = "default_min_free_disk_gb")]
    pub min_free_disk_gb: f64,
    #[serde(default = "default_warn_free_disk_gb")]
    pub warn_free_disk_gb: f64,
    #[serde(default = "default_quiet_start")]
    pub quiet_hours_start: u32,
    #[serde(default = "default_quiet_end")]
    pub quiet_hours_end: u32,
    #[serde(default = "default_work_start")]
    pub work_hours_start: u32,
    #[serde(default = "default_work_end")]
    pub work_hours_end: u32,
    /// host:port dialled to decide network reachability
    #[serde(default = "default_network_probe_addr")]
    pub network_probe_addr: String,
    #[serde(default = "default_network_timeout")]
    pub network_timeout_secs: u64,
    /// Validations kept for statistics
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_cpu_usage_max() -> f64 {
    80.0
}

fn default_cpu_warn() -> f64 {
    60.0
}

fn default_memory_usage_max() -> f64 {
    85.0
}

fn default_user_idle_min() -> f64 {
    30.0
}

fn default_intrusive_delay() -> u64 {
    5
}

fn default_command_frequency_max() -> usize {
    5
}

fn default_frequency_warn() -> usize {
    3
}

fn default_frequency_window() -> i64 {
    60
}

fn default_min_free_disk_gb() -> f64 {
    1.0
}

fn default_warn_free_disk_gb() -> f64 {
    5.0
}

fn default_quiet_start() -> u32 {
    22
}

fn default_quiet_end() -> u32 {
    7
}

fn default_work_start() -> u32 {
    9
}

fn default_work_end() -> u32 {
    17
}

fn default_network_probe_addr() -> String {
    "8.8.8.8:53".to_string()
}

fn default_network_timeout() -> u64 {
    3
}

fn default_history_limit() -> usize {
    100
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            cpu_usage_max: default_cpu_usage_max(),
            cpu_warn: default_cpu_warn(),
            memory_usage_max: default_memory_usage_max(),
            user_idle_min: default_user_idle_min(),
            intrusive_delay_secs: default_intrusive_delay(),
            command_frequency_max: default_command_frequency_max(),
            frequency_warn: default_frequency_warn(),
            frequency_window_secs: default_frequency_window(),
            min_free_disk_gb: default_min_free_disk_gb(),
            warn_free_disk_gb: default_warn_free_disk_gb(),
            quiet_hours_start: default_quiet_start(),
            quiet_hours_end: default_quiet_end(),
            work_hours_start: default_work_start(),
            work_hours_end: default_work_end(),
            network_probe_addr: default_network_probe_addr(),
            network_timeout_secs: default_network_timeout(),
            history_limit: default_history_limit(),
        }
    }
}

impl ValidationConfig {
    /// Whether `hour` falls in the quiet window (which may wrap midnight)
    pub fn in_quiet_hours(&self, hour: u32) -> bool {
        in_window(hour, self.quiet_hours_start, self.quiet_hours_end)
    }

    /// Whether `hour` falls inside work hours (inclusive of the end hour)
    pub fn in_work_hours(&self, hour: u32) -> bool {
        hour >= self.work_hours_start && hour <= self.work_hours_end
    }

    /// Reject thresholds that would make every check meaningless
    pub fn validate(&self) -> Result<(), RoxyError> {
        for (name, value) in [
            ("cpu_usage_max", self.cpu_usage_max),
            ("cpu_warn", self.cpu_warn),
            ("memory_usage_max", self.memory_usage_max),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(RoxyError::InvalidThreshold {
                    name: name.to_string(),
                    value,
                });
            }
        }
        if self.user_idle_min < 0.0 {
            return Err(RoxyError::InvalidThreshold {
                name: "user_idle_min".to_string(),
                value: self.user_idle_min,
            });
        }
        if self.command_frequency_max == 0 {
            return Err(RoxyError::InvalidThreshold {
                name: "command_frequency_max".to_string(),
                value: 0.0,
            });
        }
        if self.quiet_hours_start > 23 || self.quiet_hours_end > 23 {
            return Err(RoxyError::InvalidQuietHours {
                start: self.quiet_hours_start,
                end: self.quiet_hours_end,
            });
        }
        Ok(())
    }
}

/// Half-open hour window [start, end), wrapping past midnight when start > end
pub fn in_window(hour: u32, start: u32, end: u32) -> bool {
    if start == end {
        false
    } else if start < end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

// ============================================================================
// Learning + pipeline
// ============================================================================

/// Outcome learning store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningConfig {
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default = "default_success_cap")]
    pub success_cap: usize,
    #[serde(default = "default_failure_cap")]
    pub failure_cap: usize,
    #[serde(default = "default_failure_retention_days")]
    pub failure_retention_days: i64,
    /// Run failure analysis every N recorded failures
    #[serde(default = "default_analysis_interval")]
    pub analysis_interval: usize,
    /// Oldest augmentation blocks are evicted beyond this count
    #[serde(default = "default_max_augmentation_blocks")]
    pub max_augmentation_blocks: usize,
}

fn default_store_path() -> PathBuf {
    data_dir().join("learning.json")
}

fn default_success_cap() -> usize {
    100
}

fn default_failure_cap() -> usize {
    500
}

fn default_failure_retention_days() -> i64 {
    7
}

fn default_analysis_interval() -> usize {
    5
}

fn default_max_augmentation_blocks() -> usize {
    12
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            success_cap: default_success_cap(),
            failure_cap: default_failure_cap(),
            failure_retention_days: default_failure_retention_days(),
            analysis_interval: default_analysis_interval(),
            max_augmentation_blocks: default_max_augmentation_blocks(),
        }
    }
}

impl LearningConfig {
    /// Same settings, different store file
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: path.into(),
            ..Self::default()
        }
    }
}

/// Orchestration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_recent_commands_cap")]
    pub recent_commands_cap: usize,
    /// Apply high-confidence typo corrections before resolving
    #[serde(default = "default_true")]
    pub autocorrect: bool,
    #[serde(default = "default_corrections_path")]
    pub corrections_path: PathBuf,
}

fn default_recent_commands_cap() -> usize {
    50
}

fn default_corrections_path() -> PathBuf {
    data_dir().join("corrections.json")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            recent_commands_cap: default_recent_commands_cap(),
            autocorrect: true,
            corrections_path: default_corrections_path(),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub classifier: ClientConfig,
    #[serde(default = "default_knowledge")]
    pub knowledge: ClientConfig,
    #[serde(default)]
    pub ambiguity: AmbiguityConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub learning: LearningConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

fn default_knowledge() -> ClientConfig {
    ClientConfig {
        enabled: false,
        endpoint: "https://api.x.ai".to_string(),
        model: "grok-beta".to_string(),
        ..ClientConfig::default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            classifier: ClientConfig::default(),
            knowledge: default_knowledge(),
            ambiguity: AmbiguityConfig::default(),
            confidence: ConfidenceConfig::default(),
            validation: ValidationConfig::default(),
            learning: LearningConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Config {
    /// Load config from the user path, then the system path, else defaults
    pub fn load() -> Self {
        let user = user_config_path();
        let from_user = match &user {
            Some(path) => Self::load_from_path(path),
            None => Err(RoxyError::Config("no user config directory".to_string()).into()),
        };
        from_user
            .or_else(|_| Self::load_from_path(Path::new(SYSTEM_CONFIG_PATH)))
            .unwrap_or_else(|e| {
                warn!("Config not found, using defaults: {}", e);
                Config::default()
            })
    }

    /// Load config from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let config: Config = toml::from_str(&content).map_err(RoxyError::from)?;
        config.validation.validate()?;
        config.confidence.validate()?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Save default config to path (for `roxyctl config init`)
    pub fn save_default(path: &Path) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        info!("Saved default config to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.validation.cpu_usage_max, 80.0);
        assert_eq!(config.validation.command_frequency_max, 5);
        assert_eq!(config.validation.quiet_hours_start, 22);
        assert_eq!(config.learning.success_cap, 100);
        assert_eq!(config.pipeline.recent_commands_cap, 50);
        assert!(!config.knowledge.enabled);
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let w = ConfidenceWeights::default();
        assert!((w.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_toml_partial() {
        let toml_str = r#"
[validation]
command_frequency_max = 3
quiet_hours_start = 23

[confidence.weights]
classifier = 0.5
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.validation.command_frequency_max, 3);
        assert_eq!(config.validation.quiet_hours_start, 23);
        // Defaults for missing fields
        assert_eq!(config.validation.quiet_hours_end, 7);
        assert_eq!(config.confidence.weights.classifier, 0.5);
        assert_eq!(config.confidence.weights.historical, 0.20);
        assert_eq!(config.confidence.thresholds.reject_floor, 0.15);
    }

    #[test]
    fn test_quiet_hours_wrap_midnight() {
        let v = ValidationConfig::default();
        assert!(v.in_quiet_hours(23));
        assert!(v.in_quiet_hours(0));
        assert!(v.in_quiet_hours(6));
        assert!(!v.in_quiet_hours(7));
        assert!(!v.in_quiet_hours(12));
    }

    #[test]
    fn test_in_window_non_wrapping() {
        assert!(in_window(10, 9, 17));
        assert!(!in_window(17, 9, 17));
        assert!(!in_window(5, 5, 5));
    }

    #[test]
    fn test_validate_rejects_bad_hours() {
        let mut v = ValidationConfig::default();
        v.quiet_hours_start = 24;
        assert!(matches!(v.validate(), Err(RoxyError::InvalidQuietHours { .. })));
    }

    #[test]
    fn test_confidence_config_validation() {
        assert!(ConfidenceConfig::default().validate().is_ok());

        let mut c = ConfidenceConfig::default();
        c.thresholds.medium = 0.8;
        let err = c.validate().unwrap_err();
        assert_eq!(err.kind(), "config");
        assert!(err.to_string().contains("must descend"));

        let mut c = ConfidenceConfig::default();
        c.weights = ConfidenceWeights {
            classifier: 0.0,
            historical: 0.0,
            clarity: 0.0,
            pattern: 0.0,
            system: 0.0,
            ambiguity: 0.0,
        };
        assert!(matches!(c.validate(), Err(RoxyError::Config(_))));
    }

    #[test]
    fn test_load_rejects_unordered_thresholds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[confidence.thresholds]\nhigh = 0.95\n").unwrap();
        let err = Config::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("must descend"));
    }

    #[test]
    fn test_save_and_load_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("roxy").join("config.toml");
        Config::save_default(&path).unwrap();
        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.validation, ValidationConfig::default());
        assert_eq!(loaded.ambiguity, AmbiguityConfig::default());
    }

    #[test]
    fn test_load_invalid_file_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[validation\nbroken").unwrap();
        assert!(Config::load_from_path(&path).is_err());
    }
}
