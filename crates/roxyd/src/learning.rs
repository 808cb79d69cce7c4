//! Outcome Learning Store - persisted outcomes and resolver feedback.
//!
//! Successes and failures are written to one JSON document on every record.
//! Every Nth failure runs an analysis pass that turns recurring failures into
//! augmentation blocks appended to the resolver's instruction set.
//!
//! Rules:
//! - Persistence failures are logged, never returned to the pipeline
//! - A file that cannot be read or parsed yields an empty store
//! - Augmentation blocks are versioned; identical text is never re-added and
//!   the oldest blocks are evicted past the configured bound

use chrono::{DateTime, Duration, Utc};
use roxy_common::{
    Action, CommandType, ErrorCategory, FailureRecord, Interpretation, RoxyError, SuccessRecord,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::LearningConfig;

/// Banner the augmentation blocks are rendered under
pub const AUGMENTATION_BANNER: &str = "--- MEJORAS BASADAS EN APRENDIZAJE ---";

/// Entries kept in the improvement audit log
const IMPROVEMENT_LOG_CAP: usize = 100;

/// Failures of one category needed before it yields an improvement
const CATEGORY_MIN_FAILURES: usize = 3;

/// Failures of one command type needed before it yields an improvement
const COMMAND_TYPE_MIN_FAILURES: usize = 2;

/// Offending utterances quoted in a parsing improvement
const MAX_EXAMPLES: usize = 3;

// ============================================================================
// Improvements and augmentation
// ============================================================================

/// What an improvement changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementKind {
    /// Adds problematic examples to the instructions
    PromptEnhancement,
    /// Adds interpretation rules to the instructions
    PromptClarification,
    /// Suggests validation rules; never touches the instructions
    ValidationImprovement,
    /// Names a command type the classifier keeps missing
    CommandTypeImprovement,
}

/// One entry of the improvement audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Improvement {
    pub timestamp: DateTime<Utc>,
    pub kind: ImprovementKind,
    /// Error category or command type this came from
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub prompt_addition: Option<String>,
    #[serde(default)]
    pub validation_rules: Vec<String>,
}

/// Instruction text derived from failures, with provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentationBlock {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// "error_category:parsing", "command_type:music", ...
    pub source: String,
    pub text: String,
}

/// Ordered, versioned augmentation blocks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstructionAugmentation {
    pub version: u64,
    pub blocks: Vec<AugmentationBlock>,
}

impl InstructionAugmentation {
    /// Append a block unless an identical one exists; evicts the oldest
    /// blocks beyond `max_blocks`. Returns whether anything changed.
    pub fn push(&mut self, source: &str, text: &str, max_blocks: usize) -> bool {
        if self.blocks.iter().any(|b| b.text == text) {
            return false;
        }
        self.blocks.push(AugmentationBlock {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            source: source.to_string(),
            text: text.to_string(),
        });
        while self.blocks.len() > max_blocks.max(1) {
            let evicted = self.blocks.remove(0);
            debug!("Evicted augmentation block {} ({})", evicted.id, evicted.source);
        }
        self.version += 1;
        true
    }

    /// Text appended to the base instructions; empty when there are no blocks
    pub fn render(&self) -> String {
        if self.blocks.is_empty() {
            return String::new();
        }
        let mut out = format!("\n\n{}", AUGMENTATION_BANNER);
        for block in &self.blocks {
            out.push('\n');
            out.push_str(&block.text);
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

// ============================================================================
// Analysis and statistics
// ============================================================================

/// Recent failures grouped for the improvement pass
#[derive(Debug, Clone, Default)]
pub struct FailureAnalysis {
    pub by_category: BTreeMap<ErrorCategory, Vec<FailureRecord>>,
    pub by_command_type: BTreeMap<String, Vec<FailureRecord>>,
    /// Recent failures whose confidence was below 0.7
    pub low_confidence: usize,
    pub recent_count: usize,
    pub total_count: usize,
}

impl FailureAnalysis {
    /// Category with the most failures; ties go to the first in category order
    pub fn most_common_category(&self) -> Option<(ErrorCategory, &[FailureRecord])> {
        let mut best: Option<(ErrorCategory, &[FailureRecord])> = None;
        for (cat, records) in &self.by_category {
            if best.map_or(true, |(_, b)| records.len() > b.len()) {
                best = Some((*cat, records.as_slice()));
            }
        }
        best
    }
}

/// Store counters reported by `roxyctl stats`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningStats {
    pub total_failures: usize,
    pub total_successes: usize,
    pub recent_failures: usize,
    pub improvements_applied: usize,
    pub augmentation_version: u64,
    pub augmentation_blocks: usize,
    pub error_categories: BTreeMap<String, usize>,
    pub command_type_issues: BTreeMap<String, usize>,
}

/// On-disk layout
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    failures: Vec<FailureRecord>,
    #[serde(default)]
    successes: Vec<SuccessRecord>,
    #[serde(default)]
    improvements: Vec<Improvement>,
    #[serde(default)]
    augmentation: InstructionAugmentation,
    /// Failures ever recorded; drives the analysis cadence across restarts
    #[serde(default)]
    failures_recorded: Option<usize>,
}

// ============================================================================
// Store
// ============================================================================

/// Persisted outcome history
pub struct LearningStore {
    config: LearningConfig,
    failures: Vec<FailureRecord>,
    successes: Vec<SuccessRecord>,
    improvements: Vec<Improvement>,
    augmentation: InstructionAugmentation,
    /// Failures ever recorded, including pruned ones
    failures_recorded: usize,
}

impl LearningStore {
    /// Open the store at `config.store_path`, pruning stale records.
    /// Never fails: unreadable files give an empty store.
    pub fn open(config: LearningConfig) -> Self {
        let file = match Self::load_file(&config.store_path) {
            Ok(Some(file)) => file,
            Ok(None) => StoreFile::default(),
            Err(e) => {
                warn!("{}. Starting empty.", e);
                StoreFile::default()
            }
        };

        // Files written before the counter existed start from what they hold
        let failures_recorded = file.failures_recorded.unwrap_or(file.failures.len());
        let mut store = Self {
            config,
            failures: file.failures,
            successes: file.successes,
            improvements: file.improvements,
            augmentation: file.augmentation,
            failures_recorded,
        };
        store.prune(Utc::now());

        info!(
            "Learning store loaded: {} failures, {} successes, augmentation v{}",
            store.failures.len(),
            store.successes.len(),
            store.augmentation.version
        );
        store
    }

    fn load_file(path: &Path) -> Result<Option<StoreFile>, RoxyError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| store_error("read", path, e))?;
        let file = serde_json::from_str(&contents).map_err(|e| store_error("parse", path, e))?;
        Ok(Some(file))
    }

    /// Write the whole store (temp file, then rename)
    pub fn save(&self) -> Result<(), RoxyError> {
        let file = StoreFile {
            failures: self.failures.clone(),
            successes: self.successes.clone(),
            improvements: self.improvements.clone(),
            augmentation: self.augmentation.clone(),
            failures_recorded: Some(self.failures_recorded),
        };
        let path = &self.config.store_path;
        let json = serde_json::to_string_pretty(&file).map_err(|e| store_error("serialize", path, e))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| store_error("create directory for", path, e))?;
        }

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, json).map_err(|e| store_error("write", &temp_path, e))?;
        fs::rename(&temp_path, path).map_err(|e| store_error("rename to", path, e))?;
        Ok(())
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            warn!("Learning store not saved: {}", e);
        }
    }

    /// Drop failures outside the retention window and cap both collections
    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::days(self.config.failure_retention_days);
        self.failures.retain(|f| f.timestamp > cutoff);
        trim_front(&mut self.failures, self.config.failure_cap);
        trim_front(&mut self.successes, self.config.success_cap);
    }

    pub fn record_success(&mut self, utterance: &str, interpretation: &Interpretation) {
        self.successes
            .push(SuccessRecord::for_interpretation(utterance, interpretation));
        trim_front(&mut self.successes, self.config.success_cap);
        self.persist();
    }

    /// Record a failure; every `analysis_interval` failures the analysis pass
    /// runs and the improvements it produced are returned
    pub fn record_failure(&mut self, record: FailureRecord) -> Vec<Improvement> {
        info!(
            "Failure recorded: {} -> {}",
            record.utterance, record.error_category
        );
        self.failures.push(record);
        self.prune(Utc::now());
        self.failures_recorded += 1;

        let interval = self.config.analysis_interval.max(1);
        let improvements = if self.failures_recorded % interval == 0 {
            self.run_analysis()
        } else {
            Vec::new()
        };

        self.persist();
        improvements
    }

    /// Group failures inside the retention window
    pub fn analyze(&self, now: DateTime<Utc>) -> FailureAnalysis {
        let cutoff = now - Duration::days(self.config.failure_retention_days);
        let mut analysis = FailureAnalysis {
            total_count: self.failures.len(),
            ..FailureAnalysis::default()
        };

        for f in self.failures.iter().filter(|f| f.timestamp > cutoff) {
            analysis.recent_count += 1;
            analysis
                .by_category
                .entry(f.error_category)
                .or_default()
                .push(f.clone());
            analysis
                .by_command_type
                .entry(f.command_type.as_str().to_string())
                .or_default()
                .push(f.clone());
            if f.confidence < 0.7 {
                analysis.low_confidence += 1;
            }
        }
        analysis
    }

    /// Turn recurring failures into improvements and augmentation blocks
    pub fn run_analysis(&mut self) -> Vec<Improvement> {
        let analysis = self.analyze(Utc::now());
        let generated = generate_improvements(&analysis);

        let mut applied = Vec::new();
        for improvement in generated {
            let changed = match &improvement.prompt_addition {
                Some(text) => self.augmentation.push(
                    &source_label(&improvement),
                    text,
                    self.config.max_augmentation_blocks,
                ),
                None => self.last_rules_for(&improvement.category) != Some(&improvement.validation_rules),
            };
            if changed {
                applied.push(improvement);
            }
        }

        if !applied.is_empty() {
            info!(
                "{} improvements identified, augmentation now v{}",
                applied.len(),
                self.augmentation.version
            );
            self.improvements.extend(applied.iter().cloned());
            trim_front(&mut self.improvements, IMPROVEMENT_LOG_CAP);
        }
        applied
    }

    fn last_rules_for(&self, category: &str) -> Option<&Vec<String>> {
        self.improvements
            .iter()
            .rev()
            .find(|i| i.kind == ImprovementKind::ValidationImprovement && i.category == category)
            .map(|i| &i.validation_rules)
    }

    /// Augmentation text for the resolver's instruction set
    pub fn instruction_augmentation(&self) -> String {
        self.augmentation.render()
    }

    pub fn augmentation(&self) -> &InstructionAugmentation {
        &self.augmentation
    }

    /// (successes, attempts) for this action and category
    pub fn success_counts(&self, action: Action, command_type: CommandType) -> (usize, usize) {
        let successes = self
            .successes
            .iter()
            .filter(|s| s.action == action && s.command_type == command_type)
            .count();
        let failures = self
            .failures
            .iter()
            .filter(|f| f.action == action && f.command_type == command_type)
            .count();
        (successes, successes + failures)
    }

    /// Failures recorded after `since`
    pub fn failures_since(&self, since: DateTime<Utc>) -> usize {
        self.failures.iter().filter(|f| f.timestamp > since).count()
    }

    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    pub fn successes(&self) -> &[SuccessRecord] {
        &self.successes
    }

    pub fn improvements(&self) -> &[Improvement] {
        &self.improvements
    }

    pub fn stats(&self) -> LearningStats {
        let analysis = self.analyze(Utc::now());
        LearningStats {
            total_failures: self.failures.len(),
            total_successes: self.successes.len(),
            recent_failures: analysis.recent_count,
            improvements_applied: self.improvements.len(),
            augmentation_version: self.augmentation.version,
            augmentation_blocks: self.augmentation.blocks.len(),
            error_categories: analysis
                .by_category
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), v.len()))
                .collect(),
            command_type_issues: analysis
                .by_command_type
                .iter()
                .map(|(k, v)| (k.clone(), v.len()))
                .collect(),
        }
    }
}

/// Store error naming the operation and the file
pub(crate) fn store_error(op: &str, path: &Path, err: impl std::fmt::Display) -> RoxyError {
    RoxyError::Store(format!("Failed to {} {}: {}", op, path.display(), err))
}

fn trim_front<T>(items: &mut Vec<T>, cap: usize) {
    if items.len() > cap {
        let excess = items.len() - cap;
        items.drain(..excess);
    }
}

fn source_label(improvement: &Improvement) -> String {
    match improvement.kind {
        ImprovementKind::CommandTypeImprovement => format!("command_type:{}", improvement.category),
        _ => format!("error_category:{}", improvement.category),
    }
}

fn generate_improvements(analysis: &FailureAnalysis) -> Vec<Improvement> {
    let mut out = Vec::new();

    if let Some((category, failures)) = analysis.most_common_category() {
        if failures.len() >= CATEGORY_MIN_FAILURES {
            if let Some(i) = improvement_for_category(category, failures) {
                out.push(i);
            }
        }
    }

    for (command_type, failures) in &analysis.by_command_type {
        if failures.len() >= COMMAND_TYPE_MIN_FAILURES {
            out.push(improvement_for_command_type(command_type, failures));
        }
    }
    out
}

fn improvement_for_category(
    category: ErrorCategory,
    failures: &[FailureRecord],
) -> Option<Improvement> {
    let now = Utc::now();
    match category {
        ErrorCategory::Parsing => {
            let examples = &failures[failures.len().saturating_sub(MAX_EXAMPLES)..];
            let mut text = String::from("EJEMPLOS PROBLEMÁTICOS A MEJORAR:");
            for f in examples {
                text.push_str(&format!(
                    "\n- Input: \"{}\" -> Debe ser: {}",
                    f.utterance, f.intended_action
                ));
            }
            let utterances: Vec<&str> = examples.iter().map(|f| f.utterance.as_str()).collect();
            Some(Improvement {
                timestamp: now,
                kind: ImprovementKind::PromptEnhancement,
                category: category.as_str().to_string(),
                description: format!("Mejorar parsing para inputs como: {}", utterances.join(", ")),
                prompt_addition: Some(text),
                validation_rules: Vec::new(),
            })
        }
        ErrorCategory::Misinterpretation => Some(Improvement {
            timestamp: now,
            kind: ImprovementKind::PromptClarification,
            category: category.as_str().to_string(),
            description: "Aclarar reglas de interpretación".to_string(),
            prompt_addition: Some(
                "REGLAS ADICIONALES:\n\
                 - Ser más específico en la interpretación de comandos ambiguos\n\
                 - Priorizar contexto del usuario"
                    .to_string(),
            ),
            validation_rules: Vec::new(),
        }),
        ErrorCategory::Execution => {
            let mut rules: Vec<String> = Vec::new();
            for f in failures {
                if !rules.contains(&f.actual_result) {
                    rules.push(f.actual_result.clone());
                }
            }
            Some(Improvement {
                timestamp: now,
                kind: ImprovementKind::ValidationImprovement,
                category: category.as_str().to_string(),
                description: "Mejorar validación pre-ejecución".to_string(),
                prompt_addition: None,
                validation_rules: rules,
            })
        }
        ErrorCategory::Validation => None,
    }
}

fn improvement_for_command_type(command_type: &str, failures: &[FailureRecord]) -> Improvement {
    // Most frequent lowercased utterance; first seen wins ties
    let mut counts: Vec<(String, usize)> = Vec::new();
    for f in failures {
        let pattern = f.utterance.to_lowercase();
        match counts.iter_mut().find(|(p, _)| *p == pattern) {
            Some((_, n)) => *n += 1,
            None => counts.push((pattern, 1)),
        }
    }
    let mut most_common = String::new();
    let mut best = 0;
    for (pattern, n) in counts {
        if n > best {
            best = n;
            most_common = pattern;
        }
    }

    Improvement {
        timestamp: Utc::now(),
        kind: ImprovementKind::CommandTypeImprovement,
        category: command_type.to_string(),
        description: format!("Mejorar detección para comandos tipo \"{}\"", command_type),
        prompt_addition: Some(format!(
            "MEJORA PARA {}:\n- Patrón problemático: \"{}\"\n- Debe detectarse como: {}",
            command_type.to_uppercase(),
            most_common,
            command_type
        )),
        validation_rules: Vec::new(),
    }
}
