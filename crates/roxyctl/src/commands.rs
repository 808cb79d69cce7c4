//! Command handlers for roxyctl.

use anyhow::{bail, Result};
use owo_colors::OwoColorize;
use roxyd::config::{user_config_path, SYSTEM_CONFIG_PATH};
use roxyd::corrector::{CommandCorrector, CorrectionKind};
use roxyd::learning::LearningStore;
use roxyd::resolver::InstructionSet;
use roxyd::{Config, Decision, Pipeline, PipelineContext};
use std::path::{Path, PathBuf};

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => Config::load_from_path(p),
        None => Ok(Config::load()),
    }
}

/// Execute `roxyctl interpret <utterance>`
pub fn interpret(config: &Config, utterance: &str, execute: bool, json: bool) -> Result<()> {
    let mut pipeline = Pipeline::from_config(config)?;
    let mut ctx = PipelineContext::new(config.pipeline.recent_commands_cap);

    let decision = pipeline.process(utterance, &mut ctx);
    let report = if execute && decision.is_execute() {
        Some(pipeline.commit(decision.clone()))
    } else {
        None
    };

    if json {
        let value = serde_json::json!({
            "decision": decision,
            "message": decision.message(),
            "outcome": report.as_ref().and_then(|r| r.outcome.clone()),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    print_decision(&decision);
    if let Some(outcome) = report.and_then(|r| r.outcome) {
        if outcome.success {
            println!("{} executed (dry run)", "✓".green());
        } else {
            println!(
                "{} {}",
                "✗".red(),
                outcome.error.unwrap_or_else(|| "execution failed".into())
            );
        }
    }
    Ok(())
}

fn print_decision(decision: &Decision) {
    let i = decision.interpretation();
    let label = match decision {
        Decision::Execute { .. } => decision.kind().green().bold().to_string(),
        Decision::Confirm { .. } | Decision::Clarify { .. } => {
            decision.kind().yellow().bold().to_string()
        }
        Decision::Converse { .. } => decision.kind().cyan().bold().to_string(),
        Decision::Reject { .. } | Decision::Blocked { .. } => {
            decision.kind().red().bold().to_string()
        }
    };

    println!("Decision:    {}", label);
    println!(
        "Command:     {} / {} {}",
        i.command_type,
        i.action,
        i.target.as_deref().unwrap_or("").dimmed()
    );
    println!("Confidence:  {:.2}", i.confidence);

    match decision {
        Decision::Execute {
            validation,
            confidence,
            ..
        } => {
            if let Some(c) = confidence {
                println!("Level:       {} ({})", c.level, c.explanation);
            }
            println!("Validation:  {}", validation.summary());
            for w in &validation.warnings {
                println!("  {} {}", "!".yellow(), w);
            }
        }
        Decision::Confirm {
            validation,
            confidence,
            ..
        } => {
            println!("Level:       {} ({})", confidence.level, confidence.explanation);
            println!("Validation:  {}", validation.summary());
        }
        Decision::Clarify { analysis, .. } => {
            println!("Ambiguity:   {:.2}", analysis.score);
            for s in &analysis.signals {
                println!("  {} {} ({:.2}): {}", "?".yellow(), s.kind, s.severity, s.description);
            }
            for q in &analysis.clarifying_questions {
                println!("  - {}", q);
            }
        }
        Decision::Reject { confidence, .. } => {
            println!("Level:       {} ({})", confidence.level, confidence.explanation);
        }
        Decision::Blocked { validation, .. } => {
            for b in &validation.blocking_issues {
                println!("  {} {}", "✗".red(), b);
            }
            for r in &validation.recommendations {
                println!("  {} {}", "→".dimmed(), r);
            }
        }
        Decision::Converse { .. } => {}
    }

    println!();
    println!("{}", decision.message());
}

/// Execute `roxyctl stats`
pub fn stats(config: &Config, json: bool) -> Result<()> {
    let store = LearningStore::open(config.learning.clone());
    let learning = store.stats();
    let corrector = CommandCorrector::open(&config.pipeline.corrections_path);
    let corrections = corrector.stats();

    if json {
        let value = serde_json::json!({
            "learning": learning,
            "corrections": {
                "total": corrections.total,
                "successful": corrections.successful,
                "success_rate": corrections.success_rate(),
                "by_kind": corrections.by_kind,
                "total_patterns": corrector.patterns().len(),
                "total_common_corrections": corrector.typo_count(),
            },
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", "Learning".bold());
    println!(
        "  Failures:          {} ({} in the retention window)",
        learning.total_failures, learning.recent_failures
    );
    println!("  Successes:         {}", learning.total_successes);
    println!("  Improvements:      {}", learning.improvements_applied);
    println!(
        "  Augmentation:      v{} ({} blocks)",
        learning.augmentation_version, learning.augmentation_blocks
    );
    for (category, n) in &learning.error_categories {
        println!("    {:<18} {}", category, n);
    }
    if !learning.command_type_issues.is_empty() {
        println!("  Failures by command type:");
        for (kind, n) in &learning.command_type_issues {
            println!("    {:<18} {}", kind, n);
        }
    }

    println!();
    println!("{}", "Corrections".bold());
    println!("  Applied:           {}", corrections.total);
    println!("  Success rate:      {:.0}%", corrections.success_rate() * 100.0);
    println!("  Learned patterns:  {}", corrector.patterns().len());
    println!("  Known typo words:  {}", corrector.typo_count());
    for (kind, n) in &corrections.by_kind {
        println!("    {:<18} {}", kind.as_str(), n);
    }
    Ok(())
}

/// Execute `roxyctl augmentation`
pub fn augmentation(config: &Config, full: bool) -> Result<()> {
    let store = LearningStore::open(config.learning.clone());
    if full {
        let mut instructions = InstructionSet::default();
        instructions.set_augmentation(store.augmentation());
        println!("{}", instructions.render());
        return Ok(());
    }

    let aug = store.augmentation();
    if aug.is_empty() {
        println!("No learned instruction changes yet.");
        return Ok(());
    }
    println!("Augmentation v{} ({} blocks)", aug.version, aug.blocks.len());
    println!();
    println!("{}", store.instruction_augmentation());
    Ok(())
}

/// Execute `roxyctl correct <utterance>`
pub fn correct(config: &Config, utterance: &str, learn: Option<&str>) -> Result<()> {
    let mut corrector = CommandCorrector::open(&config.pipeline.corrections_path);

    if let Some(corrected) = learn {
        corrector.learn_from_correction(utterance, corrected, true, CorrectionKind::UserFeedback);
        println!("{} Learned '{}' → '{}'", "✓".green(), utterance, corrected);
        return Ok(());
    }

    let suggestions = corrector.analyze(utterance, &[]);
    if suggestions.is_empty() {
        println!("No corrections for '{}'", utterance);
        return Ok(());
    }
    for s in &suggestions {
        println!(
            "{:.2}  {:<12} {}",
            s.confidence,
            s.kind.as_str(),
            s.corrected.bold()
        );
        println!("      {}", s.explanation.dimmed());
    }
    if let Some(best) = corrector.suggest_best_correction(utterance, &[]) {
        println!();
        println!("Would auto-apply: {}", best.green());
    }
    Ok(())
}

/// Execute `roxyctl config init`
pub fn config_init(path: Option<PathBuf>, force: bool) -> Result<()> {
    let Some(path) = path.or_else(user_config_path) else {
        bail!("No user config directory; pass --path");
    };
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Config::save_default(&path)?;
    println!("{} Wrote default config to {}", "✓".green(), path.display());
    Ok(())
}

/// Execute `roxyctl config show`
pub fn config_show(config: &Config) -> Result<()> {
    match user_config_path() {
        Some(p) if p.exists() => println!("# {}", p.display()),
        _ if Path::new(SYSTEM_CONFIG_PATH).exists() => println!("# {}", SYSTEM_CONFIG_PATH),
        _ => println!("# defaults (no config file)"),
    }
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
