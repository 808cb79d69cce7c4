//! Roxy Daemon - line-oriented command interpretation service.
//!
//! Reads one utterance per line on stdin and writes one JSON decision per
//! line on stdout. Logs go to stderr.

use anyhow::Result;
use clap::Parser;
use roxy_common::AmbiguityAnalysis;
use roxyd::{Config, Decision, Pipeline, PipelineContext};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "roxyd")]
#[command(about = "Roxy - command interpretation service", long_about = None)]
#[command(version)]
struct Args {
    /// Config file (default: user config, then /etc/roxy/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Do not wait out validator delays
    #[arg(long)]
    no_delay: bool,
}

/// A question the last reply is waiting on
enum Pending {
    Confirm(Decision),
    Clarify(AmbiguityAnalysis),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load(),
    };

    info!("Roxy daemon v{} starting", env!("CARGO_PKG_VERSION"));
    let mut pipeline = Pipeline::from_config(&config)?;
    let mut ctx = PipelineContext::new(config.pipeline.recent_commands_cap);
    let mut pending: Option<Pending> = None;

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line?;
        let utterance = line.trim();
        if utterance.is_empty() {
            continue;
        }

        let decision = match pending.take() {
            Some(Pending::Confirm(decision)) if is_yes(utterance) => decision.confirmed(),
            Some(Pending::Confirm(decision)) if is_no(utterance) => {
                info!("User declined '{}'", decision.interpretation().original_utterance);
                emit(&mut stdout, None, "De acuerdo, no lo hago.")?;
                continue;
            }
            Some(Pending::Clarify(analysis)) => {
                let selection = utterance.parse::<usize>().ok();
                pipeline.clarify(utterance, &analysis, selection, &mut ctx)
            }
            _ => pipeline.process(utterance, &mut ctx),
        };

        let message = decision.message();
        emit(&mut stdout, Some(&decision), &message)?;

        match decision {
            Decision::Confirm { .. } => pending = Some(Pending::Confirm(decision)),
            Decision::Clarify { ref analysis, .. } => {
                pending = Some(Pending::Clarify(analysis.clone()))
            }
            other => {
                let delay = other.delay_seconds();
                if other.is_execute() && delay > 0 && !args.no_delay {
                    info!("Waiting {}s before executing", delay);
                    std::thread::sleep(Duration::from_secs(delay));
                }
                let report = pipeline.commit(other);
                if let Some(outcome) = &report.outcome {
                    if !outcome.success {
                        let error = outcome.error.as_deref().unwrap_or("error desconocido");
                        warn!("Execution failed: {}", error);
                        emit(&mut stdout, None, &format!("No se pudo completar: {}", error))?;
                    }
                }
            }
        }
    }

    info!("Input closed, shutting down");
    Ok(())
}

fn emit(out: &mut impl Write, decision: Option<&Decision>, message: &str) -> Result<()> {
    let line = serde_json::json!({
        "message": message,
        "decision": decision,
    });
    writeln!(out, "{}", line)?;
    out.flush()?;
    Ok(())
}

fn is_yes(reply: &str) -> bool {
    matches!(
        reply.to_lowercase().trim_end_matches(['.', '!']),
        "sí" | "si" | "vale" | "ok" | "yes" | "claro" | "hazlo"
    )
}

fn is_no(reply: &str) -> bool {
    matches!(
        reply.to_lowercase().trim_end_matches(['.', '!']),
        "no" | "cancela" | "déjalo" | "dejalo"
    )
}
