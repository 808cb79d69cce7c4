//! Roxy Control - CLI for the Roxy command pipeline.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, ConfigCommands};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = || commands::load_config(cli.config.as_deref());

    match cli.command {
        Commands::Interpret {
            utterance,
            execute,
            json,
        } => commands::interpret(&config()?, &utterance.join(" "), execute, json),
        Commands::Stats { json } => commands::stats(&config()?, json),
        Commands::Augmentation { full } => commands::augmentation(&config()?, full),
        Commands::Correct { utterance, learn } => {
            commands::correct(&config()?, &utterance.join(" "), learn.as_deref())
        }
        Commands::Config { action } => match action {
            ConfigCommands::Init { path, force } => commands::config_init(path, force),
            ConfigCommands::Show => commands::config_show(&config()?),
        },
    }
}
