//! CLI - Command-line argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Roxy command pipeline CLI
#[derive(Parser)]
#[command(name = "roxyctl")]
#[command(about = "Roxy - inspect and drive the command interpretation pipeline", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (default: user config, then /etc/roxy/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one utterance through the pipeline
    Interpret {
        /// The utterance, e.g. "abre spotify"
        #[arg(required = true)]
        utterance: Vec<String>,

        /// Also hand an executable decision to the dry-run adapter
        #[arg(long)]
        execute: bool,

        /// Output JSON only
        #[arg(long)]
        json: bool,
    },

    /// Learning store and correction statistics
    Stats {
        /// Output JSON only
        #[arg(long)]
        json: bool,
    },

    /// Show the learned instruction augmentation
    Augmentation {
        /// Print the full instruction set sent to the classifier
        #[arg(long)]
        full: bool,
    },

    /// Suggest corrections for an utterance
    Correct {
        #[arg(required = true)]
        utterance: Vec<String>,

        /// Record that this is what the utterance should have been
        #[arg(long)]
        learn: Option<String>,
    },

    /// Configuration helpers
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write the default configuration
    Init {
        /// Target path (default: user config path)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}
