//! Refgraph CLI - semantic graph indexing for resolved syntax trees
//!
//! Reads translation units exported by a front end as JSON syntax trees and
//! writes the graph facts the indexer reports for them.
//!
//! # Usage
//!
//! ```bash
//! # Index every tree under a directory, one .jsonl file per unit
//! refgraph index trees/ -o facts/
//!
//! # Print node and edge counts instead of facts
//! refgraph index unit.json --format graph
//!
//! # Show the merged configuration
//! refgraph config show
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use refgraph_config::{LogFormat, LoggingConfig};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod commands;
mod progress;

/// Refgraph - deterministic semantic graph indexing
#[derive(Parser, Debug)]
#[command(name = "refgraph")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Path to configuration file
    #[arg(long, short = 'c', global = true, env = "REFGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index syntax trees into graph facts
    Index(commands::index::IndexArgs),

    /// View and manage configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // A broken config file is reported by the command itself.
    let logging = commands::load_config(&cli.global, None)
        .map(|config| config.logging)
        .unwrap_or_default();
    init_logging(&cli.global, &logging)?;

    match cli.command {
        Commands::Index(args) => commands::index::execute(args, cli.global),
        Commands::Config(cmd) => commands::config::execute(cmd, cli.global),
    }
}

/// Install the stderr subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(global: &GlobalOptions, logging: &LoggingConfig) -> Result<()> {
    let filter = if global.quiet {
        EnvFilter::new("error")
    } else if global.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&logging.level))?
    };

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Text => {
            tracing::subscriber::set_global_default(builder.with_ansi(true).finish())?
        }
    }
    Ok(())
}
