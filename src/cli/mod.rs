//! Command-line interface

pub mod clean;
pub mod run;
pub mod status;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::AppConfig;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    " ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser)]
#[command(
    name = "webcollect",
    version,
    long_version = LONG_VERSION,
    about = "Resilient collect-loop runner for dynamic remote UIs"
)]
pub struct Cli {
    /// Path to a YAML config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the collect loop (resumes automatically from a saved snapshot).
    Run(run::RunArgs),
    /// Show the saved progress snapshot for a session.
    Status(status::StatusArgs),
    /// Delete a session's snapshot for an explicit fresh start.
    Clean(clean::CleanArgs),
}

/// Dispatch a parsed command line; returns the process exit code.
pub async fn dispatch(cli: Cli) -> Result<i32> {
    let config = AppConfig::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Run(args) => run::execute(config, args).await,
        Commands::Status(args) => status::execute(config, args),
        Commands::Clean(args) => clean::execute(config, args),
    }
}
