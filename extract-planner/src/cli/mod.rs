//! Command-line interface

pub mod commands;
pub mod prompt;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::deps::DepsCommands;
use commands::plan::PlanCommands;

#[derive(Debug, Parser)]
#[command(
    name = "extract-planner",
    version,
    about = "Resolve entity dependencies and plan extraction order from a schema snapshot"
)]
pub struct Cli {
    /// Config file (defaults to $EXTRACT_PLANNER_CONFIG, then the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log progress to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Plan the extraction and emit a mapping file
    Plan(PlanCommands),
    /// Show the resolved load order and dependency edges
    Deps(DepsCommands),
}
