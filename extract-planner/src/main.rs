mod catalog;
mod cli;
mod config;
mod mapping;
mod planner;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use config::PlannerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = PlannerConfig::discover(cli.config.as_deref())?;

    match cli.command {
        Commands::Plan(args) => cli::commands::plan::handle_plan_command(args, config).await,
        Commands::Deps(args) => cli::commands::deps::handle_deps_command(args, config).await,
    }
}
