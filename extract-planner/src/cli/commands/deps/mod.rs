pub mod handler;

use clap::Args;

use super::PlanningArgs;

pub use handler::handle_deps_command;

#[derive(Debug, Clone, Args)]
pub struct DepsCommands {
    #[command(flatten)]
    pub planning: PlanningArgs,

    /// Print the full plan as JSON
    #[arg(long)]
    pub json: bool,

    /// Only show deferred lookups
    #[arg(long)]
    pub deferred_only: bool,
}
