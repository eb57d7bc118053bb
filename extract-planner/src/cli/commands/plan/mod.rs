pub mod handler;

use std::path::PathBuf;

use clap::Args;

use super::PlanningArgs;
use crate::mapping::writer::MappingFormat;

pub use handler::handle_plan_command;

#[derive(Debug, Clone, Args)]
pub struct PlanCommands {
    #[command(flatten)]
    pub planning: PlanningArgs,

    /// Mapping file to write (prints to stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Mapping format (guessed from the output extension when omitted)
    #[arg(long, value_enum)]
    pub format: Option<MappingFormat>,

    /// Also write a CSV report with one row per dependency edge
    #[arg(long)]
    pub edge_report: Option<PathBuf>,
}
