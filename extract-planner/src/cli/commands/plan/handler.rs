//! Plan command handler

use anyhow::{Context, Result};
use colored::*;

use super::PlanCommands;
use crate::cli::commands::PlanningContext;
use crate::config::PlannerConfig;
use crate::mapping::writer::{self, MappingFormat};
use crate::mapping::{MappingOptions, build_mapping};
use crate::planner::{IgnoreListPolicy, PlanResult};

pub async fn handle_plan_command(args: PlanCommands, config: PlannerConfig) -> Result<()> {
    let config = args.planning.apply(config);
    let context = PlanningContext::prepare(config)?;
    let plan = context.run().await?;

    let plan_options = &context.request.options;
    let policy = IgnoreListPolicy::new(&plan_options.ignore);
    let options = MappingOptions::for_plan(&policy, plan_options);
    let document = build_mapping(&plan, context.catalog.as_ref(), &options)
        .await
        .context("Failed to build mapping")?;

    match &args.output {
        Some(path) => {
            let format = args.format.unwrap_or_else(|| MappingFormat::from_path(path));
            writer::write_mapping(&document, path, format)?;
            eprintln!(
                "{} {}",
                "Mapping written to".green(),
                path.display().to_string().cyan()
            );
        }
        None => {
            let format = args.format.unwrap_or_default();
            print!("{}", writer::to_string(&document, format)?);
        }
    }

    if let Some(path) = &args.edge_report {
        writer::write_edge_report(&plan, path)?;
        eprintln!(
            "{} {}",
            "Edge report written to".green(),
            path.display().to_string().cyan()
        );
    }

    print_summary(&plan);
    Ok(())
}

/// Summary goes to stderr so stdout stays a clean mapping document
fn print_summary(plan: &PlanResult) {
    eprintln!();
    eprintln!(
        "{} {} entities, {} deferred lookups, {} cycles broken",
        "Planned".bold(),
        plan.order.len().to_string().bright_green(),
        plan.deferred_count().to_string().yellow(),
        plan.cycles_broken.len().to_string().yellow()
    );

    for event in &plan.cycles_broken {
        eprintln!("  {} {}", "cycle".yellow(), event);
    }
    for warning in &plan.warnings {
        eprintln!("  {} {}", "warning".yellow(), warning);
    }
}
