//! Deps command handler

use anyhow::{Context, Result};
use colored::*;

use super::DepsCommands;
use crate::cli::commands::PlanningContext;
use crate::config::PlannerConfig;
use crate::planner::{PlanResult, ResolvedEdge};

pub async fn handle_deps_command(args: DepsCommands, config: PlannerConfig) -> Result<()> {
    let config = args.planning.apply(config);
    let context = PlanningContext::prepare(config)?;
    let plan = context.run().await?;

    if args.json {
        let json = serde_json::to_string_pretty(&plan).context("Failed to serialize plan")?;
        println!("{}", json);
        return Ok(());
    }

    print_order(&plan, args.deferred_only);
    Ok(())
}

fn print_order(plan: &PlanResult, deferred_only: bool) {
    println!("{}", "Load order".bold().underline());

    let width = plan.order.len().to_string().len();
    for (position, entity) in plan.order.iter().enumerate() {
        let edges: Vec<&ResolvedEdge> = plan
            .edges(entity)
            .iter()
            .filter(|e| !deferred_only || e.is_deferred())
            .collect();
        if deferred_only && edges.is_empty() {
            continue;
        }

        println!(
            "{:>width$}. {}",
            position + 1,
            entity.bright_white().bold(),
            width = width
        );
        for edge in edges {
            println!("{:>width$}  {}", "", describe_edge(edge), width = width);
        }
    }

    if !plan.cycles_broken.is_empty() {
        println!();
        println!("{}", "Cycles broken".bold().underline());
        for event in &plan.cycles_broken {
            println!("  {}", event);
        }
    }

    if !plan.warnings.is_empty() {
        println!();
        println!("{}", "Warnings".bold().underline());
        for warning in &plan.warnings {
            println!("  {}", warning.to_string().yellow());
        }
    }
}

fn describe_edge(edge: &ResolvedEdge) -> String {
    let targets = edge.resolved_targets.join(" | ");
    let required = if edge.is_required { " (required)" } else { "" };
    match edge.insert_after() {
        Some(anchor) => format!(
            "{} -> {}{} {}",
            edge.field_name,
            targets,
            required,
            format!("[deferred until {}]", anchor).yellow()
        ),
        None => format!("{} -> {}{}", edge.field_name, targets.dimmed(), required),
    }
}
