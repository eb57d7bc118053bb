//! Output writers for mapping documents and edge reports

use std::path::Path;

use anyhow::{Context, Result};
use csv::Writer;

use super::MappingDocument;
use crate::planner::PlanResult;

/// Output format for a mapping document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum MappingFormat {
    #[default]
    Yaml,
    Json,
}

impl MappingFormat {
    /// Guess the format from a file extension, defaulting to YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => MappingFormat::Json,
            _ => MappingFormat::Yaml,
        }
    }
}

pub fn to_string(document: &MappingDocument, format: MappingFormat) -> Result<String> {
    match format {
        MappingFormat::Yaml => {
            serde_yaml::to_string(document).context("Failed to serialize mapping to YAML")
        }
        MappingFormat::Json => {
            serde_json::to_string_pretty(document).context("Failed to serialize mapping to JSON")
        }
    }
}

/// Write the mapping document to a file
pub fn write_mapping(document: &MappingDocument, path: &Path, format: MappingFormat) -> Result<()> {
    let content = to_string(document, format)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write mapping file: {}", path.display()))?;

    log::info!("Mapping written to: {}", path.display());
    Ok(())
}

/// Write one CSV row per resolved edge
pub fn write_edge_report(plan: &PlanResult, path: &Path) -> Result<()> {
    let mut wtr = Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;

    wtr.write_record([
        "Position",
        "Entity",
        "Field",
        "Targets",
        "Required",
        "Classification",
        "Anchor",
    ])
    .context("Failed to write CSV header")?;

    for (position, entity) in plan.order.iter().enumerate() {
        for edge in plan.edges(entity) {
            let classification = if edge.is_deferred() { "deferred" } else { "ordinary" };
            let record = [
                (position + 1).to_string(),
                entity.clone(),
                edge.field_name.clone(),
                edge.resolved_targets.join(";"),
                if edge.is_required { "yes" } else { "no" }.to_string(),
                classification.to_string(),
                edge.anchor_entity.clone(),
            ];
            wtr.write_record(&record)
                .with_context(|| format!("Failed to write edge: {}.{}", entity, edge.field_name))?;
        }
    }

    wtr.flush().context("Failed to flush CSV writer")?;

    log::info!("Edge report written to: {}", path.display());
    Ok(())
}
