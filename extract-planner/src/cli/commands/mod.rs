//! Command handlers and the arguments they share

pub mod deps;
pub mod plan;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use is_terminal::IsTerminal;

use super::prompt::TerminalConfirmation;
use crate::catalog::{CachedCatalog, SchemaCatalog, SnapshotCatalog};
use crate::config::{PlannerConfig, extract_file};
use crate::planner::{BreakCyclesMode, ExtractDeclaration, PlanRequest, PlanResult, Planner};

/// Planning inputs shared by every command; each flag overrides the config file
#[derive(Debug, Clone, Default, Args)]
pub struct PlanningArgs {
    /// JSON schema snapshot to plan against
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Extraction definition file (YAML with an `extract:` section)
    #[arg(short, long = "extract")]
    pub extraction_definition: Option<PathBuf>,

    /// Entities to extract with all fields instead of the extraction definition (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub sobjects: Vec<String>,

    /// Entities or Entity.Field patterns to leave out (comma separated, % wildcard)
    #[arg(long, value_delimiter = ',')]
    pub ignore: Vec<String>,

    /// Cycle handling: auto or ask
    #[arg(long)]
    pub break_cycles: Option<String>,

    /// Strip the namespace prefix from emitted names
    #[arg(long)]
    pub strip_namespace: bool,

    /// Namespace prefix to strip
    #[arg(long)]
    pub namespace: Option<String>,

    /// Allow setup and tooling entities in group expansion and lookups
    #[arg(long)]
    pub include_setup_objects: bool,

    /// Entities whose optional lookups are not followed (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub required_only: Vec<String>,

    /// Concurrent catalog lookups while building the closure
    #[arg(long)]
    pub max_concurrent_lookups: Option<usize>,
}

impl PlanningArgs {
    /// Apply command-line overrides on top of a loaded config
    pub fn apply(&self, mut config: PlannerConfig) -> PlannerConfig {
        if let Some(catalog) = &self.catalog {
            config.catalog = Some(catalog.clone());
        }
        if let Some(definition) = &self.extraction_definition {
            config.extraction_definition = Some(definition.clone());
        }
        if !self.sobjects.is_empty() {
            config.extraction_definition = None;
            config.declarations = self
                .sobjects
                .iter()
                .map(|entity| ExtractDeclaration::new(entity.trim(), ["FIELDS(ALL)"]))
                .collect();
        }
        config.ignore.extend(self.ignore.iter().cloned());
        if let Some(mode) = &self.break_cycles {
            config.break_cycles = mode.clone();
        }
        if self.strip_namespace {
            config.strip_namespace = true;
        }
        if let Some(namespace) = &self.namespace {
            config.namespace = Some(namespace.clone());
        }
        if self.include_setup_objects {
            config.exclude_setup_objects = false;
        }
        config
            .required_fields_only
            .extend(self.required_only.iter().cloned());
        if let Some(limit) = self.max_concurrent_lookups {
            config.max_concurrent_lookups = limit;
        }
        config
    }
}

/// Everything a command needs to run the planner
pub struct PlanningContext {
    pub catalog: Arc<CachedCatalog>,
    pub planner: Planner,
    pub request: PlanRequest,
}

impl PlanningContext {
    pub fn prepare(config: PlannerConfig) -> Result<Self> {
        let catalog_path = config
            .catalog
            .clone()
            .context("No schema catalog given. Use --catalog or set `catalog` in the config file")?;
        let snapshot = SnapshotCatalog::from_path(&catalog_path)?;
        log::info!(
            "Loaded {} entities from {}",
            snapshot.len(),
            catalog_path.display()
        );
        let catalog = Arc::new(CachedCatalog::new(Arc::new(snapshot)));

        let declarations = match &config.extraction_definition {
            Some(path) => extract_file::load_extract(path)?,
            None => config.declarations.clone(),
        };
        if declarations.is_empty() && config.include.is_empty() {
            anyhow::bail!(
                "Nothing to extract. Provide an extraction definition, declarations in the config file, or --sobjects"
            );
        }

        let options = config.plan_options()?;
        let planner = Planner::new(catalog.clone() as Arc<dyn SchemaCatalog>)
            .with_defaults(config.default_declarations());
        let request = PlanRequest::new(declarations).with_options(options);

        Ok(Self {
            catalog,
            planner,
            request,
        })
    }

    /// Run the planner, prompting on cycles when asked to and a terminal is attached
    pub async fn run(&self) -> Result<PlanResult> {
        let mut prompt = TerminalConfirmation;
        let interactive = self.request.options.break_cycles == BreakCyclesMode::Ask
            && std::io::stdin().is_terminal();

        let result = if interactive {
            self.planner.plan(&self.request, Some(&mut prompt)).await
        } else {
            self.planner.plan(&self.request, None).await
        };
        let result = result.context("Planning failed")?;

        let stats = self.catalog.stats();
        log::debug!(
            "Catalog cache: {} hits, {} misses",
            stats.hits,
            stats.misses
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let config = PlannerConfig {
            ignore: vec!["%History".to_string()],
            break_cycles: "auto".to_string(),
            ..Default::default()
        };
        let args = PlanningArgs {
            ignore: vec!["Account.Fax".to_string()],
            break_cycles: Some("ask".to_string()),
            include_setup_objects: true,
            max_concurrent_lookups: Some(3),
            ..Default::default()
        };

        let merged = args.apply(config);
        assert_eq!(merged.ignore, vec!["%History", "Account.Fax"]);
        assert_eq!(merged.break_cycles, "ask");
        assert!(!merged.exclude_setup_objects);
        assert_eq!(merged.max_concurrent_lookups, 3);
    }

    #[test]
    fn test_prepare_requires_catalog() {
        let err = PlanningContext::prepare(PlannerConfig::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("--catalog"));
    }

    const ORDERS_SNAPSHOT: &str = r#"{"entities": [
        {"name": "Customer", "fields": [
            {"name": "Name", "type": "string", "requiredOnCreate": true, "nillable": false}
        ]},
        {"name": "Order", "fields": [
            {"name": "CustomerId", "type": "reference", "referenceTo": ["Customer"],
             "requiredOnCreate": true, "nillable": false}
        ]}
    ]}"#;

    #[test]
    fn test_sobjects_replace_extraction_definition() {
        let config = PlannerConfig {
            extraction_definition: Some(PathBuf::from("accounts.extract.yml")),
            declarations: vec![ExtractDeclaration::new("Contact", ["Name"])],
            ..Default::default()
        };
        let args = PlanningArgs {
            sobjects: vec!["Account".to_string(), " Lead".to_string()],
            ..Default::default()
        };

        let merged = args.apply(config);
        assert_eq!(merged.extraction_definition, None);
        assert!(merged.include.is_empty());
        assert_eq!(
            merged.declarations,
            vec![
                ExtractDeclaration::new("Account", ["FIELDS(ALL)"]),
                ExtractDeclaration::new("Lead", ["FIELDS(ALL)"]),
            ]
        );
    }

    #[tokio::test]
    async fn test_sobjects_do_not_clash_with_definition_entries() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = dir.path().join("schema.json");
        std::fs::write(&catalog, ORDERS_SNAPSHOT).unwrap();
        let extract = dir.path().join("extract.yml");
        std::fs::write(&extract, "extract:\n  Order:\n    fields: [CustomerId]\n").unwrap();

        let config = PlanningArgs {
            catalog: Some(catalog),
            extraction_definition: Some(extract),
            sobjects: vec!["Order".to_string()],
            ..Default::default()
        }
        .apply(PlannerConfig::default());

        let context = PlanningContext::prepare(config).unwrap();
        let result = context.run().await.unwrap();
        assert_eq!(result.order, vec!["Customer", "Order"]);
    }

    #[tokio::test]
    async fn test_prepare_and_run_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = dir.path().join("schema.json");
        std::fs::write(&catalog, ORDERS_SNAPSHOT).unwrap();
        let extract = dir.path().join("extract.yml");
        std::fs::write(&extract, "extract:\n  Order:\n").unwrap();

        let config = PlanningArgs {
            catalog: Some(catalog),
            extraction_definition: Some(extract),
            ..Default::default()
        }
        .apply(PlannerConfig::default());

        let context = PlanningContext::prepare(config).unwrap();
        let result = context.run().await.unwrap();
        assert_eq!(result.order, vec!["Customer", "Order"]);
    }
}
