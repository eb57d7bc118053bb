//! Planner configuration
//!
//! Settings come from a TOML file, found in this order:
//! 1. an explicit `--config` path
//! 2. the `EXTRACT_PLANNER_CONFIG` environment variable (a `.env` file is honoured)
//! 3. `<config dir>/extract-planner/config.toml`, if it exists
//!
//! Without any of these the built-in defaults apply. Command-line flags are
//! applied on top by the CLI.

pub mod extract_file;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::planner::{
    BreakCyclesMode, ConfigurationError, DEFAULT_MAX_CONCURRENT_LOOKUPS, DefaultDeclarations,
    ExtractDeclaration, PlanOptions,
};

pub const CONFIG_ENV_VAR: &str = "EXTRACT_PLANNER_CONFIG";
const APP_DIR: &str = "extract-planner";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// JSON schema snapshot used as the catalog
    pub catalog: Option<PathBuf>,
    /// Extraction definition file (`extract:` YAML)
    pub extraction_definition: Option<PathBuf>,
    pub ignore: Vec<String>,
    pub include: Vec<String>,
    /// "auto" or "ask"
    pub break_cycles: String,
    pub strip_namespace: bool,
    pub namespace: Option<String>,
    pub exclude_setup_objects: bool,
    pub required_fields_only: Vec<String>,
    pub max_concurrent_lookups: usize,
    /// Inline declarations, used when no extraction definition is given
    pub declarations: Vec<ExtractDeclaration>,
    /// Replacements for the built-in default declarations
    pub defaults: Vec<ExtractDeclaration>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            catalog: None,
            extraction_definition: None,
            ignore: Vec::new(),
            include: Vec::new(),
            break_cycles: BreakCyclesMode::Auto.to_string(),
            strip_namespace: false,
            namespace: None,
            exclude_setup_objects: true,
            required_fields_only: Vec::new(),
            max_concurrent_lookups: DEFAULT_MAX_CONCURRENT_LOOKUPS,
            declarations: Vec::new(),
            defaults: Vec::new(),
        }
    }
}

impl PlannerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse planner config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        // Relative paths in the file are relative to the file itself
        if let Some(base) = path.parent() {
            config.catalog = config.catalog.map(|p| resolve_relative(base, p));
            config.extraction_definition =
                config.extraction_definition.map(|p| resolve_relative(base, p));
        }

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load from the first config location that applies, or use defaults
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        match locate(explicit) {
            Some(path) => Self::load(&path),
            None => {
                log::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn break_cycles_mode(&self) -> Result<BreakCyclesMode, ConfigurationError> {
        self.break_cycles.parse()
    }

    pub fn plan_options(&self) -> Result<PlanOptions, ConfigurationError> {
        Ok(PlanOptions {
            ignore: self.ignore.clone(),
            include: self.include.clone(),
            break_cycles: self.break_cycles_mode()?,
            strip_namespace: self.strip_namespace,
            namespace: self.namespace.clone(),
            exclude_setup_objects: self.exclude_setup_objects,
            required_fields_only: self.required_fields_only.iter().cloned().collect::<HashSet<_>>(),
            max_concurrent_lookups: self.max_concurrent_lookups.max(1),
        })
    }

    pub fn default_declarations(&self) -> DefaultDeclarations {
        DefaultDeclarations::builtin().with_overrides(self.defaults.iter().cloned())
    }
}

/// Default config location under the user's config directory
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}

fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    default_config_path().filter(|p| p.exists())
}

fn resolve_relative(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlannerConfig::from_toml_str("").unwrap();
        assert_eq!(config, PlannerConfig::default());

        let options = config.plan_options().unwrap();
        assert_eq!(options.break_cycles, BreakCyclesMode::Auto);
        assert!(options.exclude_setup_objects);
        assert_eq!(options.max_concurrent_lookups, DEFAULT_MAX_CONCURRENT_LOOKUPS);
    }

    #[test]
    fn test_full_config() {
        let config = PlannerConfig::from_toml_str(
            r#"
            catalog = "schema.json"
            ignore = ["%History", "Account.Legacy%"]
            include = ["Product2"]
            break_cycles = "ask"
            strip_namespace = true
            namespace = "ns"
            exclude_setup_objects = false
            required_fields_only = ["Contact"]
            max_concurrent_lookups = 2

            [[declarations]]
            sf_object = "Account"
            fields = ["Name", "Industry"]
            where = "Rating = 'Hot'"

            [[defaults]]
            sf_object = "Group"
            fields = ["Name"]
            "#,
        )
        .unwrap();

        let options = config.plan_options().unwrap();
        assert_eq!(options.break_cycles, BreakCyclesMode::Ask);
        assert!(options.required_fields_only.contains("Contact"));
        assert_eq!(options.namespace.as_deref(), Some("ns"));
        assert_eq!(config.declarations[0].where_filter.as_deref(), Some("Rating = 'Hot'"));

        let defaults = config.default_declarations();
        assert_eq!(defaults.get("Group").unwrap().fields, vec!["Name"]);
        assert!(defaults.get("User").is_some());
    }

    #[test]
    fn test_invalid_break_cycles_mode() {
        let config = PlannerConfig::from_toml_str(r#"break_cycles = "sometimes""#).unwrap();
        assert_eq!(
            config.plan_options().unwrap_err(),
            ConfigurationError::InvalidBreakCyclesMode {
                value: "sometimes".to_string()
            }
        );
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "catalog = \"schema.json\"\nextraction_definition = \"/abs/extract.yml\"\n",
        )
        .unwrap();

        let config = PlannerConfig::discover(Some(&path)).unwrap();
        assert_eq!(config.catalog, Some(dir.path().join("schema.json")));
        assert_eq!(
            config.extraction_definition,
            Some(PathBuf::from("/abs/extract.yml"))
        );
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PlannerConfig::discover(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
