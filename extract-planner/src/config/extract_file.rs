//! Extraction definition files
//!
//! ```yaml
//! version: 1
//! extract:
//!   OBJECTS(CUSTOM):
//!     fields: FIELDS(ALL)
//!   Account:
//!     fields: [Name, Industry]
//!     where: "Rating = 'Hot'"
//!   Contact:
//! ```
//!
//! Entry order is preserved. `fields` may be a single token or a list; an
//! entry with no body declares the entity with its default fields.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::planner::{ApiPreference, ExtractDeclaration};

#[derive(Debug, Deserialize)]
struct ExtractFile {
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    extract: serde_yaml::Mapping,
}

#[derive(Debug, Default, Deserialize)]
struct ExtractEntry {
    #[serde(default)]
    fields: Option<FieldList>,
    #[serde(rename = "where", default)]
    where_filter: Option<String>,
    #[serde(default)]
    api: Option<ApiPreference>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FieldList {
    One(String),
    Many(Vec<String>),
}

impl FieldList {
    fn into_vec(self) -> Vec<String> {
        match self {
            FieldList::One(field) => vec![field],
            FieldList::Many(fields) => fields,
        }
    }
}

/// Parse an extraction definition from YAML text
pub fn parse_extract(content: &str) -> Result<Vec<ExtractDeclaration>> {
    let file: ExtractFile =
        serde_yaml::from_str(content).context("Failed to parse extraction definition")?;
    if let Some(version) = file.version.filter(|v| *v != 1) {
        log::warn!("Extraction definition version {} is not known; reading it as version 1", version);
    }

    let mut declarations = Vec::with_capacity(file.extract.len());
    for (key, value) in file.extract {
        let sf_object = match key {
            serde_yaml::Value::String(name) => name,
            other => anyhow::bail!("Extract keys must be entity names, found {:?}", other),
        };
        let entry: Option<ExtractEntry> = serde_yaml::from_value(value)
            .with_context(|| format!("Invalid extract entry for {}", sf_object))?;
        let entry = entry.unwrap_or_default();

        declarations.push(ExtractDeclaration {
            sf_object,
            fields: entry.fields.map(FieldList::into_vec).unwrap_or_default(),
            where_filter: entry.where_filter,
            api: entry.api,
        });
    }

    Ok(declarations)
}

pub fn load_extract(path: &Path) -> Result<Vec<ExtractDeclaration>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read extraction definition: {}", path.display()))?;
    let declarations = parse_extract(&content)
        .with_context(|| format!("Invalid extraction definition: {}", path.display()))?;

    log::info!(
        "Read {} declarations from {}",
        declarations.len(),
        path.display()
    );
    Ok(declarations)
}
