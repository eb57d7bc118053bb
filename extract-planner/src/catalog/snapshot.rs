//! Schema catalog backed by a JSON snapshot file
//!
//! Snapshot layout:
//!
//! ```json
//! {
//!   "entities": [
//!     { "name": "Account", "custom": false, "count": 120,
//!       "fields": [ { "name": "Name", "type": "string", "requiredOnCreate": true, "nillable": false } ] }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{CatalogError, EntityDescriptor, FieldDescriptor, SchemaCatalog, filters};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotFile {
    entities: Vec<SnapshotEntity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEntity {
    #[serde(flatten)]
    descriptor: EntityDescriptor,
    #[serde(default)]
    fields: Vec<FieldDescriptor>,
}

/// Immutable in-memory catalog
#[derive(Debug, Clone, Default)]
pub struct SnapshotCatalog {
    entities: Vec<EntityDescriptor>,
    fields: HashMap<String, Vec<FieldDescriptor>>,
    index: HashMap<String, usize>,
}

impl SnapshotCatalog {
    /// Build a catalog from entity descriptors and their fields, keeping the given order
    pub fn from_entities(entities: Vec<(EntityDescriptor, Vec<FieldDescriptor>)>) -> Self {
        let mut catalog = Self::default();

        for (descriptor, fields) in entities {
            if catalog.index.contains_key(&descriptor.name) {
                log::warn!(
                    "Duplicate entity '{}' in catalog snapshot, keeping the first",
                    descriptor.name
                );
                continue;
            }
            catalog
                .index
                .insert(descriptor.name.clone(), catalog.entities.len());
            catalog.fields.insert(descriptor.name.clone(), fields);
            catalog.entities.push(descriptor);
        }

        catalog
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: SnapshotFile =
            serde_json::from_str(json).context("Failed to parse catalog snapshot")?;

        Ok(Self::from_entities(
            file.entities
                .into_iter()
                .map(|e| (e.descriptor, e.fields))
                .collect(),
        ))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog snapshot: {}", path.display()))?;
        let catalog = Self::from_json(&content)
            .with_context(|| format!("Invalid catalog snapshot: {}", path.display()))?;

        log::info!(
            "Loaded catalog snapshot {} ({} entities)",
            path.display(),
            catalog.entities.len()
        );
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn descriptor(&self, entity: &str) -> Result<&EntityDescriptor, CatalogError> {
        self.index
            .get(entity)
            .and_then(|&idx| self.entities.get(idx))
            .ok_or_else(|| CatalogError::UnknownEntity {
                entity: entity.to_string(),
            })
    }
}

#[async_trait]
impl SchemaCatalog for SnapshotCatalog {
    async fn list_entities(&self) -> Result<Vec<EntityDescriptor>, CatalogError> {
        Ok(self.entities.clone())
    }

    async fn list_fields(&self, entity: &str) -> Result<Vec<FieldDescriptor>, CatalogError> {
        self.fields
            .get(entity)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownEntity {
                entity: entity.to_string(),
            })
    }

    async fn is_queryable(&self, entity: &str) -> Result<bool, CatalogError> {
        Ok(self.descriptor(entity)?.queryable)
    }

    async fn is_countable(&self, entity: &str) -> Result<bool, CatalogError> {
        Ok(self.descriptor(entity)?.countable && !filters::is_not_countable(entity))
    }

    async fn record_count(&self, entity: &str) -> Result<Option<u64>, CatalogError> {
        Ok(self.descriptor(entity)?.record_count)
    }
}
