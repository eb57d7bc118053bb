//! Schema catalog access
//!
//! The planner never talks to a remote org directly. Everything it knows about
//! entities and fields comes through the [`SchemaCatalog`] trait, which the
//! CLI backs with a JSON snapshot and wraps in a per-run cache.

pub mod cache;
pub mod filters;
pub mod models;
pub mod snapshot;

pub use cache::CachedCatalog;
pub use models::{EntityDescriptor, FieldDescriptor, FieldType};
pub use snapshot::SnapshotCatalog;

use async_trait::async_trait;

/// Read-only view of an org's schema
///
/// Implementations must return the same answers for the duration of a
/// planning run.
#[async_trait]
pub trait SchemaCatalog: Send + Sync {
    /// All entities in the catalog, in catalog order
    async fn list_entities(&self) -> Result<Vec<EntityDescriptor>, CatalogError>;

    /// Field list for one entity
    async fn list_fields(&self, entity: &str) -> Result<Vec<FieldDescriptor>, CatalogError>;

    async fn is_queryable(&self, entity: &str) -> Result<bool, CatalogError>;

    /// Whether the entity can be queried in bulk without a per-Id filter
    async fn is_countable(&self, entity: &str) -> Result<bool, CatalogError> {
        Ok(!filters::is_not_countable(entity))
    }

    /// Known record count, or None when counts are unavailable
    async fn record_count(&self, entity: &str) -> Result<Option<u64>, CatalogError>;

    /// Whether the entity exists in the catalog at all
    async fn contains(&self, entity: &str) -> Result<bool, CatalogError> {
        match self.is_queryable(entity).await {
            Ok(_) => Ok(true),
            Err(CatalogError::UnknownEntity { .. }) => Ok(false),
        }
    }
}

/// Error reported by a schema catalog
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogError {
    /// The entity is not part of the catalog
    UnknownEntity { entity: String },
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::UnknownEntity { entity } => {
                write!(f, "Entity '{}' does not exist in the schema catalog", entity)
            }
        }
    }
}

impl std::error::Error for CatalogError {}
