//! Per-run memoising wrapper around a schema catalog

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CatalogError, EntityDescriptor, FieldDescriptor, SchemaCatalog};

/// Caches entity and field lookups for the lifetime of one planning run
///
/// The planner asks for the same entity's fields several times (normalising,
/// collecting dependencies, emitting the mapping); this keeps the backing
/// catalog to one call per entity.
pub struct CachedCatalog {
    inner: Arc<dyn SchemaCatalog>,
    entities: RwLock<Option<Arc<Vec<EntityDescriptor>>>>,
    fields: RwLock<HashMap<String, Arc<Vec<FieldDescriptor>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedCatalog {
    pub fn new(inner: Arc<dyn SchemaCatalog>) -> Self {
        Self {
            inner,
            entities: RwLock::new(None),
            fields: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    async fn entities(&self) -> Result<Arc<Vec<EntityDescriptor>>, CatalogError> {
        if let Some(entities) = self.entities.read().await.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entities.clone());
        }

        let mut slot = self.entities.write().await;
        if let Some(entities) = slot.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entities.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let entities = Arc::new(self.inner.list_entities().await?);
        *slot = Some(entities.clone());
        Ok(entities)
    }

    async fn descriptor(&self, entity: &str) -> Result<EntityDescriptor, CatalogError> {
        self.entities()
            .await?
            .iter()
            .find(|e| e.name == entity)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownEntity {
                entity: entity.to_string(),
            })
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl SchemaCatalog for CachedCatalog {
    async fn list_entities(&self) -> Result<Vec<EntityDescriptor>, CatalogError> {
        Ok(self.entities().await?.as_ref().clone())
    }

    async fn list_fields(&self, entity: &str) -> Result<Vec<FieldDescriptor>, CatalogError> {
        if let Some(fields) = self.fields.read().await.get(entity) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(fields.as_ref().clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let fields = Arc::new(self.inner.list_fields(entity).await?);
        self.fields
            .write()
            .await
            .entry(entity.to_string())
            .or_insert_with(|| fields.clone());

        log::debug!("Cached {} fields for {}", fields.len(), entity);
        Ok(fields.as_ref().clone())
    }

    async fn is_queryable(&self, entity: &str) -> Result<bool, CatalogError> {
        Ok(self.descriptor(entity).await?.queryable)
    }

    async fn is_countable(&self, entity: &str) -> Result<bool, CatalogError> {
        // Descriptor flags are cached, but the backend may apply its own rules on top
        self.descriptor(entity).await?;
        self.inner.is_countable(entity).await
    }

    async fn record_count(&self, entity: &str) -> Result<Option<u64>, CatalogError> {
        Ok(self.descriptor(entity).await?.record_count)
    }
}

/// Hit/miss counters for a [`CachedCatalog`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}
