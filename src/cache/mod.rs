//! Process-wide catalog cache.
//!
//! Resolved [`EntityCatalog`]s are built lazily, once per
//! `(entity type, with plugins)` key, and shared read-only afterwards.
//!
//! # Design
//!
//! - Compute-once-if-absent: concurrent first lookups of the same key
//!   resolve to a single stored value
//! - No invalidation - the provider is stable for the process lifetime
//! - Fragment builders are attached while resolving, not per search

mod hash;
pub use hash::compute_hash;

use std::sync::Arc;

use dashmap::DashMap;

use crate::catalog::{
    CatalogError, CatalogProvider, CatalogResult, EntityCatalog, EntityType, FragmentRegistry,
    Hierarchy,
};

/// Cache key: entity type name and whether plugin fields are included.
type CacheKey = (String, bool);

/// Compute-once cache of resolved entity catalogs.
pub struct CatalogCache {
    provider: Arc<dyn CatalogProvider>,
    registry: FragmentRegistry,
    entries: DashMap<CacheKey, Arc<EntityCatalog>>,
}

impl std::fmt::Debug for CatalogCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogCache")
            .field("entries", &self.entries.len())
            .field("registry", &self.registry)
            .finish()
    }
}

impl CatalogCache {
    pub fn new(provider: Arc<dyn CatalogProvider>, registry: FragmentRegistry) -> Self {
        Self {
            provider,
            registry,
            entries: DashMap::new(),
        }
    }

    /// Get the resolved catalog of `itemtype`, building it on first use.
    pub fn get(&self, itemtype: &str, with_plugins: bool) -> CatalogResult<Arc<EntityCatalog>> {
        let key = (itemtype.to_string(), with_plugins);
        if let Some(hit) = self.entries.get(&key) {
            return Ok(Arc::clone(hit.value()));
        }

        let entry = self.entries.entry(key).or_try_insert_with(|| {
            let entity = self
                .provider
                .entity_type(itemtype)
                .ok_or_else(|| CatalogError::UnknownItemtype(itemtype.to_string()))?;
            tracing::debug!(itemtype, with_plugins, "resolving entity catalog");
            Ok::<_, CatalogError>(Arc::new(EntityCatalog::resolve(
                entity,
                with_plugins,
                &self.registry,
            )))
        })?;
        Ok(Arc::clone(entry.value()))
    }

    /// Raw definition of `itemtype`.
    pub fn entity_type(&self, itemtype: &str) -> Option<&EntityType> {
        self.provider.entity_type(itemtype)
    }

    /// Tree parent column of the entity type stored in `table`.
    pub fn tree_parent_column(&self, table: &str) -> Option<String> {
        match &self.provider.entity_for_table(table)?.capabilities.hierarchy {
            Hierarchy::Tree { parent_column } => Some(parent_column.clone()),
            Hierarchy::None => None,
        }
    }

    /// Number of resolved entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
