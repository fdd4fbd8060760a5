//! Field catalog: per-entity-type field descriptors and join paths.
//!
//! The catalog is read-only input to the search compiler. A
//! [`CatalogProvider`] supplies raw [`EntityType`] definitions (the bundled
//! implementation reads TOML); [`EntityCatalog`] is the resolved per-type
//! view with plugin fields merged in and custom fragment builders attached.
//! Resolved views are shared through [`crate::cache::CatalogCache`].

mod loader;
pub mod registry;
pub mod types;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub use loader::{is_valid_identifier, Catalog};
pub use registry::{FragmentBuilder, FragmentContext, FragmentRegistry, PersonNameFragment};
pub use types::{
    Capabilities, Comparator, DataType, EntityType, FieldDescriptor, FieldId, Hierarchy, JoinHop,
    JoinKind,
};

/// Errors raised while loading or resolving a catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read catalog file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Entity type defined twice: {0}")]
    DuplicateEntity(String),

    #[error("Field {id} defined twice for {itemtype}")]
    DuplicateField { itemtype: String, id: FieldId },

    #[error("Unknown field {id} for {itemtype}")]
    UnknownField { itemtype: String, id: FieldId },

    #[error("Unknown entity type: {0}")]
    UnknownItemtype(String),

    #[error("{itemtype} unions unknown type {member}")]
    UnknownUnionMember { itemtype: String, member: String },

    #[error("Invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Source of entity type definitions.
///
/// Must be stable for the lifetime of the process; resolved views are
/// cached and never refreshed.
pub trait CatalogProvider: Send + Sync {
    fn entity_type(&self, name: &str) -> Option<&EntityType>;

    fn entity_names(&self) -> Vec<&str>;

    /// Entity type whose base table is `table`.
    fn entity_for_table(&self, table: &str) -> Option<&EntityType> {
        self.entity_names()
            .into_iter()
            .filter_map(|name| self.entity_type(name))
            .find(|entity| entity.table == table && entity.union_of.is_empty())
    }
}

/// Resolved, immutable field catalog of one entity type.
pub struct EntityCatalog {
    name: String,
    table: String,
    capabilities: Capabilities,
    default_display: Vec<FieldId>,
    default_sort: Option<FieldId>,
    union_of: Vec<String>,
    meta_links: BTreeMap<String, Vec<JoinHop>>,
    fields: BTreeMap<FieldId, FieldDescriptor>,
    fragments: HashMap<FieldId, Arc<dyn FragmentBuilder>>,
}

impl fmt::Debug for EntityCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCatalog")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("fields", &self.fields.len())
            .field("fragments", &self.fragments.len())
            .finish()
    }
}

impl EntityCatalog {
    /// Resolve an entity type, merging plugin fields when requested.
    pub fn resolve(entity: &EntityType, with_plugins: bool, registry: &FragmentRegistry) -> Self {
        let plugin_fields: &[FieldDescriptor] = if with_plugins {
            &entity.plugin_fields
        } else {
            &[]
        };

        let fields: BTreeMap<FieldId, FieldDescriptor> = entity
            .fields
            .iter()
            .chain(plugin_fields)
            .map(|field| (field.id, field.clone()))
            .collect();

        let fragments = fields
            .values()
            .filter_map(|field| {
                registry
                    .resolve(&field.table, &field.column)
                    .map(|builder| (field.id, builder))
            })
            .collect();

        Self {
            name: entity.name.clone(),
            table: entity.table.clone(),
            capabilities: entity.capabilities.clone(),
            default_display: entity.default_display.clone(),
            default_sort: entity.default_sort,
            union_of: entity.union_of.clone(),
            meta_links: entity.meta_links.clone(),
            fields,
            fragments,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn default_display(&self) -> &[FieldId] {
        &self.default_display
    }

    pub fn default_sort(&self) -> Option<FieldId> {
        self.default_sort
    }

    /// Concrete types of a virtual (union) type; empty for concrete types.
    pub fn union_of(&self) -> &[String] {
        &self.union_of
    }

    pub fn is_union(&self) -> bool {
        !self.union_of.is_empty()
    }

    pub fn meta_link(&self, itemtype: &str) -> Option<&[JoinHop]> {
        self.meta_links.get(itemtype).map(Vec::as_slice)
    }

    pub fn field(&self, id: FieldId) -> Option<&FieldDescriptor> {
        self.fields.get(&id)
    }

    /// Fields in id order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.values()
    }

    pub fn fragment(&self, id: FieldId) -> Option<&Arc<dyn FragmentBuilder>> {
        self.fragments.get(&id)
    }
}
