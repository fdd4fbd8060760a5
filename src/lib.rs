//! # searchkit
//!
//! A metadata-driven search engine that compiles criteria trees into SQL
//! for asset-management datastores.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          Field Catalog (TOML entity types + fields)      │
//! │          + fragment registry, compute-once cache         │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [search::join, search::predicate]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Join plan + WHERE / HAVING from the criteria tree      │
//! │   + visibility predicate (entities, trash, rights)       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [search::assemble]
//! ┌─────────────────────────────────────────────────────────┐
//! │        COUNT query + paginated data query (sql AST)      │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [transport, search::decode]
//! ┌─────────────────────────────────────────────────────────┐
//! │                    SearchResult                          │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod search;
pub mod sql;
pub mod transport;
pub mod visibility;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::cache::CatalogCache;
    pub use crate::catalog::{
        Catalog, CatalogProvider, Comparator, DataType, EntityCatalog, FieldDescriptor, FieldId,
        FragmentRegistry, JoinHop, JoinKind,
    };
    pub use crate::config::{SearchSettings, Settings};
    pub use crate::search::{
        CompiledSearch, Criterion, FieldKeyword, HierarchyClosures, Link, SearchEngine,
        SearchRequest, SearchResult, SearchSession,
    };
    pub use crate::sql::{Dialect, SortDir};
    pub use crate::transport::{SqlTransport, SqliteTransport};
    pub use crate::visibility::{ActorContext, DefaultVisibility, VisibilityProvider, READ};
}

pub use search::{SearchEngine, SearchRequest, SearchResult};
pub use sql::Dialect;
