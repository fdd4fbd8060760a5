//! Search compilation and execution.
//!
//! A [`SearchRequest`] goes through four stages:
//!
//! ```text
//! SearchRequest ──▶ JoinPlanner + predicate compiler ──▶ CompiledSearch
//!                                                            │ count / data SQL
//!                                                            ▼
//!                    SearchResult ◀── decoder ◀── SqlTransport
//! ```
//!
//! [`SearchEngine`] ties the stages together. It holds only read-only
//! state (the catalog cache, settings, the visibility provider and the
//! translation index), so one engine can serve concurrent searches.

pub mod assemble;
pub mod dates;
pub mod decode;
pub mod driver;
pub mod error;
pub mod hierarchy;
pub mod join;
pub mod predicate;
pub mod request;
pub mod session;
pub mod translation;

pub use assemble::{compile_search, CompileContext, CompiledSearch, PageWindow, TOTAL_COLUMN};
pub use decode::{decode_rows, ColumnDescriptor, FieldValue, ResultRow};
pub use driver::SearchResult;
pub use error::{Diagnostic, DiagnosticKind, JoinPathError, PlanError, SearchError};
pub use hierarchy::{HierarchyClosures, HierarchyRequest};
pub use request::{
    Criterion, CriterionLeaf, CriterionValue, FieldKeyword, FieldRef, Link, Scalar,
    SearchRequest,
};
pub use session::SearchSession;
pub use translation::TranslationIndex;

use std::sync::Arc;

use tracing::error;

use crate::cache::CatalogCache;
use crate::config::SearchSettings;
use crate::sql::Dialect;
use crate::transport::SqlTransport;
use crate::visibility::{ActorContext, DefaultVisibility, VisibilityProvider};

/// Compiles and runs searches against one catalog.
#[derive(Clone)]
pub struct SearchEngine {
    cache: Arc<CatalogCache>,
    settings: SearchSettings,
    visibility: Arc<dyn VisibilityProvider>,
    translations: Option<TranslationIndex>,
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine")
            .field("cache", &self.cache)
            .field("settings", &self.settings)
            .field("translations", &self.translations)
            .finish_non_exhaustive()
    }
}

impl SearchEngine {
    pub fn new(cache: Arc<CatalogCache>, settings: SearchSettings) -> Self {
        Self {
            cache,
            settings,
            visibility: Arc::new(DefaultVisibility::new()),
            translations: None,
        }
    }

    pub fn with_visibility(mut self, visibility: Arc<dyn VisibilityProvider>) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_translations(mut self, translations: TranslationIndex) -> Self {
        self.translations = Some(translations);
        self
    }

    pub fn cache(&self) -> &CatalogCache {
        &self.cache
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Closures the under/not-under criteria of `request` need.
    pub fn hierarchy_requests(&self, request: &SearchRequest) -> Vec<HierarchyRequest> {
        hierarchy::collect_requests(&self.cache, request)
    }

    /// Compile for the configured dialect.
    pub fn compile(
        &self,
        request: &SearchRequest,
        actor: &ActorContext,
        closures: &HierarchyClosures,
    ) -> Result<CompiledSearch, SearchError> {
        self.compile_for(self.settings.dialect, request, actor, closures)
    }

    pub fn compile_for(
        &self,
        dialect: Dialect,
        request: &SearchRequest,
        actor: &ActorContext,
        closures: &HierarchyClosures,
    ) -> Result<CompiledSearch, SearchError> {
        let ctx = CompileContext {
            cache: &self.cache,
            settings: &self.settings,
            visibility: self.visibility.as_ref(),
            actor,
            translations: self.translations.as_ref(),
            closures,
            dialect,
        };
        compile_search(&ctx, request)
    }

    /// Compile and run `request`. Never fails: errors come back as an
    /// empty result with a diagnostic.
    pub async fn search(
        &self,
        transport: &dyn SqlTransport,
        request: &SearchRequest,
        actor: &ActorContext,
    ) -> SearchResult {
        match self.try_search(transport, request, actor).await {
            Ok(result) => result,
            Err(err) => {
                error!(itemtype = %request.itemtype, error = %err, "search failed");
                SearchResult::failed(request, &self.settings, &err)
            }
        }
    }

    async fn try_search(
        &self,
        transport: &dyn SqlTransport,
        request: &SearchRequest,
        actor: &ActorContext,
    ) -> Result<SearchResult, SearchError> {
        let closures =
            driver::load_closures(transport, &self.hierarchy_requests(request)).await?;
        let compiled = self.compile_for(transport.dialect(), request, actor, &closures)?;
        driver::execute(transport, &compiled, &self.settings).await
    }
}
