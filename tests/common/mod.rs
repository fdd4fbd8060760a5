//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use searchkit::cache::CatalogCache;
use searchkit::catalog::{Catalog, CatalogProvider, FragmentRegistry};
use searchkit::config::SearchSettings;
use searchkit::search::{CompiledSearch, HierarchyClosures, SearchEngine, SearchRequest};
use searchkit::sql::Dialect;
use searchkit::visibility::{ActorContext, READ};

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn catalog() -> Catalog {
    Catalog::from_file(fixture_path("catalog.toml")).expect("fixture catalog should load")
}

pub fn engine_with(settings: SearchSettings) -> SearchEngine {
    let cache = CatalogCache::new(Arc::new(catalog()), FragmentRegistry::with_defaults("glpi_"));
    SearchEngine::new(Arc::new(cache), settings)
}

pub fn engine() -> SearchEngine {
    engine_with(SearchSettings::default())
}

/// Actor in entity 0 with read access to every type of the fixture.
pub fn actor() -> ActorContext {
    catalog()
        .entity_names()
        .into_iter()
        .fold(ActorContext::new(7, vec![0]), |actor, name| {
            actor.with_right(name, READ)
        })
}

/// Fixed reference time: Wednesday 2024-03-13 10:30.
pub fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 13)
        .and_then(|d| d.and_hms_opt(10, 30, 0))
        .expect("valid date")
}

pub fn compile(request: &SearchRequest) -> CompiledSearch {
    compile_in(Dialect::MySql, request)
}

pub fn compile_in(dialect: Dialect, request: &SearchRequest) -> CompiledSearch {
    engine()
        .compile_for(dialect, request, &actor(), &HierarchyClosures::new())
        .expect("search should compile")
}

/// Parse `sql` with sqlparser to catch syntax errors.
pub fn validate_sql(sql: &str, dialect: Dialect) {
    use sqlparser::dialect::{MySqlDialect, SQLiteDialect};
    use sqlparser::parser::Parser;

    let result = match dialect {
        Dialect::MySql => Parser::parse_sql(&MySqlDialect {}, sql),
        Dialect::Sqlite => Parser::parse_sql(&SQLiteDialect {}, sql),
    };
    if let Err(e) = result {
        panic!("Generated SQL failed to parse:\nSQL: {sql}\nError: {e}");
    }
}

/// Number of non-overlapping occurrences of `needle` in `haystack`.
pub fn occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}
