//! Loading and resolving the fixture catalog.

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use common::{catalog, fixture_path};
use searchkit::cache::CatalogCache;
use searchkit::catalog::{
    Catalog, CatalogError, CatalogProvider, Comparator, DataType, FragmentRegistry, JoinKind,
};

fn cache() -> CatalogCache {
    CatalogCache::new(Arc::new(catalog()), FragmentRegistry::with_defaults("glpi_"))
}

#[test]
fn test_fixture_loads() {
    let catalog = catalog();
    let mut names = catalog.entity_names();
    names.sort_unstable();
    assert_eq!(
        names,
        vec!["AllAssets", "Computer", "Location", "Printer", "Software", "Ticket", "User"]
    );

    let computer = catalog.entity_type("Computer").unwrap();
    assert_eq!(computer.table, "glpi_computers");
    assert!(computer.capabilities.soft_delete);
    assert!(computer.capabilities.template);
    assert_eq!(computer.default_display, vec![1, 3, 5]);
    assert_eq!(computer.meta_links["User"][0].linkfield.as_deref(), Some("users_id"));
}

#[test]
fn test_field_descriptors() {
    let cache = cache();
    let computer = cache.get("Computer", false).unwrap();

    let software = computer.field(100).unwrap();
    assert_eq!(software.join[0].kind, JoinKind::ManyToMany);
    assert_eq!(software.join[0].pivot.as_deref(), Some("glpi_computers_softwares"));
    assert!(software.join_fans_out());

    let count = computer.field(101).unwrap();
    assert!(count.use_having);
    assert!(count.allows(Comparator::MoreThan));
    assert!(!count.allows(Comparator::Contains));

    let memory = computer.field(111).unwrap();
    assert_eq!(memory.width, Some(512.0));
    assert_eq!(memory.unit.as_deref(), Some("MiB"));

    let warranty = computer.field(120).unwrap();
    assert_eq!(warranty.datatype, DataType::DateDelay);
    assert!(warranty.nodisplay);

    let location = computer.field(3).unwrap();
    assert!(location.allows(Comparator::Under));
    assert!(!computer.field(5).unwrap().allows(Comparator::Under));
}

#[test]
fn test_plugin_fields_resolved_separately() {
    let cache = cache();
    let plain = cache.get("Computer", false).unwrap();
    let with_plugins = cache.get("Computer", true).unwrap();
    assert!(plain.field(9001).is_none());
    assert_eq!(with_plugins.field(9001).unwrap().column, "asset_tag");
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_cache_computes_once() {
    let cache = cache();
    let first = cache.get("Computer", false).unwrap();
    let second = cache.get("Computer", false).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len(), 1);

    assert!(matches!(
        cache.get("Spaceship", false),
        Err(CatalogError::UnknownItemtype(_))
    ));
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_cache_shared_across_threads() {
    let cache = Arc::new(cache());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || cache.get("Ticket", false).unwrap())
        })
        .collect();
    let resolved: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(resolved.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_fragments_bound_by_table_and_column() {
    let cache = cache();
    let user = cache.get("User", false).unwrap();
    assert!(user.fragment(1).is_some());
    assert!(user.fragment(5).is_none());

    // The computer's user column reads the same table and column.
    let computer = cache.get("Computer", false).unwrap();
    assert!(computer.fragment(70).is_some());
}

#[test]
fn test_tree_parent_column() {
    let cache = cache();
    assert_eq!(
        cache.tree_parent_column("glpi_locations").as_deref(),
        Some("locations_id")
    );
    assert_eq!(cache.tree_parent_column("glpi_computers"), None);
}

#[test]
fn test_union_type() {
    let cache = cache();
    let assets = cache.get("AllAssets", false).unwrap();
    assert!(assets.is_union());
    assert_eq!(assets.union_of(), ["Computer", "Printer"]);
}

#[test]
fn test_unknown_union_member_rejected() {
    let toml = r#"
[[entity]]
name = "AllAssets"
table = "glpi_allassets"
union_of = ["Computer", "Phone"]

[[entity]]
name = "Computer"
table = "glpi_computers"
"#;
    assert!(matches!(
        Catalog::from_toml_str(toml),
        Err(CatalogError::UnknownUnionMember { ref member, .. }) if member == "Phone"
    ));
}

#[test]
fn test_invalid_identifier_rejected() {
    let toml = r#"
[[entity]]
name = "Computer"
table = "glpi_computers; DROP TABLE x"
"#;
    assert!(matches!(
        Catalog::from_toml_str(toml),
        Err(CatalogError::InvalidIdentifier(_))
    ));
}

#[test]
fn test_default_display_must_exist() {
    let toml = r#"
[[entity]]
name = "Computer"
table = "glpi_computers"
default_display = [1]
"#;
    assert!(matches!(
        Catalog::from_toml_str(toml),
        Err(CatalogError::UnknownField { id: 1, .. })
    ));
}

#[test]
fn test_missing_file() {
    let err = Catalog::from_file(fixture_path("missing.toml")).unwrap_err();
    assert!(matches!(err, CatalogError::FileNotFound(_)));
}
