//! Query assembly over the fixture catalog: column selection, joins,
//! grouping, paging and union types.

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use common::{compile, compile_in, now, occurrences, validate_sql};
use searchkit::catalog::Comparator;
use searchkit::search::{Criterion, SearchRequest};
use searchkit::sql::{Dialect, SortDir};
use searchkit::visibility::{DefaultVisibility, LinkedUserRule};

// ============================================================================
// Concrete types
// ============================================================================

#[test]
fn test_name_search_paged() {
    let request = SearchRequest::new("Computer")
        .columns(vec![1, 2])
        .criteria(vec![Criterion::field(1, Comparator::Contains, "dev")])
        .sort(2, SortDir::Asc)
        .page(0, 10);
    let compiled = compile(&request);

    insta::assert_snapshot!(compiled.data_sql, @r"
SELECT
  `glpi_computers`.`id` AS `id`,
  `glpi_computers`.`name` AS `ITEM_Computer_1`,
  `glpi_computers`.`id` AS `ITEM_Computer_2`
FROM `glpi_computers`
WHERE `glpi_computers`.`is_deleted` = 0 AND `glpi_computers`.`is_template` = 0 AND `glpi_computers`.`entities_id` IN (0) AND `glpi_computers`.`name` LIKE '%dev%'
ORDER BY `ITEM_Computer_2` ASC, `glpi_computers`.`id` ASC
LIMIT 10
");

    insta::assert_snapshot!(compiled.count_sql, @r"
SELECT
  COUNT(*) AS `total`
FROM (
SELECT
  `glpi_computers`.`id` AS `id`
FROM `glpi_computers`
WHERE `glpi_computers`.`is_deleted` = 0 AND `glpi_computers`.`is_template` = 0 AND `glpi_computers`.`entities_id` IN (0) AND `glpi_computers`.`name` LIKE '%dev%'
) AS `counted`
");

    assert_eq!(compiled.columns.len(), 2);
    assert_eq!(compiled.columns[0].alias, "ITEM_Computer_1");
    assert!(!compiled.columns[0].aggregated);
    assert_eq!(compiled.sort, Some(2));
    assert!(compiled.warnings.is_empty());

    validate_sql(&compiled.data_sql, Dialect::MySql);
    validate_sql(&compiled.count_sql, Dialect::MySql);
}

#[test]
fn test_default_columns_and_sort() {
    let compiled = compile(&SearchRequest::new("Computer"));
    let aliases: Vec<&str> = compiled.columns.iter().map(|c| c.alias.as_str()).collect();
    assert_eq!(
        aliases,
        vec!["ITEM_Computer_1", "ITEM_Computer_3", "ITEM_Computer_5"]
    );
    assert_eq!(compiled.sort, Some(1));
    assert!(compiled.data_sql.contains(
        "LEFT JOIN `glpi_locations` ON (`glpi_computers`.`locations_id` = `glpi_locations`.`id`)"
    ));
    assert!(compiled
        .data_sql
        .contains("ORDER BY `ITEM_Computer_1` ASC, `glpi_computers`.`id` ASC"));
    assert!(compiled.data_sql.ends_with("LIMIT 20"));
    assert!(!compiled.data_sql.contains("GROUP BY"));
    validate_sql(&compiled.data_sql, Dialect::MySql);
}

#[test]
fn test_sort_without_displayed_column_orders_by_id() {
    let request = SearchRequest::new("Computer")
        .columns(vec![5])
        .sort(12, SortDir::Desc);
    let compiled = compile(&request);
    assert!(compiled
        .data_sql
        .contains("ORDER BY `glpi_computers`.`id` DESC"));
}

#[test]
fn test_many_to_many_column_is_aggregated() {
    let request = SearchRequest::new("Computer").columns(vec![1, 100]);
    let compiled = compile(&request);
    let sql = &compiled.data_sql;

    assert!(sql.contains(
        "LEFT JOIN `glpi_computers_softwares` ON (`glpi_computers_softwares`.`computers_id` = `glpi_computers`.`id`)"
    ));
    assert!(sql.contains("LEFT JOIN `glpi_softwares` AS `glpi_softwares_softwares_id_"));
    assert!(sql.contains("GROUP_CONCAT(DISTINCT"));
    assert!(sql.contains("SEPARATOR '$$##$$') AS `ITEM_Computer_100`"));
    assert!(sql.contains("AS `ITEM_Computer_100_version`"));
    assert!(sql.contains("GROUP BY `glpi_computers`.`id`"));

    let software = &compiled.columns[1];
    assert_eq!(software.field_id, 100);
    assert!(software.aggregated);
    assert_eq!(software.additional_columns, vec!["version".to_string()]);
    assert!(!compiled.columns[0].aggregated);
}

#[test]
fn test_shared_join_for_column_and_criterion() {
    let request = SearchRequest::new("Computer")
        .columns(vec![3])
        .criteria(vec![Criterion::field(3, Comparator::Contains, "Floor")]);
    let compiled = compile(&request);
    assert_eq!(occurrences(&compiled.data_sql, "LEFT JOIN `glpi_locations`"), 1);
    assert!(compiled
        .data_sql
        .contains("`glpi_locations`.`completename` LIKE '%Floor%'"));
}

#[test]
fn test_meta_criteria_share_one_join() {
    let request = SearchRequest::new("Computer")
        .columns(vec![1, 70])
        .criteria(vec![
            Criterion::meta("User", 1, Comparator::Contains, "alice"),
            Criterion::meta("User", 1, Comparator::Contains, "bob"),
        ]);
    let compiled = compile(&request);
    let sql = &compiled.data_sql;

    assert_eq!(occurrences(sql, "LEFT JOIN `glpi_users`"), 1);
    assert!(sql.contains(
        "LEFT JOIN `glpi_users` ON (`glpi_computers`.`users_id` = `glpi_users`.`id`)"
    ));
    assert!(sql.contains("`glpi_users`.`realname` LIKE '%alice%'"));
    assert!(sql.contains("`glpi_users`.`firstname` LIKE '%bob%'"));
    assert!(sql.contains("GROUP BY `glpi_computers`.`id`"));

    let meta: Vec<_> = compiled.columns.iter().filter(|c| c.meta).collect();
    assert_eq!(meta.len(), 1);
    assert_eq!(meta[0].alias, "ITEM_User_1");
    assert!(meta[0].aggregated);
}

#[test]
fn test_meta_columns_can_be_hidden() {
    let settings = searchkit::config::SearchSettings {
        display_meta_columns: false,
        ..Default::default()
    };
    let engine = common::engine_with(settings);
    let request = SearchRequest::new("Computer")
        .criteria(vec![Criterion::meta("User", 1, Comparator::Contains, "alice")]);
    let compiled = engine
        .compile(&request, &common::actor(), &Default::default())
        .unwrap();
    assert!(compiled.columns.iter().all(|c| !c.meta));
    assert!(compiled.data_sql.contains("`glpi_users`.`name` LIKE '%alice%'"));
}

#[test]
fn test_count_without_criteria_skips_display_joins() {
    let request = SearchRequest::new("Computer").columns(vec![1, 3, 100]);
    let compiled = compile(&request);

    insta::assert_snapshot!(compiled.count_sql, @r"
SELECT
  COUNT(*) AS `total`
FROM `glpi_computers`
WHERE `glpi_computers`.`is_deleted` = 0 AND `glpi_computers`.`is_template` = 0 AND `glpi_computers`.`entities_id` IN (0)
");
    assert!(compiled.data_sql.contains("LEFT JOIN"));
}

#[test]
fn test_empty_criterion_value_is_ignored() {
    let request = SearchRequest::new("Computer")
        .criteria(vec![Criterion::field(1, Comparator::Contains, "  ")]);
    let compiled = compile(&request);
    assert!(!compiled.count_sql.contains("counted"));
    assert!(!compiled.data_sql.contains("LIKE"));
}

#[test]
fn test_compile_is_deterministic() {
    let request = SearchRequest::new("Computer")
        .columns(vec![1, 3, 100, 70])
        .criteria(vec![
            Criterion::field(100, Comparator::Contains, "office"),
            Criterion::meta("User", 5, Comparator::Contains, "@example.org"),
        ])
        .at(now());
    let first = compile(&request);
    let second = compile(&request);
    assert_eq!(first.data_sql, second.data_sql);
    assert_eq!(first.count_sql, second.count_sql);
    assert_eq!(first.columns, second.columns);
}

#[test]
fn test_trash_bin_search() {
    let mut request = SearchRequest::new("Computer").columns(vec![1]);
    request.is_deleted = true;
    let compiled = compile(&request);
    assert!(compiled
        .count_sql
        .contains("`glpi_computers`.`is_deleted` = 1"));
}

#[test]
fn test_actor_without_read_sees_nothing() {
    let engine = common::engine();
    let actor = searchkit::visibility::ActorContext::new(3, vec![0]);
    let compiled = engine
        .compile(&SearchRequest::new("Computer"), &actor, &Default::default())
        .unwrap();
    assert!(compiled.count_sql.contains("WHERE 1 = 0"));
}

#[test]
fn test_row_rule_restricts_to_linked_user() {
    let rule = LinkedUserRule {
        link_table: "glpi_tickets_users".into(),
        item_fk: "tickets_id".into(),
        user_column: "users_id".into(),
        bypass_right: 1 << 4,
    };
    let visibility = DefaultVisibility::new().with_rule("Ticket", Arc::new(rule));
    let engine = common::engine().with_visibility(Arc::new(visibility));

    let compiled = engine
        .compile(&SearchRequest::new("Ticket"), &common::actor(), &Default::default())
        .unwrap();
    assert!(compiled
        .count_sql
        .contains("`glpi_tickets_users_visibility`.`users_id` = 7"));
    assert!(compiled
        .count_sql
        .contains("COUNT(DISTINCT `glpi_tickets`.`id`)"));
    assert!(compiled.data_sql.contains("AS `glpi_tickets_users_visibility`"));

    // The bypass right lifts the restriction.
    let actor = common::actor().with_right("Ticket", 1 << 4);
    let compiled = engine
        .compile(&SearchRequest::new("Ticket"), &actor, &Default::default())
        .unwrap();
    assert!(!compiled.count_sql.contains("_visibility"));
}

// ============================================================================
// Paging
// ============================================================================

#[test]
fn test_offset_and_export() {
    let request = SearchRequest::new("Computer").columns(vec![1]).page(40, 20);
    let compiled = compile(&request);
    assert!(compiled.data_sql.ends_with("LIMIT 20 OFFSET 40"));
    assert!(compiled.data_sql_at(0).ends_with("LIMIT 20"));

    let mut export = request.clone();
    export.export_all = true;
    let compiled = compile(&export);
    assert!(!compiled.data_sql.contains("LIMIT"));
    assert_eq!(compiled.window.start, 0);
    assert_eq!(compiled.window.limit, None);
}

#[test]
fn test_page_size_is_clamped() {
    let request = SearchRequest::new("Computer").columns(vec![1]).page(0, 50_000);
    let compiled = compile(&request);
    assert_eq!(compiled.window.page_size, 1000);
    assert!(compiled.data_sql.ends_with("LIMIT 1000"));
}

// ============================================================================
// Aggregate criteria
// ============================================================================

#[test]
fn test_having_on_aggregate_field() {
    let request = SearchRequest::new("Computer")
        .columns(vec![1])
        .criteria(vec![Criterion::field(101, Comparator::MoreThan, "1")]);
    let compiled = compile(&request);

    assert!(compiled.data_sql.contains("AS `ITEM_Computer_101`"));
    assert!(compiled.data_sql.contains("COUNT(DISTINCT `glpi_softwares_softwares_id_"));
    assert!(compiled.data_sql.contains("HAVING `ITEM_Computer_101` > 1"));
    let where_line = compiled
        .data_sql
        .lines()
        .find(|line| line.starts_with("WHERE"))
        .unwrap();
    assert!(!where_line.contains("ITEM_"));

    // The count wraps the full grouped select so HAVING can see the alias.
    assert!(compiled.count_sql.contains("HAVING `ITEM_Computer_101` > 1"));
    assert!(compiled.count_sql.contains(") AS `counted`"));

    let count = compiled
        .columns
        .iter()
        .find(|c| c.field_id == 101)
        .unwrap();
    assert!(!count.aggregated);
}

// ============================================================================
// Warnings
// ============================================================================

#[test]
fn test_unknown_column_is_dropped_with_warning() {
    let request = SearchRequest::new("Computer").columns(vec![1, 999]);
    let compiled = compile(&request);
    assert_eq!(compiled.columns.len(), 1);
    assert_eq!(compiled.warnings.len(), 1);
    assert!(compiled.warnings[0].contains("999"));
}

#[test]
fn test_plugin_fields_need_opt_in() {
    let request = SearchRequest::new("Computer").columns(vec![1, 9001]);
    let compiled = compile(&request);
    assert_eq!(compiled.columns.len(), 1);

    let mut with_plugins = request.clone();
    with_plugins.with_plugins = true;
    let compiled = compile(&with_plugins);
    assert_eq!(compiled.columns.len(), 2);
    assert!(compiled
        .data_sql
        .contains("`glpi_computers`.`asset_tag` AS `ITEM_Computer_9001`"));
}

#[test]
fn test_unknown_itemtype_is_fatal() {
    let engine = common::engine();
    let result = engine.compile(
        &SearchRequest::new("Spaceship"),
        &common::actor(),
        &Default::default(),
    );
    assert!(matches!(
        result,
        Err(searchkit::search::SearchError::Catalog(_))
    ));
}

// ============================================================================
// Union types
// ============================================================================

#[test]
fn test_union_branches() {
    let compiled = compile(&SearchRequest::new("AllAssets"));
    let sql = &compiled.data_sql;

    assert_eq!(occurrences(sql, "UNION ALL"), 1);
    assert!(sql.contains("'Computer' AS `TYPE`"));
    assert!(sql.contains("'Printer' AS `TYPE`"));
    assert!(sql.contains("`glpi_computers`.`serial` AS `ITEM_AllAssets_5`"));
    assert!(sql.contains("NULL AS `ITEM_AllAssets_5`"));
    assert!(sql.contains(") AS `union_rows`"));
    assert!(sql.contains("ORDER BY `ITEM_AllAssets_1` ASC, `TYPE` ASC, `id` ASC"));

    let aliases: Vec<&str> = compiled.columns.iter().map(|c| c.alias.as_str()).collect();
    assert_eq!(
        aliases,
        vec!["ITEM_AllAssets_1", "ITEM_AllAssets_3", "ITEM_AllAssets_5"]
    );
    assert!(compiled.count_sql.starts_with("SELECT\n  COUNT(*) AS `total`\nFROM (\n"));
    assert!(compiled.count_sql.contains("UNION ALL"));

    validate_sql(sql, Dialect::MySql);
    validate_sql(&compiled.count_sql, Dialect::MySql);
}

#[test]
fn test_union_criterion_on_missing_field() {
    let request = SearchRequest::new("AllAssets")
        .criteria(vec![Criterion::field(5, Comparator::Contains, "SN")]);
    let compiled = compile(&request);
    assert!(compiled
        .data_sql
        .contains("`glpi_computers`.`serial` LIKE '%SN%'"));
    assert!(compiled.data_sql.contains("1 = 0"));
}

#[test]
fn test_union_meta_criterion_without_link() {
    let request = SearchRequest::new("AllAssets")
        .criteria(vec![Criterion::meta("User", 1, Comparator::Contains, "smith")]);
    let compiled = compile(&request);
    let printer_branch = compiled
        .data_sql
        .split("UNION ALL")
        .find(|branch| branch.contains("FROM `glpi_printers`"))
        .unwrap();
    assert!(printer_branch.contains("1 = 0"));
    assert!(!printer_branch.contains("glpi_users"));
    assert!(compiled.data_sql.contains("`glpi_users`.`realname` LIKE '%smith%'"));
}

#[test]
fn test_union_sqlite_has_no_operand_parens() {
    let compiled = compile_in(Dialect::Sqlite, &SearchRequest::new("AllAssets"));
    assert!(compiled.data_sql.contains("\nUNION ALL\nSELECT"));
    assert!(compiled.data_sql.contains("'Printer' AS \"TYPE\""));
    validate_sql(&compiled.data_sql, Dialect::Sqlite);
}
