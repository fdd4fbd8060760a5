//! Criteria trees compiled against the fixture catalog: boolean links,
//! negation, per-datatype predicates and keyword fields.

#[path = "../common/mod.rs"]
mod common;

use common::{actor, compile, engine, now};
use searchkit::catalog::Comparator;
use searchkit::search::{
    CompiledSearch, Criterion, CriterionValue, FieldKeyword, HierarchyClosures, Link, Scalar,
    SearchRequest, TranslationIndex,
};
use searchkit::sql::Dialect;

fn computers(criteria: Vec<Criterion>) -> CompiledSearch {
    compile(
        &SearchRequest::new("Computer")
            .columns(vec![1])
            .criteria(criteria)
            .at(now()),
    )
}

/// The WHERE line of the data query.
fn where_line(compiled: &CompiledSearch) -> String {
    compiled
        .data_sql
        .lines()
        .find(|line| line.starts_with("WHERE"))
        .unwrap_or_default()
        .to_string()
}

// ============================================================================
// Links and groups
// ============================================================================

#[test]
fn test_nested_group_with_or() {
    let compiled = computers(vec![
        Criterion::field(1, Comparator::Contains, "x"),
        Criterion::group(
            Link::And,
            vec![
                Criterion::field(5, Comparator::Equals, "1"),
                Criterion::field(5, Comparator::Equals, "2").with_link(Link::Or),
            ],
        ),
    ]);
    assert!(where_line(&compiled).ends_with(
        "AND `glpi_computers`.`name` LIKE '%x%' AND (`glpi_computers`.`serial` = '1' OR `glpi_computers`.`serial` = '2')"
    ));
}

#[test]
fn test_or_sibling_is_grouped_under_visibility() {
    let compiled = computers(vec![
        Criterion::field(1, Comparator::Contains, "a"),
        Criterion::field(5, Comparator::Contains, "b").with_link(Link::Or),
    ]);
    assert!(where_line(&compiled).ends_with(
        "IN (0) AND (`glpi_computers`.`name` LIKE '%a%' OR `glpi_computers`.`serial` LIKE '%b%')"
    ));
}

#[test]
fn test_links_fold_left_to_right() {
    let compiled = computers(vec![
        Criterion::field(1, Comparator::Contains, "a"),
        Criterion::field(5, Comparator::Contains, "b").with_link(Link::Or),
        Criterion::field(1, Comparator::Contains, "c").with_link(Link::And),
    ]);
    assert!(where_line(&compiled).ends_with(
        "IN (0) AND (`glpi_computers`.`name` LIKE '%a%' OR `glpi_computers`.`serial` LIKE '%b%') \
         AND `glpi_computers`.`name` LIKE '%c%'"
    ));
}

#[test]
fn test_first_sibling_link_is_ignored() {
    let compiled = computers(vec![
        Criterion::field(1, Comparator::Contains, "a").with_link(Link::Or),
    ]);
    assert!(where_line(&compiled).ends_with("IN (0) AND `glpi_computers`.`name` LIKE '%a%'"));
}

#[test]
fn test_negated_group() {
    let compiled = computers(vec![Criterion::group(
        Link::AndNot,
        vec![
            Criterion::field(1, Comparator::Contains, "a"),
            Criterion::field(5, Comparator::Contains, "b").with_link(Link::Or),
        ],
    )]);
    assert!(where_line(&compiled).ends_with(
        "AND NOT (`glpi_computers`.`name` LIKE '%a%' OR `glpi_computers`.`serial` LIKE '%b%')"
    ));
}

#[test]
fn test_empty_group_is_dropped() {
    let compiled = computers(vec![
        Criterion::group(Link::And, vec![Criterion::field(1, Comparator::Contains, "")]),
        Criterion::field(5, Comparator::Contains, "b"),
    ]);
    assert!(where_line(&compiled).ends_with("IN (0) AND `glpi_computers`.`serial` LIKE '%b%'"));
}

// ============================================================================
// Negation
// ============================================================================

#[test]
fn test_not_equals_includes_null() {
    let compiled = computers(vec![Criterion::field(5, Comparator::NotEquals, "SN1")]);
    assert!(where_line(&compiled).contains(
        "(`glpi_computers`.`serial` <> 'SN1' OR `glpi_computers`.`serial` IS NULL)"
    ));
}

#[test]
fn test_negated_link_flips_comparator() {
    let compiled = computers(vec![
        Criterion::field(1, Comparator::Contains, "dev").with_link(Link::AndNot),
    ]);
    assert!(where_line(&compiled).contains(
        "(`glpi_computers`.`name` NOT LIKE '%dev%' OR `glpi_computers`.`name` IS NULL)"
    ));

    let double = computers(vec![
        Criterion::field(1, Comparator::NotContains, "dev").with_link(Link::AndNot),
    ]);
    assert!(where_line(&double).ends_with("AND `glpi_computers`.`name` LIKE '%dev%'"));
}

#[test]
fn test_null_keyword() {
    let compiled = computers(vec![Criterion::field(5, Comparator::Contains, "NULL")]);
    assert!(where_line(&compiled).ends_with("AND `glpi_computers`.`serial` IS NULL"));

    let compiled = computers(vec![Criterion::field(5, Comparator::NotContains, "null")]);
    assert!(where_line(&compiled).ends_with("AND `glpi_computers`.`serial` IS NOT NULL"));
}

#[test]
fn test_anchored_contains() {
    let compiled = computers(vec![Criterion::field(1, Comparator::Contains, "^dev")]);
    assert!(where_line(&compiled).contains("`glpi_computers`.`name` LIKE 'dev%'"));
}

#[test]
fn test_list_value() {
    let value = CriterionValue::List(vec![
        Scalar::Text("A".into()),
        Scalar::Text("B".into()),
    ]);
    let compiled = computers(vec![Criterion::field(5, Comparator::Equals, value.clone())]);
    assert!(where_line(&compiled).contains(
        "(`glpi_computers`.`serial` = 'A' OR `glpi_computers`.`serial` = 'B')"
    ));

    let compiled = computers(vec![Criterion::field(5, Comparator::NotEquals, value)]);
    assert!(where_line(&compiled).contains(
        "((`glpi_computers`.`serial` <> 'A' OR `glpi_computers`.`serial` IS NULL) AND \
         (`glpi_computers`.`serial` <> 'B' OR `glpi_computers`.`serial` IS NULL))"
    ));
}

// ============================================================================
// Datatypes
// ============================================================================

#[test]
fn test_under_uses_closure() {
    let mut closures = HierarchyClosures::new();
    closures.insert("glpi_locations", 1, vec![1, 2, 4]);
    let request = SearchRequest::new("Computer")
        .columns(vec![1])
        .criteria(vec![Criterion::field(3, Comparator::Under, 1i64)]);
    let compiled = engine()
        .compile_for(Dialect::MySql, &request, &actor(), &closures)
        .unwrap();
    assert!(compiled.data_sql.contains("LEFT JOIN `glpi_locations`"));
    assert!(where_line(&compiled).ends_with("AND `glpi_locations`.`id` IN (1, 2, 4)"));

    let request = SearchRequest::new("Computer")
        .columns(vec![1])
        .criteria(vec![Criterion::field(3, Comparator::NotUnder, 1i64)]);
    let compiled = engine()
        .compile_for(Dialect::MySql, &request, &actor(), &closures)
        .unwrap();
    assert!(where_line(&compiled).ends_with("AND `glpi_locations`.`id` NOT IN (1, 2, 4)"));
}

#[test]
fn test_dropdown_equals_id() {
    let compiled = computers(vec![Criterion::field(3, Comparator::Equals, 4i64)]);
    assert!(where_line(&compiled).ends_with("AND `glpi_locations`.`id` = 4"));

    let compiled = computers(vec![Criterion::field(3, Comparator::Equals, "HQ")]);
    assert!(where_line(&compiled).ends_with("AND `glpi_locations`.`completename` = 'HQ'"));
}

#[test]
fn test_numeric_width_and_operators() {
    let compiled = computers(vec![Criterion::field(111, Comparator::Equals, "1024")]);
    assert!(where_line(&compiled).contains(
        "(`glpi_computers`.`memory` >= 512 AND `glpi_computers`.`memory` <= 1536)"
    ));

    let compiled = computers(vec![Criterion::field(111, Comparator::Contains, ">2048")]);
    assert!(where_line(&compiled).ends_with("AND `glpi_computers`.`memory` > 2048"));

    let compiled = computers(vec![Criterion::field(111, Comparator::LessThan, "4096")]);
    assert!(where_line(&compiled).ends_with("AND `glpi_computers`.`memory` < 4096"));

    let compiled = computers(vec![Criterion::field(2, Comparator::Equals, "5")]);
    assert!(where_line(&compiled).ends_with("AND `glpi_computers`.`id` = 5"));
}

#[test]
fn test_boolean_values() {
    let compiled = computers(vec![Criterion::field(47, Comparator::Equals, "yes")]);
    assert!(where_line(&compiled).ends_with("AND `glpi_computers`.`is_dynamic` = 1"));

    let compiled = computers(vec![Criterion::field(47, Comparator::Equals, "maybe")]);
    assert!(!where_line(&compiled).contains("is_dynamic"));
    assert_eq!(compiled.warnings.len(), 1);
    assert!(compiled.warnings[0].contains("maybe"));
}

#[test]
fn test_relative_dates() {
    let compiled = computers(vec![Criterion::field(19, Comparator::LessThan, "-7DAY")]);
    assert!(where_line(&compiled)
        .ends_with("AND `glpi_computers`.`date_mod` < '2024-03-06 10:30:00'"));

    let compiled = computers(vec![Criterion::field(19, Comparator::Equals, "2024-03-01")]);
    assert!(where_line(&compiled).ends_with(
        "AND `glpi_computers`.`date_mod` BETWEEN '2024-03-01 00:00:00' AND '2024-03-01 23:59:59'"
    ));
}

#[test]
fn test_date_delay_adds_months() {
    let compiled = computers(vec![Criterion::field(120, Comparator::LessThan, "TODAY")]);
    assert!(where_line(&compiled).ends_with(
        "AND DATE_ADD(`glpi_computers`.`warranty_date`, INTERVAL \
         `glpi_computers`.`warranty_duration` MONTH) < '2024-03-13'"
    ));
    // nodisplay fields filter without becoming columns
    assert!(compiled.columns.iter().all(|c| c.field_id != 120));
}

// ============================================================================
// Keyword fields
// ============================================================================

#[test]
fn test_all_fields_keyword() {
    let compiled = computers(vec![Criterion::keyword(
        FieldKeyword::All,
        Comparator::Contains,
        "dev",
    )]);
    let clause = where_line(&compiled);
    assert!(clause.contains("(`glpi_computers`.`name` LIKE '%dev%' OR "));
    assert!(clause.contains(" OR `glpi_computers`.`serial` LIKE '%dev%'"));
    assert!(clause.contains("`glpi_locations`.`completename` LIKE '%dev%'"));
    assert!(!clause.contains("is_dynamic"));
    assert!(!clause.contains("ITEM_Computer_101"));
    assert!(compiled.warnings.is_empty());
}

#[test]
fn test_all_fields_keyword_negated() {
    let compiled = computers(vec![Criterion::keyword(
        FieldKeyword::All,
        Comparator::NotContains,
        "dev",
    )]);
    assert!(where_line(&compiled).contains(
        "(`glpi_computers`.`name` NOT LIKE '%dev%' OR `glpi_computers`.`name` IS NULL) AND "
    ));
}

#[test]
fn test_view_keyword_uses_displayed_columns() {
    let request = SearchRequest::new("Computer")
        .columns(vec![1, 5])
        .criteria(vec![Criterion::keyword(
            FieldKeyword::View,
            Comparator::Contains,
            "x",
        )]);
    let compiled = compile(&request);
    assert!(where_line(&compiled).ends_with(
        "AND (`glpi_computers`.`name` LIKE '%x%' OR `glpi_computers`.`serial` LIKE '%x%')"
    ));
}

// ============================================================================
// Rejected criteria
// ============================================================================

#[test]
fn test_disallowed_comparator_is_skipped() {
    let compiled = computers(vec![Criterion::field(5, Comparator::Under, "1")]);
    assert!(!where_line(&compiled).contains("serial"));
    assert_eq!(compiled.warnings.len(), 1);
    assert!(compiled.warnings[0].contains("under is not allowed"));
}

#[test]
fn test_unknown_criterion_field_is_skipped() {
    let compiled = computers(vec![
        Criterion::field(999, Comparator::Contains, "x"),
        Criterion::field(1, Comparator::Contains, "y"),
    ]);
    assert!(where_line(&compiled).ends_with("AND `glpi_computers`.`name` LIKE '%y%'"));
    assert_eq!(compiled.warnings.len(), 1);
    assert!(compiled.warnings[0].contains("unknown field 999"));
}

// ============================================================================
// Join paths and translations
// ============================================================================

#[test]
fn test_requester_through_link_table() {
    let request = SearchRequest::new("Ticket")
        .columns(vec![1])
        .criteria(vec![Criterion::field(4, Comparator::Contains, "alice")]);
    let compiled = compile(&request);
    let sql = &compiled.data_sql;

    assert!(sql.contains("LEFT JOIN `glpi_tickets_users` AS `glpi_tickets_users_tickets_id_"));
    assert!(sql.contains("`.type = 1)"));
    assert!(sql.contains("LEFT JOIN `glpi_users` AS `glpi_users_users_id_"));
    assert!(sql.contains("GROUP BY `glpi_tickets`.`id`"));
    assert!(where_line(&compiled).contains("`.`realname` LIKE '%alice%'"));

    let requester = compiled.columns.iter().find(|c| c.field_id == 4).unwrap();
    assert!(requester.aggregated);
}

#[test]
fn test_translated_dropdown() {
    let mut index = TranslationIndex::new("fr_FR", "glpi_dropdowntranslations");
    index.insert("Location", "completename");
    let engine = engine().with_translations(index);

    let request = SearchRequest::new("Computer")
        .columns(vec![3])
        .criteria(vec![Criterion::field(3, Comparator::Contains, "Etage")]);
    let compiled = engine
        .compile(&request, &actor(), &HierarchyClosures::new())
        .unwrap();
    let sql = &compiled.data_sql;

    let join = "LEFT JOIN `glpi_dropdowntranslations` AS `";
    let start = sql.find(join).expect("translation join") + join.len();
    let alias = &sql[start..start + sql[start..].find('`').unwrap()];
    assert!(alias.starts_with("glpi_locations_trans_completename_"));

    let translated =
        format!("COALESCE(`{alias}`.`value`, `glpi_locations`.`completename`)");
    assert!(sql.contains(&format!("{translated} AS `ITEM_Computer_3`")));
    assert!(sql.contains(&format!("`{alias}`.`language` = 'fr_FR'")));
    assert_eq!(
        sql.matches("LEFT JOIN `glpi_dropdowntranslations`").count(),
        1
    );
    assert!(where_line(&compiled).contains(&format!("{translated} LIKE '%Etage%'")));
}
