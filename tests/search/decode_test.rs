//! Decoding data query rows against the columns of a compiled search.

#[path = "../common/mod.rs"]
mod common;

use common::compile;
use searchkit::search::{decode_rows, FieldValue, SearchRequest, SearchError};
use searchkit::transport::QueryOutput;

fn text(s: &str) -> Option<String> {
    Some(s.to_string())
}

#[test]
fn test_decode_software_column() {
    let compiled = compile(&SearchRequest::new("Computer").columns(vec![1, 100]));
    let output = QueryOutput {
        columns: vec![
            "id".into(),
            "ITEM_Computer_1".into(),
            "ITEM_Computer_100".into(),
            "ITEM_Computer_100_version".into(),
        ],
        rows: vec![
            vec![
                text("1"),
                text("dev-01"),
                text("Firefox$$1$$##$$LibreOffice$$2"),
                text("120$$1$$##$$7.6$$2"),
            ],
            vec![
                text("3"),
                text("srv-01"),
                text("__NULL__$$__NULL__"),
                text("__NULL__$$__NULL__"),
            ],
        ],
        warnings: vec![],
    };

    let rows = decode_rows(&output, &compiled.columns, &compiled.itemtype).unwrap();
    assert_eq!(rows.len(), 2);

    let software = &rows[0].cells[1];
    let names: Vec<_> = software.iter().map(|v| v.value.as_deref()).collect();
    assert_eq!(names, vec![Some("Firefox"), Some("LibreOffice")]);
    assert_eq!(software[0].id, Some(1));
    assert_eq!(software[0].extra["version"].as_deref(), Some("120"));
    assert_eq!(software[1].extra["version"].as_deref(), Some("7.6"));

    // A computer without software has an empty cell, not a NULL value.
    assert!(rows[1].cells[1].is_empty());
    assert_eq!(rows[1].cells[0], vec![FieldValue {
        id: None,
        value: text("srv-01"),
        extra: Default::default(),
    }]);
}

#[test]
fn test_escaped_separators_in_values() {
    let compiled = compile(&SearchRequest::new("Computer").columns(vec![1, 100]));
    let output = QueryOutput {
        columns: vec![
            "id".into(),
            "ITEM_Computer_1".into(),
            "ITEM_Computer_100".into(),
            "ITEM_Computer_100_version".into(),
        ],
        rows: vec![vec![
            text("3"),
            text("srv-01"),
            // `$$$$####` (id 4) and `$$##$$` (id 5), as escaped by the data query.
            text("$_$_$_$_####$$4$$##$$$_$_##$_$_$$5"),
            text("1.0$_$$4$$##$$__NULL__$$5"),
        ]],
        warnings: vec![],
    };
    let rows = decode_rows(&output, &compiled.columns, &compiled.itemtype).unwrap();
    let software = &rows[0].cells[1];
    assert_eq!(software.len(), 2);
    assert_eq!(software[0].id, Some(4));
    assert_eq!(software[0].value.as_deref(), Some("$$$$####"));
    assert_eq!(software[0].extra["version"].as_deref(), Some("1.0$"));
    assert_eq!(software[1].id, Some(5));
    assert_eq!(software[1].value.as_deref(), Some("$$##$$"));
    assert_eq!(software[1].extra["version"], None);
}

#[test]
fn test_decode_meta_column() {
    let compiled = compile(
        &SearchRequest::new("Computer")
            .columns(vec![1])
            .criteria(vec![searchkit::search::Criterion::meta(
                "User",
                1,
                searchkit::catalog::Comparator::Contains,
                "smith",
            )]),
    );
    let meta = compiled.columns.iter().find(|c| c.meta).unwrap();
    assert_eq!(meta.itemtype, "User");

    let output = QueryOutput {
        columns: vec!["id".into(), "ITEM_Computer_1".into(), meta.alias.clone()],
        rows: vec![vec![text("1"), text("dev-01"), text("Smith Alice$$1")]],
        warnings: vec![],
    };
    let rows = decode_rows(&output, &compiled.columns, &compiled.itemtype).unwrap();
    assert_eq!(rows[0].cells[1][0].value.as_deref(), Some("Smith Alice"));
    assert_eq!(rows[0].cells[1][0].id, Some(1));
}

#[test]
fn test_missing_selected_column() {
    let compiled = compile(&SearchRequest::new("Computer").columns(vec![1, 5]));
    let output = QueryOutput {
        columns: vec!["id".into(), "ITEM_Computer_1".into()],
        rows: vec![vec![text("1"), text("dev-01")]],
        warnings: vec![],
    };
    let err = decode_rows(&output, &compiled.columns, &compiled.itemtype).unwrap_err();
    assert!(matches!(err, SearchError::Decode(ref message) if message.contains("ITEM_Computer_5")));
}

#[test]
fn test_row_serialization() {
    let compiled = compile(&SearchRequest::new("Computer").columns(vec![1]));
    let output = QueryOutput {
        columns: vec!["id".into(), "ITEM_Computer_1".into()],
        rows: vec![vec![text("4"), None]],
        warnings: vec![],
    };
    let rows = decode_rows(&output, &compiled.columns, &compiled.itemtype).unwrap();
    let json = serde_json::to_value(&rows).unwrap();
    assert_eq!(
        json,
        serde_json::json!([{ "id": 4, "itemtype": "Computer", "cells": [[]] }])
    );
}
