//! Result decoding.
//!
//! Aggregated cells pack every joined row as `value$$id`, records joined
//! with `$$##$$`, ordered by the joined row id. NULL values and ids are
//! written as `__NULL__`. Every `$` of a value is escaped as `$_` before
//! packing, so a packed value never holds `$$` and both separators split
//! unambiguously.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::catalog::{DataType, FieldId};
use crate::transport::QueryOutput;

use super::error::SearchError;

pub const RECORD_SEPARATOR: &str = "$$##$$";
pub const VALUE_SEPARATOR: &str = "$$";
pub const NULL_SENTINEL: &str = "__NULL__";
pub const ESCAPE_CHAR: &str = "$";
/// Replacement of [`ESCAPE_CHAR`] inside packed values.
pub const ESCAPED_CHAR: &str = "$_";

/// Output column holding the base row id.
pub const ID_COLUMN: &str = "id";
/// Output column holding the concrete type of a union row.
pub const TYPE_COLUMN: &str = "TYPE";

/// One value of a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
    /// Id of the joined row the value comes from (aggregated columns only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub value: Option<String>,
    /// Auxiliary columns of the same joined row.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Option<String>>,
}

impl FieldValue {
    fn new(id: Option<i64>, value: Option<String>) -> Self {
        Self {
            id,
            value,
            extra: BTreeMap::new(),
        }
    }
}

/// A decoded result row; `cells` follow the column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    pub id: i64,
    pub itemtype: String,
    pub cells: Vec<Vec<FieldValue>>,
}

/// Describes one result column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub itemtype: String,
    pub field_id: FieldId,
    pub label: String,
    pub datatype: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Field of a meta criterion's entity type.
    #[serde(default)]
    pub meta: bool,
    /// Output column name (`ITEM_<Type>_<id>`).
    pub alias: String,
    /// Whether the cell is packed with separators.
    pub aggregated: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_columns: Vec<String>,
}

impl ColumnDescriptor {
    pub fn aux_alias(&self, column: &str) -> String {
        aux_alias(&self.alias, column)
    }
}

/// Output name of field `id` of `itemtype`.
pub fn column_alias(itemtype: &str, id: FieldId) -> String {
    format!("ITEM_{itemtype}_{id}")
}

/// Output name of auxiliary `column` of the cell `alias`.
pub fn aux_alias(alias: &str, column: &str) -> String {
    format!("{alias}_{column}")
}

/// Split a packed cell into `(id, value)` records, in packing order.
/// Duplicate records and records without value and id are dropped.
pub fn decode_packed(raw: &str) -> Vec<FieldValue> {
    let mut seen = HashSet::new();
    raw.split(RECORD_SEPARATOR)
        .filter_map(|record| {
            let (value, id) = record
                .rsplit_once(VALUE_SEPARATOR)
                .unwrap_or((record, NULL_SENTINEL));
            let value =
                (value != NULL_SENTINEL).then(|| value.replace(ESCAPED_CHAR, ESCAPE_CHAR));
            let id = id.parse::<i64>().ok();
            if value.is_none() && id.is_none() {
                return None;
            }
            seen.insert((id, value.clone()))
                .then(|| FieldValue::new(id, value))
        })
        .collect()
}

/// Decode one cell. Plain cells hold at most one value.
pub fn decode_cell(raw: Option<&str>, aggregated: bool) -> Vec<FieldValue> {
    match raw {
        None => Vec::new(),
        Some(raw) if aggregated => decode_packed(raw),
        Some(raw) => vec![FieldValue::new(None, Some(raw.to_string()))],
    }
}

fn attach_extra(values: &mut [FieldValue], column: &str, raw: Option<&str>, aggregated: bool) {
    if aggregated {
        let extras = raw.map(decode_packed).unwrap_or_default();
        for value in values.iter_mut() {
            let extra = extras
                .iter()
                .find(|e| e.id.is_some() && e.id == value.id)
                .and_then(|e| e.value.clone());
            value.extra.insert(column.to_string(), extra);
        }
    } else if let Some(value) = values.first_mut() {
        value
            .extra
            .insert(column.to_string(), raw.map(str::to_string));
    }
}

/// Decode the rows of a data query.
pub fn decode_rows(
    output: &QueryOutput,
    columns: &[ColumnDescriptor],
    itemtype: &str,
) -> Result<Vec<ResultRow>, SearchError> {
    let id_index = output
        .column_index(ID_COLUMN)
        .ok_or_else(|| SearchError::Decode(format!("missing `{ID_COLUMN}` column")))?;
    let type_index = output.column_index(TYPE_COLUMN);

    let mut layout = Vec::with_capacity(columns.len());
    for column in columns {
        let index = output
            .column_index(&column.alias)
            .ok_or_else(|| SearchError::Decode(format!("missing column `{}`", column.alias)))?;
        let extras: Vec<(&str, Option<usize>)> = column
            .additional_columns
            .iter()
            .map(|c| (c.as_str(), output.column_index(&column.aux_alias(c))))
            .collect();
        layout.push((column, index, extras));
    }

    output
        .rows
        .iter()
        .map(|row| {
            let cell = |i: usize| row.get(i).and_then(|c| c.as_deref());
            let id = cell(id_index)
                .and_then(|raw| raw.parse::<i64>().ok())
                .ok_or_else(|| SearchError::Decode("row without a numeric id".into()))?;
            let row_type = type_index
                .and_then(cell)
                .unwrap_or(itemtype)
                .to_string();

            let cells = layout
                .iter()
                .map(|(column, index, extras)| {
                    let mut values = decode_cell(cell(*index), column.aggregated);
                    for (name, extra_index) in extras {
                        let raw = extra_index.and_then(cell);
                        attach_extra(&mut values, name, raw, column.aggregated);
                    }
                    values
                })
                .collect();

            Ok(ResultRow {
                id,
                itemtype: row_type,
                cells,
            })
        })
        .collect()
}
