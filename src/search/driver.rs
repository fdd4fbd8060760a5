//! Execution driver.
//!
//! Runs the count query, then the data query, on one transport. Aggregated
//! cells cut by the server's concatenation limit are retried once with the
//! larger limit from the settings.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::FieldId;
use crate::config::SearchSettings;
use crate::sql::{SortDir, SqlDialect};
use crate::transport::{QueryOutput, SqlTransport, TransportResult};

use super::assemble::CompiledSearch;
use super::decode::{decode_rows, ColumnDescriptor, ResultRow};
use super::error::{Diagnostic, SearchError};
use super::hierarchy::{HierarchyClosures, HierarchyRequest};
use super::request::SearchRequest;

/// Outcome of a search. Failed searches carry a diagnostic and no rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub itemtype: String,
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<ResultRow>,
    pub total_count: u64,
    /// 1-based position of the first row, 0 when there are no rows.
    pub begin: u64,
    /// Position of the last row.
    pub end: u64,
    /// Offset actually used, after resetting out-of-range starts.
    pub start: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<FieldId>,
    pub order: SortDir,
    pub page_size: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,
}

impl SearchResult {
    /// Empty result reporting `err`.
    pub fn failed(request: &SearchRequest, settings: &SearchSettings, err: &SearchError) -> Self {
        Self {
            itemtype: request.itemtype.clone(),
            columns: Vec::new(),
            rows: Vec::new(),
            total_count: 0,
            begin: 0,
            end: 0,
            start: 0,
            sort: request.sort,
            order: request.order,
            page_size: request
                .page_size
                .unwrap_or(settings.default_page_size)
                .clamp(1, settings.max_page_size.max(1)),
            warnings: Vec::new(),
            diagnostic: Some(Diagnostic::from(err)),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.diagnostic.is_some()
    }
}

/// Load the `(id, parent)` pairs of each tree table once and compute the
/// closure of every requested node.
pub async fn load_closures(
    transport: &dyn SqlTransport,
    requests: &[HierarchyRequest],
) -> TransportResult<HierarchyClosures> {
    let mut by_table: BTreeMap<(&str, &str), Vec<i64>> = BTreeMap::new();
    for request in requests {
        by_table
            .entry((request.table.as_str(), request.parent_column.as_str()))
            .or_default()
            .push(request.node);
    }

    let mut closures = HierarchyClosures::new();
    for ((table, parent_column), nodes) in by_table {
        let loader = HierarchyRequest {
            table: table.to_string(),
            parent_column: parent_column.to_string(),
            node: 0,
        };
        let output = transport.query(&loader.load_query(transport.dialect())).await?;
        let pairs = HierarchyRequest::pairs(&output);
        debug!(table, nodes = nodes.len(), rows = pairs.len(), "loaded hierarchy");
        for node in nodes {
            closures.add_from_pairs(table, node, &pairs);
        }
    }
    Ok(closures)
}

fn parse_total(output: &QueryOutput) -> Result<u64, SearchError> {
    output
        .rows
        .first()
        .and_then(|row| row.first())
        .and_then(|cell| cell.as_deref())
        .and_then(|cell| cell.parse().ok())
        .ok_or_else(|| SearchError::Decode("count query returned no total".into()))
}

/// Run the data query, raising the concatenation limit once on truncation.
async fn fetch_rows(
    transport: &dyn SqlTransport,
    sql: &str,
    settings: &SearchSettings,
) -> Result<QueryOutput, SearchError> {
    let dialect = transport.dialect();
    let mut limit = settings.concat_max_len;
    for attempt in 0..2 {
        if dialect.truncates_group_concat() {
            if let Some(statement) = dialect.set_group_concat_limit(limit) {
                transport.execute(&statement).await?;
            }
        }
        let output = transport.query(sql).await?;
        if !output.has_concat_truncation() {
            return Ok(output);
        }
        if attempt == 0 {
            warn!(
                limit,
                retry_limit = settings.concat_retry_len,
                "grouped values truncated, retrying with a larger limit"
            );
            limit = settings.concat_retry_len;
        }
    }
    Err(SearchError::EncodingOverflow { limit })
}

/// Execute a compiled search.
pub async fn execute(
    transport: &dyn SqlTransport,
    compiled: &CompiledSearch,
    settings: &SearchSettings,
) -> Result<SearchResult, SearchError> {
    let total = parse_total(&transport.query(&compiled.count_sql).await?)?;

    let mut start = compiled.window.start;
    if total > 0 && start >= total {
        debug!(start, total, "start beyond total, resetting to the first page");
        start = 0;
    }
    let sql = if start == compiled.window.start {
        compiled.data_sql.clone()
    } else {
        compiled.data_sql_at(start)
    };

    let output = fetch_rows(transport, &sql, settings).await?;
    let rows = decode_rows(&output, &compiled.columns, &compiled.itemtype)?;
    let begin = if rows.is_empty() { 0 } else { start + 1 };
    let end = start + rows.len() as u64;
    debug!(
        itemtype = %compiled.itemtype,
        total,
        rows = rows.len(),
        "search executed"
    );

    Ok(SearchResult {
        itemtype: compiled.itemtype.clone(),
        columns: compiled.columns.clone(),
        rows,
        total_count: total,
        begin,
        end,
        start,
        sort: compiled.sort,
        order: compiled.order,
        page_size: compiled.window.page_size,
        warnings: compiled.warnings.clone(),
        diagnostic: None,
    })
}
