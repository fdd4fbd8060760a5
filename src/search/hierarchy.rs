//! Descendant closures for "under" / "not under" criteria.
//!
//! The assembler is synchronous and never reads the database, so the
//! driver loads the `(id, parent)` pairs of every tree table a request
//! needs beforehand and hands the resulting [`HierarchyClosures`] over.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::cache::CatalogCache;
use crate::catalog::{Comparator, EntityCatalog};
use crate::sql::{col, Dialect, Query, TableRef};
use crate::transport::QueryOutput;

use super::request::{FieldRef, SearchRequest};

/// Prepared descendant closures keyed by `(table, node)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HierarchyClosures {
    closures: HashMap<(String, i64), Vec<i64>>,
}

impl HierarchyClosures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: &str, node: i64, closure: Vec<i64>) {
        self.closures.insert((table.to_string(), node), closure);
    }

    /// Closure of `node`, self included. Falls back to the node alone when
    /// nothing was loaded for it.
    pub fn closure(&self, table: &str, node: i64) -> Vec<i64> {
        self.closures
            .get(&(table.to_string(), node))
            .cloned()
            .unwrap_or_else(|| vec![node])
    }

    /// Compute and store the closure of `node` from `(id, parent)` pairs.
    pub fn add_from_pairs(&mut self, table: &str, node: i64, pairs: &[(i64, Option<i64>)]) {
        self.insert(table, node, descendants(pairs, node));
    }

    pub fn len(&self) -> usize {
        self.closures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closures.is_empty()
    }
}

/// `node` and every transitive child, sorted. Cycles are tolerated.
pub fn descendants(pairs: &[(i64, Option<i64>)], node: i64) -> Vec<i64> {
    let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
    for (id, parent) in pairs {
        if let Some(parent) = parent {
            children.entry(*parent).or_default().push(*id);
        }
    }

    let mut seen = HashSet::from([node]);
    let mut queue = VecDeque::from([node]);
    while let Some(current) = queue.pop_front() {
        for child in children.get(&current).into_iter().flatten() {
            if seen.insert(*child) {
                queue.push_back(*child);
            }
        }
    }

    let mut closure: Vec<i64> = seen.into_iter().collect();
    closure.sort_unstable();
    closure
}

/// A closure the driver must load before compiling.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct HierarchyRequest {
    pub table: String,
    pub parent_column: String,
    pub node: i64,
}

impl HierarchyRequest {
    /// `SELECT id, <parent> FROM <table>`, one row per node.
    pub fn load_query(&self, dialect: Dialect) -> String {
        Query::new()
            .select(vec![col("id"), col(&self.parent_column)])
            .from(TableRef::new(&self.table))
            .to_sql(dialect)
    }

    /// Parse the rows returned by [`Self::load_query`].
    pub fn pairs(output: &QueryOutput) -> Vec<(i64, Option<i64>)> {
        output
            .rows
            .iter()
            .filter_map(|row| {
                let id = row.first()?.as_deref()?.parse().ok()?;
                let parent = row
                    .get(1)
                    .and_then(|cell| cell.as_deref())
                    .and_then(|cell| cell.parse().ok());
                Some((id, parent))
            })
            .collect()
    }
}

/// Closures needed by the under/not-under criteria of `request`, across
/// union branches and meta types.
pub fn collect_requests(cache: &CatalogCache, request: &SearchRequest) -> Vec<HierarchyRequest> {
    let Ok(base) = cache.get(&request.itemtype, request.with_plugins) else {
        return Vec::new();
    };
    let branches: Vec<String> = if base.is_union() {
        base.union_of().to_vec()
    } else {
        vec![base.name().to_string()]
    };

    let mut wanted = BTreeSet::new();
    for leaf in request.criteria.iter().flat_map(|c| c.leaves()) {
        if !matches!(leaf.searchtype, Comparator::Under | Comparator::NotUnder) {
            continue;
        }
        let FieldRef::Id(field_id) = leaf.field else {
            continue;
        };
        let owners: Vec<String> = match (&leaf.itemtype, leaf.meta) {
            (Some(meta_type), true) => vec![meta_type.clone()],
            _ => branches.clone(),
        };
        for owner in owners {
            let Ok(catalog) = cache.get(&owner, request.with_plugins) else {
                continue;
            };
            wanted.extend(requests_for(cache, &catalog, field_id, &leaf.value.texts()));
        }
    }
    wanted.into_iter().collect()
}

fn requests_for(
    cache: &CatalogCache,
    catalog: &EntityCatalog,
    field_id: u32,
    values: &[String],
) -> Vec<HierarchyRequest> {
    let Some(field) = catalog.field(field_id) else {
        return Vec::new();
    };
    let Some(parent_column) = cache.tree_parent_column(&field.table) else {
        return Vec::new();
    };
    values
        .iter()
        .filter_map(|v| v.trim().parse::<i64>().ok())
        .map(|node| HierarchyRequest {
            table: field.table.clone(),
            parent_column: parent_column.clone(),
            node,
        })
        .collect()
}
