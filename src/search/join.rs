//! Join planning.
//!
//! Every join a search needs goes through one [`JoinPlanner`]. A hop is
//! identified by the hash of its normalized description (reference alias,
//! target table, kind, link column, extra condition), so asking for the
//! same logical join twice returns the existing alias and emits nothing.
//!
//! Aliases are the bare table name for the first conventional join from
//! the base table (`glpi_locations` via `locations_id`); any other join
//! gets `<table>_<linkfield>_<hash prefix>`, and translation joins get
//! `<table>_trans_<column>_<hash prefix>`. Generated aliases are cut to
//! [`MAX_ALIAS_LEN`] by shortening the readable part, never the hash.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::cache::compute_hash;
use crate::catalog::{is_valid_identifier, FieldDescriptor, JoinHop, JoinKind};
use crate::sql::{raw_sql, table_col, Dialect, ExprExt, Join, SqlDialect, TableRef};

use super::error::JoinPathError;
use super::translation::TranslationIndex;

/// Length of the hash suffix in generated aliases.
const ALIAS_HASH_LEN: usize = 12;

/// Longest identifier MySQL accepts.
pub const MAX_ALIAS_LEN: usize = 64;

/// `<readable>_<hash prefix>`, with `readable` shortened to fit.
fn hashed_alias(readable: &str, key: &str) -> String {
    let hash = &key[..ALIAS_HASH_LEN.min(key.len())];
    let room = MAX_ALIAS_LEN - hash.len() - 1;
    let mut cut = readable.len().min(room);
    while !readable.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}_{hash}", readable[..cut].trim_end_matches('_'))
}

/// A table already reachable in the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRef {
    pub alias: String,
    pub table: String,
    /// Entity type stored in the table, when known.
    pub itemtype: Option<String>,
}

impl JoinRef {
    pub fn new(alias: &str, table: &str, itemtype: Option<&str>) -> Self {
        Self {
            alias: alias.to_string(),
            table: table.to_string(),
            itemtype: itemtype.map(str::to_string),
        }
    }
}

/// Where a join path ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEnd {
    pub reference: JoinRef,
    /// Whether any hop on the path can return several rows per base row.
    pub fans_out: bool,
}

#[derive(Debug, Clone)]
struct ResolvedJoin {
    reference: JoinRef,
    fans_out: bool,
}

#[derive(Serialize)]
struct HopKey<'a> {
    from: &'a str,
    table: &'a str,
    kind: JoinKind,
    linkfield: &'a str,
    condition: Option<&'a str>,
    itemtype: Option<&'a str>,
}

#[derive(Serialize)]
struct TranslationKey<'a> {
    translation_of: &'a str,
    column: &'a str,
    itemtype: &'a str,
    language: &'a str,
}

/// Accumulates the deduplicated, insertion-ordered join clauses of one query.
#[derive(Debug)]
pub struct JoinPlanner {
    base: JoinRef,
    table_prefix: String,
    dialect: Dialect,
    joins: Vec<Join>,
    by_key: HashMap<String, ResolvedJoin>,
    aliases: HashSet<String>,
    fans_out: bool,
}

impl JoinPlanner {
    pub fn new(itemtype: &str, base_table: &str, table_prefix: &str, dialect: Dialect) -> Self {
        Self {
            base: JoinRef::new(base_table, base_table, Some(itemtype)),
            table_prefix: table_prefix.to_string(),
            dialect,
            joins: Vec::new(),
            by_key: HashMap::new(),
            aliases: HashSet::from([base_table.to_string()]),
            fans_out: false,
        }
    }

    pub fn base(&self) -> &JoinRef {
        &self.base
    }

    /// Conventional foreign key pointing at `table`
    /// (`glpi_locations` -> `locations_id`).
    pub fn foreign_key(&self, table: &str) -> String {
        let stem = table.strip_prefix(&self.table_prefix).unwrap_or(table);
        format!("{stem}_id")
    }

    /// Plan the joins reaching `field` from `from`.
    pub fn plan_field(
        &mut self,
        from: &JoinRef,
        field: &FieldDescriptor,
    ) -> Result<PathEnd, JoinPathError> {
        let hops = if !field.join.is_empty() {
            field.join.clone()
        } else if field.table == from.table {
            Vec::new()
        } else {
            vec![JoinHop::standard(&field.table)]
        };

        let end = self.plan_path(from, &hops)?;
        if end.reference.table != field.table {
            return Err(JoinPathError::TableMismatch {
                expected: field.table.clone(),
                found: end.reference.table,
            });
        }
        Ok(end)
    }

    /// Plan a chain of hops, threading the reference table forward.
    pub fn plan_path(&mut self, from: &JoinRef, hops: &[JoinHop]) -> Result<PathEnd, JoinPathError> {
        let mut reference = from.clone();
        let mut fans_out = false;
        for hop in hops {
            let (next, hop_fans_out) = self.plan_hop(&reference, hop)?;
            reference = next;
            fans_out |= hop_fans_out;
        }
        Ok(PathEnd {
            reference,
            fans_out,
        })
    }

    fn plan_hop(
        &mut self,
        reference: &JoinRef,
        hop: &JoinHop,
    ) -> Result<(JoinRef, bool), JoinPathError> {
        check_identifier(&hop.table)?;
        for name in [&hop.linkfield, &hop.pivot, &hop.pivot_fk].into_iter().flatten() {
            check_identifier(name)?;
        }

        if hop.kind == JoinKind::ManyToMany {
            let pivot = hop.pivot.as_deref().ok_or_else(|| JoinPathError::MissingPivot {
                table: hop.table.clone(),
            })?;
            let to_pivot = JoinHop {
                table: pivot.to_string(),
                kind: JoinKind::Child,
                linkfield: hop.pivot_fk.clone(),
                condition: hop.condition.clone(),
                itemtype: None,
                pivot: None,
                pivot_fk: None,
            };
            let to_target = JoinHop {
                table: hop.table.clone(),
                kind: JoinKind::Standard,
                linkfield: hop.linkfield.clone(),
                condition: None,
                itemtype: hop.itemtype.clone(),
                pivot: None,
                pivot_fk: None,
            };
            let (pivot_ref, _) = self.plan_hop(reference, &to_pivot)?;
            let (target, _) = self.plan_hop(&pivot_ref, &to_target)?;
            return Ok((target, true));
        }

        // The field already lives on the reference table.
        if hop.kind == JoinKind::Standard
            && hop.table == reference.table
            && hop.condition.is_none()
            && hop.linkfield.is_none()
        {
            return Ok((reference.clone(), false));
        }

        let conventional = self.conventional_linkfield(reference, hop);
        let linkfield = hop.linkfield.clone().unwrap_or_else(|| conventional.clone());
        let polymorphic_type = match hop.kind {
            JoinKind::ItemtypeItem => Some(
                hop.itemtype
                    .clone()
                    .or_else(|| reference.itemtype.clone())
                    .ok_or_else(|| JoinPathError::MissingItemtype {
                        table: hop.table.clone(),
                    })?,
            ),
            JoinKind::ItemtypeItemRevert => Some(hop.itemtype.clone().ok_or_else(|| {
                JoinPathError::MissingItemtype {
                    table: hop.table.clone(),
                }
            })?),
            _ => None,
        };

        let key = compute_hash(&HopKey {
            from: &reference.alias,
            table: &hop.table,
            kind: hop.kind,
            linkfield: &linkfield,
            condition: hop.condition.as_deref(),
            itemtype: polymorphic_type.as_deref(),
        })?;
        if let Some(existing) = self.by_key.get(&key) {
            return Ok((existing.reference.clone(), existing.fans_out));
        }

        let plain = reference.alias == self.base.alias
            && hop.condition.is_none()
            && linkfield == conventional
            && !self.aliases.contains(&hop.table);
        let alias = if plain {
            hop.table.clone()
        } else {
            hashed_alias(&format!("{}_{}", hop.table, linkfield), &key)
        };

        let on = match hop.kind {
            JoinKind::Standard | JoinKind::ManyToMany => {
                table_col(&reference.alias, &linkfield).eq(table_col(&alias, "id"))
            }
            JoinKind::Child => table_col(&alias, &linkfield).eq(table_col(&reference.alias, "id")),
            JoinKind::ItemtypeItem => table_col(&alias, &linkfield)
                .eq(table_col(&reference.alias, "id"))
                .and(table_col(&alias, "itemtype").eq(polymorphic_type.as_deref().unwrap_or_default())),
            JoinKind::ItemtypeItemRevert => table_col(&reference.alias, &linkfield)
                .eq(table_col(&alias, "id"))
                .and(
                    table_col(&reference.alias, "itemtype")
                        .eq(polymorphic_type.as_deref().unwrap_or_default()),
                ),
        };
        let on = match &hop.condition {
            Some(condition) => on.and(self.expand_condition(condition, &alias, &reference.alias)),
            None => on,
        };

        self.push_join(&hop.table, &alias, on);
        let fans_out = hop.kind.fans_out();
        self.fans_out |= fans_out;

        let target = JoinRef {
            alias,
            table: hop.table.clone(),
            itemtype: match hop.kind {
                JoinKind::ItemtypeItemRevert => polymorphic_type,
                _ => hop.itemtype.clone(),
            },
        };
        self.by_key.insert(
            key,
            ResolvedJoin {
                reference: target.clone(),
                fans_out,
            },
        );
        Ok((target, fans_out))
    }

    fn conventional_linkfield(&self, reference: &JoinRef, hop: &JoinHop) -> String {
        match hop.kind {
            JoinKind::Standard | JoinKind::ManyToMany => self.foreign_key(&hop.table),
            JoinKind::Child => self.foreign_key(&reference.table),
            JoinKind::ItemtypeItem | JoinKind::ItemtypeItemRevert => "items_id".to_string(),
        }
    }

    fn expand_condition(&self, condition: &str, alias: &str, reference: &str) -> crate::sql::Expr {
        let expanded = condition
            .replace("NEWTABLE", &self.dialect.quote_identifier(alias))
            .replace("REFTABLE", &self.dialect.quote_identifier(reference));
        raw_sql(&expanded).paren()
    }

    fn push_join(&mut self, table: &str, alias: &str, on: crate::sql::Expr) {
        let table_ref = if alias == table {
            TableRef::new(table)
        } else {
            TableRef::new(table).with_alias(alias)
        };
        self.aliases.insert(alias.to_string());
        self.joins.push(Join::left(table_ref, on));
    }

    /// Join the translation of `column` of the rows reachable as `value`.
    /// Returns the alias holding the translated `value` column.
    pub fn translation_join(
        &mut self,
        value: &JoinRef,
        column: &str,
        itemtype: &str,
        index: &TranslationIndex,
    ) -> Result<String, JoinPathError> {
        check_identifier(index.table())?;
        let key = compute_hash(&TranslationKey {
            translation_of: &value.alias,
            column,
            itemtype,
            language: index.language(),
        })?;
        if let Some(existing) = self.by_key.get(&key) {
            return Ok(existing.reference.alias.clone());
        }

        let alias = hashed_alias(&format!("{}_trans_{}", value.table, column), &key);
        let on = table_col(&alias, "itemtype")
            .eq(itemtype)
            .and(table_col(&alias, "items_id").eq(table_col(&value.alias, "id")))
            .and(table_col(&alias, "language").eq(index.language()))
            .and(table_col(&alias, "field").eq(column));
        self.push_join(index.table(), &alias, on);

        self.by_key.insert(
            key,
            ResolvedJoin {
                reference: JoinRef::new(&alias, index.table(), None),
                fans_out: false,
            },
        );
        Ok(alias)
    }

    /// Add joins required by a visibility predicate. Aliases already
    /// present are skipped.
    pub fn add_visibility_joins(&mut self, joins: Vec<Join>, fans_out: bool) {
        for join in joins {
            let alias = join.table.reference_name().to_string();
            if self.aliases.insert(alias) {
                self.joins.push(join);
            }
        }
        self.fans_out |= fans_out;
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Whether any planned join can multiply base rows.
    pub fn fans_out(&self) -> bool {
        self.fans_out
    }
}

fn check_identifier(name: &str) -> Result<(), JoinPathError> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(JoinPathError::InvalidIdentifier(name.to_string()))
    }
}
