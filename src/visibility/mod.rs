//! Row visibility: entity scoping, trash/template exclusion, rights and
//! per-type row rules.
//!
//! The search compiler asks a [`VisibilityProvider`] once per assembled
//! query (once per branch for union types) for the base WHERE term and any
//! joins that term needs.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::EntityCatalog;
use crate::sql::{always_false, and_all, lit_int, table_col, Expr, ExprExt, Join, TableRef};

/// Read permission bit.
pub const READ: u32 = 1;

/// Identity and permission context of the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActorContext {
    pub user_id: i64,
    /// Entities the actor is currently working in.
    #[serde(default)]
    pub active_entities: Vec<i64>,
    /// Ancestors of the active entities; their recursive items are visible.
    #[serde(default)]
    pub ancestor_entities: Vec<i64>,
    /// Permission bitmask per entity type.
    #[serde(default)]
    pub rights: HashMap<String, u32>,
}

impl ActorContext {
    pub fn new(user_id: i64, active_entities: Vec<i64>) -> Self {
        Self {
            user_id,
            active_entities,
            ..Default::default()
        }
    }

    pub fn with_right(mut self, itemtype: &str, mask: u32) -> Self {
        *self.rights.entry(itemtype.to_string()).or_default() |= mask;
        self
    }

    pub fn with_ancestors(mut self, ancestors: Vec<i64>) -> Self {
        self.ancestor_entities = ancestors;
        self
    }

    pub fn has_right(&self, itemtype: &str, bit: u32) -> bool {
        self.rights.get(itemtype).is_some_and(|mask| mask & bit != 0)
    }
}

/// WHERE term plus the joins it references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisibilityPredicate {
    pub where_clause: Option<Expr>,
    pub joins: Vec<Join>,
    /// Whether `joins` can return several rows per base row.
    pub fans_out: bool,
}

impl VisibilityPredicate {
    pub fn deny() -> Self {
        Self {
            where_clause: Some(always_false()),
            ..Default::default()
        }
    }

    /// AND another predicate onto this one.
    pub fn merge(&mut self, other: VisibilityPredicate) {
        self.where_clause = match (self.where_clause.take(), other.where_clause) {
            (Some(a), Some(b)) => Some(a.and(b)),
            (a, b) => a.or(b),
        };
        self.joins.extend(other.joins);
        self.fans_out |= other.fans_out;
    }
}

/// Supplies the default visibility predicate of an entity type.
pub trait VisibilityProvider: Send + Sync {
    fn default_predicate(
        &self,
        entity: &EntityCatalog,
        actor: &ActorContext,
        is_deleted: bool,
    ) -> VisibilityPredicate;
}

/// Extra row-level restriction for one entity type.
pub trait RowRule: Send + Sync {
    fn apply(&self, entity: &EntityCatalog, actor: &ActorContext) -> VisibilityPredicate;
}

/// Capability-driven visibility with optional per-type row rules.
#[derive(Clone, Default)]
pub struct DefaultVisibility {
    rules: HashMap<String, Vec<Arc<dyn RowRule>>>,
}

impl std::fmt::Debug for DefaultVisibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<_, _> = self.rules.iter().map(|(k, v)| (k, v.len())).collect();
        f.debug_struct("DefaultVisibility")
            .field("rules", &counts)
            .finish()
    }
}

impl DefaultVisibility {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, itemtype: &str, rule: Arc<dyn RowRule>) -> Self {
        self.rules.entry(itemtype.to_string()).or_default().push(rule);
        self
    }
}

impl VisibilityProvider for DefaultVisibility {
    fn default_predicate(
        &self,
        entity: &EntityCatalog,
        actor: &ActorContext,
        is_deleted: bool,
    ) -> VisibilityPredicate {
        if !actor.has_right(entity.name(), READ) {
            tracing::debug!(itemtype = entity.name(), "actor lacks READ, denying all rows");
            return VisibilityPredicate::deny();
        }

        let table = entity.table();
        let caps = entity.capabilities();
        let mut terms = Vec::new();

        if caps.soft_delete {
            terms.push(table_col(table, "is_deleted").eq(lit_int(i64::from(is_deleted))));
        }
        if caps.template {
            terms.push(table_col(table, "is_template").eq(lit_int(0)));
        }
        if caps.entity_scoped {
            terms.push(entity_restriction(table, caps.recursive, actor));
        }

        let mut predicate = VisibilityPredicate {
            where_clause: and_all(terms),
            ..Default::default()
        };
        for rule in self.rules.get(entity.name()).into_iter().flatten() {
            predicate.merge(rule.apply(entity, actor));
        }
        predicate
    }
}

fn entity_restriction(table: &str, recursive: bool, actor: &ActorContext) -> Expr {
    let active: Vec<Expr> = actor.active_entities.iter().copied().map(lit_int).collect();
    let own = table_col(table, "entities_id").in_list(active);
    if !recursive || actor.ancestor_entities.is_empty() {
        return own;
    }
    let ancestors = actor
        .ancestor_entities
        .iter()
        .copied()
        .map(lit_int)
        .collect();
    let inherited = table_col(table, "is_recursive")
        .eq(lit_int(1))
        .and(table_col(table, "entities_id").in_list(ancestors));
    own.or(inherited).paren()
}

/// Restricts rows to those linked to the actor through a link table, unless
/// the actor holds `bypass_right` on the type (e.g. tickets the actor
/// requested, unless they may see all tickets).
#[derive(Debug, Clone)]
pub struct LinkedUserRule {
    pub link_table: String,
    /// Link table column referencing the base row.
    pub item_fk: String,
    pub user_column: String,
    pub bypass_right: u32,
}

impl RowRule for LinkedUserRule {
    fn apply(&self, entity: &EntityCatalog, actor: &ActorContext) -> VisibilityPredicate {
        if actor.has_right(entity.name(), self.bypass_right) {
            return VisibilityPredicate::default();
        }
        let alias = format!("{}_visibility", self.link_table);
        let join = Join::left(
            TableRef::new(&self.link_table).with_alias(&alias),
            table_col(&alias, &self.item_fk).eq(table_col(entity.table(), "id")),
        );
        VisibilityPredicate {
            where_clause: Some(table_col(&alias, &self.user_column).eq(lit_int(actor.user_id))),
            joins: vec![join],
            fans_out: true,
        }
    }
}
