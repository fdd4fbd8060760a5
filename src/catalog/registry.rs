//! Custom fragment builders keyed by `(table, column)`.
//!
//! Some fields cannot be rendered by the generic select/criterion builders
//! (a person's display name spans three columns, for instance). A
//! [`FragmentBuilder`] registered for the field's `(table, column)` pair is
//! attached to the field when an entity catalog is built, so the compiler
//! only does a map lookup per field. Builders return `None` to fall back to
//! the generic rendering.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::types::{Comparator, FieldDescriptor};
use crate::search::predicate::like_pattern;
use crate::sql::{coalesce, or_all, table_col, Dialect, Expr, ExprExt};

/// Where a custom fragment is rendered.
pub struct FragmentContext<'a> {
    pub itemtype: &'a str,
    pub field: &'a FieldDescriptor,
    /// Alias of the table holding the field.
    pub alias: &'a str,
    pub dialect: Dialect,
}

/// Custom SQL for one field.
pub trait FragmentBuilder: Send + Sync {
    /// Value expression used in SELECT and as the criterion operand.
    fn select(&self, ctx: &FragmentContext<'_>) -> Option<Expr> {
        let _ = ctx;
        None
    }

    /// Complete predicate for a criterion on this field.
    fn criterion(
        &self,
        ctx: &FragmentContext<'_>,
        comparator: Comparator,
        negated: bool,
        value: &str,
    ) -> Option<Expr> {
        let _ = (ctx, comparator, negated, value);
        None
    }
}

/// Registry of custom fragment builders.
#[derive(Clone, Default)]
pub struct FragmentRegistry {
    builders: HashMap<(String, String), Arc<dyn FragmentBuilder>>,
}

impl fmt::Debug for FragmentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.builders.keys().collect();
        keys.sort();
        f.debug_struct("FragmentRegistry")
            .field("builders", &keys)
            .finish()
    }
}

impl FragmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the builders every asset-management catalog needs.
    pub fn with_defaults(table_prefix: &str) -> Self {
        let mut registry = Self::new();
        registry.register(
            &format!("{table_prefix}users"),
            "name",
            Arc::new(PersonNameFragment),
        );
        registry
    }

    pub fn register(&mut self, table: &str, column: &str, builder: Arc<dyn FragmentBuilder>) {
        self.builders
            .insert((table.to_string(), column.to_string()), builder);
    }

    pub fn resolve(&self, table: &str, column: &str) -> Option<Arc<dyn FragmentBuilder>> {
        self.builders
            .get(&(table.to_string(), column.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}

/// Users are shown as "realname firstname" and searched on login and both
/// name parts.
#[derive(Debug, Default)]
pub struct PersonNameFragment;

impl FragmentBuilder for PersonNameFragment {
    fn select(&self, ctx: &FragmentContext<'_>) -> Option<Expr> {
        let full_name = table_col(ctx.alias, "realname")
            .concat(" ")
            .concat(table_col(ctx.alias, "firstname"));
        Some(coalesce(vec![full_name, table_col(ctx.alias, "name")]))
    }

    fn criterion(
        &self,
        ctx: &FragmentContext<'_>,
        comparator: Comparator,
        negated: bool,
        value: &str,
    ) -> Option<Expr> {
        if comparator != Comparator::Contains || value.eq_ignore_ascii_case("null") {
            return None;
        }
        let pattern = like_pattern(value);
        let columns = ["name", "realname", "firstname"];
        if negated {
            let terms = columns
                .iter()
                .map(|c| {
                    let column = table_col(ctx.alias, c);
                    column
                        .clone()
                        .not_like(pattern.as_str())
                        .or(column.is_null())
                        .paren()
                })
                .collect();
            crate::sql::and_all(terms)
        } else {
            let terms = columns
                .iter()
                .map(|c| table_col(ctx.alias, c).like(pattern.as_str()))
                .collect();
            or_all(terms).map(|e| e.paren())
        }
    }
}
