//! Query assembly.
//!
//! Turns a [`SearchRequest`] into the COUNT query and the paginated data
//! query. A concrete type compiles to one branch; a virtual type compiles
//! one branch per member type and wraps their `UNION ALL` in a derived
//! table so ordering and paging apply to the merged rows.
//!
//! Every branch owns a [`JoinPlanner`], so a field needed by a column and
//! by a criterion is joined once. Problems with a single column or
//! criterion are recorded as warnings and the rest of the search goes on.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::CatalogCache;
use crate::catalog::{
    Comparator, DataType, EntityCatalog, FieldDescriptor, FieldId, FragmentContext,
};
use crate::config::SearchSettings;
use crate::sql::{
    always_false, and_all, coalesce, col, count_distinct, count_star, func, group_concat,
    lit_null, lit_str, or_all, raw_sql, star, table_col, Dialect, Expr, ExprExt, LimitOffset,
    OrderByExpr, Query, SelectExpr, SortDir, SqlDialect, TableRef,
};
use crate::visibility::{ActorContext, VisibilityPredicate, VisibilityProvider};

use super::decode::{
    aux_alias, column_alias, ColumnDescriptor, ESCAPED_CHAR, ESCAPE_CHAR, ID_COLUMN,
    NULL_SENTINEL, RECORD_SEPARATOR, TYPE_COLUMN, VALUE_SEPARATOR,
};
use super::error::{PlanError, SearchError};
use super::hierarchy::HierarchyClosures;
use super::join::{JoinPlanner, JoinRef};
use super::predicate::{compile_predicate, PredicateError, PredicateInput};
use super::request::{
    Criterion, CriterionLeaf, FieldKeyword, FieldRef, Link, SearchRequest,
};
use super::translation::TranslationIndex;

/// Alias of the derived table wrapping union branches.
const UNION_ALIAS: &str = "union_rows";
/// Alias of the derived table counted by the COUNT query.
const COUNT_ALIAS: &str = "counted";
/// Output column of the COUNT query.
pub const TOTAL_COLUMN: &str = "total";

/// Everything the assembler reads besides the request.
pub struct CompileContext<'a> {
    pub cache: &'a CatalogCache,
    pub settings: &'a SearchSettings,
    pub visibility: &'a dyn VisibilityProvider,
    pub actor: &'a ActorContext,
    pub translations: Option<&'a TranslationIndex>,
    pub closures: &'a HierarchyClosures,
    pub dialect: Dialect,
}

/// Rows requested from the data query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    pub start: u64,
    pub page_size: u64,
    /// `None` when every row is exported.
    pub limit: Option<u64>,
}

impl PageWindow {
    fn for_request(settings: &SearchSettings, request: &SearchRequest) -> Self {
        let page_size = request
            .page_size
            .unwrap_or(settings.default_page_size)
            .clamp(1, settings.max_page_size.max(1));
        if request.export_all {
            Self {
                start: 0,
                page_size,
                limit: None,
            }
        } else {
            Self {
                start: request.start,
                page_size,
                limit: Some(page_size),
            }
        }
    }

    fn limit_offset(&self, start: u64) -> Option<LimitOffset> {
        self.limit.map(|limit| LimitOffset {
            limit: Some(limit),
            offset: (start > 0).then_some(start),
        })
    }
}

/// A compiled search, ready to run.
#[derive(Debug, Clone)]
pub struct CompiledSearch {
    pub itemtype: String,
    pub count_sql: String,
    pub data_sql: String,
    pub columns: Vec<ColumnDescriptor>,
    pub sort: Option<FieldId>,
    pub order: SortDir,
    pub window: PageWindow,
    /// Dropped columns and criteria.
    pub warnings: Vec<String>,
    data_query: Query,
    dialect: Dialect,
}

impl CompiledSearch {
    /// The data query starting at `start` instead of the requested offset.
    pub fn data_sql_at(&self, start: u64) -> String {
        let mut query = self.data_query.clone();
        query.limit_offset = self.window.limit_offset(start);
        query.to_sql(self.dialect)
    }
}

/// A column to select, resolved against the displayed type.
#[derive(Debug, Clone)]
struct ColumnSpec {
    descriptor: ColumnDescriptor,
    /// Entity type of a meta column.
    meta_type: Option<String>,
}

/// WHERE and HAVING parts of a criteria (sub)tree.
#[derive(Debug, Default)]
struct Clauses {
    where_clause: Option<Expr>,
    having: Option<Expr>,
}

impl Clauses {
    fn map(self, f: impl Fn(Expr) -> Expr) -> Self {
        Self {
            where_clause: self.where_clause.map(&f),
            having: self.having.map(&f),
        }
    }
}

fn combine(acc: Option<Expr>, term: Option<Expr>, link: Link) -> Option<Expr> {
    match (acc, term) {
        (None, term) => term,
        (acc, None) => acc,
        (Some(acc), Some(term)) if link.is_or() => Some(acc.or(term)),
        (Some(acc), Some(term)) => Some(acc.and(term)),
    }
}

/// OR the terms together (AND when negated), parenthesized when several.
fn join_terms(terms: Vec<Expr>, negated: bool) -> Option<Expr> {
    let several = terms.len() > 1;
    let joined = if negated { and_all(terms) } else { or_all(terms) };
    joined.map(|e| if several { e.paren() } else { e })
}

/// Pack every joined value with its row id into one string cell.
fn pack(value: Expr, id: &Expr) -> Expr {
    let guarded = func(
        "REPLACE",
        vec![value, lit_str(ESCAPE_CHAR), lit_str(ESCAPED_CHAR)],
    );
    let record = coalesce(vec![guarded, lit_str(NULL_SENTINEL)])
        .concat(lit_str(VALUE_SEPARATOR))
        .concat(coalesce(vec![id.clone(), lit_str(NULL_SENTINEL)]));
    group_concat(record, id.clone(), RECORD_SEPARATOR, true)
}

fn union_all(mut queries: Vec<Query>) -> Query {
    let rest = queries.split_off(queries.len().min(1));
    let Some(first) = queries.pop() else {
        return Query::new();
    };
    let mut rest = rest.into_iter();
    let Some(second) = rest.next() else {
        return first;
    };
    let op = rest.fold(first.union_all(second), |op, query| op.chain(true, query));
    Query::from_set_operation(op)
}

/// Compile `request` into its COUNT and data queries.
pub fn compile_search(
    ctx: &CompileContext<'_>,
    request: &SearchRequest,
) -> Result<CompiledSearch, SearchError> {
    let display = ctx.cache.get(&request.itemtype, request.with_plugins)?;
    let members: Vec<Arc<EntityCatalog>> = if display.is_union() {
        display
            .union_of()
            .iter()
            .map(|member| ctx.cache.get(member, request.with_plugins))
            .collect::<Result<_, _>>()?
    } else {
        vec![Arc::clone(&display)]
    };

    let now = request
        .now
        .unwrap_or_else(|| Local::now().naive_local());
    let mut warnings = Vec::new();
    let specs = column_specs(ctx, &display, &members, request, &mut warnings);
    let window = PageWindow::for_request(ctx.settings, request);
    let is_union = display.is_union();

    let mut branches = Vec::with_capacity(members.len());
    let mut columns = Vec::new();
    for member in &members {
        let mut branch = Branch::new(ctx, Arc::clone(member), display.name(), request, now);
        let selected = branch.select_columns(&specs, is_union);
        branch.apply_criteria(&request.criteria, is_union);
        if columns.is_empty() {
            columns = selected;
        }
        warnings.extend(branch.warnings.drain(..).map(|e| e.to_string()));
        branches.push(branch);
    }
    if is_union {
        columns = specs.iter().map(|s| s.descriptor.clone()).collect();
    }

    let sort = request.sort.or(display.default_sort());
    let sort_alias = sort.and_then(|id| {
        columns
            .iter()
            .find(|c| !c.meta && c.field_id == id)
            .map(|c| c.alias.clone())
    });

    let (count_query, data_query) = if is_union {
        union_queries(&branches, sort_alias.as_deref(), request.order)
    } else {
        let branch = &branches[0];
        let table = branch.entity.table().to_string();
        let order = match &sort_alias {
            Some(alias) => vec![
                OrderByExpr::new(col(alias), request.order),
                OrderByExpr::asc(table_col(&table, "id")),
            ],
            None => vec![OrderByExpr::new(table_col(&table, "id"), request.order)],
        };
        (
            branch.count_query(),
            branch.select_query(false).order_by(order),
        )
    };

    let mut compiled = CompiledSearch {
        itemtype: display.name().to_string(),
        count_sql: count_query.to_sql(ctx.dialect),
        data_sql: String::new(),
        columns,
        sort,
        order: request.order,
        window,
        warnings,
        data_query,
        dialect: ctx.dialect,
    };
    compiled.data_sql = compiled.data_sql_at(window.start);

    for warning in &compiled.warnings {
        warn!(itemtype = %compiled.itemtype, "{warning}");
    }
    debug!(
        itemtype = %compiled.itemtype,
        count_sql = %compiled.count_sql,
        data_sql = %compiled.data_sql,
        "compiled search"
    );
    Ok(compiled)
}

fn union_queries(branches: &[Branch<'_>], sort_alias: Option<&str>, order: SortDir) -> (Query, Query) {
    let data = union_all(branches.iter().map(|b| b.select_query(true)).collect());
    let inner_counts = union_all(branches.iter().map(|b| b.count_inner(true)).collect());

    let mut order_by = Vec::new();
    if let Some(alias) = sort_alias {
        order_by.push(OrderByExpr::new(col(alias), order));
    }
    order_by.push(OrderByExpr::asc(col(TYPE_COLUMN)));
    order_by.push(OrderByExpr::new(col(ID_COLUMN), if sort_alias.is_some() { SortDir::Asc } else { order }));

    let data_query = Query::new()
        .select(vec![star()])
        .from_subquery(data, UNION_ALIAS)
        .order_by(order_by);
    let count_query = Query::new()
        .select(vec![count_star().alias(TOTAL_COLUMN)])
        .from_subquery(inner_counts, COUNT_ALIAS);
    (count_query, data_query)
}

/// Whether a field's value must be aggregated per base row.
fn aggregates(field: &FieldDescriptor) -> bool {
    !field.use_having && (field.join_fans_out() || field.force_group_by)
}

fn descriptor(itemtype: &str, field: &FieldDescriptor, meta: bool, aggregated: bool) -> ColumnDescriptor {
    ColumnDescriptor {
        itemtype: itemtype.to_string(),
        field_id: field.id,
        label: field.label.clone(),
        datatype: field.datatype,
        unit: field.unit.clone(),
        meta,
        alias: column_alias(itemtype, field.id),
        aggregated,
        additional_columns: field.additional_columns.clone(),
    }
}

/// Columns of the result: requested (or default) columns, forced ones,
/// fields used by criteria, then meta fields.
fn column_specs(
    ctx: &CompileContext<'_>,
    display: &EntityCatalog,
    members: &[Arc<EntityCatalog>],
    request: &SearchRequest,
    warnings: &mut Vec<String>,
) -> Vec<ColumnSpec> {
    let requested = if request.columns.is_empty() {
        display.default_display().to_vec()
    } else {
        request.columns.clone()
    };
    let leaves: Vec<&CriterionLeaf> = request
        .criteria
        .iter()
        .flat_map(|c| c.leaves())
        .filter(|leaf| !leaf.value.is_empty())
        .collect();
    let criteria_ids = leaves.iter().filter(|leaf| !leaf.meta).filter_map(|leaf| match leaf.field {
        FieldRef::Id(id) => Some(id),
        FieldRef::Keyword(_) => None,
    });

    let explicit = requested
        .into_iter()
        .chain(request.force_display.iter().copied())
        .map(|id| (id, true));
    let mut seen = HashSet::new();
    let mut specs = Vec::new();
    for (id, is_explicit) in explicit.chain(criteria_ids.map(|id| (id, false)).collect::<Vec<_>>()) {
        if !seen.insert(id) {
            continue;
        }
        match display.field(id) {
            Some(field) if !field.nodisplay || field.use_having => {
                let aggregated = aggregates(field)
                    || members
                        .iter()
                        .filter_map(|m| m.field(id))
                        .any(aggregates);
                specs.push(ColumnSpec {
                    descriptor: descriptor(display.name(), field, false, aggregated),
                    meta_type: None,
                });
            }
            Some(_) => {}
            None if is_explicit => {
                warnings.push(PlanError::lookup(display.name(), id).to_string());
            }
            None => {}
        }
    }

    let mut seen_meta = HashSet::new();
    for leaf in leaves.iter().filter(|leaf| leaf.meta) {
        let (Some(meta_type), FieldRef::Id(id)) = (&leaf.itemtype, leaf.field) else {
            continue;
        };
        let Ok(meta) = ctx.cache.get(meta_type, request.with_plugins) else {
            continue;
        };
        let Some(field) = meta.field(id) else {
            continue;
        };
        if !(ctx.settings.display_meta_columns || field.use_having) {
            continue;
        }
        if seen_meta.insert((meta_type.clone(), id)) {
            specs.push(ColumnSpec {
                descriptor: descriptor(meta_type, field, true, !field.use_having),
                meta_type: Some(meta_type.clone()),
            });
        }
    }
    specs
}

/// One SELECT over one concrete type.
struct Branch<'a> {
    ctx: &'a CompileContext<'a>,
    entity: Arc<EntityCatalog>,
    /// Type named in output aliases (the virtual type for union branches).
    output_type: String,
    request: &'a SearchRequest,
    now: NaiveDateTime,
    joins: JoinPlanner,
    visibility: VisibilityPredicate,
    select: Vec<SelectExpr>,
    display_ids: Vec<FieldId>,
    where_clause: Option<Expr>,
    having: Option<Expr>,
    force_group: bool,
    warnings: Vec<PlanError>,
}

impl<'a> Branch<'a> {
    fn new(
        ctx: &'a CompileContext<'a>,
        entity: Arc<EntityCatalog>,
        output_type: &str,
        request: &'a SearchRequest,
        now: NaiveDateTime,
    ) -> Self {
        let mut joins = JoinPlanner::new(
            entity.name(),
            entity.table(),
            &ctx.settings.table_prefix,
            ctx.dialect,
        );
        let visibility = ctx
            .visibility
            .default_predicate(&entity, ctx.actor, request.is_deleted);
        joins.add_visibility_joins(visibility.joins.clone(), visibility.fans_out);
        Self {
            ctx,
            entity,
            output_type: output_type.to_string(),
            request,
            now,
            joins,
            visibility,
            select: Vec::new(),
            display_ids: Vec::new(),
            where_clause: None,
            having: None,
            force_group: false,
            warnings: Vec::new(),
        }
    }

    fn dialect(&self) -> Dialect {
        self.ctx.dialect
    }

    fn catalog(&self, itemtype: &str, field: FieldId) -> Result<Arc<EntityCatalog>, PlanError> {
        self.ctx
            .cache
            .get(itemtype, self.request.with_plugins)
            .map_err(|_| PlanError::lookup(itemtype, field))
    }

    /// Reference to the table of `meta_type`, joined through the meta link.
    fn meta_ref(&mut self, meta_type: &str, field: FieldId) -> Result<JoinRef, PlanError> {
        let hops = self
            .entity
            .meta_link(meta_type)
            .ok_or_else(|| PlanError::lookup(self.entity.name(), format!("meta link to {meta_type}")))?
            .to_vec();
        let base = self.joins.base().clone();
        let end = self
            .joins
            .plan_path(&base, &hops)
            .map_err(|source| PlanError::JoinPath {
                itemtype: self.entity.name().to_string(),
                field,
                source,
            })?;
        self.force_group = true;
        Ok(JoinRef {
            itemtype: Some(meta_type.to_string()),
            ..end.reference
        })
    }

    /// Value of `field` read from `reference`.
    fn value_expr(
        &mut self,
        catalog: &EntityCatalog,
        field: &FieldDescriptor,
        reference: &JoinRef,
    ) -> Result<Expr, PlanError> {
        let fragment_ctx = FragmentContext {
            itemtype: catalog.name(),
            field,
            alias: &reference.alias,
            dialect: self.dialect(),
        };
        if let Some(expr) = catalog
            .fragment(field.id)
            .and_then(|builder| builder.select(&fragment_ctx))
        {
            return Ok(expr);
        }
        if let Some(computation) = &field.computation {
            let alias = self.dialect().quote_identifier(&reference.alias);
            return Ok(raw_sql(&computation.replace("TABLE", &alias)));
        }

        let column = table_col(&reference.alias, &field.column);
        if field.datatype == DataType::DateDelay {
            if let Some(delay) = &field.delay_column {
                return Ok(Expr::AddMonths {
                    date: Box::new(column),
                    months: Box::new(table_col(&reference.alias, delay)),
                });
            }
        }
        if let (Some(index), Some(linked)) = (self.ctx.translations, &field.linked_type) {
            if index.has(linked, &field.column) {
                let translated = self
                    .joins
                    .translation_join(reference, &field.column, linked, index)
                    .map_err(|source| PlanError::JoinPath {
                        itemtype: catalog.name().to_string(),
                        field: field.id,
                        source,
                    })?;
                return Ok(coalesce(vec![table_col(&translated, "value"), column]));
            }
        }
        Ok(column)
    }

    /// Add the columns to SELECT and return the descriptors actually
    /// selected. Union branches select NULL for columns they cannot
    /// resolve; a concrete search omits them.
    fn select_columns(&mut self, specs: &[ColumnSpec], null_fallback: bool) -> Vec<ColumnDescriptor> {
        let mut selected = Vec::with_capacity(specs.len());
        for spec in specs {
            let d = &spec.descriptor;
            if spec.meta_type.is_none() {
                self.display_ids.push(d.field_id);
            }
            match self.column_source(spec) {
                Ok(Some((value, reference))) => {
                    let id = table_col(&reference.alias, "id");
                    if d.aggregated {
                        self.force_group = true;
                        self.select.push(pack(value, &id).alias(&d.alias));
                        for extra in &d.additional_columns {
                            let packed = pack(table_col(&reference.alias, extra), &id);
                            self.select.push(packed.alias(&d.aux_alias(extra)));
                        }
                    } else {
                        self.select.push(value.alias(&d.alias));
                        for extra in &d.additional_columns {
                            let value = table_col(&reference.alias, extra);
                            self.select.push(value.alias(&d.aux_alias(extra)));
                        }
                    }
                    selected.push(d.clone());
                }
                Ok(None) if null_fallback => {
                    self.select_nulls(d);
                    selected.push(d.clone());
                }
                Ok(None) => {
                    self.warnings
                        .push(PlanError::lookup(self.entity.name(), d.field_id));
                }
                Err(e) => {
                    self.warnings.push(e);
                    if null_fallback {
                        self.select_nulls(d);
                        selected.push(d.clone());
                    }
                }
            }
        }
        selected
    }

    fn select_nulls(&mut self, d: &ColumnDescriptor) {
        self.select.push(lit_null().alias(&d.alias));
        for extra in &d.additional_columns {
            self.select.push(lit_null().alias(&aux_alias(&d.alias, extra)));
        }
    }

    fn column_source(&mut self, spec: &ColumnSpec) -> Result<Option<(Expr, JoinRef)>, PlanError> {
        let id = spec.descriptor.field_id;
        let (catalog, from) = match &spec.meta_type {
            Some(meta_type) => {
                let catalog = self.catalog(meta_type, id)?;
                let from = self.meta_ref(meta_type, id)?;
                (catalog, from)
            }
            None => (Arc::clone(&self.entity), self.joins.base().clone()),
        };
        let Some(field) = catalog.field(id) else {
            return Ok(None);
        };
        let end = self
            .joins
            .plan_field(&from, field)
            .map_err(|source| PlanError::JoinPath {
                itemtype: catalog.name().to_string(),
                field: id,
                source,
            })?;
        let value = self.value_expr(&catalog, field, &end.reference)?;
        Ok(Some((value, end.reference)))
    }

    fn apply_criteria(&mut self, criteria: &[Criterion], is_union: bool) {
        let clauses = self.compile_list(criteria, is_union);
        self.where_clause = clauses.where_clause;
        self.having = clauses.having;
    }

    /// Siblings combine left to right with their own links; the first
    /// surviving sibling's AND/OR is ignored.
    fn compile_list(&mut self, criteria: &[Criterion], is_union: bool) -> Clauses {
        let mut out = Clauses::default();
        for criterion in criteria {
            let part = self.compile_node(criterion, is_union);
            let link = criterion.link();
            out.where_clause = combine(out.where_clause.take(), part.where_clause, link);
            out.having = combine(out.having.take(), part.having, link);
        }
        out
    }

    fn compile_node(&mut self, criterion: &Criterion, is_union: bool) -> Clauses {
        match criterion {
            Criterion::Group { link, criteria } => {
                let negated = link.is_negated();
                self.compile_list(criteria, is_union).map(|e| {
                    let grouped = e.paren();
                    if negated {
                        grouped.not()
                    } else {
                        grouped
                    }
                })
            }
            Criterion::Leaf(leaf) => match self.compile_leaf(leaf, is_union) {
                Ok(clauses) => clauses,
                Err(e) => {
                    self.warnings.push(e);
                    Clauses::default()
                }
            },
        }
    }

    fn compile_leaf(&mut self, leaf: &CriterionLeaf, is_union: bool) -> Result<Clauses, PlanError> {
        let values = leaf.value.texts();
        if values.is_empty() {
            return Ok(Clauses::default());
        }
        let (comparator, negated) = leaf.searchtype.normalize(leaf.link.is_negated());

        match leaf.field {
            FieldRef::Keyword(keyword) => Ok(Clauses {
                where_clause: self.keyword_term(keyword, leaf.searchtype, comparator, negated, &values),
                having: None,
            }),
            FieldRef::Id(id) if leaf.meta => {
                let meta_type = leaf
                    .itemtype
                    .as_deref()
                    .ok_or_else(|| PlanError::lookup(self.entity.name(), id))?;
                if is_union && self.entity.meta_link(meta_type).is_none() {
                    return Ok(Clauses {
                        where_clause: Some(always_false()),
                        having: None,
                    });
                }
                let catalog = self.catalog(meta_type, id)?;
                let field = catalog
                    .field(id)
                    .ok_or_else(|| PlanError::lookup(meta_type, id))?;
                let from = self.meta_ref(meta_type, id)?;
                self.field_term(&catalog, &from, field, leaf.searchtype, comparator, negated, &values)
            }
            FieldRef::Id(id) => {
                let entity = Arc::clone(&self.entity);
                match entity.field(id) {
                    Some(field) => {
                        let base = self.joins.base().clone();
                        self.field_term(&entity, &base, field, leaf.searchtype, comparator, negated, &values)
                    }
                    None if is_union => Ok(Clauses {
                        where_clause: Some(always_false()),
                        having: None,
                    }),
                    None => Err(PlanError::lookup(entity.name(), id)),
                }
            }
        }
    }

    /// "All fields" ORs a predicate over every searchable field; "view"
    /// does the same over the displayed columns.
    fn keyword_term(
        &mut self,
        keyword: FieldKeyword,
        requested: Comparator,
        comparator: Comparator,
        negated: bool,
        values: &[String],
    ) -> Option<Expr> {
        let entity = Arc::clone(&self.entity);
        let ids: Vec<FieldId> = match keyword {
            FieldKeyword::All => entity
                .fields()
                .filter(|f| !f.nosearch && !f.use_having)
                .map(|f| f.id)
                .collect(),
            FieldKeyword::View => self.display_ids.clone(),
        };
        let base = self.joins.base().clone();
        let mut terms = Vec::new();
        for id in ids {
            let Some(field) = entity.field(id) else {
                continue;
            };
            if field.use_having || !field.allows(requested) {
                continue;
            }
            match self.field_term(&entity, &base, field, requested, comparator, negated, values) {
                Ok(Clauses {
                    where_clause: Some(term),
                    ..
                }) => terms.push(term),
                Ok(_) => {}
                Err(e) => debug!(itemtype = entity.name(), field = id, "skipped in keyword search: {e}"),
            }
        }
        join_terms(terms, negated)
    }

    #[allow(clippy::too_many_arguments)]
    fn field_term(
        &mut self,
        catalog: &EntityCatalog,
        from: &JoinRef,
        field: &FieldDescriptor,
        requested: Comparator,
        comparator: Comparator,
        negated: bool,
        values: &[String],
    ) -> Result<Clauses, PlanError> {
        if field.nosearch || !field.allows(requested) {
            return Err(PlanError::UnsupportedComparator {
                itemtype: catalog.name().to_string(),
                field: field.id,
                comparator: requested,
            });
        }
        let end = self
            .joins
            .plan_field(from, field)
            .map_err(|source| PlanError::JoinPath {
                itemtype: catalog.name().to_string(),
                field: field.id,
                source,
            })?;
        if field.force_group_by {
            self.force_group = true;
        }

        let owner = if from.itemtype.as_deref() == Some(self.entity.name()) {
            self.output_type.clone()
        } else {
            catalog.name().to_string()
        };
        let operand = if field.use_having {
            col(&column_alias(&owner, field.id))
        } else {
            self.value_expr(catalog, field, &end.reference)?
        };
        let id_operand = table_col(&end.reference.alias, "id");
        let fragment = (!field.use_having)
            .then(|| catalog.fragment(field.id))
            .flatten();
        let fragment_ctx = FragmentContext {
            itemtype: catalog.name(),
            field,
            alias: &end.reference.alias,
            dialect: self.dialect(),
        };

        let mut terms = Vec::with_capacity(values.len());
        for value in values {
            if let Some(expr) = fragment
                .and_then(|builder| builder.criterion(&fragment_ctx, comparator, negated, value))
            {
                terms.push(expr);
                continue;
            }
            let input = PredicateInput {
                datatype: field.datatype,
                operand: &operand,
                id_operand: &id_operand,
                comparator,
                negated,
                value,
                width: field.width,
                tree_table: &field.table,
                closures: self.ctx.closures,
                now: self.now,
            };
            let term = compile_predicate(&input).map_err(|e| match e {
                PredicateError::UnsupportedComparator => PlanError::UnsupportedComparator {
                    itemtype: catalog.name().to_string(),
                    field: field.id,
                    comparator: requested,
                },
                PredicateError::InvalidValue => PlanError::InvalidValue {
                    itemtype: catalog.name().to_string(),
                    field: field.id,
                    datatype: field.datatype,
                    value: value.clone(),
                },
            })?;
            terms.push(term);
        }

        let combined = join_terms(terms, negated);
        Ok(if field.use_having {
            Clauses {
                where_clause: None,
                having: combined,
            }
        } else {
            Clauses {
                where_clause: combined,
                having: None,
            }
        })
    }

    fn grouped(&self) -> bool {
        self.force_group || self.joins.fans_out() || self.having.is_some()
    }

    fn where_clause(&self) -> Option<Expr> {
        let terms: Vec<Expr> = self
            .visibility
            .where_clause
            .iter()
            .chain(self.where_clause.iter())
            .cloned()
            .collect();
        and_all(terms)
    }

    fn head(&self, tagged: bool) -> Vec<SelectExpr> {
        let mut head = vec![table_col(self.entity.table(), "id").alias(ID_COLUMN)];
        if tagged {
            head.push(lit_str(self.entity.name()).alias(TYPE_COLUMN));
        }
        head
    }

    /// FROM, joins, WHERE, GROUP BY and HAVING shared by both queries.
    fn body(&self, select: Vec<SelectExpr>) -> Query {
        let table = self.entity.table();
        let mut query = Query::new().select(select).from(TableRef::new(table));
        query.joins = self.joins.joins().to_vec();
        if let Some(condition) = self.where_clause() {
            query = query.filter(condition);
        }
        if self.grouped() {
            query = query.group_by(vec![table_col(table, "id")]);
        }
        if let Some(having) = &self.having {
            query = query.having(having.clone());
        }
        query
    }

    fn select_query(&self, tagged: bool) -> Query {
        let mut select = self.head(tagged);
        select.extend(self.select.iter().cloned());
        self.body(select)
    }

    /// Rows counted by the COUNT query. HAVING refers to output aliases,
    /// so the full select list is kept when there is one.
    fn count_inner(&self, tagged: bool) -> Query {
        if self.having.is_some() {
            self.select_query(tagged)
        } else {
            self.body(self.head(tagged))
        }
    }

    fn count_query(&self) -> Query {
        if self.where_clause.is_none() && self.having.is_none() {
            let table = self.entity.table();
            let count = if self.visibility.fans_out {
                count_distinct(table_col(table, "id"))
            } else {
                count_star()
            };
            let mut query = Query::new()
                .select(vec![count.alias(TOTAL_COLUMN)])
                .from(TableRef::new(table));
            query.joins = self.visibility.joins.clone();
            if let Some(condition) = &self.visibility.where_clause {
                query = query.filter(condition.clone());
            }
            return query;
        }
        Query::new()
            .select(vec![count_star().alias(TOTAL_COLUMN)])
            .from_subquery(self.count_inner(false), COUNT_ALIAS)
    }
}
