//! SQL generation module.
//!
//! This module provides a type-safe SQL builder that renders the search
//! queries for each supported dialect. It includes:
//!
//! - [`query`] - SELECT query builder (joins, derived tables, UNION ALL)
//! - [`expr`] - Expression AST and builder DSL
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - SQL dialect implementations

pub mod dialect;
pub mod expr;
pub mod query;
pub mod token;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types at the sql module level
pub use dialect::{Dialect, SqlDialect};
pub use expr::{
    always_false, and_all, coalesce, col, count_distinct, count_star, func,
    group_concat, lit_float, lit_int, lit_null, lit_str, or_all, raw_sql, star, table_col,
    BinaryOperator, Expr, ExprExt, Literal, UnaryOperator,
};
pub use query::{
    FromItem, Join, JoinType, LimitOffset, OrderByExpr, Query, SelectExpr, SetOperation, SortDir,
    TableRef,
};
pub use token::{Token, TokenStream};
