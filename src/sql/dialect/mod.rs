//! SQL Dialect definitions and formatting rules.
//!
//! This module provides a trait-based abstraction for SQL dialect differences.
//! The search compiler targets two engines:
//!
//! - [`MySql`]: the production asset-management datastore (MySQL / MariaDB)
//! - [`Sqlite`]: embedded execution, used by the `rusqlite` transport and tests
//!
//! Differences that matter to the search compiler:
//!
//! | Feature | MySQL | SQLite |
//! |---------|-------|--------|
//! | Identifier quoting | `` `x` `` | `"x"` |
//! | Backslash escapes in strings | yes | no |
//! | String concatenation | `CONCAT()` | `\|\|` |
//! | `GROUP_CONCAT(DISTINCT x ... SEPARATOR s)` | yes | no (`group_concat(x, s ORDER BY ...)`, 3.44+) |
//! | Concatenation length limit | `group_concat_max_len` | none |
//! | Parenthesized UNION operands | yes | no |
//!
//! # Usage
//!
//! ```ignore
//! use searchkit::sql::dialect::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::MySql;
//! let quoted = dialect.quote_identifier("glpi_computers");  // `glpi_computers`
//! ```

pub mod helpers;
mod mysql;
mod sqlite;

pub use mysql::MySql;
pub use sqlite::Sqlite;

use serde::{Deserialize, Serialize};

use super::token::TokenStream;

/// SQL dialect trait - defines how SQL constructs are rendered.
///
/// Implementations handle dialect-specific syntax differences.
/// The default implementations follow ANSI SQL where possible.
pub trait SqlDialect: std::fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column, alias).
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal.
    ///
    /// All dialects use single quotes with `''` for escaping.
    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    /// Format a boolean literal.
    fn format_bool(&self, b: bool) -> &'static str;

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Emit LIMIT/OFFSET or equivalent pagination clause.
    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_standard(limit, offset)
    }

    // =========================================================================
    // Operators
    // =========================================================================

    /// String concatenation operator.
    fn concat_operator(&self) -> &'static str {
        "||"
    }

    /// Whether this dialect supports the `||` concat operator.
    ///
    /// MySQL uses `||` as logical OR by default.
    fn supports_concat_operator(&self) -> bool {
        true
    }

    // =========================================================================
    // Set operations
    // =========================================================================

    /// Whether UNION operands may be wrapped in parentheses.
    ///
    /// SQLite rejects `(SELECT ...) UNION (SELECT ...)`.
    fn parenthesize_set_operands(&self) -> bool {
        true
    }

    // =========================================================================
    // Grouped concatenation
    // =========================================================================

    /// Emit an ordered group concatenation of `expr` using `separator`.
    fn emit_group_concat(
        &self,
        expr: &TokenStream,
        order_by: &TokenStream,
        separator: &str,
        distinct: bool,
    ) -> TokenStream;

    /// Whether the server silently truncates group concatenations at a
    /// session-configurable length.
    fn truncates_group_concat(&self) -> bool {
        false
    }

    /// Statement raising the group concatenation limit, when the dialect has one.
    fn set_group_concat_limit(&self, len: u64) -> Option<String> {
        let _ = len;
        None
    }

    // =========================================================================
    // Date/Time
    // =========================================================================

    /// Format a datetime expression truncated to the minute (`YYYY-MM-DD HH:MM`).
    fn emit_truncate_to_minute(&self, expr: &TokenStream) -> TokenStream;

    /// Add a number of months (an expression) to a date expression.
    fn emit_add_months(&self, date: &TokenStream, months: &TokenStream) -> TokenStream;
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    MySql,
    Sqlite,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::MySql => &MySql,
            Dialect::Sqlite => &Sqlite,
        }
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        self.dialect().format_bool(b)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        self.dialect().emit_limit_offset(limit, offset)
    }

    fn concat_operator(&self) -> &'static str {
        self.dialect().concat_operator()
    }

    fn supports_concat_operator(&self) -> bool {
        self.dialect().supports_concat_operator()
    }

    fn parenthesize_set_operands(&self) -> bool {
        self.dialect().parenthesize_set_operands()
    }

    fn emit_group_concat(
        &self,
        expr: &TokenStream,
        order_by: &TokenStream,
        separator: &str,
        distinct: bool,
    ) -> TokenStream {
        self.dialect()
            .emit_group_concat(expr, order_by, separator, distinct)
    }

    fn truncates_group_concat(&self) -> bool {
        self.dialect().truncates_group_concat()
    }

    fn set_group_concat_limit(&self, len: u64) -> Option<String> {
        self.dialect().set_group_concat_limit(len)
    }

    fn emit_truncate_to_minute(&self, expr: &TokenStream) -> TokenStream {
        self.dialect().emit_truncate_to_minute(expr)
    }

    fn emit_add_months(&self, date: &TokenStream, months: &TokenStream) -> TokenStream {
        self.dialect().emit_add_months(date, months)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
