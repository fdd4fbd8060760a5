//! SQLite SQL dialect.
//!
//! Used for embedded execution. SQLite differences:
//! - ANSI identifier quoting (`"`)
//! - No backslash escapes in string literals
//! - `group_concat(x, sep ORDER BY y)` (3.44+); DISTINCT aggregates take a
//!   single argument, so duplicates are removed by the result decoder
//! - Compound SELECT operands cannot be parenthesized

use super::helpers;
use super::SqlDialect;
use crate::sql::token::{Token, TokenStream};

/// SQLite SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn parenthesize_set_operands(&self) -> bool {
        false
    }

    fn emit_group_concat(
        &self,
        expr: &TokenStream,
        order_by: &TokenStream,
        separator: &str,
        _distinct: bool,
    ) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::FunctionName("GROUP_CONCAT".into()))
            .lparen()
            .append(expr)
            .comma()
            .space()
            .push(Token::LitString(separator.into()))
            .space()
            .push(Token::OrderBy)
            .space()
            .append(order_by)
            .rparen();
        ts
    }

    fn emit_truncate_to_minute(&self, expr: &TokenStream) -> TokenStream {
        helpers::emit_call("STRFTIME", &[helpers::lit("%Y-%m-%d %H:%M"), expr.clone()])
    }

    fn emit_add_months(&self, date: &TokenStream, months: &TokenStream) -> TokenStream {
        let mut modifier = TokenStream::new();
        modifier
            .push(Token::LitString("+".into()))
            .space()
            .push(Token::Concat)
            .space()
            .append(months)
            .space()
            .push(Token::Concat)
            .space()
            .push(Token::LitString(" months".into()));
        helpers::emit_call("DATE", &[date.clone(), modifier])
    }
}
