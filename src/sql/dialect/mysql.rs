//! MySQL SQL dialect.
//!
//! MySQL differences from ANSI that the search compiler cares about:
//! - Backtick identifier quoting (`` `name` ``)
//! - Backslash is an escape character inside string literals
//! - `||` is logical OR by default (use CONCAT())
//! - `GROUP_CONCAT(DISTINCT ... ORDER BY ... SEPARATOR ...)`, silently
//!   truncated at `group_concat_max_len` (warning 1260)

use super::helpers;
use super::SqlDialect;
use crate::sql::token::{Token, TokenStream};

/// MySQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_backslash(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    // Uses default emit_limit_offset (LIMIT ... OFFSET ...)

    fn supports_concat_operator(&self) -> bool {
        false
    }

    fn emit_group_concat(
        &self,
        expr: &TokenStream,
        order_by: &TokenStream,
        separator: &str,
        distinct: bool,
    ) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::FunctionName("GROUP_CONCAT".into())).lparen();
        if distinct {
            ts.push(Token::Distinct).space();
        }
        ts.append(expr)
            .space()
            .push(Token::OrderBy)
            .space()
            .append(order_by)
            .space()
            .push(Token::Separator)
            .space()
            .push(Token::LitString(separator.into()))
            .rparen();
        ts
    }

    fn truncates_group_concat(&self) -> bool {
        true
    }

    fn set_group_concat_limit(&self, len: u64) -> Option<String> {
        Some(format!("SET SESSION group_concat_max_len = {len}"))
    }

    fn emit_truncate_to_minute(&self, expr: &TokenStream) -> TokenStream {
        helpers::emit_call(
            "DATE_FORMAT",
            &[expr.clone(), helpers::lit("%Y-%m-%d %H:%i")],
        )
    }

    fn emit_add_months(&self, date: &TokenStream, months: &TokenStream) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::FunctionName("DATE_ADD".into()))
            .lparen()
            .append(date)
            .comma()
            .space()
            .push(Token::Raw("INTERVAL".into()))
            .space()
            .append(months)
            .space()
            .push(Token::Raw("MONTH".into()))
            .rparen();
        ts
    }
}
