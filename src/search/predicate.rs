//! Predicate compiler: one comparator on one value, dispatched on datatype.
//!
//! Negation is folded into each rule instead of wrapping the positive form
//! in `NOT`: a negated criterion also matches rows whose value is NULL
//! (no joined row counts as "not equal").

use chrono::NaiveDateTime;

use crate::catalog::{Comparator, DataType};
use crate::sql::{lit_float, lit_int, lit_str, Expr, ExprExt};

use super::dates::{resolve_date, DatePrecision, ResolvedDate};
use super::hierarchy::HierarchyClosures;

/// Why a value could not be compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateError {
    UnsupportedComparator,
    InvalidValue,
}

/// Everything needed to compile one leaf value.
#[derive(Debug, Clone)]
pub struct PredicateInput<'a> {
    pub datatype: DataType,
    /// Value expression of the field.
    pub operand: &'a Expr,
    /// `id` of the row holding the value.
    pub id_operand: &'a Expr,
    /// Positive comparator; see [`Comparator::normalize`].
    pub comparator: Comparator,
    pub negated: bool,
    pub value: &'a str,
    pub width: Option<f64>,
    /// Table of the field, for tree closures.
    pub tree_table: &'a str,
    pub closures: &'a HierarchyClosures,
    pub now: NaiveDateTime,
}

/// LIKE pattern for a "contains" value: `%value%`, with `^` anchoring the
/// start and `$` anchoring the end.
pub fn like_pattern(value: &str) -> String {
    let (start, rest) = match value.strip_prefix('^') {
        Some(rest) => ("", rest),
        None => ("%", value),
    };
    let (body, end) = match rest.strip_suffix('$') {
        Some(body) => (body, ""),
        None => (rest, "%"),
    };
    format!("{start}{body}{end}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CmpOp {
    fn apply(self, left: Expr, right: Expr) -> Expr {
        match self {
            CmpOp::Lt => left.lt(right),
            CmpOp::Lte => left.lte(right),
            CmpOp::Gt => left.gt(right),
            CmpOp::Gte => left.gte(right),
        }
    }
}

/// Split an inline `<`, `>`, `<=` or `>=` prefix off a value.
fn split_operator(value: &str) -> (Option<CmpOp>, &str) {
    for (prefix, op) in [
        ("<=", CmpOp::Lte),
        (">=", CmpOp::Gte),
        ("<", CmpOp::Lt),
        (">", CmpOp::Gt),
    ] {
        if let Some(rest) = value.strip_prefix(prefix) {
            return (Some(op), rest.trim());
        }
    }
    (None, value)
}

fn comparator_operator(comparator: Comparator) -> Option<CmpOp> {
    match comparator {
        Comparator::LessThan => Some(CmpOp::Lt),
        Comparator::MoreThan => Some(CmpOp::Gt),
        _ => None,
    }
}

/// Compile one value into a boolean expression.
pub fn compile_predicate(input: &PredicateInput<'_>) -> Result<Expr, PredicateError> {
    let value = input.value.trim();
    if input.comparator == Comparator::Under {
        return tree(input, value);
    }
    match input.datatype {
        DataType::Bool => boolean(input, value),
        DataType::Right => right(input, value),
        dt if dt.is_numeric() => numeric(input, value),
        dt if dt.is_date() => date(input, value),
        dt if dt.links_by_id()
            && input.comparator == Comparator::Equals
            && value.parse::<i64>().is_ok() =>
        {
            linked_id(input, value)
        }
        _ => text(input, value),
    }
}

fn tree(input: &PredicateInput<'_>, value: &str) -> Result<Expr, PredicateError> {
    let node: i64 = value.parse().map_err(|_| PredicateError::InvalidValue)?;
    let ids = input
        .closures
        .closure(input.tree_table, node)
        .into_iter()
        .map(lit_int)
        .collect();
    Ok(if input.negated {
        input.id_operand.clone().not_in_list(ids)
    } else {
        input.id_operand.clone().in_list(ids)
    })
}

fn boolean(input: &PredicateInput<'_>, value: &str) -> Result<Expr, PredicateError> {
    let flag = match value.to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" => 1,
        "no" | "false" | "0" => 0,
        _ => return Err(PredicateError::InvalidValue),
    };
    match input.comparator {
        Comparator::Contains | Comparator::Equals => {
            Ok(equality(input.operand, lit_int(flag), input.negated))
        }
        _ => Err(PredicateError::UnsupportedComparator),
    }
}

fn right(input: &PredicateInput<'_>, value: &str) -> Result<Expr, PredicateError> {
    let mask: i64 = value.parse().map_err(|_| PredicateError::InvalidValue)?;
    let masked = input.operand.clone().bit_and(lit_int(mask)).paren();
    Ok(if input.negated {
        masked
            .eq(lit_int(0))
            .or(input.operand.clone().is_null())
            .paren()
    } else {
        masked.ne(lit_int(0))
    })
}

fn numeric(input: &PredicateInput<'_>, value: &str) -> Result<Expr, PredicateError> {
    let (inline, rest) = split_operator(value);
    let op = inline.or(comparator_operator(input.comparator));
    let number = rest.parse::<f64>().ok().filter(|n| n.is_finite());

    let positive = match (op, number) {
        (Some(op), Some(n)) => op.apply(input.operand.clone(), number_literal(n)),
        (Some(_), None) => return Err(PredicateError::InvalidValue),
        (None, Some(n)) => match input.width {
            Some(width) if width > 0.0 => input
                .operand
                .clone()
                .gte(number_literal(n - width))
                .and(input.operand.clone().lte(number_literal(n + width)))
                .paren(),
            _ if !input.negated => input.operand.clone().eq(number_literal(n)),
            _ => return Ok(equality(input.operand, number_literal(n), true)),
        },
        (None, None) if input.comparator == Comparator::Contains => return text(input, value),
        (None, None) => return Err(PredicateError::InvalidValue),
    };
    Ok(negate_if(positive, input))
}

fn number_literal(n: f64) -> Expr {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        lit_int(n as i64)
    } else {
        lit_float(n)
    }
}

fn date(input: &PredicateInput<'_>, value: &str) -> Result<Expr, PredicateError> {
    let (inline, rest) = split_operator(value);
    let op = inline.or(comparator_operator(input.comparator));
    let resolved = resolve_date(rest, input.now);
    let as_literal = |d: &ResolvedDate| match input.datatype {
        DataType::Datetime => lit_str(&d.datetime_literal()),
        _ => lit_str(&d.date_literal()),
    };

    let positive = match (op, resolved) {
        (Some(op), Some(d)) => op.apply(input.operand.clone(), as_literal(&d)),
        (Some(_), None) => return Err(PredicateError::InvalidValue),
        (None, Some(d)) => match input.datatype {
            DataType::Datetime if d.precision == DatePrecision::Day => input
                .operand
                .clone()
                .between(
                    lit_str(&format!("{} 00:00:00", d.date_literal())),
                    lit_str(&format!("{} 23:59:59", d.date_literal())),
                ),
            DataType::Datetime => Expr::TruncateToMinute(Box::new(input.operand.clone()))
                .eq(lit_str(&d.minute_literal())),
            _ => input.operand.clone().eq(as_literal(&d)),
        },
        (None, None) if input.comparator == Comparator::Contains => return text(input, value),
        (None, None) => return Err(PredicateError::InvalidValue),
    };
    Ok(negate_if(positive, input))
}

fn linked_id(input: &PredicateInput<'_>, value: &str) -> Result<Expr, PredicateError> {
    let id: i64 = value.parse().map_err(|_| PredicateError::InvalidValue)?;
    Ok(equality(input.id_operand, lit_int(id), input.negated))
}

fn text(input: &PredicateInput<'_>, value: &str) -> Result<Expr, PredicateError> {
    let operand = input.operand.clone();
    match input.comparator {
        Comparator::Contains if value.eq_ignore_ascii_case("null") => Ok(if input.negated {
            operand.is_not_null()
        } else {
            operand.is_null()
        }),
        Comparator::Contains if value == "^$" => Ok(if input.negated {
            operand
                .clone()
                .not_like(lit_str(""))
                .and(operand.is_not_null())
                .paren()
        } else {
            operand.clone().like(lit_str("")).or(operand.is_null()).paren()
        }),
        Comparator::Contains => {
            let pattern = lit_str(&like_pattern(value));
            Ok(if input.negated {
                operand.clone().not_like(pattern).or(operand.is_null()).paren()
            } else {
                operand.like(pattern)
            })
        }
        Comparator::Equals => Ok(equality(input.operand, lit_str(value), input.negated)),
        Comparator::LessThan | Comparator::MoreThan => {
            let Some(op) = comparator_operator(input.comparator) else {
                return Err(PredicateError::UnsupportedComparator);
            };
            Ok(negate_if(op.apply(operand, lit_str(value)), input))
        }
        _ => Err(PredicateError::UnsupportedComparator),
    }
}

/// `x = v`, or `(x <> v OR x IS NULL)` when negated.
fn equality(operand: &Expr, value: Expr, negated: bool) -> Expr {
    if negated {
        operand
            .clone()
            .ne(value)
            .or(operand.clone().is_null())
            .paren()
    } else {
        operand.clone().eq(value)
    }
}

/// `(NOT (p) OR x IS NULL)` when negated.
fn negate_if(positive: Expr, input: &PredicateInput<'_>) -> Expr {
    if !input.negated {
        return positive;
    }
    let positive = match positive {
        Expr::Paren(_) => positive,
        other => other.paren(),
    };
    positive
        .not()
        .or(input.operand.clone().is_null())
        .paren()
}
