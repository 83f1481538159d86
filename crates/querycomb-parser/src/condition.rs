//! Condition expression parser using pest PEG grammar + Pratt parser.
//!
//! Parses slot conditions like:
//! - `"status == 'start'"`
//! - `"status == 'finish' and not retried"`
//! - `"code >= 500 or path =~ '^/admin'"`
//!
//! Precedence from loosest to tightest: `or`/`||`/`xor`, `and`/`&&`,
//! prefix `not`/`!`, then comparisons.

use pest::Parser;
use pest::iterators::Pair;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest_derive::Parser;

use crate::ast::{CompareOp, ConditionExpr, Literal, Operand};
use crate::error::{ConfigParseError, Result};

// ---------------------------------------------------------------------------
// Pest parser (generated from expr.pest grammar)
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[grammar = "src/expr.pest"]
pub(crate) struct ExprParser;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a condition expression string into an AST.
///
/// # Examples
///
/// ```
/// use querycomb_parser::condition::parse_condition;
///
/// let expr = parse_condition("status == 'start' and not retried").unwrap();
/// assert_eq!(expr.fields(), vec!["status", "retried"]);
/// println!("{expr}");
/// ```
pub fn parse_condition(input: &str) -> Result<ConditionExpr> {
    let mut pairs = ExprParser::parse(Rule::condition, input)
        .map_err(|e| ConfigParseError::Condition(e.to_string()))?;

    let pratt = PrattParser::new()
        .op(Op::infix(Rule::or_op, Assoc::Left) | Op::infix(Rule::xor_op, Assoc::Left))
        .op(Op::infix(Rule::and_op, Assoc::Left))
        .op(Op::prefix(Rule::not_op));

    // condition = { SOI ~ expr ~ EOI }
    let expr_pair = pairs
        .next()
        .and_then(|condition| condition.into_inner().find(|p| p.as_rule() == Rule::expr))
        .ok_or_else(|| ConfigParseError::Condition(format!("empty condition: {input:?}")))?;

    parse_expr(expr_pair, &pratt)
}

// ---------------------------------------------------------------------------
// Internal parsing helpers
// ---------------------------------------------------------------------------

fn parse_expr(pair: Pair<'_, Rule>, pratt: &PrattParser<Rule>) -> Result<ConditionExpr> {
    pratt
        .map_primary(|primary| match primary.as_rule() {
            Rule::expr => parse_expr(primary, pratt),
            Rule::comparison => parse_comparison(primary),
            _ => parse_operand(primary).map(ConditionExpr::Truthy),
        })
        .map_prefix(|op, rhs| match op.as_rule() {
            Rule::not_op => Ok(ConditionExpr::Not(Box::new(rhs?))),
            other => unreachable!("unexpected prefix rule: {other:?}"),
        })
        .map_infix(|lhs, op, rhs| match op.as_rule() {
            Rule::and_op => Ok(merge_binary(ConditionExpr::And, lhs?, rhs?)),
            Rule::or_op => Ok(merge_binary(ConditionExpr::Or, lhs?, rhs?)),
            Rule::xor_op => Ok(ConditionExpr::Xor(Box::new(lhs?), Box::new(rhs?))),
            other => unreachable!("unexpected infix rule: {other:?}"),
        })
        .parse(pair.into_inner())
}

/// Flatten nested binary operators of the same kind.
/// `a AND (b AND c)` becomes `AND(a, b, c)` instead of `AND(a, AND(b, c))`.
fn merge_binary(
    ctor: fn(Vec<ConditionExpr>) -> ConditionExpr,
    lhs: ConditionExpr,
    rhs: ConditionExpr,
) -> ConditionExpr {
    let is_same = |expr: &ConditionExpr| -> bool {
        matches!(
            (&ctor(vec![]), expr),
            (ConditionExpr::And(_), ConditionExpr::And(_))
                | (ConditionExpr::Or(_), ConditionExpr::Or(_))
        )
    };

    let mut args = Vec::new();
    for side in [lhs, rhs] {
        if is_same(&side) {
            match side {
                ConditionExpr::And(children) | ConditionExpr::Or(children) => {
                    args.extend(children);
                }
                _ => unreachable!(),
            }
        } else {
            args.push(side);
        }
    }

    ctor(args)
}

fn parse_comparison(pair: Pair<'_, Rule>) -> Result<ConditionExpr> {
    let text = pair.as_str().to_string();
    let mut inner = pair.into_inner();
    let (Some(left), Some(op), Some(right)) = (inner.next(), inner.next(), inner.next()) else {
        return Err(ConfigParseError::Condition(format!(
            "incomplete comparison: {text}"
        )));
    };

    let op = CompareOp::from_str(op.as_str()).ok_or_else(|| {
        ConfigParseError::Condition(format!("unknown operator '{}'", op.as_str()))
    })?;
    let left = parse_operand(left)?;
    let right = parse_operand(right)?;

    if op.is_regex() && !matches!(right, Operand::Literal(Literal::String(_))) {
        return Err(ConfigParseError::Condition(format!(
            "right side of '{op}' must be a quoted pattern: {text}"
        )));
    }

    Ok(ConditionExpr::Compare { left, op, right })
}

fn parse_operand(pair: Pair<'_, Rule>) -> Result<Operand> {
    let operand = match pair.as_rule() {
        Rule::ident => Operand::Field(pair.as_str().to_string()),
        Rule::string => Operand::Literal(Literal::String(parse_string(pair))),
        Rule::number => Operand::Literal(parse_number(pair.as_str())?),
        Rule::boolean => Operand::Literal(Literal::Bool(pair.as_str() == "true")),
        Rule::null => Operand::Literal(Literal::Null),
        other => unreachable!("unexpected operand rule: {other:?}"),
    };
    Ok(operand)
}

fn parse_number(s: &str) -> Result<Literal> {
    if !s.contains(['.', 'e', 'E'])
        && let Ok(n) = s.parse::<i64>()
    {
        return Ok(Literal::Integer(n));
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() => Ok(Literal::Float(f)),
        Ok(_) => Err(ConfigParseError::Condition(format!(
            "invalid number '{s}': out of range"
        ))),
        Err(e) => Err(ConfigParseError::Condition(format!(
            "invalid number '{s}': {e}"
        ))),
    }
}

/// Extract a quoted string's contents.
///
/// Only quote, backslash, and whitespace escapes are resolved; any other
/// backslash sequence is kept verbatim so regex classes like `\d` survive.
pub(crate) fn parse_string(pair: Pair<'_, Rule>) -> String {
    let raw = pair
        .into_inner()
        .next()
        .map(|inner| inner.as_str())
        .unwrap_or("");

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(q @ ('\\' | '"' | '\'')) => out.push(q),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

// =============================================================================
// Tests
// =============================================================================
