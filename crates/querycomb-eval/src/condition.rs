//! Compiled slot conditions.
//!
//! A `ConditionExpr` from the parser is compiled once into a predicate over
//! the ordered list of fields it references. Field references become indices
//! into that list, literals become JSON values, and regex patterns are
//! compiled up front so a bad pattern fails configuration, not evaluation.

use std::cmp::Ordering;

use querycomb_parser::{CompareOp, ConditionExpr, Literal, Operand, parse_condition};
use regex::Regex;
use serde_json::{Number, Value};

use crate::error::Result;
use crate::event::Event;

/// A compiled, reusable predicate over named record fields.
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    source: String,
    fields: Vec<String>,
    root: Node,
}

#[derive(Debug, Clone)]
enum Node {
    And(Vec<Node>),
    Or(Vec<Node>),
    Xor(Box<Node>, Box<Node>),
    Not(Box<Node>),
    Compare { left: Arg, op: CompareOp, right: Arg },
    Regex { left: Arg, regex: Regex, negate: bool },
    Truthy(Arg),
}

#[derive(Debug, Clone)]
enum Arg {
    /// Index into the condition's field list.
    Field(usize),
    Literal(Value),
}

impl CompiledCondition {
    /// Parse and compile a condition string.
    pub fn compile(source: &str) -> Result<Self> {
        let expr = parse_condition(source)?;
        compile_condition(source, &expr)
    }

    /// The condition text as configured.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Referenced field names, in the order `evaluate` expects their values.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Evaluate against one value per referenced field, in `fields()` order.
    ///
    /// A missing value makes any comparison on it false.
    pub fn evaluate(&self, values: &[&Value]) -> bool {
        eval_node(&self.root, values)
    }

    /// Evaluate against a record.
    ///
    /// A record lacking any referenced field does not match.
    pub fn matches(&self, event: &Event) -> bool {
        let mut values = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            match event.get_field(field) {
                Some(v) => values.push(v),
                None => return false,
            }
        }
        self.evaluate(&values)
    }
}

/// Compile a parsed condition.
pub fn compile_condition(source: &str, expr: &ConditionExpr) -> Result<CompiledCondition> {
    let fields = expr.fields();
    let root = compile_node(expr, &fields)?;
    Ok(CompiledCondition {
        source: source.to_string(),
        fields,
        root,
    })
}

fn compile_node(expr: &ConditionExpr, fields: &[String]) -> Result<Node> {
    let node = match expr {
        ConditionExpr::And(args) => Node::And(
            args.iter()
                .map(|a| compile_node(a, fields))
                .collect::<Result<_>>()?,
        ),
        ConditionExpr::Or(args) => Node::Or(
            args.iter()
                .map(|a| compile_node(a, fields))
                .collect::<Result<_>>()?,
        ),
        ConditionExpr::Xor(lhs, rhs) => Node::Xor(
            Box::new(compile_node(lhs, fields)?),
            Box::new(compile_node(rhs, fields)?),
        ),
        ConditionExpr::Not(inner) => Node::Not(Box::new(compile_node(inner, fields)?)),
        ConditionExpr::Compare { left, op, right } if op.is_regex() => {
            // The parser guarantees a string literal on the right.
            let pattern = match right {
                Operand::Literal(Literal::String(p)) => p.as_str(),
                other => {
                    return Err(querycomb_parser::ConfigParseError::Condition(format!(
                        "right side of '{op}' must be a quoted pattern, got {other}"
                    ))
                    .into());
                }
            };
            Node::Regex {
                left: compile_arg(left, fields)?,
                regex: Regex::new(pattern)?,
                negate: *op == CompareOp::NotMatches,
            }
        }
        ConditionExpr::Compare { left, op, right } => Node::Compare {
            left: compile_arg(left, fields)?,
            op: *op,
            right: compile_arg(right, fields)?,
        },
        ConditionExpr::Truthy(operand) => Node::Truthy(compile_arg(operand, fields)?),
    };
    Ok(node)
}

fn compile_arg(operand: &Operand, fields: &[String]) -> Result<Arg> {
    let arg = match operand {
        Operand::Field(name) => {
            // fields() was derived from this same expression, so the name is present.
            let idx = fields.iter().position(|f| f == name).unwrap_or(usize::MAX);
            Arg::Field(idx)
        }
        Operand::Literal(lit) => Arg::Literal(literal_to_value(lit)?),
    };
    Ok(arg)
}

fn literal_to_value(lit: &Literal) -> Result<Value> {
    let value = match lit {
        Literal::String(s) => Value::String(s.clone()),
        Literal::Integer(n) => Value::from(*n),
        Literal::Float(f) => Number::from_f64(*f).map(Value::Number).ok_or_else(|| {
            querycomb_parser::ConfigParseError::Condition(format!(
                "invalid number '{f}': not a finite value"
            ))
        })?,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
    };
    Ok(value)
}

// =============================================================================
// Evaluation
// =============================================================================

fn eval_node(node: &Node, values: &[&Value]) -> bool {
    match node {
        Node::And(args) => args.iter().all(|a| eval_node(a, values)),
        Node::Or(args) => args.iter().any(|a| eval_node(a, values)),
        Node::Xor(lhs, rhs) => eval_node(lhs, values) != eval_node(rhs, values),
        Node::Not(inner) => !eval_node(inner, values),
        Node::Compare { left, op, right } => {
            let (Some(l), Some(r)) = (resolve(left, values), resolve(right, values)) else {
                return false;
            };
            compare(l, *op, r)
        }
        Node::Regex {
            left,
            regex,
            negate,
        } => {
            let Some(l) = resolve(left, values) else {
                return false;
            };
            let matched = l.as_str().is_some_and(|s| regex.is_match(s));
            matched != *negate
        }
        Node::Truthy(arg) => resolve(arg, values).is_some_and(is_truthy),
    }
}

fn resolve<'v>(arg: &'v Arg, values: &[&'v Value]) -> Option<&'v Value> {
    match arg {
        Arg::Field(idx) => values.get(*idx).copied(),
        Arg::Literal(v) => Some(v),
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::Ne => !values_equal(left, right),
        CompareOp::Lt => order(left, right) == Some(Ordering::Less),
        CompareOp::Le => matches!(order(left, right), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => order(left, right) == Some(Ordering::Greater),
        CompareOp::Ge => matches!(
            order(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        // Compiled into Node::Regex.
        CompareOp::Matches | CompareOp::NotMatches => false,
    }
}

/// Numbers compare by value (`1 == 1.0`); everything else structurally.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => numbers_cmp(a, b) == Some(Ordering::Equal),
        _ => left == right,
    }
}

/// Ordering is defined for number pairs and string pairs only.
fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => numbers_cmp(a, b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn numbers_cmp(a: &Number, b: &Number) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return Some(x.cmp(&y));
    }
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}

fn is_truthy(v: &Value) -> bool {
    !matches!(v, Value::Null | Value::Bool(false))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Record;
    use serde_json::json;

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    fn check(cond: &str, v: Value) -> bool {
        let compiled = CompiledCondition::compile(cond).unwrap();
        let r = record(v);
        compiled.matches(&Event::new(&r))
    }

    #[test]
    fn test_string_equality() {
        assert!(check("status == 'start'", json!({"status": "start"})));
        assert!(!check("status == 'start'", json!({"status": "finish"})));
        assert!(check("status != 'start'", json!({"status": "finish"})));
    }

    #[test]
    fn test_missing_field_never_matches() {
        assert!(!check("status == 'start'", json!({"state": "start"})));
        // Even a negated condition is false when its field is absent.
        assert!(!check("status != 'start'", json!({})));
        assert!(!check("not flag", json!({})));
    }

    #[test]
    fn test_numeric_comparisons() {
        let r = json!({"code": 503, "ratio": 0.25});
        assert!(check("code >= 500", r.clone()));
        assert!(check("code > 500 and code < 600", r.clone()));
        assert!(check("code <= 503", r.clone()));
        assert!(check("ratio < 0.5", r.clone()));
        assert!(check("code == 503.0", r.clone()));
        assert!(!check("code < 500", r));
    }

    #[test]
    fn test_string_ordering() {
        assert!(check("name < 'm'", json!({"name": "alice"})));
        assert!(!check("name > 'm'", json!({"name": "alice"})));
    }

    #[test]
    fn test_mixed_types_are_unequal_and_unordered() {
        assert!(!check("code == '503'", json!({"code": 503})));
        assert!(check("code != '503'", json!({"code": 503})));
        assert!(!check("code < 'x'", json!({"code": 503})));
        assert!(!check("code >= 'x'", json!({"code": 503})));
    }

    #[test]
    fn test_field_to_field_comparison() {
        assert!(check("a == b", json!({"a": "x", "b": "x"})));
        assert!(!check("a == b", json!({"a": "x", "b": "y"})));
        assert!(check("start < finish", json!({"start": 10, "finish": 20})));
    }

    #[test]
    fn test_truthiness() {
        assert!(check("flag", json!({"flag": true})));
        assert!(check("flag", json!({"flag": "no"})));
        assert!(check("flag", json!({"flag": 0})));
        assert!(!check("flag", json!({"flag": false})));
        assert!(!check("flag", json!({"flag": null})));
        assert!(check("not flag", json!({"flag": null})));
    }

    #[test]
    fn test_nil_comparisons() {
        assert!(check("user == nil", json!({"user": null})));
        assert!(check("user != nil", json!({"user": "bob"})));
    }

    #[test]
    fn test_regex_match() {
        assert!(check(r"path =~ '^/api/\d+$'", json!({"path": "/api/42"})));
        assert!(!check(r"path =~ '^/api/\d+$'", json!({"path": "/api/x"})));
        assert!(check("path !~ '^/admin'", json!({"path": "/api/42"})));
        // Non-strings never match a pattern.
        assert!(!check("code =~ '5'", json!({"code": 5})));
        assert!(check("code !~ '5'", json!({"code": 5})));
    }

    #[test]
    fn test_invalid_regex_fails_compilation() {
        let err = CompiledCondition::compile("path =~ '[unclosed'").unwrap_err();
        assert!(matches!(err, crate::CombineError::InvalidRegex(_)), "got: {err}");
    }

    #[test]
    fn test_out_of_range_literal_fails_compilation() {
        let err = CompiledCondition::compile("big == 1e999").unwrap_err();
        assert!(matches!(err, crate::CombineError::Parser(_)), "got: {err}");

        let expr = ConditionExpr::Compare {
            left: Operand::Field("big".to_string()),
            op: CompareOp::Eq,
            right: Operand::Literal(Literal::Float(f64::INFINITY)),
        };
        assert!(compile_condition("big == inf", &expr).is_err());
    }

    #[test]
    fn test_xor() {
        let cond = "a xor b";
        assert!(check(cond, json!({"a": true, "b": false})));
        assert!(!check(cond, json!({"a": true, "b": true})));
        assert!(!check(cond, json!({"a": false, "b": false})));
    }

    #[test]
    fn test_evaluate_positional_values() {
        let compiled = CompiledCondition::compile("status == 'finish' and code >= 200").unwrap();
        assert_eq!(compiled.fields(), ["status", "code"]);
        assert!(compiled.evaluate(&[&json!("finish"), &json!(204)]));
        assert!(!compiled.evaluate(&[&json!("finish"), &json!(100)]));
        // Too few values behaves like missing fields.
        assert!(!compiled.evaluate(&[&json!("finish")]));
    }

    #[test]
    fn test_dotted_field() {
        assert!(check(
            "request.method == 'GET'",
            json!({"request": {"method": "GET"}})
        ));
    }

    #[test]
    fn test_source_is_kept() {
        let compiled = CompiledCondition::compile("a == 1").unwrap();
        assert_eq!(compiled.source(), "a == 1");
    }
}
