//! Expression evaluation.
//!
//! [`Evaluator`] is the seam between the renderer and whatever gives
//! expressions meaning. [`BuiltinEvaluator`] interprets the expression
//! language of `thtml-parser` against a [`Context`] and nothing else.
//!
//! Values are JSON values. Operators follow JavaScript where templates can
//! observe the difference: truthiness, `+` concatenating strings, missing
//! properties reading as `null`.

use crate::context::Context;
use dashmap::DashMap;
use serde_json::{Map, Number, Value};
use std::sync::Arc;
use thtml_parser::ast::{BinaryOp, ExprKind, Expression, UnaryOp};
use thtml_parser::{format_number, ExprParser, ParseError};

/// Expression evaluation error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("Invalid expression `{expression}`: {source}")]
    Syntax {
        expression: String,
        #[source]
        source: ParseError,
    },

    #[error("{0} is not defined")]
    Undefined(String),

    #[error("Cannot read properties of null (reading '{0}')")]
    NullAccess(String),

    /// Raised by evaluators other than the built-in one.
    #[error("{0}")]
    Other(String),
}

/// Evaluates expression source against a context.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, expression: &str, context: &Context) -> Result<Value, EvalError>;
}

/// Default number of distinct expressions [`BuiltinEvaluator`] memoises.
pub const DEFAULT_MEMO_CAPACITY: usize = 4096;

/// The built-in expression language. Parsed expressions are memoised by
/// source text, up to `capacity` entries; past that, new expressions are
/// parsed on every use.
#[derive(Debug)]
pub struct BuiltinEvaluator {
    parsed: DashMap<String, Arc<Expression>>,
    capacity: usize,
}

impl Default for BuiltinEvaluator {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MEMO_CAPACITY)
    }
}

impl BuiltinEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            parsed: DashMap::new(),
            capacity,
        }
    }

    fn parse(&self, source: &str) -> Result<Arc<Expression>, EvalError> {
        let cached = self.parsed.get(source).map(|e| Arc::clone(e.value()));
        if let Some(expr) = cached {
            return Ok(expr);
        }
        let expr = Arc::new(ExprParser::parse(source).map_err(|e| EvalError::Syntax {
            expression: source.to_string(),
            source: e,
        })?);
        if self.parsed.len() < self.capacity {
            self.parsed.insert(source.to_string(), Arc::clone(&expr));
        }
        Ok(expr)
    }
}

impl Evaluator for BuiltinEvaluator {
    fn evaluate(&self, expression: &str, context: &Context) -> Result<Value, EvalError> {
        let expr = self.parse(expression.trim())?;
        eval(&expr, context)
    }
}

/// Evaluate a parsed expression.
pub fn eval(expr: &Expression, context: &Context) -> Result<Value, EvalError> {
    match &expr.kind {
        ExprKind::Number(n) => Ok(number(*n)),
        ExprKind::String(s) => Ok(Value::String(s.clone())),
        ExprKind::Boolean(b) => Ok(Value::Bool(*b)),
        ExprKind::Null | ExprKind::Undefined => Ok(Value::Null),
        ExprKind::Identifier(name) => context
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::Undefined(name.clone())),
        ExprKind::Member { .. } => Ok(eval_chain(expr, context)?.unwrap_or(Value::Null)),
        ExprKind::Unary { op, operand } => {
            let value = eval(operand, context)?;
            Ok(match op {
                UnaryOp::Not => Value::Bool(!truthy(&value)),
                UnaryOp::Neg => number(-to_number(&value)),
            })
        }
        ExprKind::Binary { left, op, right } => {
            let left = eval(left, context)?;
            match op {
                BinaryOp::And if !truthy(&left) => Ok(left),
                BinaryOp::Or if truthy(&left) => Ok(left),
                BinaryOp::NullishCoalescing if !left.is_null() => Ok(left),
                BinaryOp::And | BinaryOp::Or | BinaryOp::NullishCoalescing => {
                    eval(right, context)
                }
                _ => Ok(binary(*op, &left, &eval(right, context)?)),
            }
        }
        ExprKind::Ternary {
            condition,
            consequent,
            alternate,
        } => {
            if truthy(&eval(condition, context)?) {
                eval(consequent, context)
            } else {
                eval(alternate, context)
            }
        }
        ExprKind::Array(items) => items
            .iter()
            .map(|item| eval(item, context))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        ExprKind::Object(properties) => {
            let mut map = Map::new();
            for property in properties {
                map.insert(property.key.clone(), eval(&property.value, context)?);
            }
            Ok(Value::Object(map))
        }
    }
}

/// Evaluate a member-access chain. `None` means an optional link met
/// `null` and the rest of the chain was skipped.
fn eval_chain(expr: &Expression, context: &Context) -> Result<Option<Value>, EvalError> {
    let ExprKind::Member {
        object,
        property,
        computed,
        optional,
    } = &expr.kind
    else {
        return eval(expr, context).map(Some);
    };
    let Some(object) = eval_chain(object, context)? else {
        return Ok(None);
    };
    if *optional && object.is_null() {
        return Ok(None);
    }
    let key = if *computed {
        property_key(&eval(property, context)?)
    } else {
        match &property.kind {
            ExprKind::String(name) => name.clone(),
            _ => property_key(&eval(property, context)?),
        }
    };
    member(&object, &key).map(Some)
}

fn member(object: &Value, key: &str) -> Result<Value, EvalError> {
    let value = match object {
        Value::Null => return Err(EvalError::NullAccess(key.to_string())),
        Value::Object(map) => map.get(key).cloned(),
        Value::Array(items) if key == "length" => Some(Value::from(items.len())),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i).cloned()),
        Value::String(s) if key == "length" => Some(Value::from(s.chars().count())),
        Value::String(s) => key
            .parse::<usize>()
            .ok()
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::String(c.to_string())),
        Value::Bool(_) | Value::Number(_) => None,
    };
    Ok(value.unwrap_or(Value::Null))
}

fn property_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => stringify(other),
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add => {
            if left.is_string() || right.is_string() {
                Value::String(stringify(left) + &stringify(right))
            } else {
                number(to_number(left) + to_number(right))
            }
        }
        BinaryOp::Sub => number(to_number(left) - to_number(right)),
        BinaryOp::Mul => number(to_number(left) * to_number(right)),
        BinaryOp::Div => number(to_number(left) / to_number(right)),
        BinaryOp::Mod => number(to_number(left) % to_number(right)),
        BinaryOp::Eq => Value::Bool(loose_eq(left, right)),
        BinaryOp::Neq => Value::Bool(!loose_eq(left, right)),
        BinaryOp::StrictEq => Value::Bool(strict_eq(left, right)),
        BinaryOp::StrictNeq => Value::Bool(!strict_eq(left, right)),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Lte | BinaryOp::Gte => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => to_number(left).partial_cmp(&to_number(right)),
            };
            let result = ordering.is_some_and(|o| match op {
                BinaryOp::Lt => o.is_lt(),
                BinaryOp::Gt => o.is_gt(),
                BinaryOp::Lte => o.is_le(),
                _ => o.is_ge(),
            });
            Value::Bool(result)
        }
        // Short-circuit operators are handled by `eval`.
        BinaryOp::And | BinaryOp::Or | BinaryOp::NullishCoalescing => Value::Null,
    }
}

fn strict_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::String(_))
        | (Value::String(_), Value::Number(_))
        | (Value::Bool(_), _)
        | (_, Value::Bool(_)) => {
            if left.is_null() || right.is_null() {
                return false;
            }
            to_number(left) == to_number(right)
        }
        _ => strict_eq(left, right),
    }
}

/// A JSON number for `n`; integral values become integers and non-finite
/// values become `null`.
pub fn number(n: f64) -> Value {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

/// Numeric coercion, as JavaScript's `Number(value)`.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

/// JavaScript truthiness.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Text form of a value as it appears in rendered output.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => i.to_string(),
            (_, Some(u)) => u.to_string(),
            _ => format_number(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(","),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn context() -> Context {
        Context::from_value(json!({
            "user": { "name": "Ada", "age": 36, "tags": ["a", "b"], "manager": null },
            "items": [1, 2, 3],
            "count": 0,
            "title": "Hello",
            "price": 2.5
        }))
        .unwrap()
    }

    fn run(source: &str) -> Value {
        BuiltinEvaluator::new().evaluate(source, &context()).unwrap()
    }

    fn run_err(source: &str) -> EvalError {
        BuiltinEvaluator::new().evaluate(source, &context()).unwrap_err()
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    #[test]
    fn test_paths() {
        assert_eq!(run("user.name"), json!("Ada"));
        assert_eq!(run("user['age']"), json!(36));
        assert_eq!(run("items[1]"), json!(2));
        assert_eq!(run("user.tags.length"), json!(2));
        assert_eq!(run("title.length"), json!(5));
        assert_eq!(run("title[0]"), json!("H"));
    }

    #[test]
    fn test_missing_property_is_null() {
        assert_eq!(run("user.email"), Value::Null);
        assert_eq!(run("items[10]"), Value::Null);
    }

    #[test]
    fn test_undefined_variable_is_an_error() {
        assert_eq!(run_err("nobody"), EvalError::Undefined("nobody".into()));
        assert_eq!(run_err("nobody").to_string(), "nobody is not defined");
    }

    #[test]
    fn test_null_access() {
        assert_eq!(run_err("user.manager.name"), EvalError::NullAccess("name".into()));
        assert_eq!(run("user.manager?.name"), Value::Null);
    }

    #[test]
    fn test_optional_link_skips_rest_of_chain() {
        assert_eq!(run("user.manager?.name.first"), Value::Null);
        assert_eq!(run("user.manager?.[nobody].x"), Value::Null);
        assert_eq!(run("user.manager?.name.first ?? 'none'"), json!("none"));
        assert_eq!(run("user?.name.length"), json!(3));
        assert_eq!(run("user.email?.x.y"), Value::Null);
        assert_eq!(run_err("user.email.x?.y"), EvalError::NullAccess("x".into()));
    }

    // =========================================================================
    // Operators
    // =========================================================================

    #[test]
    fn test_arithmetic_normalizes_integers() {
        assert_eq!(run("1 + 2"), json!(3));
        assert_eq!(run("7 / 2"), json!(3.5));
        assert_eq!(run("price * 2"), json!(5));
        assert_eq!(run("10 % 4"), json!(2));
        assert_eq!(run("-user.age"), json!(-36));
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(run("title + ', ' + user.name"), json!("Hello, Ada"));
        assert_eq!(run("'n=' + 1"), json!("n=1"));
    }

    #[test]
    fn test_comparison() {
        assert_eq!(run("user.age > 30"), json!(true));
        assert_eq!(run("'b' < 'a'"), json!(false));
        assert_eq!(run("count >= 0 && count <= 0"), json!(true));
    }

    #[test]
    fn test_equality() {
        assert_eq!(run("'1' == 1"), json!(true));
        assert_eq!(run("'1' === 1"), json!(false));
        assert_eq!(run("price === 2.5"), json!(true));
        assert_eq!(run("null == false"), json!(false));
        assert_eq!(run("user.manager === null"), json!(true));
        assert_eq!(run("count != 0"), json!(false));
    }

    #[test]
    fn test_logical_returns_operands() {
        assert_eq!(run("count || 'none'"), json!("none"));
        assert_eq!(run("title && user.name"), json!("Ada"));
        assert_eq!(run("count ?? 5"), json!(0));
        assert_eq!(run("user.manager ?? 'n/a'"), json!("n/a"));
    }

    #[test]
    fn test_short_circuit_skips_errors() {
        assert_eq!(run("false && nobody"), json!(false));
        assert_eq!(run("true || nobody"), json!(true));
    }

    #[test]
    fn test_ternary_and_not() {
        assert_eq!(run("count ? 'some' : 'none'"), json!("none"));
        assert_eq!(run("!items"), json!(false));
    }

    #[test]
    fn test_literals() {
        assert_eq!(run("[1, 'a', null]"), json!([1, "a", null]));
        assert_eq!(run("{ n: user.name, count }"), json!({ "n": "Ada", "count": 0 }));
    }

    #[test]
    fn test_syntax_error() {
        let err = run_err("1 +");
        assert!(matches!(err, EvalError::Syntax { .. }));
        assert!(err.to_string().starts_with("Invalid expression `1 +`"));
    }

    // =========================================================================
    // Coercion helpers
    // =========================================================================

    #[test]
    fn test_truthiness() {
        for falsy in [json!(null), json!(false), json!(0), json!(""), json!(0.0)] {
            assert!(!truthy(&falsy), "{falsy} should be falsy");
        }
        for value in [json!(true), json!(1), json!("0"), json!([]), json!({})] {
            assert!(truthy(&value), "{value} should be truthy");
        }
    }

    #[test]
    fn test_stringify() {
        assert_eq!(stringify(&json!(null)), "null");
        assert_eq!(stringify(&json!(true)), "true");
        assert_eq!(stringify(&json!(3)), "3");
        assert_eq!(stringify(&json!(3.0)), "3");
        assert_eq!(stringify(&json!(0.5)), "0.5");
        assert_eq!(stringify(&json!("x")), "x");
        assert_eq!(stringify(&json!([1, "a", [2, 3]])), "1,a,2,3");
        assert_eq!(stringify(&json!({ "b": 1, "a": [true] })), "{\"b\":1,\"a\":[true]}");
    }

    #[test]
    fn test_number_handles_non_finite() {
        assert_eq!(number(1.0 / 0.0), Value::Null);
        assert_eq!(number(4.0), json!(4));
    }

    #[test]
    fn test_parsed_expressions_are_memoised() {
        let evaluator = BuiltinEvaluator::new();
        let ctx = context();
        evaluator.evaluate("count + 1", &ctx).unwrap();
        evaluator.evaluate(" count + 1 ", &ctx).unwrap();
        assert_eq!(evaluator.parsed.len(), 1);
    }

    #[test]
    fn test_memo_stops_growing_at_capacity() {
        let evaluator = BuiltinEvaluator::with_capacity(2);
        let ctx = context();
        for n in 0..5 {
            let value = evaluator.evaluate(&format!("count + {n}"), &ctx).unwrap();
            assert_eq!(value, run(&format!("count + {n}")));
        }
        assert_eq!(evaluator.parsed.len(), 2);
    }
}
