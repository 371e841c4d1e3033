//! Python semantics over JSON values
//!
//! Values are `serde_json::Value`; this module supplies the Python view of
//! them: type names, truthiness, numeric tower, equality and ordering.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use super::error::StepError;
use crate::util::render;

/// Python type name of a value
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => match n.as_i64() {
            Some(i) => i != 0,
            None => n.as_f64().is_some_and(|f| f != 0.0),
        },
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// A numeric operand: Python `bool` counts as `int`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub fn of(value: &Value) -> Option<Num> {
        match value {
            Value::Bool(b) => Some(Num::Int(i64::from(*b))),
            Value::Number(n) => match n.as_i64() {
                Some(i) if !n.is_f64() => Some(Num::Int(i)),
                _ => n.as_f64().map(Num::Float),
            },
            _ => None,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    pub fn into_value(self) -> Result<Value, StepError> {
        match self {
            Num::Int(i) => Ok(Value::from(i)),
            Num::Float(f) => float(f),
        }
    }
}

/// Wrap a float; JSON has no NaN or infinity
pub fn float(f: f64) -> Result<Value, StepError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| StepError::overflow("numerical result out of range"))
}

/// Python `==`: numbers compare by value across int/float
pub fn py_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| py_eq(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| py_eq(v, other)))
        }
        _ => match (Num::of(a), Num::of(b)) {
            (Some(x), Some(y)) => num_cmp(x, y) == Some(Ordering::Equal),
            _ => a == b,
        },
    }
}

fn num_cmp(a: Num, b: Num) -> Option<Ordering> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => Some(x.cmp(&y)),
        _ => a.as_f64().partial_cmp(&b.as_f64()),
    }
}

/// Python ordering (`<` and friends); mismatched types are a `TypeError`
pub fn py_cmp(a: &Value, b: &Value, symbol: &str) -> Result<Ordering, StepError> {
    let unsupported = || {
        StepError::type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            symbol,
            type_name(a),
            type_name(b)
        ))
    };
    match (a, b) {
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                if !py_eq(l, r) {
                    return py_cmp(l, r, symbol);
                }
            }
            Ok(x.len().cmp(&y.len()))
        }
        _ => match (Num::of(a), Num::of(b)) {
            (Some(x), Some(y)) => num_cmp(x, y).ok_or_else(unsupported),
            _ => Err(unsupported()),
        },
    }
}

/// Python `str(value)`: strings are unquoted, everything else is the repr
pub fn py_str(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => render(other),
    }
}

/// Integer view of a value used as an index or count
pub fn as_index(value: &Value, what: &str) -> Result<i64, StepError> {
    match Num::of(value) {
        Some(Num::Int(i)) => Ok(i),
        _ => Err(StepError::type_error(format!(
            "{} must be integers, not {}",
            what,
            type_name(value)
        ))),
    }
}

/// Resolve a possibly negative index against a length
pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let idx = if index < 0 { index + len } else { index };
    (0..len).contains(&idx).then_some(idx as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_matches_python() {
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
            assert!(!truthy(&falsy), "{falsy}");
        }
        for t in [json!(true), json!(-1), json!(0.5), json!("x"), json!([0]), json!({"a": null})] {
            assert!(truthy(&t), "{t}");
        }
    }

    #[test]
    fn int_and_float_compare_by_value() {
        assert!(py_eq(&json!(1), &json!(1.0)));
        assert!(py_eq(&json!([1, {"a": 2}]), &json!([1.0, {"a": 2.0}])));
        assert!(!py_eq(&json!("1"), &json!(1)));
        assert!(py_eq(&json!(true), &json!(1)));
    }

    #[test]
    fn ordering() {
        assert_eq!(py_cmp(&json!(1), &json!(2.5), "<").unwrap(), Ordering::Less);
        assert_eq!(py_cmp(&json!("b"), &json!("a"), "<").unwrap(), Ordering::Greater);
        assert_eq!(py_cmp(&json!([1, 2]), &json!([1, 2, 0]), "<").unwrap(), Ordering::Less);
        let err = py_cmp(&json!(1), &json!("a"), "<").unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: '<' not supported between instances of 'int' and 'str'"
        );
    }

    #[test]
    fn indices() {
        assert_eq!(normalize_index(-1, 3), Some(2));
        assert_eq!(normalize_index(3, 3), None);
        assert_eq!(normalize_index(-4, 3), None);
    }

    #[test]
    fn str_of_values() {
        assert_eq!(py_str(&json!("hi")), "hi");
        assert_eq!(py_str(&json!(null)), "None");
        assert_eq!(py_str(&json!(["a"])), "['a']");
    }
}
