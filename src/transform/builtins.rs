//! Allow-listed built-in functions and methods
//!
//! Functions: `len str int float bool abs round min max sum sorted list`.
//! Methods by receiver type:
//! - `str`: `upper lower strip lstrip rstrip split replace startswith endswith
//!   join title capitalize find count isdigit`
//! - `list`: `index count`
//! - `dict`: `get keys values items`
//!
//! Nothing else is callable from an expression except dotted paths resolved
//! through the injected `FunctionResolver`.

use std::cmp::Ordering;
use std::sync::LazyLock;

use rustc_hash::FxHashMap;
use serde_json::Value;

use super::error::StepError;
use super::value::{as_index, float, py_cmp, py_eq, py_str, truthy, type_name, Num};

/// Evaluated call arguments
#[derive(Debug, Default)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl Args {
    pub fn new(positional: Vec<Value>, keywords: Vec<(String, Value)>) -> Self {
        Self {
            positional,
            keywords,
        }
    }

    /// Remove a keyword argument
    fn keyword(&mut self, name: &str) -> Option<Value> {
        let pos = self.keywords.iter().position(|(k, _)| k == name)?;
        Some(self.keywords.remove(pos).1)
    }

    /// Positional argument `index` or the keyword `name`
    fn param(&mut self, index: usize, name: &str) -> Option<Value> {
        match self.keyword(name) {
            Some(value) => Some(value),
            None => self.positional.get(index).cloned(),
        }
    }

    /// Check positional count and that no keyword is left over
    fn check(&self, func: &str, min: usize, max: usize) -> Result<(), StepError> {
        if let Some((name, _)) = self.keywords.first() {
            return Err(StepError::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                func, name
            )));
        }
        let given = self.positional.len();
        if given < min || given > max {
            let expected = match (min, max) {
                (0, 0) => "no arguments".to_string(),
                (a, b) if a == b => format!("exactly {} argument{}", a, if a == 1 { "" } else { "s" }),
                (a, usize::MAX) => format!("at least {} argument{}", a, if a == 1 { "" } else { "s" }),
                (a, b) => format!("from {} to {} arguments", a, b),
            };
            return Err(StepError::type_error(format!(
                "{}() takes {} ({} given)",
                func, expected, given
            )));
        }
        Ok(())
    }
}

pub type BuiltinFunction = fn(Args) -> Result<Value, StepError>;

static BUILTINS: LazyLock<FxHashMap<&'static str, BuiltinFunction>> = LazyLock::new(|| {
    let mut functions: FxHashMap<&'static str, BuiltinFunction> = FxHashMap::default();
    functions.insert("len", len);
    functions.insert("str", str_);
    functions.insert("int", int);
    functions.insert("float", float_);
    functions.insert("bool", bool_);
    functions.insert("abs", abs);
    functions.insert("round", round);
    functions.insert("min", min);
    functions.insert("max", max);
    functions.insert("sum", sum);
    functions.insert("sorted", sorted);
    functions.insert("list", list);
    functions
});

pub fn builtin(name: &str) -> Option<BuiltinFunction> {
    BUILTINS.get(name).copied()
}

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains_key(name)
}

/// Items of an iterable: list elements, string characters, mapping keys
pub fn iterate(value: &Value) -> Result<Vec<Value>, StepError> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        Value::Object(map) => Ok(map.keys().map(|k| Value::String(k.clone())).collect()),
        other => Err(StepError::type_error(format!(
            "'{}' object is not iterable",
            type_name(other)
        ))),
    }
}

fn first_or(args: &Args, default: Value) -> Value {
    args.positional.first().cloned().unwrap_or(default)
}

fn len(args: Args) -> Result<Value, StepError> {
    args.check("len", 1, 1)?;
    let n = match &args.positional[0] {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        other => {
            return Err(StepError::type_error(format!(
                "object of type '{}' has no len()",
                type_name(other)
            )))
        }
    };
    Ok(Value::from(n))
}

fn str_(args: Args) -> Result<Value, StepError> {
    args.check("str", 0, 1)?;
    Ok(Value::String(py_str(&first_or(&args, Value::String(String::new())))))
}

fn int(args: Args) -> Result<Value, StepError> {
    args.check("int", 0, 1)?;
    match first_or(&args, Value::from(0)) {
        Value::String(s) => {
            let cleaned = s.trim().replace('_', "");
            cleaned.parse::<i64>().map(Value::from).map_err(|_| {
                StepError::value(format!(
                    "invalid literal for int() with base 10: {}",
                    crate::util::quote_str(&s)
                ))
            })
        }
        other => match Num::of(&other) {
            Some(Num::Int(i)) => Ok(Value::from(i)),
            Some(Num::Float(f)) if f.is_finite() && f.trunc().abs() < 9.2e18 => {
                Ok(Value::from(f.trunc() as i64))
            }
            Some(Num::Float(_)) => Err(StepError::overflow("cannot convert float to integer")),
            None => Err(StepError::type_error(format!(
                "int() argument must be a string or a number, not '{}'",
                type_name(&other)
            ))),
        },
    }
}

fn float_(args: Args) -> Result<Value, StepError> {
    args.check("float", 0, 1)?;
    match first_or(&args, Value::from(0.0)) {
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .ok_or_else(|| {
                StepError::value(format!(
                    "could not convert string to float: {}",
                    crate::util::quote_str(&s)
                ))
            })
            .and_then(float),
        other => match Num::of(&other) {
            Some(n) => float(n.as_f64()),
            None => Err(StepError::type_error(format!(
                "float() argument must be a string or a number, not '{}'",
                type_name(&other)
            ))),
        },
    }
}

fn bool_(args: Args) -> Result<Value, StepError> {
    args.check("bool", 0, 1)?;
    Ok(Value::Bool(truthy(&first_or(&args, Value::Bool(false)))))
}

fn number_arg(func: &str, value: &Value) -> Result<Num, StepError> {
    Num::of(value).ok_or_else(|| {
        StepError::type_error(format!(
            "bad operand type for {}(): '{}'",
            func,
            type_name(value)
        ))
    })
}

fn abs(args: Args) -> Result<Value, StepError> {
    args.check("abs", 1, 1)?;
    match number_arg("abs", &args.positional[0])? {
        Num::Int(i) => i
            .checked_abs()
            .map(Value::from)
            .ok_or_else(|| StepError::overflow("integer overflow")),
        Num::Float(f) => float(f.abs()),
    }
}

fn round(mut args: Args) -> Result<Value, StepError> {
    let ndigits = args.param(1, "ndigits");
    let value = args.positional.first().cloned();
    args.positional.truncate(1);
    args.check("round", 1, 1)?;
    let number = number_arg("round", value.as_ref().unwrap_or(&Value::Null))?;

    match ndigits.filter(|n| !n.is_null()) {
        None => match number {
            Num::Int(i) => Ok(Value::from(i)),
            Num::Float(f) => {
                let rounded = f.round_ties_even();
                if rounded.is_finite() && rounded.abs() < 9.2e18 {
                    Ok(Value::from(rounded as i64))
                } else {
                    Err(StepError::overflow("cannot convert float to integer"))
                }
            }
        },
        Some(digits) => {
            let digits = as_index(&digits, "round() ndigits")?;
            let scale = 10f64.powi(digits.clamp(-308, 308) as i32);
            match number {
                Num::Int(i) if digits >= 0 => Ok(Value::from(i)),
                Num::Int(i) => {
                    let rounded = ((i as f64) * scale).round_ties_even() / scale;
                    Ok(Value::from(rounded as i64))
                }
                Num::Float(f) => float((f * scale).round_ties_even() / scale),
            }
        }
    }
}

/// Single iterable argument, or the arguments themselves
fn candidates(func: &str, args: &Args) -> Result<Vec<Value>, StepError> {
    args.check(func, 1, usize::MAX)?;
    if args.positional.len() == 1 {
        iterate(&args.positional[0])
    } else {
        Ok(args.positional.clone())
    }
}

fn extreme(func: &str, args: Args, keep: Ordering) -> Result<Value, StepError> {
    let items = candidates(func, &args)?;
    let mut iter = items.into_iter();
    let mut best = iter
        .next()
        .ok_or_else(|| StepError::value(format!("{}() arg is an empty sequence", func)))?;
    for item in iter {
        let symbol = if keep == Ordering::Less { "<" } else { ">" };
        if py_cmp(&item, &best, symbol)? == keep {
            best = item;
        }
    }
    Ok(best)
}

fn min(args: Args) -> Result<Value, StepError> {
    extreme("min", args, Ordering::Less)
}

fn max(args: Args) -> Result<Value, StepError> {
    extreme("max", args, Ordering::Greater)
}

fn sum(mut args: Args) -> Result<Value, StepError> {
    let start = args.param(1, "start").unwrap_or(Value::from(0));
    args.positional.truncate(1);
    args.check("sum", 1, 1)?;
    let mut total = number_arg("sum", &start)?;
    for item in iterate(&args.positional[0])? {
        let n = Num::of(&item).ok_or_else(|| {
            StepError::type_error(format!(
                "unsupported operand type(s) for +: 'int' and '{}'",
                type_name(&item)
            ))
        })?;
        total = match (total, n) {
            (Num::Int(a), Num::Int(b)) => Num::Int(
                a.checked_add(b)
                    .ok_or_else(|| StepError::overflow("integer overflow"))?,
            ),
            (a, b) => Num::Float(a.as_f64() + b.as_f64()),
        };
    }
    total.into_value()
}

fn sorted(mut args: Args) -> Result<Value, StepError> {
    let reverse = args.keyword("reverse").map(|v| truthy(&v)).unwrap_or(false);
    args.check("sorted", 1, 1)?;
    let mut items = iterate(&args.positional[0])?;
    let mut failure: Option<StepError> = None;
    items.sort_by(|a, b| match py_cmp(a, b, "<") {
        Ok(ordering) => ordering,
        Err(e) => {
            failure.get_or_insert(e);
            Ordering::Equal
        }
    });
    if let Some(e) = failure {
        return Err(e);
    }
    if reverse {
        items.reverse();
    }
    Ok(Value::Array(items))
}

fn list(args: Args) -> Result<Value, StepError> {
    args.check("list", 0, 1)?;
    match args.positional.first() {
        Some(value) => iterate(value).map(Value::Array),
        None => Ok(Value::Array(Vec::new())),
    }
}

// ═══════════════════════════════════════════════════════════════
// METHODS
// ═══════════════════════════════════════════════════════════════

/// Call `receiver.method(args)`
pub fn call_method(receiver: &Value, method: &str, args: Args) -> Result<Value, StepError> {
    match receiver {
        Value::String(s) => str_method(s, method, args),
        Value::Array(items) => list_method(items, method, args),
        Value::Object(map) => dict_method(map, method, args),
        other => Err(StepError::attribute(type_name(other), method)),
    }
}

fn str_arg(func: &str, value: &Value) -> Result<String, StepError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(StepError::type_error(format!(
            "{}() argument must be str, not {}",
            func,
            type_name(other)
        ))),
    }
}

/// Optional `chars` argument of the strip family
fn strip_chars(func: &str, args: &Args) -> Result<Option<Vec<char>>, StepError> {
    args.check(func, 0, 1)?;
    match args.positional.first() {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(str_arg(func, value)?.chars().collect())),
    }
}

fn char_index(s: &str, byte_index: usize) -> usize {
    s[..byte_index].chars().count()
}

fn title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut previous_cased = false;
    for c in s.chars() {
        if previous_cased {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        previous_cased = c.is_alphabetic();
    }
    out
}

fn split(s: &str, mut args: Args) -> Result<Value, StepError> {
    let sep = args.param(0, "sep").filter(|v| !v.is_null());
    let maxsplit = match args.param(1, "maxsplit") {
        Some(v) => as_index(&v, "split() maxsplit")?,
        None => -1,
    };
    args.positional.clear();
    args.check("split", 0, 0)?;

    let parts: Vec<String> = match sep {
        Some(sep) => {
            let sep = str_arg("split", &sep)?;
            if sep.is_empty() {
                return Err(StepError::value("empty separator"));
            }
            if maxsplit < 0 {
                s.split(sep.as_str()).map(str::to_string).collect()
            } else {
                s.splitn(maxsplit as usize + 1, sep.as_str())
                    .map(str::to_string)
                    .collect()
            }
        }
        None if maxsplit < 0 => s.split_whitespace().map(str::to_string).collect(),
        None => {
            let mut parts = Vec::new();
            let mut rest = s.trim_start();
            while !rest.is_empty() {
                if parts.len() as i64 == maxsplit {
                    parts.push(rest.to_string());
                    break;
                }
                let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                parts.push(rest[..end].to_string());
                rest = rest[end..].trim_start();
            }
            parts
        }
    };
    Ok(Value::Array(parts.into_iter().map(Value::String).collect()))
}

/// `startswith` / `endswith` accept a string or a list of candidates
fn affix(func: &str, args: &Args, test: impl Fn(&str) -> bool) -> Result<Value, StepError> {
    args.check(func, 1, 1)?;
    match &args.positional[0] {
        Value::String(p) => Ok(Value::Bool(test(p))),
        Value::Array(options) => {
            for option in options {
                if test(&str_arg(func, option)?) {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        other => Err(StepError::type_error(format!(
            "{} first arg must be str or a list of str, not {}",
            func,
            type_name(other)
        ))),
    }
}

fn str_method(s: &str, method: &str, args: Args) -> Result<Value, StepError> {
    let string = |v: String| Ok(Value::String(v));
    match method {
        "upper" => {
            args.check(method, 0, 0)?;
            string(s.to_uppercase())
        }
        "lower" => {
            args.check(method, 0, 0)?;
            string(s.to_lowercase())
        }
        "strip" => match strip_chars(method, &args)? {
            None => string(s.trim().to_string()),
            Some(chars) => string(s.trim_matches(chars.as_slice()).to_string()),
        },
        "lstrip" => match strip_chars(method, &args)? {
            None => string(s.trim_start().to_string()),
            Some(chars) => string(s.trim_start_matches(chars.as_slice()).to_string()),
        },
        "rstrip" => match strip_chars(method, &args)? {
            None => string(s.trim_end().to_string()),
            Some(chars) => string(s.trim_end_matches(chars.as_slice()).to_string()),
        },
        "split" => split(s, args),
        "replace" => {
            args.check(method, 2, 3)?;
            let old = str_arg(method, &args.positional[0])?;
            let new = str_arg(method, &args.positional[1])?;
            match args.positional.get(2) {
                Some(count) => {
                    let count = as_index(count, "replace() count")?;
                    if count < 0 {
                        string(s.replace(&old, &new))
                    } else {
                        string(s.replacen(&old, &new, count as usize))
                    }
                }
                None => string(s.replace(&old, &new)),
            }
        }
        "startswith" => affix(method, &args, |p| s.starts_with(p)),
        "endswith" => affix(method, &args, |p| s.ends_with(p)),
        "join" => {
            args.check(method, 1, 1)?;
            let parts = iterate(&args.positional[0])?
                .iter()
                .enumerate()
                .map(|(i, part)| match part {
                    Value::String(p) => Ok(p.clone()),
                    other => Err(StepError::type_error(format!(
                        "sequence item {}: expected str instance, {} found",
                        i,
                        type_name(other)
                    ))),
                })
                .collect::<Result<Vec<String>, StepError>>()?;
            string(parts.join(s))
        }
        "title" => {
            args.check(method, 0, 0)?;
            string(title(s))
        }
        "capitalize" => {
            args.check(method, 0, 0)?;
            let mut chars = s.chars();
            let capitalized = match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            };
            string(capitalized)
        }
        "find" => {
            args.check(method, 1, 1)?;
            let sub = str_arg(method, &args.positional[0])?;
            let index = s.find(sub.as_str()).map_or(-1, |b| char_index(s, b) as i64);
            Ok(Value::from(index))
        }
        "count" => {
            args.check(method, 1, 1)?;
            let sub = str_arg(method, &args.positional[0])?;
            let n = if sub.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(sub.as_str()).count()
            };
            Ok(Value::from(n))
        }
        "isdigit" => {
            args.check(method, 0, 0)?;
            Ok(Value::Bool(
                !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()),
            ))
        }
        _ => Err(StepError::attribute("str", method)),
    }
}

fn list_method(items: &[Value], method: &str, args: Args) -> Result<Value, StepError> {
    match method {
        "index" => {
            args.check(method, 1, 1)?;
            let needle = &args.positional[0];
            items
                .iter()
                .position(|item| py_eq(item, needle))
                .map(Value::from)
                .ok_or_else(|| {
                    StepError::value(format!("{} is not in list", crate::util::render(needle)))
                })
        }
        "count" => {
            args.check(method, 1, 1)?;
            let needle = &args.positional[0];
            Ok(Value::from(items.iter().filter(|item| py_eq(item, needle)).count()))
        }
        _ => Err(StepError::attribute("list", method)),
    }
}

fn dict_method(
    map: &serde_json::Map<String, Value>,
    method: &str,
    args: Args,
) -> Result<Value, StepError> {
    match method {
        "get" => {
            args.check(method, 1, 2)?;
            let default = args.positional.get(1).cloned().unwrap_or(Value::Null);
            match &args.positional[0] {
                Value::String(key) => Ok(map.get(key).cloned().unwrap_or(default)),
                _ => Ok(default),
            }
        }
        "keys" => {
            args.check(method, 0, 0)?;
            Ok(Value::Array(
                map.keys().map(|k| Value::String(k.clone())).collect(),
            ))
        }
        "values" => {
            args.check(method, 0, 0)?;
            Ok(Value::Array(map.values().cloned().collect()))
        }
        "items" => {
            args.check(method, 0, 0)?;
            Ok(Value::Array(
                map.iter()
                    .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()]))
                    .collect(),
            ))
        }
        _ => Err(StepError::attribute("dict", method)),
    }
}

/// `str % args` printf-style formatting (`%s`, `%r`, `%d`, `%i`, `%f`, `%%`)
pub fn format_percent(template: &str, args: &Value) -> Result<Value, StepError> {
    let values: Vec<Value> = match args {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    };
    let mut values = values.into_iter();
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars();
    let not_enough = || StepError::type_error("not enough arguments for format string");

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s') => out.push_str(&py_str(&values.next().ok_or_else(not_enough)?)),
            Some('r') => out.push_str(&crate::util::render(&values.next().ok_or_else(not_enough)?)),
            Some('d') | Some('i') => {
                let value = values.next().ok_or_else(not_enough)?;
                match Num::of(&value) {
                    Some(Num::Int(i)) => out.push_str(&i.to_string()),
                    Some(Num::Float(f)) => out.push_str(&(f.trunc() as i64).to_string()),
                    None => {
                        return Err(StepError::type_error(format!(
                            "%d format: a number is required, not {}",
                            type_name(&value)
                        )))
                    }
                }
            }
            Some('f') => {
                let value = values.next().ok_or_else(not_enough)?;
                let n = Num::of(&value).ok_or_else(|| {
                    StepError::type_error(format!(
                        "must be real number, not {}",
                        type_name(&value)
                    ))
                })?;
                out.push_str(&format!("{:.6}", n.as_f64()));
            }
            Some(other) => {
                return Err(StepError::value(format!(
                    "unsupported format character '{}'",
                    other
                )))
            }
            None => return Err(StepError::value("incomplete format")),
        }
    }
    if values.next().is_some() {
        return Err(StepError::type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(Value::String(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::ErrorKind;
    use serde_json::json;

    fn call(name: &str, positional: Vec<Value>) -> Result<Value, StepError> {
        builtin(name).unwrap()(Args::new(positional, Vec::new()))
    }

    fn method(receiver: Value, name: &str, positional: Vec<Value>) -> Result<Value, StepError> {
        call_method(&receiver, name, Args::new(positional, Vec::new()))
    }

    #[test]
    fn conversions() {
        assert_eq!(call("int", vec![json!(" 42 ")]).unwrap(), json!(42));
        assert_eq!(call("int", vec![json!(3.9)]).unwrap(), json!(3));
        assert_eq!(call("float", vec![json!("2.5")]).unwrap(), json!(2.5));
        assert_eq!(call("str", vec![json!(7)]).unwrap(), json!("7"));
        assert_eq!(call("bool", vec![json!([])]).unwrap(), json!(false));
        let err = call("int", vec![json!("abc")]).unwrap_err();
        assert_eq!(err.to_string(), "ValueError: invalid literal for int() with base 10: 'abc'");
    }

    #[test]
    fn aggregates() {
        assert_eq!(call("len", vec![json!("héllo")]).unwrap(), json!(5));
        assert_eq!(call("min", vec![json!([3, 1, 2])]).unwrap(), json!(1));
        assert_eq!(call("max", vec![json!(3), json!(7.5)]).unwrap(), json!(7.5));
        assert_eq!(call("sum", vec![json!([1, 2, 3])]).unwrap(), json!(6));
        assert_eq!(call("sum", vec![json!([1, 2.5])]).unwrap(), json!(3.5));
        assert_eq!(call("sorted", vec![json!(["b", "a"])]).unwrap(), json!(["a", "b"]));
        assert_eq!(call("list", vec![json!("ab")]).unwrap(), json!(["a", "b"]));
        assert!(call("max", vec![json!([])]).is_err());
        assert_eq!(
            call("sorted", vec![json!([1, "a"])]).unwrap_err().kind,
            ErrorKind::TypeError
        );
    }

    #[test]
    fn sorted_reverse_keyword() {
        let args = Args::new(vec![json!([1, 3, 2])], vec![("reverse".to_string(), json!(true))]);
        assert_eq!(builtin("sorted").unwrap()(args).unwrap(), json!([3, 2, 1]));
    }

    #[test]
    fn round_half_to_even() {
        assert_eq!(call("round", vec![json!(2.5)]).unwrap(), json!(2));
        assert_eq!(call("round", vec![json!(3.5)]).unwrap(), json!(4));
        assert_eq!(call("round", vec![json!(1.2345), json!(2)]).unwrap(), json!(1.23));
    }

    #[test]
    fn arity_errors() {
        let err = call("len", vec![]).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: len() takes exactly 1 argument (0 given)");
        let err = method(json!("x"), "upper", vec![json!(1)]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeError);
    }

    #[test]
    fn string_methods() {
        assert_eq!(method(json!("Hi"), "upper", vec![]).unwrap(), json!("HI"));
        assert_eq!(method(json!("  x "), "strip", vec![]).unwrap(), json!("x"));
        assert_eq!(method(json!("xxaxx"), "strip", vec![json!("x")]).unwrap(), json!("a"));
        assert_eq!(method(json!("a,b,c"), "split", vec![json!(",")]).unwrap(), json!(["a", "b", "c"]));
        assert_eq!(method(json!("a,b,c"), "split", vec![json!(","), json!(1)]).unwrap(), json!(["a", "b,c"]));
        assert_eq!(method(json!(" a  b "), "split", vec![]).unwrap(), json!(["a", "b"]));
        assert_eq!(method(json!("-"), "join", vec![json!(["a", "b"])]).unwrap(), json!("a-b"));
        assert_eq!(method(json!("hello world"), "title", vec![]).unwrap(), json!("Hello World"));
        assert_eq!(method(json!("hELLO"), "capitalize", vec![]).unwrap(), json!("Hello"));
        assert_eq!(method(json!("héllo"), "find", vec![json!("l")]).unwrap(), json!(2));
        assert_eq!(method(json!("abc"), "find", vec![json!("z")]).unwrap(), json!(-1));
        assert_eq!(method(json!("data.csv"), "endswith", vec![json!([".json", ".csv"])]).unwrap(), json!(true));
        assert_eq!(method(json!("2024"), "isdigit", vec![]).unwrap(), json!(true));
        assert_eq!(method(json!("aaa"), "replace", vec![json!("a"), json!("b"), json!(2)]).unwrap(), json!("bba"));
        let err = method(json!("x"), "nope", vec![]).unwrap_err();
        assert_eq!(err.to_string(), "AttributeError: 'str' object has no attribute 'nope'");
    }

    #[test]
    fn list_and_dict_methods() {
        assert_eq!(method(json!([1, 2, 1]), "count", vec![json!(1)]).unwrap(), json!(2));
        assert_eq!(method(json!([1, 2]), "index", vec![json!(2.0)]).unwrap(), json!(1));
        assert!(method(json!([1]), "index", vec![json!(5)]).is_err());

        let d = json!({"a": 1, "b": 2});
        assert_eq!(method(d.clone(), "get", vec![json!("a")]).unwrap(), json!(1));
        assert_eq!(method(d.clone(), "get", vec![json!("z"), json!(0)]).unwrap(), json!(0));
        assert_eq!(method(d.clone(), "keys", vec![]).unwrap(), json!(["a", "b"]));
        assert_eq!(method(d, "items", vec![]).unwrap(), json!([["a", 1], ["b", 2]]));
    }

    #[test]
    fn percent_formatting() {
        assert_eq!(
            format_percent("%s-%d %%", &json!(["a", 3])).unwrap(),
            json!("a-3 %")
        );
        assert_eq!(format_percent("%r", &json!("x")).unwrap(), json!("'x'"));
        assert!(format_percent("%s %s", &json!("x")).is_err());
    }
}
