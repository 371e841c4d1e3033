//! Interpreter for parsed transformation expressions.
//!
//! Evaluation is sandboxed: the only names are the five bindings of [`Scope`]
//! (plus comprehension variables), the allow-listed builtins and dotted
//! function paths resolved through a [`FunctionResolver`]. There is no
//! assignment, import or attribute access outside the method allow-list.

use serde_json::{Map, Value};

use super::builtins::{builtin, call_method, format_percent, is_builtin, iterate, Args};
use super::error::{ErrorKind, StepError};
use super::parser::{BinOp, BoolOp, CmpOp, Expr, UnaryOp};
use super::rewrite::{
    BATCH_NUM_BINDING, DAG_CONFIG_BINDING, DAG_CONTEXT_BINDING, RESULTS_BINDING, SOURCE_BINDING,
};
use super::value::{
    as_index, float, normalize_index, py_cmp, py_eq, truthy, type_name, Num,
};
use crate::registry::FunctionResolver;
use crate::util::render;

/// Deepest expression tree the interpreter walks
pub const MAX_EVAL_DEPTH: usize = 200;

/// What an expression can see
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    /// Edge input (`$SOURCE`)
    pub source: &'a Value,
    /// Results of the earlier steps, error records included (`$1`, `$2`, ...)
    pub results: &'a [Value],
    pub dag_config: &'a Value,
    pub dag_context: &'a Value,
    pub batch_num: u64,
}

/// Interpreter over one [`Scope`]
pub struct Interpreter<'a> {
    scope: Scope<'a>,
    resolver: Option<&'a dyn FunctionResolver>,
    /// Comprehension variables, innermost last
    locals: Vec<(String, Value)>,
    depth: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(scope: Scope<'a>) -> Self {
        Self {
            scope,
            resolver: None,
            locals: Vec::new(),
            depth: 0,
        }
    }

    pub fn with_resolver(mut self, resolver: &'a dyn FunctionResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Evaluates an expression.
    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value, StepError> {
        if self.depth >= MAX_EVAL_DEPTH {
            return Err(StepError::recursion(format!(
                "expression tree deeper than {} levels",
                MAX_EVAL_DEPTH
            )));
        }
        self.depth += 1;
        let result = self.evaluate_expr(expr);
        self.depth -= 1;
        result
    }

    fn evaluate_expr(&mut self, expr: &Expr) -> Result<Value, StepError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(name) => self.evaluate_name(name),
            Expr::List(items) => items
                .iter()
                .map(|item| self.evaluate(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Dict(entries) => self.evaluate_dict(entries),
            Expr::Attribute { value, attr } => self.evaluate_attribute(value, attr),
            Expr::Call { func, args, kwargs } => self.evaluate_call(func, args, kwargs),
            Expr::Index { value, index } => self.evaluate_index(value, index),
            Expr::Slice {
                value,
                lower,
                upper,
                step,
            } => self.evaluate_slice(value, lower.as_deref(), upper.as_deref(), step.as_deref()),
            Expr::Unary { op, operand } => self.evaluate_unary(*op, operand),
            Expr::Binary { op, left, right } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                binary(*op, &left, &right)
            }
            Expr::Compare { left, ops } => self.evaluate_compare(left, ops),
            Expr::Bool { op, left, right } => {
                let left = self.evaluate(left)?;
                match (op, truthy(&left)) {
                    (BoolOp::And, false) | (BoolOp::Or, true) => Ok(left),
                    _ => self.evaluate(right),
                }
            }
            Expr::IfElse {
                condition,
                then,
                otherwise,
            } => {
                if truthy(&self.evaluate(condition)?) {
                    self.evaluate(then)
                } else {
                    self.evaluate(otherwise)
                }
            }
            Expr::ListComp {
                element,
                var,
                iter,
                condition,
            } => self.evaluate_comprehension(element, var, iter, condition.as_deref()),
        }
    }

    fn local(&self, name: &str) -> Option<&Value> {
        self.locals
            .iter()
            .rev()
            .find(|(local, _)| local == name)
            .map(|(_, value)| value)
    }

    fn is_bound(&self, name: &str) -> bool {
        self.local(name).is_some()
            || matches!(
                name,
                SOURCE_BINDING
                    | RESULTS_BINDING
                    | DAG_CONFIG_BINDING
                    | DAG_CONTEXT_BINDING
                    | BATCH_NUM_BINDING
            )
    }

    fn evaluate_name(&self, name: &str) -> Result<Value, StepError> {
        if let Some(value) = self.local(name) {
            return Ok(value.clone());
        }
        match name {
            SOURCE_BINDING => Ok(self.scope.source.clone()),
            RESULTS_BINDING => Ok(Value::Array(self.scope.results.to_vec())),
            DAG_CONFIG_BINDING => Ok(self.scope.dag_config.clone()),
            DAG_CONTEXT_BINDING => Ok(self.scope.dag_context.clone()),
            BATCH_NUM_BINDING => Ok(Value::from(self.scope.batch_num)),
            _ if is_builtin(name) => Err(StepError::type_error(format!(
                "built-in function '{}' must be called",
                name
            ))),
            _ => Err(StepError::name(name)),
        }
    }

    fn evaluate_dict(&mut self, entries: &[(Expr, Expr)]) -> Result<Value, StepError> {
        let mut map = Map::with_capacity(entries.len());
        for (key, value) in entries {
            let key = match self.evaluate(key)? {
                Value::String(key) => key,
                other => {
                    return Err(StepError::type_error(format!(
                        "dict keys must be str, not {}",
                        type_name(&other)
                    )))
                }
            };
            let value = self.evaluate(value)?;
            map.insert(key, value);
        }
        Ok(Value::Object(map))
    }

    fn evaluate_attribute(&mut self, value: &Expr, attr: &str) -> Result<Value, StepError> {
        if let Some(root) = value.root_name().filter(|root| !self.is_bound(root)) {
            return Err(StepError::name(root));
        }
        let receiver = self.evaluate(value)?;
        Err(StepError::attribute(type_name(&receiver), attr))
    }

    fn evaluate_args(
        &mut self,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<Args, StepError> {
        let positional = args
            .iter()
            .map(|arg| self.evaluate(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let keywords = kwargs
            .iter()
            .map(|(name, arg)| Ok((name.clone(), self.evaluate(arg)?)))
            .collect::<Result<Vec<_>, StepError>>()?;
        Ok(Args::new(positional, keywords))
    }

    fn evaluate_call(
        &mut self,
        func: &Expr,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<Value, StepError> {
        match func {
            Expr::Name(name) if !self.is_bound(name) => {
                let function = builtin(name).ok_or_else(|| StepError::name(name))?;
                let args = self.evaluate_args(args, kwargs)?;
                function(args)
            }
            Expr::Attribute { value, attr } => {
                // `pkg.module.fn(...)`: a dotted path on an unbound root
                if let Some(root) = value.root_name().filter(|root| !self.is_bound(root)) {
                    let path = func.dotted_path().ok_or_else(|| StepError::name(root))?;
                    return self.call_resolved(root, &path, args, kwargs);
                }
                let receiver = self.evaluate(value)?;
                let args = self.evaluate_args(args, kwargs)?;
                call_method(&receiver, attr, args)
            }
            other => {
                let callee = self.evaluate(other)?;
                Err(StepError::type_error(format!(
                    "'{}' object is not callable",
                    type_name(&callee)
                )))
            }
        }
    }

    fn call_resolved(
        &mut self,
        root: &str,
        path: &str,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<Value, StepError> {
        let Some(resolver) = self.resolver else {
            return Err(StepError::name(root));
        };
        let function = resolver.resolve_transform(path).ok_or_else(|| {
            StepError::new(
                ErrorKind::FunctionError,
                format!("cannot resolve function '{}'", path),
            )
        })?;
        if !kwargs.is_empty() {
            return Err(StepError::type_error(format!(
                "{}() does not accept keyword arguments",
                path
            )));
        }
        let args = self.evaluate_args(args, &[])?;
        function
            .call(&args.positional)
            .map_err(|e| StepError::new(ErrorKind::FunctionError, format!("{}: {}", path, e)))
    }

    fn evaluate_index(&mut self, value: &Expr, index: &Expr) -> Result<Value, StepError> {
        // `results[i]` without materialising the whole result list
        if matches!(value, Expr::Name(name) if name == RESULTS_BINDING && self.local(name).is_none())
        {
            let index = self.evaluate(index)?;
            let results = self.scope.results;
            return list_item(results, &index);
        }
        let container = self.evaluate(value)?;
        let index = self.evaluate(index)?;
        subscript(&container, &index)
    }

    fn evaluate_slice(
        &mut self,
        value: &Expr,
        lower: Option<&Expr>,
        upper: Option<&Expr>,
        step: Option<&Expr>,
    ) -> Result<Value, StepError> {
        let container = self.evaluate(value)?;
        let mut bound = |expr: Option<&Expr>| -> Result<Option<i64>, StepError> {
            match expr {
                None => Ok(None),
                Some(expr) => match self.evaluate(expr)? {
                    Value::Null => Ok(None),
                    other => as_index(&other, "slice indices").map(Some),
                },
            }
        };
        let lower = bound(lower)?;
        let upper = bound(upper)?;
        let step = bound(step)?;

        match &container {
            Value::Array(items) => {
                let picked = slice_positions(items.len(), lower, upper, step)?;
                Ok(Value::Array(
                    picked.into_iter().map(|i| items[i].clone()).collect(),
                ))
            }
            Value::String(s) => {
                let chars: Vec<char> = s.chars().collect();
                let picked = slice_positions(chars.len(), lower, upper, step)?;
                Ok(Value::String(picked.into_iter().map(|i| chars[i]).collect()))
            }
            other => Err(StepError::type_error(format!(
                "'{}' object is not subscriptable",
                type_name(other)
            ))),
        }
    }

    fn evaluate_unary(&mut self, op: UnaryOp, operand: &Expr) -> Result<Value, StepError> {
        let value = self.evaluate(operand)?;
        match op {
            UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
            UnaryOp::Neg | UnaryOp::Pos => {
                let symbol = if op == UnaryOp::Neg { "-" } else { "+" };
                let n = Num::of(&value).ok_or_else(|| {
                    StepError::type_error(format!(
                        "bad operand type for unary {}: '{}'",
                        symbol,
                        type_name(&value)
                    ))
                })?;
                match (op, n) {
                    (UnaryOp::Pos, n) => n.into_value(),
                    (_, Num::Int(i)) => i
                        .checked_neg()
                        .map(Value::from)
                        .ok_or_else(|| StepError::overflow("integer overflow")),
                    (_, Num::Float(f)) => float(-f),
                }
            }
        }
    }

    fn evaluate_compare(&mut self, left: &Expr, ops: &[(CmpOp, Expr)]) -> Result<Value, StepError> {
        let mut left = self.evaluate(left)?;
        for (op, right) in ops {
            let right = self.evaluate(right)?;
            if !compare(*op, &left, &right)? {
                return Ok(Value::Bool(false));
            }
            left = right;
        }
        Ok(Value::Bool(true))
    }

    fn evaluate_comprehension(
        &mut self,
        element: &Expr,
        var: &str,
        iter: &Expr,
        condition: Option<&Expr>,
    ) -> Result<Value, StepError> {
        let items = iterate(&self.evaluate(iter)?)?;
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            self.locals.push((var.to_string(), item));
            let produced = self.comprehension_item(element, condition);
            self.locals.pop();
            if let Some(value) = produced? {
                out.push(value);
            }
        }
        Ok(Value::Array(out))
    }

    fn comprehension_item(
        &mut self,
        element: &Expr,
        condition: Option<&Expr>,
    ) -> Result<Option<Value>, StepError> {
        if let Some(condition) = condition {
            if !truthy(&self.evaluate(condition)?) {
                return Ok(None);
            }
        }
        self.evaluate(element).map(Some)
    }
}

fn list_item(items: &[Value], index: &Value) -> Result<Value, StepError> {
    let i = match Num::of(index) {
        Some(Num::Int(i)) => i,
        _ => {
            return Err(StepError::type_error(format!(
                "list indices must be integers or slices, not {}",
                type_name(index)
            )))
        }
    };
    normalize_index(i, items.len())
        .map(|i| items[i].clone())
        .ok_or_else(|| StepError::index("list"))
}

/// `container[index]`
pub fn subscript(container: &Value, index: &Value) -> Result<Value, StepError> {
    match container {
        Value::Array(items) => list_item(items, index),
        Value::String(s) => {
            let i = match Num::of(index) {
                Some(Num::Int(i)) => i,
                _ => {
                    return Err(StepError::type_error(format!(
                        "string indices must be integers, not '{}'",
                        type_name(index)
                    )))
                }
            };
            let len = s.chars().count();
            normalize_index(i, len)
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::String(c.to_string()))
                .ok_or_else(|| StepError::index("string"))
        }
        Value::Object(map) => match index {
            Value::String(key) => map.get(key).cloned().ok_or_else(|| StepError::key(key)),
            other => Err(StepError::new(ErrorKind::KeyError, render(other))),
        },
        other => Err(StepError::type_error(format!(
            "'{}' object is not subscriptable",
            type_name(other)
        ))),
    }
}

/// Positions selected by `[lower:upper:step]` over a sequence of `len`
fn slice_positions(
    len: usize,
    lower: Option<i64>,
    upper: Option<i64>,
    step: Option<i64>,
) -> Result<Vec<usize>, StepError> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(StepError::value("slice step cannot be zero"));
    }
    let len = len as i64;
    let clamp = |bound: i64, low: i64, high: i64| {
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(low, high)
    };

    let mut positions = Vec::new();
    if step > 0 {
        let start = lower.map_or(0, |l| clamp(l, 0, len));
        let stop = upper.map_or(len, |u| clamp(u, 0, len));
        let mut i = start;
        while i < stop {
            positions.push(i as usize);
            i += step;
        }
    } else {
        let start = lower.map_or(len - 1, |l| clamp(l, -1, len - 1));
        let stop = upper.map_or(-1, |u| clamp(u, -1, len - 1));
        let mut i = start;
        while i > stop {
            positions.push(i as usize);
            i += step;
        }
    }
    Ok(positions)
}

fn unsupported(op: BinOp, left: &Value, right: &Value) -> StepError {
    StepError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        type_name(left),
        type_name(right)
    ))
}

fn repeat<T: Clone>(items: &[T], count: i64) -> Result<Vec<T>, StepError> {
    let count = count.max(0) as usize;
    let total = items.len().saturating_mul(count);
    if total > 1 << 24 {
        return Err(StepError::overflow("repeated sequence is too large"));
    }
    let mut out = Vec::with_capacity(total);
    for _ in 0..count {
        out.extend_from_slice(items);
    }
    Ok(out)
}

/// Apply a binary arithmetic operator with Python semantics
pub fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, StepError> {
    match (op, left, right) {
        (BinOp::Add, Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
        (BinOp::Add, Value::String(_), other) => Err(StepError::type_error(format!(
            "can only concatenate str (not \"{}\") to str",
            type_name(other)
        ))),
        (BinOp::Add, Value::Array(a), Value::Array(b)) => {
            Ok(Value::Array(a.iter().chain(b).cloned().collect()))
        }
        (BinOp::Add, Value::Array(_), other) => Err(StepError::type_error(format!(
            "can only concatenate list (not \"{}\") to list",
            type_name(other)
        ))),
        (BinOp::Mul, Value::String(s), count) | (BinOp::Mul, count, Value::String(s))
            if matches!(Num::of(count), Some(Num::Int(_))) =>
        {
            let count = as_index(count, "repeat count")?;
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::String(repeat(&chars, count)?.into_iter().collect()))
        }
        (BinOp::Mul, Value::Array(items), count) | (BinOp::Mul, count, Value::Array(items))
            if matches!(Num::of(count), Some(Num::Int(_))) =>
        {
            let count = as_index(count, "repeat count")?;
            Ok(Value::Array(repeat(items, count)?))
        }
        (BinOp::Mod, Value::String(template), args) => format_percent(template, args),
        _ => {
            let (Some(a), Some(b)) = (Num::of(left), Num::of(right)) else {
                return Err(unsupported(op, left, right));
            };
            arithmetic(op, a, b)?.into_value()
        }
    }
}

fn overflow() -> StepError {
    StepError::overflow("integer overflow")
}

fn arithmetic(op: BinOp, a: Num, b: Num) -> Result<Num, StepError> {
    use Num::{Float, Int};

    match (op, a, b) {
        (BinOp::Add, Int(x), Int(y)) => x.checked_add(y).map(Int).ok_or_else(overflow),
        (BinOp::Sub, Int(x), Int(y)) => x.checked_sub(y).map(Int).ok_or_else(overflow),
        (BinOp::Mul, Int(x), Int(y)) => x.checked_mul(y).map(Int).ok_or_else(overflow),
        (BinOp::Add, x, y) => Ok(Float(x.as_f64() + y.as_f64())),
        (BinOp::Sub, x, y) => Ok(Float(x.as_f64() - y.as_f64())),
        (BinOp::Mul, x, y) => Ok(Float(x.as_f64() * y.as_f64())),

        (BinOp::Div, x, y) => {
            if y.as_f64() == 0.0 {
                return Err(StepError::zero_division());
            }
            Ok(Float(x.as_f64() / y.as_f64()))
        }

        (BinOp::FloorDiv, Int(x), Int(y)) => {
            if y == 0 {
                return Err(StepError::new(
                    ErrorKind::ZeroDivisionError,
                    "integer division or modulo by zero",
                ));
            }
            let q = x.checked_div(y).ok_or_else(overflow)?;
            let adjust = x % y != 0 && ((x < 0) != (y < 0));
            Ok(Int(if adjust { q - 1 } else { q }))
        }
        (BinOp::FloorDiv, x, y) => {
            if y.as_f64() == 0.0 {
                return Err(StepError::new(
                    ErrorKind::ZeroDivisionError,
                    "float floor division by zero",
                ));
            }
            Ok(Float((x.as_f64() / y.as_f64()).floor()))
        }

        (BinOp::Mod, Int(x), Int(y)) => {
            if y == 0 {
                return Err(StepError::new(
                    ErrorKind::ZeroDivisionError,
                    "integer division or modulo by zero",
                ));
            }
            let r = x.checked_rem(y).ok_or_else(overflow)?;
            Ok(Int(if r != 0 && ((r < 0) != (y < 0)) { r + y } else { r }))
        }
        (BinOp::Mod, x, y) => {
            let (x, y) = (x.as_f64(), y.as_f64());
            if y == 0.0 {
                return Err(StepError::new(ErrorKind::ZeroDivisionError, "float modulo"));
            }
            let r = x % y;
            Ok(Float(if r != 0.0 && ((r < 0.0) != (y < 0.0)) { r + y } else { r }))
        }

        (BinOp::Pow, Int(x), Int(y)) if y >= 0 => {
            let exp = u32::try_from(y).map_err(|_| overflow())?;
            x.checked_pow(exp).map(Int).ok_or_else(overflow)
        }
        (BinOp::Pow, x, y) => {
            let (x, y) = (x.as_f64(), y.as_f64());
            if x == 0.0 && y < 0.0 {
                return Err(StepError::new(
                    ErrorKind::ZeroDivisionError,
                    "0.0 cannot be raised to a negative power",
                ));
            }
            let result = x.powf(y);
            if result.is_nan() {
                return Err(StepError::value("math domain error"));
            }
            Ok(Float(result))
        }
    }
}

fn contains(container: &Value, needle: &Value) -> Result<bool, StepError> {
    match container {
        Value::String(haystack) => match needle {
            Value::String(needle) => Ok(haystack.contains(needle.as_str())),
            other => Err(StepError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                type_name(other)
            ))),
        },
        Value::Array(items) => Ok(items.iter().any(|item| py_eq(item, needle))),
        Value::Object(map) => Ok(needle.as_str().is_some_and(|key| map.contains_key(key))),
        other => Err(StepError::type_error(format!(
            "argument of type '{}' is not iterable",
            type_name(other)
        ))),
    }
}

/// Identity on JSON values: same variant and same value, no numeric coercion
fn identical(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.is_f64() == b.is_f64() && a == b,
        _ => left == right,
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, StepError> {
    use std::cmp::Ordering::{Greater, Less};

    Ok(match op {
        CmpOp::Eq => py_eq(left, right),
        CmpOp::NotEq => !py_eq(left, right),
        CmpOp::Lt => py_cmp(left, right, "<")? == Less,
        CmpOp::LtEq => py_cmp(left, right, "<=")? != Greater,
        CmpOp::Gt => py_cmp(left, right, ">")? == Greater,
        CmpOp::GtEq => py_cmp(left, right, ">=")? != Less,
        CmpOp::In => contains(right, left)?,
        CmpOp::NotIn => !contains(right, left)?,
        CmpOp::Is => identical(left, right),
        CmpOp::IsNot => !identical(left, right),
    })
}
