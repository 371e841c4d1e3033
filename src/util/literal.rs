//! Python-style literal rendering
//!
//! Used for two things:
//! - the code generator's parameter literals (`render_param`)
//! - the rendered representation of transformation results (`render`)
//!
//! Rules:
//! - numbers pass through verbatim
//! - strings use single quotes, double quotes when the value contains a single
//!   quote (and no double quote), escaped single quotes when it contains both
//! - lists and mappings render recursively, mappings in insertion order
//! - `true`/`false`/`null` become `True`/`False`/`None`

use std::fmt::Write;

use serde_json::Value;

const DAG_CONFIG_REF: &str = "$DAG_CONFIG";

/// Render a value as a Python literal
pub fn render(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value, false);
    out
}

/// Render a node parameter for the generated artifact.
///
/// Same as [`render`], except that strings of the form `$DAG_CONFIG.key`
/// (and a bare `$DAG_CONFIG`) become lookups into the artifact's
/// `dag_config` mapping instead of string literals.
pub fn render_param(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value, true);
    out
}

/// Quote a string, picking the quoting style from its contents
pub fn quote_str(s: &str) -> String {
    let has_single = s.contains('\'');
    let has_double = s.contains('"');
    let quote = if has_single && !has_double { '"' } else { '\'' };

    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// A whole-string `$DAG_CONFIG` reference found in a node parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigRef<'a> {
    /// Bare `$DAG_CONFIG`: the whole mapping
    Whole,
    /// `$DAG_CONFIG.key`
    Key(&'a str),
}

impl<'a> ConfigRef<'a> {
    /// Recognise `$DAG_CONFIG` / `$DAG_CONFIG.key`; anything else is a plain string
    pub fn parse(s: &'a str) -> Option<Self> {
        let rest = s.strip_prefix(DAG_CONFIG_REF)?;
        if rest.is_empty() {
            return Some(ConfigRef::Whole);
        }
        let key = rest.strip_prefix('.')?;
        // Same key alphabet as `$DAG_CONFIG.key` placeholders in transformations
        if key.is_empty() || !key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            return None;
        }
        Some(ConfigRef::Key(key))
    }

    /// Lookup expression into the artifact's `dag_config` mapping
    pub fn to_lookup(self) -> String {
        match self {
            ConfigRef::Whole => "dag_config".to_string(),
            ConfigRef::Key(key) => format!("dag_config[{}]", quote_str(key)),
        }
    }
}

fn write_value(out: &mut String, value: &Value, params: bool) {
    match value {
        Value::Null => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Number(n) => {
            let _ = write!(out, "{}", n);
        }
        Value::String(s) => match params.then(|| ConfigRef::parse(s)).flatten() {
            Some(reference) => out.push_str(&reference.to_lookup()),
            None => out.push_str(&quote_str(s)),
        },
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item, params);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&quote_str(key));
                out.push_str(": ");
                write_value(out, item, params);
            }
            out.push('}');
        }
    }
}
