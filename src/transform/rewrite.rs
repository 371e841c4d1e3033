//! Expression Rewriter - `$` placeholders to evaluable references
//!
//! | Placeholder          | Rewritten to            |
//! |----------------------|-------------------------|
//! | `$N` (N >= 1)        | `results[N-1]`          |
//! | `$SOURCE`            | `source_data`           |
//! | `$DAG_CONFIG.key`    | `dag_config['key']`     |
//! | `$DAG_CONFIG`        | `dag_config`            |
//! | `$DAG_CONTEXT.key`   | `dag_context['key']`    |
//! | `$DAG_CONTEXT`       | `dag_context`           |
//! | `$BATCH_NUM`         | `batch_num`             |
//!
//! Rewriting is lexical: text inside quoted string literals is copied as-is
//! and nothing outside a placeholder token is touched. Tokens with no safe
//! replacement (`$0`, `$-1`, `$01`, `$WHATEVER`, a lone `$`) are rejected.

use std::fmt;

use thiserror::Error;

use crate::util::{quote_str, ConfigRef};

/// Binding of the edge input
pub const SOURCE_BINDING: &str = "source_data";
/// Binding of prior step results
pub const RESULTS_BINDING: &str = "results";
/// Binding of the DAG-level config mapping
pub const DAG_CONFIG_BINDING: &str = "dag_config";
/// Binding of the execution context mapping
pub const DAG_CONTEXT_BINDING: &str = "dag_context";
/// Binding of the active batch ordinal
pub const BATCH_NUM_BINDING: &str = "batch_num";

/// A placeholder recognised in an expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    /// `$N`: result of the N-th prior step (1-based)
    Step(usize),
    Source,
    DagConfig(Option<String>),
    DagContext(Option<String>),
    BatchNum,
}

impl Placeholder {
    /// Evaluable replacement text
    pub fn replacement(&self) -> String {
        match self {
            Placeholder::Step(n) => format!("{}[{}]", RESULTS_BINDING, n - 1),
            Placeholder::Source => SOURCE_BINDING.to_string(),
            Placeholder::DagConfig(None) => ConfigRef::Whole.to_lookup(),
            Placeholder::DagConfig(Some(key)) => ConfigRef::Key(key).to_lookup(),
            Placeholder::DagContext(None) => DAG_CONTEXT_BINDING.to_string(),
            Placeholder::DagContext(Some(key)) => {
                format!("{}[{}]", DAG_CONTEXT_BINDING, quote_str(key))
            }
            Placeholder::BatchNum => BATCH_NUM_BINDING.to_string(),
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placeholder::Step(n) => write!(f, "${}", n),
            Placeholder::Source => f.write_str("$SOURCE"),
            Placeholder::DagConfig(None) => f.write_str("$DAG_CONFIG"),
            Placeholder::DagConfig(Some(key)) => write!(f, "$DAG_CONFIG.{}", key),
            Placeholder::DagContext(None) => f.write_str("$DAG_CONTEXT"),
            Placeholder::DagContext(Some(key)) => write!(f, "$DAG_CONTEXT.{}", key),
            Placeholder::BatchNum => f.write_str("$BATCH_NUM"),
        }
    }
}

/// Malformed placeholder token and its byte offset in the expression
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed placeholder '{token}' at offset {offset}")]
pub struct RewriteError {
    pub token: String,
    pub offset: usize,
}

enum Piece<'a> {
    Text(&'a str),
    Placeholder(Placeholder),
}

/// Rewrite every placeholder of `expr`
pub fn rewrite(expr: &str) -> Result<String, RewriteError> {
    let mut out = String::with_capacity(expr.len() + 16);
    scan(expr, |piece| match piece {
        Piece::Text(text) => out.push_str(text),
        Piece::Placeholder(p) => out.push_str(&p.replacement()),
    })?;
    Ok(out)
}

/// Placeholders used by `expr`, in order of appearance
pub fn placeholders(expr: &str) -> Result<Vec<Placeholder>, RewriteError> {
    let mut found = Vec::new();
    scan(expr, |piece| {
        if let Piece::Placeholder(p) = piece {
            found.push(p);
        }
    })?;
    Ok(found)
}

fn scan<'a>(expr: &'a str, mut emit: impl FnMut(Piece<'a>)) -> Result<(), RewriteError> {
    let bytes = expr.as_bytes();
    let mut i = 0;
    let mut text_start = 0;
    // (quote byte, triple-quoted)
    let mut quote: Option<(u8, bool)> = None;

    while i < bytes.len() {
        let b = bytes[i];

        if let Some((q, triple)) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                if !triple {
                    quote = None;
                } else if bytes[i..].starts_with(&[q, q, q]) {
                    quote = None;
                    i += 3;
                    continue;
                }
            }
            i += 1;
            continue;
        }

        match b {
            b'\'' | b'"' => {
                let triple = bytes[i..].starts_with(&[b, b, b]);
                quote = Some((b, triple));
                i += if triple { 3 } else { 1 };
            }
            b'$' => {
                emit(Piece::Text(&expr[text_start..i]));
                let (placeholder, len) = placeholder_at(expr, i)?;
                emit(Piece::Placeholder(placeholder));
                i += len;
                text_start = i;
            }
            _ => i += 1,
        }
    }

    if text_start < expr.len() {
        emit(Piece::Text(&expr[text_start..]));
    }
    Ok(())
}

fn take_while(s: &str, pred: impl Fn(u8) -> bool) -> &str {
    let end = s.bytes().position(|b| !pred(b)).unwrap_or(s.len());
    &s[..end]
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Parse the placeholder starting at `offset` (the `$`); returns it with its length
fn placeholder_at(expr: &str, offset: usize) -> Result<(Placeholder, usize), RewriteError> {
    let rest = &expr[offset + 1..];
    let reject = |len: usize| RewriteError {
        token: expr[offset..offset + 1 + len].to_string(),
        offset,
    };

    let first = rest.bytes().next();
    match first {
        Some(b) if b.is_ascii_digit() => {
            let digits = take_while(rest, |b| b.is_ascii_digit());
            if digits.starts_with('0') {
                return Err(reject(digits.len()));
            }
            let n: usize = digits.parse().map_err(|_| reject(digits.len()))?;
            Ok((Placeholder::Step(n), 1 + digits.len()))
        }
        Some(b'-') => {
            let digits = take_while(&rest[1..], |b| b.is_ascii_digit());
            Err(reject(1 + digits.len()))
        }
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {
            let word = take_while(rest, is_word_byte);
            let consumed = 1 + word.len();
            match word {
                "SOURCE" => Ok((Placeholder::Source, consumed)),
                "BATCH_NUM" => Ok((Placeholder::BatchNum, consumed)),
                "DAG_CONFIG" | "DAG_CONTEXT" => {
                    let key = rest[word.len()..]
                        .strip_prefix('.')
                        .map(|after| take_while(after, is_word_byte))
                        .filter(|key| !key.is_empty());
                    let len = consumed + key.map_or(0, |k| 1 + k.len());
                    let key = key.map(str::to_string);
                    let placeholder = if word == "DAG_CONFIG" {
                        Placeholder::DagConfig(key)
                    } else {
                        Placeholder::DagContext(key)
                    };
                    Ok((placeholder, len))
                }
                _ => Err(reject(word.len())),
            }
        }
        _ => Err(reject(0)),
    }
}
