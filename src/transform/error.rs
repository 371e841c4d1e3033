//! Step errors
//!
//! A failing transformation step is data, not an `Err` that escapes the chain.
//! Kinds are named after the equivalent Python exceptions so error records
//! read the same whether they come from the interpreter or a generated
//! artifact.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::util::ERROR_KEY;

/// Error-kind tag of a failed step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NameError,
    TypeError,
    KeyError,
    IndexError,
    AttributeError,
    ValueError,
    ZeroDivisionError,
    OverflowError,
    SyntaxError,
    /// Expression nested deeper than the parser or interpreter allows
    RecursionError,
    /// Malformed `$` placeholder
    PlaceholderError,
    /// A resolved function failed or could not be resolved
    FunctionError,
    /// The edge adapter failed before the chain ran
    AdapterError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NameError => "NameError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::KeyError => "KeyError",
            ErrorKind::IndexError => "IndexError",
            ErrorKind::AttributeError => "AttributeError",
            ErrorKind::ValueError => "ValueError",
            ErrorKind::ZeroDivisionError => "ZeroDivisionError",
            ErrorKind::OverflowError => "OverflowError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::RecursionError => "RecursionError",
            ErrorKind::PlaceholderError => "PlaceholderError",
            ErrorKind::FunctionError => "FunctionError",
            ErrorKind::AdapterError => "AdapterError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A captured step failure: kind tag plus message
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct StepError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StepError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn name(name: &str) -> Self {
        Self::new(ErrorKind::NameError, format!("name '{}' is not defined", name))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    pub fn value(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValueError, message)
    }

    /// `KeyError` carrying the repr of the missing key, like Python does
    pub fn key(key: &str) -> Self {
        Self::new(ErrorKind::KeyError, crate::util::quote_str(key))
    }

    pub fn index(container: &str) -> Self {
        Self::new(ErrorKind::IndexError, format!("{} index out of range", container))
    }

    pub fn attribute(type_name: &str, attr: &str) -> Self {
        Self::new(
            ErrorKind::AttributeError,
            format!("'{}' object has no attribute '{}'", type_name, attr),
        )
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SyntaxError, message)
    }

    pub fn recursion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RecursionError, message)
    }

    pub fn zero_division() -> Self {
        Self::new(ErrorKind::ZeroDivisionError, "division by zero")
    }

    pub fn overflow(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OverflowError, message)
    }

    /// The record later steps observe in place of a value:
    /// `{"__error__": "Kind: message"}`
    pub fn to_record(&self) -> Value {
        json!({ ERROR_KEY: self.to_string() })
    }

    /// Recognise an error record produced by [`StepError::to_record`]
    pub fn from_record(value: &Value) -> Option<Self> {
        let text = as_error_record(value)?;
        let (kind, message) = text.split_once(": ").unwrap_or((text, ""));
        let kind = serde_json::from_value::<ErrorKind>(Value::String(kind.to_string()))
            .unwrap_or(ErrorKind::FunctionError);
        Some(Self::new(kind, message))
    }
}

/// The error text of an error record, if `value` is one
pub fn as_error_record(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) if map.len() == 1 => map.get(ERROR_KEY).and_then(Value::as_str),
        _ => None,
    }
}

pub fn is_error_record(value: &Value) -> bool {
    as_error_record(value).is_some()
}
