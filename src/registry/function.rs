//! Callable interfaces
//!
//! Node functions are async and produce batches; transformation functions
//! (adapters and in-expression calls) are synchronous value-to-value maps.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Failure raised by a user or reserved function
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CallError(pub String);

impl CallError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Node function abstraction
///
/// Implementations:
/// - reserved `typhoon.flow.*` nodes
/// - [`FnNode`]: wraps a plain closure
///
/// # Example
/// ```rust,ignore
/// let batches = node.call(None, &params).await?;
/// ```
#[async_trait]
pub trait NodeFunction: Send + Sync {
    /// Run the node.
    ///
    /// `input` is `None` for source nodes, otherwise the final value of the
    /// incoming edge's chain. Every returned value is one batch that fans out
    /// over the node's outgoing edges.
    async fn call(&self, input: Option<Value>, params: &Map<String, Value>)
        -> Result<Vec<Value>, CallError>;
}

/// Transformation function abstraction (adapters, `pkg.module.fn(...)` calls)
pub trait Transform: Send + Sync {
    fn call(&self, args: &[Value]) -> Result<Value, CallError>;
}

/// Closure-backed node function
pub struct FnNode<F>(pub F);

#[async_trait]
impl<F> NodeFunction for FnNode<F>
where
    F: Fn(Option<Value>, &Map<String, Value>) -> Result<Vec<Value>, CallError> + Send + Sync,
{
    async fn call(
        &self,
        input: Option<Value>,
        params: &Map<String, Value>,
    ) -> Result<Vec<Value>, CallError> {
        (self.0)(input, params)
    }
}

/// Closure-backed transformation function
pub struct FnTransform<F>(pub F);

impl<F> Transform for FnTransform<F>
where
    F: Fn(&[Value]) -> Result<Value, CallError> + Send + Sync,
{
    fn call(&self, args: &[Value]) -> Result<Value, CallError> {
        (self.0)(args)
    }
}

/// Exactly one argument, as adapters and unary transforms expect
pub fn single_arg<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value, CallError> {
    match args {
        [value] => Ok(value),
        _ => Err(CallError::new(format!(
            "{}() takes exactly one argument ({} given)",
            name,
            args.len()
        ))),
    }
}
