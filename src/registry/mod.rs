//! Registry Module - function resolution
//!
//! - `function`: `NodeFunction` / `Transform` callables and closure wrappers
//! - `resolver`: `FunctionResolver` capability and the in-process `FunctionRegistry`
//! - `builtin`: reserved `typhoon.*` functions

mod builtin;
mod function;
mod resolver;

pub use function::{single_arg, CallError, FnNode, FnTransform, NodeFunction, Transform};
pub use resolver::{FunctionRegistry, FunctionResolver, Namespace};
